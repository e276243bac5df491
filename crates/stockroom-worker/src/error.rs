//! Worker startup errors.

use stockroom_core::error::DomainError;
use thiserror::Error;

/// Errors that stop the worker from starting.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// A required environment variable is missing or invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// A dependency (cache, search index, stream) could not be reached.
    #[error("dependency unavailable: {0}")]
    Dependency(#[from] DomainError),

    /// The broker connection could not be established.
    #[error("broker error: {0}")]
    Broker(String),
}
