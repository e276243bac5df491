//! Invoice channel abstractions.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::DomainError;
use crate::event::InvoiceTask;

/// Hands an invoice task to whichever channel the deployment uses.
#[async_trait]
pub trait InvoiceDispatcher: Send + Sync {
    /// Queues `task` for asynchronous delivery.
    async fn dispatch(&self, task: &InvoiceTask) -> Result<(), DomainError>;
}

/// Worker-side view of the durable invoice queue.
///
/// Entries are raw payloads so the worker can drop ones that do not decode.
#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Blocks up to `timeout` for the head entry. `None` means the queue
    /// stayed empty.
    async fn pop(&self, timeout: Duration) -> Result<Option<String>, DomainError>;

    /// Appends a raw entry to the tail of the queue.
    async fn push_back(&self, payload: &str) -> Result<(), DomainError>;
}

/// Which channel carries invoice tasks. Exactly one is active per
/// deployment; the API produces to it and the worker consumes from it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum InvoiceBackend {
    /// The durable Redis list `queue:invoice_sending`.
    #[default]
    Queue,
    /// The partitioned `checkout-events` topic.
    Stream,
}

impl FromStr for InvoiceBackend {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "queue" => Ok(Self::Queue),
            "stream" => Ok(Self::Stream),
            other => Err(DomainError::Validation(format!(
                "unknown invoice backend {other:?}, expected \"queue\" or \"stream\""
            ))),
        }
    }
}

impl fmt::Display for InvoiceBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Queue => f.write_str("queue"),
            Self::Stream => f.write_str("stream"),
        }
    }
}
