//! Stockroom Cache — Redis adapters.
//!
//! `RedisCache` backs the cache-aside layer and `RedisInvoiceQueue` backs the
//! durable invoice list. Both share a multiplexed `ConnectionManager` that
//! reconnects on its own.

mod error;
pub mod invoice_queue;
pub mod redis_cache;

pub use invoice_queue::RedisInvoiceQueue;
pub use redis_cache::RedisCache;

use redis::aio::ConnectionManager;
use stockroom_core::error::DomainError;

/// Opens a managed connection to `url`.
///
/// # Errors
///
/// Returns `DomainError::Transient` if the URL is invalid or the server is
/// unreachable.
pub async fn connect(url: &str) -> Result<ConnectionManager, DomainError> {
    let client = redis::Client::open(url).map_err(error::map_redis_error)?;
    ConnectionManager::new(client)
        .await
        .map_err(error::map_redis_error)
}
