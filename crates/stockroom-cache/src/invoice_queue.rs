//! Durable invoice queue on a Redis list.
//!
//! Producers `RPUSH` to the tail; the worker `BLPOP`s from the head and
//! pushes failed entries back to the tail.

use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use stockroom_core::error::DomainError;
use stockroom_core::event::{INVOICE_QUEUE, InvoiceTask};
use stockroom_core::invoice::{InvoiceDispatcher, TaskQueue};

use crate::error::map_redis_error;

/// Invoice queue on the Redis list `queue:invoice_sending`.
#[derive(Clone)]
pub struct RedisInvoiceQueue {
    connection: ConnectionManager,
    key: String,
}

impl RedisInvoiceQueue {
    /// Uses the default queue key.
    #[must_use]
    pub fn new(connection: ConnectionManager) -> Self {
        Self {
            connection,
            key: INVOICE_QUEUE.to_owned(),
        }
    }

    /// Uses a custom list key.
    #[must_use]
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    async fn rpush(&self, payload: &str) -> Result<(), DomainError> {
        let mut con = self.connection.clone();
        let _len: i64 = con
            .rpush(&self.key, payload)
            .await
            .map_err(map_redis_error)?;
        Ok(())
    }
}

impl std::fmt::Debug for RedisInvoiceQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisInvoiceQueue")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl InvoiceDispatcher for RedisInvoiceQueue {
    async fn dispatch(&self, task: &InvoiceTask) -> Result<(), DomainError> {
        let payload = serde_json::to_string(task)
            .map_err(|e| DomainError::Persistence(format!("invoice serialization failed: {e}")))?;
        self.rpush(&payload).await?;
        tracing::debug!(user_id = task.user_id, queue = %self.key, "invoice task queued");
        Ok(())
    }
}

#[async_trait]
impl TaskQueue for RedisInvoiceQueue {
    async fn pop(&self, timeout: Duration) -> Result<Option<String>, DomainError> {
        let mut con = self.connection.clone();
        let entry: Option<(String, String)> = con
            .blpop(&self.key, timeout.as_secs_f64())
            .await
            .map_err(map_redis_error)?;
        Ok(entry.map(|(_key, payload)| payload))
    }

    async fn push_back(&self, payload: &str) -> Result<(), DomainError> {
        self.rpush(payload).await
    }
}
