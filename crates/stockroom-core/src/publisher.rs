//! Event publisher abstraction.

use async_trait::async_trait;
use serde::Serialize;

use crate::error::DomainError;

/// Durable, partition-keyed event channel.
///
/// Implementations wait for the broker to acknowledge the write and retry
/// transient failures internally; an error means the event was not stored.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Sends `payload` on `topic`. Messages sharing `partition_key` are
    /// delivered to consumers in send order.
    async fn send(&self, topic: &str, partition_key: &str, payload: &[u8])
    -> Result<(), DomainError>;

    /// Like `send`, but tags the message with `message_id` so a broker with
    /// duplicate detection stores a retried send only once.
    async fn send_once(
        &self,
        topic: &str,
        partition_key: &str,
        _message_id: &str,
        payload: &[u8],
    ) -> Result<(), DomainError> {
        self.send(topic, partition_key, payload).await
    }
}

/// Serializes `message` as JSON and sends it.
///
/// # Errors
///
/// Returns `DomainError::Persistence` if serialization fails, otherwise
/// whatever the publisher returns.
pub async fn publish_json<T: Serialize + Sync>(
    publisher: &dyn EventPublisher,
    topic: &str,
    partition_key: &str,
    message: &T,
) -> Result<(), DomainError> {
    let payload = serde_json::to_vec(message)
        .map_err(|e| DomainError::Persistence(format!("event serialization failed: {e}")))?;
    publisher.send(topic, partition_key, &payload).await
}

/// Serializes `message` as JSON and sends it tagged with `message_id`.
///
/// # Errors
///
/// Same as `publish_json`.
pub async fn publish_json_once<T: Serialize + Sync>(
    publisher: &dyn EventPublisher,
    topic: &str,
    partition_key: &str,
    message_id: &str,
    message: &T,
) -> Result<(), DomainError> {
    let payload = serde_json::to_vec(message)
        .map_err(|e| DomainError::Persistence(format!("event serialization failed: {e}")))?;
    publisher
        .send_once(topic, partition_key, message_id, &payload)
        .await
}
