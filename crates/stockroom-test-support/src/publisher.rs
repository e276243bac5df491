//! Test publishers — `EventPublisher` implementations for tests.

use std::sync::Mutex;

use async_trait::async_trait;
use stockroom_core::error::DomainError;
use stockroom_core::publisher::EventPublisher;

/// One message captured by `RecordingPublisher`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedMessage {
    /// Destination topic.
    pub topic: String,
    /// Partition key.
    pub key: String,
    /// Deduplication id, for messages sent with `send_once`.
    pub message_id: Option<String>,
    /// Raw payload bytes.
    pub payload: Vec<u8>,
}

impl PublishedMessage {
    /// Decodes the payload as JSON.
    ///
    /// # Panics
    ///
    /// Panics if the payload is not valid JSON for `T`.
    pub fn decode<T: serde::de::DeserializeOwned>(&self) -> T {
        serde_json::from_slice(&self.payload).expect("published payload decodes")
    }
}

/// A publisher that records every message and always succeeds.
#[derive(Debug, Default)]
pub struct RecordingPublisher {
    sent: Mutex<Vec<PublishedMessage>>,
}

impl RecordingPublisher {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of all sent messages.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn sent(&self) -> Vec<PublishedMessage> {
        self.sent.lock().unwrap().clone()
    }

    fn record(&self, topic: &str, key: &str, message_id: Option<&str>, payload: &[u8]) {
        self.sent.lock().unwrap().push(PublishedMessage {
            topic: topic.to_owned(),
            key: key.to_owned(),
            message_id: message_id.map(str::to_owned),
            payload: payload.to_vec(),
        });
    }

    /// Returns the messages sent on `topic`.
    pub fn sent_on(&self, topic: &str) -> Vec<PublishedMessage> {
        self.sent().into_iter().filter(|m| m.topic == topic).collect()
    }
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    async fn send(
        &self,
        topic: &str,
        partition_key: &str,
        payload: &[u8],
    ) -> Result<(), DomainError> {
        self.record(topic, partition_key, None, payload);
        Ok(())
    }

    async fn send_once(
        &self,
        topic: &str,
        partition_key: &str,
        message_id: &str,
        payload: &[u8],
    ) -> Result<(), DomainError> {
        self.record(topic, partition_key, Some(message_id), payload);
        Ok(())
    }
}

/// A publisher that always fails, as if the broker were unreachable.
#[derive(Debug)]
pub struct FailingPublisher;

#[async_trait]
impl EventPublisher for FailingPublisher {
    async fn send(
        &self,
        _topic: &str,
        _partition_key: &str,
        _payload: &[u8],
    ) -> Result<(), DomainError> {
        Err(DomainError::Transient("broker unreachable".into()))
    }
}
