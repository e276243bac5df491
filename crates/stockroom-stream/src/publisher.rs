//! `JetStream` implementation of `EventPublisher`.

use std::future::Future;
use std::time::Duration;

use async_nats::HeaderMap;
use async_nats::header::NATS_MESSAGE_ID;
use async_nats::jetstream::{self, stream};
use async_trait::async_trait;
use stockroom_core::error::DomainError;
use stockroom_core::publisher::EventPublisher;

use crate::broker_error;
use crate::partition::{
    DEFAULT_PARTITIONS, PARTITIONS_METADATA_KEY, recorded_partitions, stream_name, subject_for,
    topic_wildcard,
};

/// Retry schedule for a single publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishRetry {
    /// Attempts including the first; at least one is always made.
    pub max_attempts: u32,
    /// Delay after the first failure, doubled after each further one.
    pub initial_backoff: Duration,
    /// Upper bound on a single delay.
    pub max_backoff: Duration,
}

impl Default for PublishRetry {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(2),
        }
    }
}

impl PublishRetry {
    /// Runs `attempt` until it succeeds or the attempts are used up,
    /// returning the last error.
    ///
    /// # Errors
    ///
    /// The error of the final attempt.
    pub async fn run<T, F, Fut>(&self, mut attempt: F) -> Result<T, DomainError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, DomainError>>,
    {
        let attempts = self.max_attempts.max(1);
        let mut backoff = self.initial_backoff;
        let mut number = 1;
        loop {
            match attempt(number).await {
                Ok(value) => return Ok(value),
                Err(e) if number >= attempts => return Err(e),
                Err(e) => {
                    tracing::warn!(
                        attempt = number,
                        error = %e,
                        backoff_ms = backoff.as_millis(),
                        "publish failed, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff = backoff.saturating_mul(2).min(self.max_backoff);
                    number += 1;
                }
            }
        }
    }
}

/// Publishes to `<topic>.<partition>` subjects and waits for the stream to
/// store each message.
#[derive(Clone)]
pub struct JetStreamPublisher {
    context: jetstream::Context,
    partitions: u32,
    retry: PublishRetry,
}

impl std::fmt::Debug for JetStreamPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JetStreamPublisher")
            .field("partitions", &self.partitions)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl JetStreamPublisher {
    /// Creates a publisher over `context` with default partitions and retry.
    #[must_use]
    pub fn new(context: jetstream::Context) -> Self {
        Self {
            context,
            partitions: DEFAULT_PARTITIONS,
            retry: PublishRetry::default(),
        }
    }

    #[must_use]
    pub fn with_partitions(mut self, partitions: u32) -> Self {
        self.partitions = partitions.max(1);
        self
    }

    #[must_use]
    pub fn with_retry(mut self, retry: PublishRetry) -> Self {
        self.retry = retry;
        self
    }

    /// Creates the stream backing `topic` unless it already exists, and
    /// records this publisher's partition count in its metadata so consumer
    /// groups can check they cover every partition.
    ///
    /// # Errors
    ///
    /// `DomainError::Transient` when the broker refuses or is unreachable.
    pub async fn ensure_topic(&self, topic: &str) -> Result<(), DomainError> {
        let stream = ensure_stream(&self.context, topic).await?;
        let info = stream.cached_info();
        let recorded = recorded_partitions(&info.config.metadata);
        if recorded != Some(self.partitions) {
            if let Some(previous) = recorded {
                tracing::warn!(
                    topic,
                    previous,
                    partitions = self.partitions,
                    "partition count changed; consumer groups must match"
                );
            }
            let mut config = info.config.clone();
            config
                .metadata
                .insert(PARTITIONS_METADATA_KEY.to_owned(), self.partitions.to_string());
            self.context
                .update_stream(&config)
                .await
                .map_err(|e| broker_error(&format!("record partitions on {}", config.name), e))?;
        }
        tracing::info!(topic, partitions = self.partitions, "topic ready");
        Ok(())
    }

    async fn publish(
        &self,
        subject: &str,
        headers: Option<&HeaderMap>,
        payload: &[u8],
    ) -> Result<(), DomainError> {
        let context = &self.context;
        self.retry
            .run(|_| async move {
                let target = subject.to_owned();
                let ack = match headers {
                    Some(headers) => {
                        context
                            .publish_with_headers(target, headers.clone(), payload.to_vec().into())
                            .await
                    }
                    None => context.publish(target, payload.to_vec().into()).await,
                }
                .map_err(|e| broker_error("publish", e))?;
                ack.await.map_err(|e| broker_error("publish ack", e))?;
                Ok(())
            })
            .await
    }
}

/// Headers tagging a message for `JetStream` duplicate detection.
#[must_use]
pub fn message_id_headers(message_id: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(NATS_MESSAGE_ID, message_id);
    headers
}

/// Looks up or creates the stream for `topic`, covering all its partitions.
pub(crate) async fn ensure_stream(
    context: &jetstream::Context,
    topic: &str,
) -> Result<stream::Stream, DomainError> {
    let name = stream_name(topic);
    let stream = context
        .get_or_create_stream(stream::Config {
            name: name.clone(),
            subjects: vec![topic_wildcard(topic)],
            storage: stream::StorageType::File,
            ..Default::default()
        })
        .await
        .map_err(|e| broker_error(&format!("ensure stream {name}"), e))?;
    tracing::debug!(stream = %name, topic, "stream ready");
    Ok(stream)
}

#[async_trait]
impl EventPublisher for JetStreamPublisher {
    async fn send(
        &self,
        topic: &str,
        partition_key: &str,
        payload: &[u8],
    ) -> Result<(), DomainError> {
        let subject = subject_for(topic, partition_key, self.partitions);
        self.publish(&subject, None, payload).await?;
        tracing::debug!(%subject, key = partition_key, "event published");
        Ok(())
    }

    async fn send_once(
        &self,
        topic: &str,
        partition_key: &str,
        message_id: &str,
        payload: &[u8],
    ) -> Result<(), DomainError> {
        let subject = subject_for(topic, partition_key, self.partitions);
        let headers = message_id_headers(message_id);
        self.publish(&subject, Some(&headers), payload).await?;
        tracing::debug!(%subject, key = partition_key, message_id, "event published");
        Ok(())
    }
}
