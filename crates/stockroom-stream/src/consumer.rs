//! Per-partition consumption.
//!
//! A `PartitionConsumer` walks one partition through
//! `Unassigned -> Assigned -> Consuming -> Revoked`. Deliveries are handled
//! one at a time and acknowledged only after the handler succeeds, so the
//! channel redelivers anything that was not fully processed.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use stockroom_core::error::DomainError;
use tokio_util::sync::CancellationToken;

/// Default delay before a failed message is redelivered.
pub const DEFAULT_REDELIVERY_DELAY: Duration = Duration::from_secs(5);

/// Lifecycle of one partition within a consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionState {
    /// Not yet claimed.
    Unassigned,
    /// Claimed; the handler's setup hook has run.
    Assigned,
    /// Deliveries are being processed.
    Consuming,
    /// Released; the handler's cleanup hook has run.
    Revoked,
}

impl fmt::Display for PartitionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unassigned => "unassigned",
            Self::Assigned => "assigned",
            Self::Consuming => "consuming",
            Self::Revoked => "revoked",
        };
        f.write_str(name)
    }
}

/// Application logic for one topic.
///
/// `handle` must be idempotent: deliveries are at-least-once. Returning
/// `DomainError::Validation` marks the payload as permanently unprocessable;
/// it is acknowledged and dropped. Any other error triggers redelivery.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Runs when a partition is assigned, before the first delivery.
    async fn setup(&self, _partition: u32) -> Result<(), DomainError> {
        Ok(())
    }

    /// Processes one payload.
    async fn handle(&self, payload: &[u8]) -> Result<(), DomainError>;

    /// Runs when a partition is revoked, after the last delivery.
    async fn cleanup(&self, _partition: u32) {}
}

/// One message received from the channel.
#[async_trait]
pub trait Delivery: Send + Sync {
    /// Raw message body.
    fn payload(&self) -> &[u8];

    /// Marks the message as processed.
    async fn ack(&self) -> Result<(), DomainError>;

    /// Asks for redelivery after `delay`.
    async fn nak(&self, delay: Duration) -> Result<(), DomainError>;
}

/// Tally of one consumption run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumeStats {
    /// Messages handled and acknowledged.
    pub acked: u64,
    /// Messages sent back for redelivery.
    pub redelivered: u64,
    /// Unprocessable messages acknowledged without effect.
    pub poisoned: u64,
}

enum Outcome {
    Acked,
    Redelivered,
    Poisoned,
}

/// Drives a single partition of a topic.
pub struct PartitionConsumer {
    topic: String,
    partition: u32,
    handler: Arc<dyn MessageHandler>,
    redelivery_delay: Duration,
    state: PartitionState,
}

impl fmt::Debug for PartitionConsumer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PartitionConsumer")
            .field("topic", &self.topic)
            .field("partition", &self.partition)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl PartitionConsumer {
    #[must_use]
    pub fn new(topic: impl Into<String>, partition: u32, handler: Arc<dyn MessageHandler>) -> Self {
        Self {
            topic: topic.into(),
            partition,
            handler,
            redelivery_delay: DEFAULT_REDELIVERY_DELAY,
            state: PartitionState::Unassigned,
        }
    }

    #[must_use]
    pub fn with_redelivery_delay(mut self, delay: Duration) -> Self {
        self.redelivery_delay = delay;
        self
    }

    #[must_use]
    pub fn state(&self) -> PartitionState {
        self.state
    }

    /// Runs the handler's setup hook.
    ///
    /// # Errors
    ///
    /// Whatever the setup hook returns; the partition stays unassigned.
    pub async fn assign(&mut self) -> Result<(), DomainError> {
        self.handler.setup(self.partition).await?;
        self.transition(PartitionState::Assigned);
        Ok(())
    }

    /// Processes deliveries in order until the stream ends or `cancel`
    /// fires. A delivery already being handled is finished first.
    pub async fn consume<S, D>(&mut self, deliveries: S, cancel: &CancellationToken) -> ConsumeStats
    where
        S: Stream<Item = Result<D, DomainError>> + Send,
        D: Delivery,
    {
        self.transition(PartitionState::Consuming);
        let mut deliveries = std::pin::pin!(deliveries);
        let mut stats = ConsumeStats::default();
        loop {
            let next = tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                next = deliveries.next() => next,
            };
            match next {
                None => break,
                Some(Err(e)) => {
                    tracing::warn!(
                        topic = %self.topic,
                        partition = self.partition,
                        error = %e,
                        "error receiving message"
                    );
                }
                Some(Ok(delivery)) => match self.process(&delivery).await {
                    Outcome::Acked => stats.acked += 1,
                    Outcome::Redelivered => stats.redelivered += 1,
                    Outcome::Poisoned => stats.poisoned += 1,
                },
            }
        }
        stats
    }

    /// Runs the handler's cleanup hook.
    pub async fn revoke(&mut self) {
        self.handler.cleanup(self.partition).await;
        self.transition(PartitionState::Revoked);
    }

    /// Assigns, consumes and revokes in one go.
    ///
    /// # Errors
    ///
    /// The setup hook's error; nothing is consumed in that case.
    pub async fn run<S, D>(
        mut self,
        deliveries: S,
        cancel: CancellationToken,
    ) -> Result<ConsumeStats, DomainError>
    where
        S: Stream<Item = Result<D, DomainError>> + Send,
        D: Delivery,
    {
        self.assign().await?;
        let stats = self.consume(deliveries, &cancel).await;
        self.revoke().await;
        tracing::info!(
            topic = %self.topic,
            partition = self.partition,
            acked = stats.acked,
            redelivered = stats.redelivered,
            poisoned = stats.poisoned,
            "partition consumer stopped"
        );
        Ok(stats)
    }

    async fn process<D: Delivery>(&self, delivery: &D) -> Outcome {
        match self.handler.handle(delivery.payload()).await {
            Ok(()) => {
                if let Err(e) = delivery.ack().await {
                    tracing::warn!(
                        topic = %self.topic,
                        partition = self.partition,
                        error = %e,
                        "failed to ack message"
                    );
                }
                Outcome::Acked
            }
            Err(DomainError::Validation(reason)) => {
                tracing::error!(
                    topic = %self.topic,
                    partition = self.partition,
                    %reason,
                    "dropping unprocessable message"
                );
                if let Err(e) = delivery.ack().await {
                    tracing::warn!(
                        topic = %self.topic,
                        partition = self.partition,
                        error = %e,
                        "failed to ack poison message"
                    );
                }
                Outcome::Poisoned
            }
            Err(e) => {
                tracing::warn!(
                    topic = %self.topic,
                    partition = self.partition,
                    error = %e,
                    delay_ms = self.redelivery_delay.as_millis(),
                    "handler failed, message will be redelivered"
                );
                if let Err(e) = delivery.nak(self.redelivery_delay).await {
                    tracing::warn!(
                        topic = %self.topic,
                        partition = self.partition,
                        error = %e,
                        "failed to nak message"
                    );
                }
                Outcome::Redelivered
            }
        }
    }

    fn transition(&mut self, to: PartitionState) {
        tracing::info!(
            topic = %self.topic,
            partition = self.partition,
            from = %self.state,
            %to,
            "partition state changed"
        );
        self.state = to;
    }
}
