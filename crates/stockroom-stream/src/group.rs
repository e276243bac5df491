//! Consumer group over every partition of a `JetStream` topic.

use std::sync::Arc;
use std::time::Duration;

use async_nats::jetstream::consumer::{AckPolicy, DeliverPolicy, PullConsumer, pull};
use async_nats::jetstream::{self, AckKind};
use async_trait::async_trait;
use futures::StreamExt;
use stockroom_core::error::DomainError;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::broker_error;
use crate::consumer::{
    ConsumeStats, DEFAULT_REDELIVERY_DELAY, Delivery, MessageHandler, PartitionConsumer,
};
use crate::partition::{
    DEFAULT_PARTITIONS, check_partition_coverage, partition_subject, recorded_partitions,
};
use crate::publisher::ensure_stream;

/// How long the broker waits for an ack before redelivering on its own.
const ACK_WAIT: Duration = Duration::from_secs(30);

/// A `JetStream` message seen through the `Delivery` port.
pub struct JetStreamDelivery(jetstream::Message);

#[async_trait]
impl Delivery for JetStreamDelivery {
    fn payload(&self) -> &[u8] {
        &self.0.payload
    }

    async fn ack(&self) -> Result<(), DomainError> {
        self.0.ack().await.map_err(|e| broker_error("ack", e))
    }

    async fn nak(&self, delay: Duration) -> Result<(), DomainError> {
        self.0
            .ack_with(AckKind::Nak(Some(delay)))
            .await
            .map_err(|e| broker_error("nak", e))
    }
}

/// Runs one durable pull consumer per partition of `topic`, each with a
/// single unacknowledged message at a time.
#[derive(Clone)]
pub struct JetStreamConsumerGroup {
    context: jetstream::Context,
    group: String,
    topic: String,
    partitions: u32,
    redelivery_delay: Duration,
}

impl std::fmt::Debug for JetStreamConsumerGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JetStreamConsumerGroup")
            .field("group", &self.group)
            .field("topic", &self.topic)
            .field("partitions", &self.partitions)
            .finish_non_exhaustive()
    }
}

impl JetStreamConsumerGroup {
    #[must_use]
    pub fn new(
        context: jetstream::Context,
        group: impl Into<String>,
        topic: impl Into<String>,
    ) -> Self {
        Self {
            context,
            group: group.into(),
            topic: topic.into(),
            partitions: DEFAULT_PARTITIONS,
            redelivery_delay: DEFAULT_REDELIVERY_DELAY,
        }
    }

    #[must_use]
    pub fn with_partitions(mut self, partitions: u32) -> Self {
        self.partitions = partitions.max(1);
        self
    }

    #[must_use]
    pub fn with_redelivery_delay(mut self, delay: Duration) -> Self {
        self.redelivery_delay = delay;
        self
    }

    /// Durable consumer name for `partition`, shared by every replica of
    /// the group so a restart resumes where the last one stopped.
    #[must_use]
    pub fn consumer_name(&self, partition: u32) -> String {
        format!("{}-{}-{partition}", self.group, self.topic)
    }

    /// Binds every partition and spawns its consumer into `tasks`.
    ///
    /// # Errors
    ///
    /// `DomainError::Validation` if publishers recorded more partitions on
    /// the stream than this group consumes. `DomainError::Transient` if the
    /// stream or a consumer cannot be created; partitions spawned before the
    /// failure keep running until `cancel` fires.
    pub async fn spawn(
        &self,
        handler: Arc<dyn MessageHandler>,
        cancel: &CancellationToken,
        tasks: &mut JoinSet<Result<ConsumeStats, DomainError>>,
    ) -> Result<(), DomainError> {
        let stream = ensure_stream(&self.context, &self.topic).await?;
        let recorded = recorded_partitions(&stream.cached_info().config.metadata);
        check_partition_coverage(&self.topic, recorded, self.partitions)?;

        for partition in 0..self.partitions {
            let name = self.consumer_name(partition);
            let consumer: PullConsumer = stream
                .get_or_create_consumer(
                    &name,
                    pull::Config {
                        durable_name: Some(name.clone()),
                        filter_subject: partition_subject(&self.topic, partition),
                        deliver_policy: DeliverPolicy::All,
                        ack_policy: AckPolicy::Explicit,
                        ack_wait: ACK_WAIT,
                        max_ack_pending: 1,
                        ..Default::default()
                    },
                )
                .await
                .map_err(|e| broker_error(&format!("create consumer {name}"), e))?;
            let messages = consumer
                .messages()
                .await
                .map_err(|e| broker_error(&format!("subscribe {name}"), e))?;

            let deliveries = messages.map(|message| {
                message
                    .map(JetStreamDelivery)
                    .map_err(|e| broker_error("receive", e))
            });
            let worker = PartitionConsumer::new(self.topic.clone(), partition, handler.clone())
                .with_redelivery_delay(self.redelivery_delay);
            tasks.spawn(worker.run(deliveries, cancel.child_token()));
            tracing::info!(
                consumer = %name,
                topic = %self.topic,
                partition,
                "partition consumer started"
            );
        }
        Ok(())
    }
}
