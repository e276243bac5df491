//! Stockroom Stream — the partitioned event channel.
//!
//! Topics map onto NATS `JetStream` streams whose subjects carry a partition
//! suffix. Publishers hash each message key onto a partition; consumers run
//! one durable pull consumer per partition with a single message in flight,
//! so events sharing a key are processed strictly in order.

use stockroom_core::error::DomainError;

pub mod consumer;
pub mod group;
pub mod invoice;
pub mod partition;
pub mod publisher;

pub use consumer::{ConsumeStats, Delivery, MessageHandler, PartitionConsumer, PartitionState};
pub use group::{JetStreamConsumerGroup, JetStreamDelivery};
pub use invoice::TopicInvoiceDispatcher;
pub use publisher::{JetStreamPublisher, PublishRetry};

/// Maps any broker client error onto the shared error type.
pub(crate) fn broker_error(context: &str, error: impl std::fmt::Display) -> DomainError {
    DomainError::Transient(format!("{context}: {error}"))
}
