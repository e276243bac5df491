//! Key-to-partition routing shared by publishers and consumers.

use std::collections::HashMap;

use stockroom_core::error::DomainError;

/// Default number of partitions per topic.
pub const DEFAULT_PARTITIONS: u32 = 3;

/// Stream metadata entry holding the publishers' partition count.
pub const PARTITIONS_METADATA_KEY: &str = "stockroom.partitions";

const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

/// 32-bit FNV-1a. Stable across processes and platforms, unlike
/// `std::collections::hash_map::DefaultHasher`.
#[must_use]
pub fn fnv1a(bytes: &[u8]) -> u32 {
    bytes.iter().fold(FNV_OFFSET_BASIS, |hash, byte| {
        (hash ^ u32::from(*byte)).wrapping_mul(FNV_PRIME)
    })
}

/// Partition for `key` among `partitions` (treated as at least one).
#[must_use]
pub fn partition_for(key: &str, partitions: u32) -> u32 {
    fnv1a(key.as_bytes()) % partitions.max(1)
}

/// Subject of one partition of `topic`.
#[must_use]
pub fn partition_subject(topic: &str, partition: u32) -> String {
    format!("{topic}.{partition}")
}

/// Subject a message keyed by `key` is published to.
#[must_use]
pub fn subject_for(topic: &str, key: &str, partitions: u32) -> String {
    partition_subject(topic, partition_for(key, partitions))
}

/// Wildcard covering every partition of `topic`.
#[must_use]
pub fn topic_wildcard(topic: &str) -> String {
    format!("{topic}.*")
}

/// `JetStream` stream backing `topic`: `product-events` becomes
/// `PRODUCT_EVENTS`.
#[must_use]
pub fn stream_name(topic: &str) -> String {
    topic
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
        .collect()
}

/// Partition count recorded in a stream's metadata, if any.
#[must_use]
pub fn recorded_partitions(metadata: &HashMap<String, String>) -> Option<u32> {
    metadata.get(PARTITIONS_METADATA_KEY)?.parse().ok()
}

/// Checks that `consumed` partitions cover every partition publishers write
/// to. Extra consumer partitions only sit idle.
///
/// # Errors
///
/// `DomainError::Validation` when publishers use more partitions than are
/// consumed; events on the uncovered subjects would never be processed.
pub fn check_partition_coverage(
    topic: &str,
    recorded: Option<u32>,
    consumed: u32,
) -> Result<(), DomainError> {
    match recorded {
        Some(published) if published > consumed => Err(DomainError::Validation(format!(
            "{topic} is published on {published} partitions but only {consumed} are consumed"
        ))),
        Some(published) if published < consumed => {
            tracing::warn!(topic, published, consumed, "consuming more partitions than published");
            Ok(())
        }
        Some(_) => Ok(()),
        None => {
            tracing::debug!(topic, "no partition count recorded yet");
            Ok(())
        }
    }
}
