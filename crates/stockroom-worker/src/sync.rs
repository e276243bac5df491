//! Applies product events to the search index.

use std::sync::Arc;

use async_trait::async_trait;
use stockroom_core::clock::Clock;
use stockroom_core::error::DomainError;
use stockroom_core::event::{AuditRecord, ProductAction, ProductEvent};
use stockroom_core::search::SearchIndex;
use stockroom_stream::MessageHandler;

/// Mirrors `product-events` into the search index and its audit log.
///
/// Upserts and deletes are keyed by product id, so a redelivered event
/// leaves the index unchanged.
pub struct IndexSynchronizer {
    index: Arc<dyn SearchIndex>,
    clock: Arc<dyn Clock>,
}

impl IndexSynchronizer {
    #[must_use]
    pub fn new(index: Arc<dyn SearchIndex>, clock: Arc<dyn Clock>) -> Self {
        Self { index, clock }
    }

    /// Applies one decoded event.
    ///
    /// # Errors
    ///
    /// The index error when the document write fails. Audit failures are
    /// logged only.
    pub async fn apply(&self, event: &ProductEvent) -> Result<(), DomainError> {
        let product_id = event.product.id;
        match event.action {
            ProductAction::Create | ProductAction::Update => {
                self.index.upsert(&event.product).await?;
                tracing::info!(
                    product_id,
                    action = %event.action,
                    "product synced to search index"
                );
            }
            ProductAction::Delete => {
                if self.index.delete(product_id).await? {
                    tracing::info!(product_id, "product removed from search index");
                } else {
                    tracing::debug!(product_id, "product already absent from search index");
                }
            }
        }

        let record = AuditRecord::for_event(event, self.clock.now());
        if let Err(e) = self.index.append_audit(&record).await {
            tracing::warn!(product_id, error = %e, "failed to append audit record");
        }
        Ok(())
    }
}

#[async_trait]
impl MessageHandler for IndexSynchronizer {
    async fn setup(&self, partition: u32) -> Result<(), DomainError> {
        tracing::info!(partition, "index synchronizer assigned partition");
        Ok(())
    }

    async fn handle(&self, payload: &[u8]) -> Result<(), DomainError> {
        let event: ProductEvent = serde_json::from_slice(payload)
            .map_err(|e| DomainError::Validation(format!("undecodable product event: {e}")))?;
        self.apply(&event).await
    }

    async fn cleanup(&self, partition: u32) {
        tracing::info!(partition, "index synchronizer revoked partition");
    }
}
