//! Search index abstraction.

use async_trait::async_trait;

use crate::error::DomainError;
use crate::event::AuditRecord;
use crate::model::Product;

/// Document index kept eventually consistent with the primary store.
#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// Inserts or replaces the document for `product.id`.
    async fn upsert(&self, product: &Product) -> Result<(), DomainError>;

    /// Removes the document for `id`. Returns `false` if it was already
    /// absent, which callers treat as success.
    async fn delete(&self, id: i64) -> Result<bool, DomainError>;

    /// Appends an entry to the audit log.
    async fn append_audit(&self, record: &AuditRecord) -> Result<(), DomainError>;
}
