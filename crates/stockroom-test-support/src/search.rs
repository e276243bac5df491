//! In-memory `SearchIndex` for tests.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use stockroom_core::error::DomainError;
use stockroom_core::event::AuditRecord;
use stockroom_core::model::Product;
use stockroom_core::search::SearchIndex;

/// A search index holding documents in a map and audit entries in a list.
/// Audit appends and document writes can be switched to fail independently.
#[derive(Debug, Default)]
pub struct InMemorySearchIndex {
    documents: Mutex<BTreeMap<i64, Product>>,
    audit: Mutex<Vec<AuditRecord>>,
    fail_writes: AtomicBool,
    fail_audit: AtomicBool,
}

impl InMemorySearchIndex {
    /// Creates an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `upsert` and `delete` fail while `true`.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Makes `append_audit` fail while `true`.
    pub fn set_fail_audit(&self, fail: bool) {
        self.fail_audit.store(fail, Ordering::SeqCst);
    }

    /// Returns the indexed documents ordered by id.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn documents(&self) -> Vec<Product> {
        self.documents.lock().unwrap().values().cloned().collect()
    }

    /// Returns the audit log in append order.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn audit_log(&self) -> Vec<AuditRecord> {
        self.audit.lock().unwrap().clone()
    }

    fn check_writes(&self) -> Result<(), DomainError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(DomainError::Transient("index unavailable".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl SearchIndex for InMemorySearchIndex {
    async fn upsert(&self, product: &Product) -> Result<(), DomainError> {
        self.check_writes()?;
        self.documents
            .lock()
            .unwrap()
            .insert(product.id, product.clone());
        Ok(())
    }

    async fn delete(&self, id: i64) -> Result<bool, DomainError> {
        self.check_writes()?;
        Ok(self.documents.lock().unwrap().remove(&id).is_some())
    }

    async fn append_audit(&self, record: &AuditRecord) -> Result<(), DomainError> {
        if self.fail_audit.load(Ordering::SeqCst) {
            return Err(DomainError::Transient("audit index unavailable".into()));
        }
        self.audit.lock().unwrap().push(record.clone());
        Ok(())
    }
}
