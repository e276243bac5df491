//! Test invoice channels — dispatcher and queue implementations for tests.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use stockroom_core::error::DomainError;
use stockroom_core::event::InvoiceTask;
use stockroom_core::invoice::{InvoiceDispatcher, TaskQueue};

/// A dispatcher that records every task and always succeeds.
#[derive(Debug, Default)]
pub struct RecordingInvoiceDispatcher {
    dispatched: Mutex<Vec<InvoiceTask>>,
}

impl RecordingInvoiceDispatcher {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of all dispatched tasks.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn dispatched(&self) -> Vec<InvoiceTask> {
        self.dispatched.lock().unwrap().clone()
    }
}

#[async_trait]
impl InvoiceDispatcher for RecordingInvoiceDispatcher {
    async fn dispatch(&self, task: &InvoiceTask) -> Result<(), DomainError> {
        self.dispatched.lock().unwrap().push(task.clone());
        Ok(())
    }
}

/// A dispatcher that always fails.
#[derive(Debug)]
pub struct FailingInvoiceDispatcher;

#[async_trait]
impl InvoiceDispatcher for FailingInvoiceDispatcher {
    async fn dispatch(&self, _task: &InvoiceTask) -> Result<(), DomainError> {
        Err(DomainError::Transient("queue unreachable".into()))
    }
}

const EMPTY_POLL: Duration = Duration::from_millis(5);

/// A FIFO queue of raw entries. `pop` answers at once when an entry is
/// queued; on an empty queue it waits a few milliseconds (at most the
/// timeout) so an idle worker loop still yields to the runtime.
#[derive(Debug, Default)]
pub struct InMemoryTaskQueue {
    entries: Mutex<VecDeque<String>>,
}

impl InMemoryTaskQueue {
    /// Creates a queue holding `entries`, head first.
    #[must_use]
    pub fn with_entries(entries: Vec<String>) -> Self {
        Self {
            entries: Mutex::new(entries.into()),
        }
    }

    /// Returns the queued entries, head first.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().unwrap().iter().cloned().collect()
    }
}

#[async_trait]
impl InvoiceDispatcher for InMemoryTaskQueue {
    async fn dispatch(&self, task: &InvoiceTask) -> Result<(), DomainError> {
        let payload = serde_json::to_string(task)
            .map_err(|e| DomainError::Persistence(e.to_string()))?;
        self.entries.lock().unwrap().push_back(payload);
        Ok(())
    }
}

#[async_trait]
impl TaskQueue for InMemoryTaskQueue {
    async fn pop(&self, timeout: Duration) -> Result<Option<String>, DomainError> {
        let head = self.entries.lock().unwrap().pop_front();
        if head.is_none() {
            tokio::time::sleep(timeout.min(EMPTY_POLL)).await;
        }
        Ok(head)
    }

    async fn push_back(&self, payload: &str) -> Result<(), DomainError> {
        self.entries.lock().unwrap().push_back(payload.to_owned());
        Ok(())
    }
}
