//! Shared test doubles and utilities for the Stockroom catalog service.

mod cache;
mod clock;
mod invoice;
mod publisher;
mod search;
mod store;

pub use cache::{FailingCache, InMemoryCache};
pub use clock::{FixedClock, ManualClock};
pub use invoice::{FailingInvoiceDispatcher, InMemoryTaskQueue, RecordingInvoiceDispatcher};
pub use publisher::{FailingPublisher, PublishedMessage, RecordingPublisher};
pub use search::InMemorySearchIndex;
pub use store::InMemoryProductStore;
