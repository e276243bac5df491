//! Stockroom Worker — asynchronous consumers of the catalog's events.
//!
//! Keeps the Elasticsearch read model in step with the product event stream
//! and delivers invoices queued by checkout.

pub mod config;
pub mod error;
pub mod invoice;
pub mod sync;
