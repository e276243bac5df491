//! Stockroom Catalog — the resilient product data-access layer.
//!
//! Serves reads through a cache-aside cache, guards the primary store with a
//! circuit breaker, runs the stock-decrementing checkout transaction, and
//! announces every mutation on the product event stream without letting a
//! downstream outage fail the caller.

pub mod breaker;
pub mod checkout;
mod notifier;
pub mod repository;
