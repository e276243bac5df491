//! Stockroom Core — shared domain types and ports.
//!
//! This crate defines the product model, the domain error taxonomy, the
//! events that travel between processes, and the traits every adapter
//! implements. It contains no infrastructure code.

pub mod cache;
pub mod clock;
pub mod error;
pub mod event;
pub mod invoice;
pub mod model;
pub mod publisher;
pub mod search;
pub mod store;
