//! Stockroom Search — the Elasticsearch read model.
//!
//! Keeps one document per product in the `products` index and appends one
//! entry per processed event to the `product-logs` index.

pub mod elasticsearch;

pub use elasticsearch::ElasticsearchIndex;
