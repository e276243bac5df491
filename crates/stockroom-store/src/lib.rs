//! Stockroom Store — `PostgreSQL` persistence for products and transactions.

pub mod pg_product_store;
pub mod schema;

/// Embedded migrations from the workspace `migrations/` directory.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations");
