//! Primary store abstraction.

use async_trait::async_trait;

use crate::error::DomainError;
use crate::model::{NewProduct, Product, ProductFilter, Purchase, PurchaseOrder};

/// Relational store holding products and purchase records.
#[async_trait]
pub trait ProductStore: Send + Sync {
    /// Returns one page of products, optionally filtered by a
    /// case-insensitive name substring. No ordering is guaranteed.
    async fn list(&self, filter: &ProductFilter) -> Result<Vec<Product>, DomainError>;

    /// Looks up a product by primary key.
    async fn find(&self, id: i64) -> Result<Option<Product>, DomainError>;

    /// Inserts a product and returns it with its assigned id.
    async fn insert(&self, product: &NewProduct) -> Result<Product, DomainError>;

    /// Overwrites every mutable field of `product`. Returns `false` when no
    /// row has that id.
    async fn update(&self, product: &Product) -> Result<bool, DomainError>;

    /// Deletes a product. Returns `false` when no row has that id.
    async fn delete(&self, id: i64) -> Result<bool, DomainError>;

    /// Atomically decrements stock by `order.quantity` if enough is on hand
    /// and records the purchase.
    ///
    /// Fails with `DomainError::InsufficientStockOrNotFound` when the
    /// conditional decrement matches no row; nothing is written in that case.
    async fn purchase(&self, order: &PurchaseOrder) -> Result<Purchase, DomainError>;
}
