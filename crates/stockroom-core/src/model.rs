//! Catalog data model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Minimum length of a product name.
pub const MIN_NAME_LEN: usize = 3;

/// Default page size when the caller does not ask for one.
pub const DEFAULT_PAGE_LIMIT: u32 = 10;

/// Largest page a single list call may return.
pub const MAX_PAGE_LIMIT: u32 = 100;

/// A catalog product as stored in the primary store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    /// Store-assigned identifier, immutable after creation.
    pub id: i64,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Unit price in the smallest currency unit.
    #[serde(default)]
    pub price: i64,
    /// Units on hand. Never negative.
    #[serde(default)]
    pub stock: i64,
}

impl Product {
    /// A product carrying only its identifier, as published on delete.
    #[must_use]
    pub fn id_only(id: i64) -> Self {
        Self {
            id,
            name: String::new(),
            price: 0,
            stock: 0,
        }
    }

    /// Validates the mutable fields of an existing product.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` naming the first violated rule.
    pub fn validate(&self) -> Result<(), DomainError> {
        validate_fields(&self.name, self.price, self.stock)
    }
}

/// Payload for creating a product; the store assigns the id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewProduct {
    /// Display name.
    pub name: String,
    /// Unit price in the smallest currency unit.
    pub price: i64,
    /// Initial units on hand.
    pub stock: i64,
}

impl NewProduct {
    /// Validates the creation payload.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` naming the first violated rule.
    pub fn validate(&self) -> Result<(), DomainError> {
        validate_fields(&self.name, self.price, self.stock)
    }

    /// Combines the payload with a store-assigned id.
    #[must_use]
    pub fn with_id(self, id: i64) -> Product {
        Product {
            id,
            name: self.name,
            price: self.price,
            stock: self.stock,
        }
    }
}

fn validate_fields(name: &str, price: i64, stock: i64) -> Result<(), DomainError> {
    if name.trim().chars().count() < MIN_NAME_LEN {
        return Err(DomainError::Validation(format!(
            "name must be at least {MIN_NAME_LEN} characters"
        )));
    }
    if price <= 0 {
        return Err(DomainError::Validation("price must be positive".into()));
    }
    if stock < 0 {
        return Err(DomainError::Validation("stock must not be negative".into()));
    }
    Ok(())
}

/// Pagination and search parameters for listing products.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductFilter {
    page: u32,
    limit: u32,
    search: String,
}

impl ProductFilter {
    /// Builds a filter, applying defaults for missing values.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if `page` is zero or `limit` falls
    /// outside `1..=100`.
    pub fn new(
        page: Option<u32>,
        limit: Option<u32>,
        search: Option<String>,
    ) -> Result<Self, DomainError> {
        let page = page.unwrap_or(1);
        let limit = limit.unwrap_or(DEFAULT_PAGE_LIMIT);
        if page == 0 {
            return Err(DomainError::Validation("page must be at least 1".into()));
        }
        if limit == 0 || limit > MAX_PAGE_LIMIT {
            return Err(DomainError::Validation(format!(
                "limit must be between 1 and {MAX_PAGE_LIMIT}"
            )));
        }
        Ok(Self {
            page,
            limit,
            search: search.map(|s| s.trim().to_owned()).unwrap_or_default(),
        })
    }

    /// The 1-based page number.
    #[must_use]
    pub fn page(&self) -> u32 {
        self.page
    }

    /// The page size.
    #[must_use]
    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// The search term; empty when no name filter applies.
    #[must_use]
    pub fn search(&self) -> &str {
        &self.search
    }

    /// Number of rows to skip: `(page - 1) * limit`.
    #[must_use]
    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.limit)
    }
}

impl Default for ProductFilter {
    fn default() -> Self {
        Self {
            page: 1,
            limit: DEFAULT_PAGE_LIMIT,
            search: String::new(),
        }
    }
}

/// An immutable purchase record written by checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Store-assigned identifier.
    pub id: i64,
    /// The purchasing user.
    pub user_id: i64,
    /// The purchased product.
    pub product_id: i64,
    /// Units bought.
    pub quantity: i64,
    /// Unit price times quantity at the time of purchase.
    pub total_price: i64,
    /// When the row was written.
    pub created_at: DateTime<Utc>,
}

/// The authenticated buyer of a checkout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Customer {
    /// User identifier.
    pub user_id: i64,
    /// Address the invoice is sent to.
    pub email: String,
}

/// A request to buy `quantity` units of a product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutRequest {
    /// The product to buy.
    pub product_id: i64,
    /// Units to buy; must be positive.
    pub quantity: i64,
}

/// Input to the store's purchase transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PurchaseOrder {
    /// The purchasing user.
    pub user_id: i64,
    /// The product to decrement.
    pub product_id: i64,
    /// Units to decrement.
    pub quantity: i64,
}

/// Outcome of a committed purchase transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Purchase {
    /// The recorded transaction row.
    pub transaction: Transaction,
    /// The product as it stands after the stock decrement.
    pub product: Product,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_defaults_to_first_page_of_ten() {
        let filter = ProductFilter::new(None, None, None).unwrap();

        assert_eq!(filter.page(), 1);
        assert_eq!(filter.limit(), 10);
        assert_eq!(filter.search(), "");
        assert_eq!(filter.offset(), 0);
    }

    #[test]
    fn test_filter_offset_skips_previous_pages() {
        let filter = ProductFilter::new(Some(3), Some(25), None).unwrap();

        assert_eq!(filter.offset(), 50);
    }

    #[test]
    fn test_filter_rejects_page_zero() {
        let result = ProductFilter::new(Some(0), Some(10), None);

        assert!(matches!(result, Err(DomainError::Validation(_))));
    }

    #[test]
    fn test_filter_rejects_limit_outside_bounds() {
        assert!(ProductFilter::new(Some(1), Some(0), None).is_err());
        assert!(ProductFilter::new(Some(1), Some(101), None).is_err());
        assert!(ProductFilter::new(Some(1), Some(100), None).is_ok());
    }

    #[test]
    fn test_filter_trims_search_term() {
        let filter = ProductFilter::new(None, None, Some("  phone ".into())).unwrap();

        assert_eq!(filter.search(), "phone");
    }

    #[test]
    fn test_new_product_validation_rules() {
        let valid = NewProduct {
            name: "Kopi".into(),
            price: 5000,
            stock: 0,
        };
        assert!(valid.validate().is_ok());

        let short_name = NewProduct {
            name: "ab".into(),
            ..valid.clone()
        };
        assert!(short_name.validate().is_err());

        let free = NewProduct {
            price: 0,
            ..valid.clone()
        };
        assert!(free.validate().is_err());

        let negative_stock = NewProduct { stock: -1, ..valid };
        assert!(negative_stock.validate().is_err());
    }

    #[test]
    fn test_product_deserializes_id_only_payload() {
        let product: Product = serde_json::from_str(r#"{"id": 42}"#).unwrap();

        assert_eq!(product, Product::id_only(42));
    }
}
