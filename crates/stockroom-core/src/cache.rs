//! Cache store abstraction and the key scheme shared by its users.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::DomainError;
use crate::model::ProductFilter;

/// Prefix shared by every cached list page.
pub const PRODUCT_LIST_NAMESPACE: &str = "products:";

/// Key-value store with per-entry TTL, used as a cache-aside accelerator.
///
/// Callers treat every error as a cache miss.
#[async_trait]
pub trait Cache: Send + Sync {
    /// Reads a value.
    async fn get(&self, key: &str) -> Result<Option<String>, DomainError>;

    /// Writes a value that expires after `ttl`.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), DomainError>;

    /// Removes a single key. Removing a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<(), DomainError>;

    /// Removes every key starting with `prefix`.
    async fn delete_prefix(&self, prefix: &str) -> Result<(), DomainError>;
}

/// Key of a single cached product.
#[must_use]
pub fn product_key(id: i64) -> String {
    format!("product:{id}")
}

/// Key of a cached list page; lives under `PRODUCT_LIST_NAMESPACE`.
#[must_use]
pub fn product_list_key(filter: &ProductFilter) -> String {
    format!(
        "{PRODUCT_LIST_NAMESPACE}page:{}:limit:{}:search:{}",
        filter.page(),
        filter.limit(),
        filter.search()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_key_embeds_every_filter_field() {
        let filter = ProductFilter::new(Some(2), Some(20), Some("phone".into())).unwrap();

        assert_eq!(product_list_key(&filter), "products:page:2:limit:20:search:phone");
    }

    #[test]
    fn test_product_key_is_outside_list_namespace() {
        assert_eq!(product_key(42), "product:42");
        assert!(!product_key(42).starts_with(PRODUCT_LIST_NAMESPACE));
    }
}
