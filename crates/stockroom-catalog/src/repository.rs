//! Cache-aside product repository.
//!
//! Reads check the cache first and fall back to the store through the
//! circuit breaker and a query timeout. Writes go straight to the store,
//! then invalidate the affected keys and publish a `ProductEvent`.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use stockroom_core::cache::{Cache, product_key, product_list_key};
use stockroom_core::clock::Clock;
use stockroom_core::error::DomainError;
use stockroom_core::event::ProductAction;
use stockroom_core::model::{NewProduct, Product, ProductFilter};
use stockroom_core::publisher::EventPublisher;
use stockroom_core::store::ProductStore;

use crate::breaker::{BreakerError, CircuitBreaker};
use crate::notifier::ChangeNotifier;

/// Default bound on a single store read.
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(5);

/// Expiry of cached entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheTtls {
    /// Single products.
    pub product: Duration,
    /// List pages.
    pub list: Duration,
}

impl Default for CacheTtls {
    fn default() -> Self {
        Self {
            product: Duration::from_secs(600),
            list: Duration::from_secs(300),
        }
    }
}

/// Product data access shared by every request handler.
pub struct ProductRepository {
    store: Arc<dyn ProductStore>,
    breaker: Arc<CircuitBreaker>,
    notifier: ChangeNotifier,
    ttls: CacheTtls,
    query_timeout: Duration,
}

impl ProductRepository {
    /// Creates a repository with default TTLs and query timeout.
    #[must_use]
    pub fn new(
        store: Arc<dyn ProductStore>,
        cache: Arc<dyn Cache>,
        breaker: Arc<CircuitBreaker>,
        publisher: Arc<dyn EventPublisher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            breaker,
            notifier: ChangeNotifier::new(cache, publisher, clock),
            ttls: CacheTtls::default(),
            query_timeout: DEFAULT_QUERY_TIMEOUT,
        }
    }

    /// Overrides the cache TTLs.
    #[must_use]
    pub fn with_ttls(mut self, ttls: CacheTtls) -> Self {
        self.ttls = ttls;
        self
    }

    /// Overrides the per-read timeout.
    #[must_use]
    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = timeout;
        self
    }

    /// The breaker guarding store reads.
    #[must_use]
    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Returns one page of products, optionally filtered by name.
    ///
    /// # Errors
    ///
    /// `ServiceUnavailable` when the breaker rejects the read, `Transient`
    /// when the store fails or times out.
    pub async fn list(&self, filter: &ProductFilter) -> Result<Vec<Product>, DomainError> {
        let key = product_list_key(filter);
        if let Some(products) = self.cached::<Vec<Product>>(&key).await {
            return Ok(products);
        }

        let products = self.guarded(|| self.store.list(filter)).await?;
        self.fill(&key, &products, self.ttls.list).await;
        Ok(products)
    }

    /// Returns the product with `id`.
    ///
    /// # Errors
    ///
    /// `NotFound` when no product has `id`, plus the read errors of
    /// [`Self::list`].
    pub async fn get_by_id(&self, id: i64) -> Result<Product, DomainError> {
        let key = product_key(id);
        if let Some(product) = self.cached::<Product>(&key).await {
            return Ok(product);
        }

        let product = self
            .guarded(|| self.store.find(id))
            .await?
            .ok_or(DomainError::NotFound(id))?;
        self.fill(&key, &product, self.ttls.product).await;
        Ok(product)
    }

    /// Inserts a product and announces it.
    ///
    /// # Errors
    ///
    /// `Validation` for an invalid payload, or the store's error.
    pub async fn create(&self, new: NewProduct) -> Result<Product, DomainError> {
        new.validate()?;
        let product = self.store.insert(&new).await?;
        tracing::info!(product_id = product.id, "product created");

        self.notifier.invalidate_lists().await;
        self.notifier
            .announce(ProductAction::Create, product.clone())
            .await;
        Ok(product)
    }

    /// Replaces every mutable field of an existing product.
    ///
    /// # Errors
    ///
    /// `Validation` for an invalid payload, `NotFound` when no product has
    /// `product.id`, or the store's error.
    pub async fn update(&self, product: Product) -> Result<Product, DomainError> {
        product.validate()?;
        if !self.store.update(&product).await? {
            return Err(DomainError::NotFound(product.id));
        }
        tracing::info!(product_id = product.id, "product updated");

        self.notifier.invalidate_product(product.id).await;
        self.notifier
            .announce(ProductAction::Update, product.clone())
            .await;
        Ok(product)
    }

    /// Removes a product.
    ///
    /// # Errors
    ///
    /// `NotFound` when no product has `id`, or the store's error. Nothing is
    /// invalidated or announced for a missing id.
    pub async fn delete(&self, id: i64) -> Result<(), DomainError> {
        if !self.store.delete(id).await? {
            return Err(DomainError::NotFound(id));
        }
        tracing::info!(product_id = id, "product deleted");

        self.notifier.invalidate_product(id).await;
        self.notifier
            .announce(ProductAction::Delete, Product::id_only(id))
            .await;
        Ok(())
    }

    /// Runs a store read through the breaker under the query timeout.
    async fn guarded<T, F, Fut>(&self, read: F) -> Result<T, DomainError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, DomainError>>,
    {
        let timeout = self.query_timeout;
        let outcome = self
            .breaker
            .call(|| async move {
                tokio::time::timeout(timeout, read())
                    .await
                    .map_err(|_| {
                        DomainError::Transient(format!(
                            "query timed out after {}ms",
                            timeout.as_millis()
                        ))
                    })?
            })
            .await;

        match outcome {
            Ok(value) => Ok(value),
            Err(BreakerError::Inner(e)) => Err(e),
            Err(BreakerError::Open | BreakerError::TooManyRequests) => {
                tracing::warn!(
                    breaker = self.breaker.name(),
                    "store read rejected by circuit breaker"
                );
                Err(DomainError::ServiceUnavailable)
            }
        }
    }

    async fn cached<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        match self.notifier.cache().get(key).await {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(value) => {
                    tracing::debug!(cache_key = key, "cache hit");
                    Some(value)
                }
                Err(e) => {
                    tracing::warn!(cache_key = key, error = %e, "undecodable cache entry");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(cache_key = key, error = %e, "cache read failed");
                None
            }
        }
    }

    async fn fill<T: Serialize + Sync>(&self, key: &str, value: &T, ttl: Duration) {
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(cache_key = key, error = %e, "cache value did not serialize");
                return;
            }
        };
        if let Err(e) = self.notifier.cache().set(key, &raw, ttl).await {
            tracing::warn!(cache_key = key, error = %e, "cache write failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use stockroom_core::event::{PRODUCT_EVENTS_TOPIC, ProductEvent};
    use stockroom_test_support::{
        FailingCache, FailingPublisher, FixedClock, InMemoryCache, InMemoryProductStore,
        RecordingPublisher,
    };

    use super::*;
    use crate::breaker::{BreakerSettings, BreakerState};

    struct Fixture {
        store: Arc<InMemoryProductStore>,
        cache: Arc<InMemoryCache>,
        publisher: Arc<RecordingPublisher>,
        repository: ProductRepository,
    }

    fn clock() -> Arc<FixedClock> {
        Arc::new(FixedClock(Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap()))
    }

    fn product(id: i64, name: &str) -> Product {
        Product {
            id,
            name: name.into(),
            price: 1000,
            stock: 5,
        }
    }

    fn fixture(products: Vec<Product>) -> Fixture {
        let store = Arc::new(InMemoryProductStore::with_products(products));
        let cache = Arc::new(InMemoryCache::new());
        let publisher = Arc::new(RecordingPublisher::new());
        let clock = clock();
        let breaker = Arc::new(CircuitBreaker::new(BreakerSettings::default(), clock.clone()));
        let repository = ProductRepository::new(
            store.clone(),
            cache.clone(),
            breaker,
            publisher.clone(),
            clock,
        );
        Fixture {
            store,
            cache,
            publisher,
            repository,
        }
    }

    fn catalog() -> Vec<Product> {
        (1..=25).map(|id| product(id, &format!("item-{id:02}"))).collect()
    }

    #[tokio::test]
    async fn test_list_returns_at_most_limit_items_of_requested_page() {
        // Arrange
        let f = fixture(catalog());
        let filter = ProductFilter::new(Some(3), Some(10), None).unwrap();

        // Act
        let page = f.repository.list(&filter).await.unwrap();

        // Assert
        let ids: Vec<i64> = page.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![21, 22, 23, 24, 25]);
    }

    #[tokio::test]
    async fn test_list_populates_cache_with_list_ttl() {
        // Arrange
        let f = fixture(catalog());
        let filter = ProductFilter::new(Some(1), Some(5), Some("item-1".into())).unwrap();

        // Act
        let first = f.repository.list(&filter).await.unwrap();
        let second = f.repository.list(&filter).await.unwrap();

        // Assert
        assert_eq!(first, second);
        assert_eq!(f.store.read_count(), 1);
        assert_eq!(
            f.cache.ttl_of("products:page:1:limit:5:search:item-1"),
            Some(Duration::from_secs(300))
        );
    }

    #[tokio::test]
    async fn test_get_by_id_caches_product_for_ten_minutes() {
        // Arrange
        let f = fixture(vec![product(42, "Kopi Susu")]);

        // Act
        let found = f.repository.get_by_id(42).await.unwrap();

        // Assert
        assert_eq!(found.name, "Kopi Susu");
        assert_eq!(f.cache.ttl_of("product:42"), Some(Duration::from_secs(600)));
    }

    #[tokio::test]
    async fn test_get_by_id_missing_returns_not_found_and_caches_nothing() {
        // Arrange
        let f = fixture(vec![]);

        // Act
        let result = f.repository.get_by_id(9).await;

        // Assert
        assert!(matches!(result, Err(DomainError::NotFound(9))));
        assert!(f.cache.is_empty());
    }

    #[tokio::test]
    async fn test_cache_hit_bypasses_store_even_when_breaker_open() {
        // Arrange
        let f = fixture(vec![product(42, "Kopi Susu")]);
        f.repository.get_by_id(42).await.unwrap();
        f.store.set_fail_reads(true);
        for id in 100..103 {
            let _ = f.repository.get_by_id(id).await;
        }
        let reads_before = f.store.read_count();

        // Act
        let result = f.repository.get_by_id(42).await;

        // Assert
        assert_eq!(f.repository.breaker().state(), BreakerState::Open);
        assert_eq!(result.unwrap().name, "Kopi Susu");
        assert_eq!(f.store.read_count(), reads_before);
    }

    #[tokio::test]
    async fn test_open_breaker_rejects_reads_without_touching_store() {
        // Arrange
        let f = fixture(vec![product(1, "Kopi")]);
        f.store.set_fail_reads(true);
        for _ in 0..3 {
            let result = f.repository.get_by_id(1).await;
            assert!(matches!(result, Err(DomainError::Transient(_))));
        }
        let reads_before = f.store.read_count();

        // Act
        let result = f.repository.list(&ProductFilter::default()).await;

        // Assert
        assert!(matches!(result, Err(DomainError::ServiceUnavailable)));
        assert_eq!(f.store.read_count(), reads_before);
    }

    #[tokio::test]
    async fn test_undecodable_cache_entry_is_treated_as_miss() {
        // Arrange
        let f = fixture(vec![product(42, "Kopi Susu")]);
        f.cache.insert_raw("product:42", "{not json");

        // Act
        let found = f.repository.get_by_id(42).await.unwrap();

        // Assert
        assert_eq!(found.name, "Kopi Susu");
        assert_eq!(f.store.read_count(), 1);
    }

    #[tokio::test]
    async fn test_failing_cache_falls_back_to_store() {
        // Arrange
        let store = Arc::new(InMemoryProductStore::with_products(vec![product(42, "Kopi")]));
        let clock = clock();
        let repository = ProductRepository::new(
            store.clone(),
            Arc::new(FailingCache),
            Arc::new(CircuitBreaker::new(BreakerSettings::default(), clock.clone())),
            Arc::new(RecordingPublisher::new()),
            clock,
        );

        // Act
        let found = repository.get_by_id(42).await;
        let created = repository
            .create(NewProduct {
                name: "Teh Tarik".into(),
                price: 3000,
                stock: 4,
            })
            .await;

        // Assert
        assert_eq!(found.unwrap().id, 42);
        assert!(created.is_ok());
    }

    #[tokio::test]
    async fn test_create_invalidates_lists_and_emits_create_event() {
        // Arrange
        let f = fixture(catalog());
        let filter = ProductFilter::default();
        f.repository.list(&filter).await.unwrap();
        f.cache.insert_raw("product:1", "{}");

        // Act
        let created = f
            .repository
            .create(NewProduct {
                name: "Nasi Goreng".into(),
                price: 25_000,
                stock: 10,
            })
            .await
            .unwrap();

        // Assert
        assert_eq!(created.id, 26);
        assert!(!f.cache.contains(&product_list_key(&filter)));
        assert!(f.cache.contains("product:1"));
        let sent = f.publisher.sent_on(PRODUCT_EVENTS_TOPIC);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].key, "26");
        let event: ProductEvent = sent[0].decode();
        assert_eq!(event.action, ProductAction::Create);
        assert_eq!(event.product, created);
        assert_eq!(
            sent[0].message_id.as_deref(),
            event.event_id.map(|id| id.to_string()).as_deref()
        );
    }

    #[tokio::test]
    async fn test_create_rejects_invalid_product() {
        // Arrange
        let f = fixture(vec![]);

        // Act
        let result = f
            .repository
            .create(NewProduct {
                name: "ab".into(),
                price: 1,
                stock: 0,
            })
            .await;

        // Assert
        assert!(matches!(result, Err(DomainError::Validation(_))));
        assert!(f.publisher.sent().is_empty());
    }

    #[tokio::test]
    async fn test_update_then_get_reflects_new_data() {
        // Arrange
        let f = fixture(vec![product(42, "Kopi Susu")]);
        f.repository.get_by_id(42).await.unwrap();
        let changed = Product {
            price: 1500,
            ..product(42, "Kopi Susu Gula Aren")
        };

        // Act
        f.repository.update(changed.clone()).await.unwrap();
        let found = f.repository.get_by_id(42).await.unwrap();

        // Assert
        assert_eq!(found, changed);
        let event: ProductEvent = f.publisher.sent()[0].decode();
        assert_eq!(event.action, ProductAction::Update);
        assert_eq!(event.product.price, 1500);
    }

    #[tokio::test]
    async fn test_update_missing_product_returns_not_found() {
        // Arrange
        let f = fixture(vec![]);

        // Act
        let result = f.repository.update(product(7, "Ghost")).await;

        // Assert
        assert!(matches!(result, Err(DomainError::NotFound(7))));
        assert!(f.publisher.sent().is_empty());
    }

    #[tokio::test]
    async fn test_delete_emits_id_only_event_and_invalidates() {
        // Arrange
        let f = fixture(vec![product(42, "Kopi Susu")]);
        f.repository.get_by_id(42).await.unwrap();

        // Act
        f.repository.delete(42).await.unwrap();

        // Assert
        assert!(!f.cache.contains("product:42"));
        assert!(f.store.product(42).is_none());
        let event: ProductEvent = f.publisher.sent()[0].decode();
        assert_eq!(event.action, ProductAction::Delete);
        assert_eq!(event.product, Product::id_only(42));
    }

    #[tokio::test]
    async fn test_delete_missing_product_returns_not_found_without_event() {
        // Arrange
        let f = fixture(vec![]);

        // Act
        let result = f.repository.delete(42).await;

        // Assert
        assert!(matches!(result, Err(DomainError::NotFound(42))));
        assert!(f.publisher.sent().is_empty());
    }

    #[tokio::test]
    async fn test_publish_failure_does_not_fail_write() {
        // Arrange
        let store = Arc::new(InMemoryProductStore::new());
        let clock = clock();
        let repository = ProductRepository::new(
            store.clone(),
            Arc::new(InMemoryCache::new()),
            Arc::new(CircuitBreaker::new(BreakerSettings::default(), clock.clone())),
            Arc::new(FailingPublisher),
            clock,
        );

        // Act
        let created = repository
            .create(NewProduct {
                name: "Es Teh".into(),
                price: 2000,
                stock: 3,
            })
            .await
            .unwrap();

        // Assert
        assert_eq!(store.product(created.id), Some(created));
    }
}
