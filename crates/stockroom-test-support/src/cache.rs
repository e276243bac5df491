//! Test caches — `Cache` implementations for tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use stockroom_core::cache::Cache;
use stockroom_core::error::DomainError;

/// A map-backed cache that records the TTL of every write. Entries never
/// expire on their own; tests inspect `ttl_of` instead.
#[derive(Debug, Default)]
pub struct InMemoryCache {
    entries: Mutex<HashMap<String, (String, Duration)>>,
}

impl InMemoryCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if `key` is cached.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn contains(&self, key: &str) -> bool {
        self.entries.lock().unwrap().contains_key(key)
    }

    /// Returns the TTL `key` was last written with.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn ttl_of(&self, key: &str) -> Option<Duration> {
        self.entries.lock().unwrap().get(key).map(|(_, ttl)| *ttl)
    }

    /// Writes a raw value, bypassing the trait. Used to plant stale or
    /// corrupt entries.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn insert_raw(&self, key: &str, value: &str) {
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_owned(), (value.to_owned(), Duration::from_secs(60)));
    }

    /// Number of cached keys.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    /// Returns `true` when nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl Cache for InMemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, DomainError> {
        Ok(self
            .entries
            .lock()
            .unwrap()
            .get(key)
            .map(|(value, _)| value.clone()))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), DomainError> {
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_owned(), (value.to_owned(), ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), DomainError> {
        self.entries.lock().unwrap().remove(key);
        Ok(())
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<(), DomainError> {
        self.entries
            .lock()
            .unwrap()
            .retain(|key, _| !key.starts_with(prefix));
        Ok(())
    }
}

/// A cache whose every call fails, as if the cache server were down.
#[derive(Debug)]
pub struct FailingCache;

#[async_trait]
impl Cache for FailingCache {
    async fn get(&self, _key: &str) -> Result<Option<String>, DomainError> {
        Err(DomainError::Transient("cache connection refused".into()))
    }

    async fn set(&self, _key: &str, _value: &str, _ttl: Duration) -> Result<(), DomainError> {
        Err(DomainError::Transient("cache connection refused".into()))
    }

    async fn delete(&self, _key: &str) -> Result<(), DomainError> {
        Err(DomainError::Transient("cache connection refused".into()))
    }

    async fn delete_prefix(&self, _prefix: &str) -> Result<(), DomainError> {
        Err(DomainError::Transient("cache connection refused".into()))
    }
}
