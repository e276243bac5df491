//! Redis implementation of the `Cache` trait.

use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use stockroom_core::cache::Cache;
use stockroom_core::error::DomainError;

use crate::error::map_redis_error;

/// Keys fetched per `SCAN` round trip during prefix invalidation.
const SCAN_BATCH: usize = 100;

/// Cache backed by Redis strings with `EX` expiry.
#[derive(Clone)]
pub struct RedisCache {
    connection: ConnectionManager,
}

impl RedisCache {
    /// Wraps an open connection.
    #[must_use]
    pub fn new(connection: ConnectionManager) -> Self {
        Self { connection }
    }
}

impl std::fmt::Debug for RedisCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisCache").finish_non_exhaustive()
    }
}

/// Escapes glob metacharacters so `prefix` matches literally in `SCAN MATCH`.
fn escape_glob(prefix: &str) -> String {
    let mut escaped = String::with_capacity(prefix.len() + 1);
    for c in prefix.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Whole seconds for `SET EX`; Redis rejects zero.
fn expiry_seconds(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

#[async_trait]
impl Cache for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<String>, DomainError> {
        let mut con = self.connection.clone();
        let value: Option<String> = con.get(key).await.map_err(map_redis_error)?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), DomainError> {
        let mut con = self.connection.clone();
        let () = con
            .set_ex(key, value, expiry_seconds(ttl))
            .await
            .map_err(map_redis_error)?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), DomainError> {
        let mut con = self.connection.clone();
        let _removed: usize = con.del(key).await.map_err(map_redis_error)?;
        Ok(())
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<(), DomainError> {
        let mut con = self.connection.clone();
        let pattern = format!("{}*", escape_glob(prefix));
        let mut cursor: u64 = 0;
        let mut removed = 0usize;
        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut con)
                .await
                .map_err(map_redis_error)?;
            if !keys.is_empty() {
                let count: usize = con.del(&keys).await.map_err(map_redis_error)?;
                removed += count;
            }
            if next == 0 {
                break;
            }
            cursor = next;
        }
        tracing::debug!(prefix, removed, "cache prefix invalidated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_glob_leaves_plain_prefix_untouched() {
        assert_eq!(escape_glob("products:"), "products:");
    }

    #[test]
    fn test_escape_glob_escapes_metacharacters() {
        assert_eq!(escape_glob("a*b?[c]"), r"a\*b\?\[c\]");
    }

    #[test]
    fn test_expiry_never_rounds_to_zero() {
        assert_eq!(expiry_seconds(Duration::from_millis(200)), 1);
        assert_eq!(expiry_seconds(Duration::from_secs(300)), 300);
    }
}
