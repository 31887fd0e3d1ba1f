//! Best-effort key/value cache with time-based expiry.
//!
//! Backend failures never fail a request: they are logged and treated as a
//! miss (reads) or a no-op (writes). There is no stampede protection and
//! pattern invalidation is a best-effort scan.

pub mod memory;
pub mod redis_store;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::config::CacheConfig;

pub use memory::MemoryCache;
pub use redis_store::RedisCache;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("Cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Raw string storage behind the cache
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;
    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError>;
    async fn delete(&self, key: &str) -> Result<(), CacheError>;
    /// Delete every key matching a glob pattern (`*` wildcard); returns the count removed
    async fn delete_matching(&self, pattern: &str) -> Result<u64, CacheError>;
}

#[derive(Clone)]
pub struct Cache {
    store: Arc<dyn CacheStore>,
    prefix: String,
    default_ttl: Duration,
}

impl Cache {
    pub fn new(store: Arc<dyn CacheStore>, prefix: impl Into<String>, default_ttl: Duration) -> Self {
        Self {
            store,
            prefix: prefix.into(),
            default_ttl,
        }
    }

    /// Redis when configured and reachable, otherwise an in-process map
    pub async fn from_config(config: &CacheConfig) -> Self {
        let ttl = Duration::from_secs(config.default_ttl_secs);
        if let Some(url) = &config.redis_url {
            match RedisCache::connect(url).await {
                Ok(store) => {
                    tracing::info!("Cache backed by Redis");
                    return Self::new(Arc::new(store), &config.key_prefix, ttl);
                }
                Err(e) => tracing::warn!("Redis unavailable, falling back to in-memory cache: {}", e),
            }
        }
        Self::new(Arc::new(MemoryCache::new()), &config.key_prefix, ttl)
    }

    pub fn in_memory(prefix: impl Into<String>) -> Self {
        Self::new(Arc::new(MemoryCache::new()), prefix, Duration::from_secs(300))
    }

    fn key(&self, key: &str) -> String {
        format!("{}:{}", self.prefix, key)
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let full_key = self.key(key);
        match self.store.get(&full_key).await {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(value) => {
                    tracing::debug!(key = %full_key, "cache hit");
                    Some(value)
                }
                Err(e) => {
                    tracing::warn!(key = %full_key, "Discarding undecodable cache entry: {}", e);
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(key = %full_key, "Cache read failed: {}", e);
                None
            }
        }
    }

    pub async fn set<T: Serialize>(&self, key: &str, value: &T, ttl: Option<Duration>) {
        let full_key = self.key(key);
        let result = match serde_json::to_string(value) {
            Ok(raw) => self.store.set(&full_key, raw, ttl.unwrap_or(self.default_ttl)).await,
            Err(e) => Err(e.into()),
        };
        if let Err(e) = result {
            tracing::warn!(key = %full_key, "Cache write failed: {}", e);
        }
    }

    pub async fn delete(&self, key: &str) {
        let full_key = self.key(key);
        if let Err(e) = self.store.delete(&full_key).await {
            tracing::warn!(key = %full_key, "Cache delete failed: {}", e);
        }
    }

    pub async fn invalidate_pattern(&self, pattern: &str) -> u64 {
        let full_pattern = self.key(pattern);
        match self.store.delete_matching(&full_pattern).await {
            Ok(removed) => {
                tracing::debug!(pattern = %full_pattern, removed, "cache invalidated");
                removed
            }
            Err(e) => {
                tracing::warn!(pattern = %full_pattern, "Cache invalidation failed: {}", e);
                0
            }
        }
    }

    /// Read-through helper: return the cached value or compute and store it
    pub async fn get_or_set<T, F, Fut, E>(&self, key: &str, ttl: Option<Duration>, compute: F) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(hit) = self.get(key).await {
            return Ok(hit);
        }
        let value = compute().await?;
        self.set(key, &value, ttl).await;
        Ok(value)
    }
}

/// Cache key layout
pub mod keys {
    use super::Uuid;

    pub fn dashboard(company_id: Uuid) -> String {
        format!("analytics:{}:dashboard", company_id)
    }

    pub fn company_analytics(company_id: Uuid) -> String {
        format!("analytics:{}:*", company_id)
    }
}

/// Glob match supporting only `*`
pub(crate) fn glob_match(pattern: &str, text: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 1 {
        return pattern == text;
    }

    let (first, last) = (parts[0], parts[parts.len() - 1]);
    if !text.starts_with(first) || !text[first.len()..].ends_with(last) {
        return false;
    }

    let mut rest = &text[first.len()..text.len() - last.len()];
    for part in &parts[1..parts.len() - 1] {
        match rest.find(part) {
            Some(idx) => rest = &rest[idx + part.len()..],
            None => return false,
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glob_patterns() {
        assert!(glob_match("analytics:*", "analytics:abc:dashboard"));
        assert!(glob_match("a:*:dashboard", "a:123:dashboard"));
        assert!(!glob_match("a:*:dashboard", "a:123:stats"));
        assert!(glob_match("exact", "exact"));
        assert!(!glob_match("exact", "exactly"));
        assert!(glob_match("*", ""));
        assert!(glob_match("a*b*c", "a-b-c"));
        assert!(!glob_match("ab*ba", "aba"));
    }

    #[tokio::test]
    async fn json_round_trip_and_prefix_isolation() {
        let store = Arc::new(MemoryCache::new());
        let cache = Cache::new(store.clone(), "app", Duration::from_secs(60));
        let other = Cache::new(store, "other", Duration::from_secs(60));

        cache.set("k", &vec![1, 2, 3], None).await;
        assert_eq!(cache.get::<Vec<i32>>("k").await, Some(vec![1, 2, 3]));
        assert_eq!(other.get::<Vec<i32>>("k").await, None);

        cache.delete("k").await;
        assert_eq!(cache.get::<Vec<i32>>("k").await, None);
    }

    #[tokio::test]
    async fn undecodable_entry_is_a_miss() {
        let cache = Cache::in_memory("app");
        cache.set("k", &"text", None).await;
        assert_eq!(cache.get::<u32>("k").await, None);
    }

    #[tokio::test]
    async fn invalidate_pattern_only_touches_matching_keys() {
        let cache = Cache::in_memory("app");
        let company = Uuid::new_v4();
        cache.set(&keys::dashboard(company), &1, None).await;
        cache.set(&keys::dashboard(Uuid::new_v4()), &2, None).await;

        assert_eq!(cache.invalidate_pattern(&keys::company_analytics(company)).await, 1);
        assert_eq!(cache.get::<i32>(&keys::dashboard(company)).await, None);
    }

    #[tokio::test]
    async fn get_or_set_computes_once() {
        let cache = Cache::in_memory("app");
        let first: Result<i32, ()> = cache.get_or_set("n", None, || async { Ok(7) }).await;
        let second: Result<i32, ()> = cache.get_or_set("n", None, || async { Ok(8) }).await;
        assert_eq!(first, Ok(7));
        assert_eq!(second, Ok(7));

        let failed: Result<i32, &str> = cache.get_or_set("err", None, || async { Err("boom") }).await;
        assert_eq!(failed, Err("boom"));
        assert_eq!(cache.get::<i32>("err").await, None);
    }
}
