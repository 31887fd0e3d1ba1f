use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{glob_match, CacheError, CacheStore};

/// In-process store; expired entries are dropped lazily on access
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, (String, Instant)>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let now = Instant::now();
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                Some((value, expires_at)) if *expires_at > now => return Ok(Some(value.clone())),
                Some(_) => {}
                None => return Ok(None),
            }
        }
        self.entries.write().await.remove(key);
        Ok(None)
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        let expires_at = Instant::now() + ttl;
        self.entries.write().await.insert(key.to_string(), (value, expires_at));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn delete_matching(&self, pattern: &str) -> Result<u64, CacheError> {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|key, _| !glob_match(pattern, key));
        Ok((before - entries.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn entries_expire() {
        let cache = MemoryCache::new();
        cache.set("short", "v".to_string(), Duration::from_millis(20)).await.unwrap();
        cache.set("long", "v".to_string(), Duration::from_secs(60)).await.unwrap();
        assert_eq!(cache.get("short").await.unwrap().as_deref(), Some("v"));

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(cache.get("short").await.unwrap(), None);
        assert_eq!(cache.get("long").await.unwrap().as_deref(), Some("v"));
    }

    #[tokio::test]
    async fn delete_matching_counts_removed() {
        let cache = MemoryCache::new();
        for key in ["p:a:1", "p:a:2", "p:b:1"] {
            cache.set(key, "v".to_string(), Duration::from_secs(60)).await.unwrap();
        }
        assert_eq!(cache.delete_matching("p:a:*").await.unwrap(), 2);
        assert_eq!(cache.get("p:b:1").await.unwrap().as_deref(), Some("v"));
    }
}
