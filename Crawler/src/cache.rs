// src/cache.rs

//! Crawl cache: memoized detail-page bytes.
//!
//! The cache is advisory. A backend failure is logged and reported as a miss
//! (or a no-op for writes) so that a broken cache directory slows a search
//! down without ever failing it.

use std::sync::Arc;

use chrono::Utc;

use crate::models::{CacheConfig, EvictionPolicy};
use crate::storage::{CacheStore, LocalStore, MemoryStore};

const FAILED_PREFIX: &str = "failed:";
const HASH_PREFIX: &str = "hash:";

/// Key/bytes memoization shared by every query session.
#[derive(Clone)]
pub struct CrawlCache {
    store: Arc<dyn CacheStore>,
    config: CacheConfig,
}

impl CrawlCache {
    pub fn new(store: Arc<dyn CacheStore>, config: CacheConfig) -> Self {
        Self { store, config }
    }

    /// Build the cache described by configuration: on disk when a directory
    /// is configured, in memory otherwise.
    pub fn from_config(config: &CacheConfig) -> Self {
        let store: Arc<dyn CacheStore> = match (&config.dir, config.enabled) {
            (Some(dir), true) => {
                log::debug!("Crawl cache at {}", dir.display());
                Arc::new(LocalStore::new(dir))
            }
            _ => Arc::new(MemoryStore::new()),
        };
        Self::new(store, config.clone())
    }

    /// A cache that never stores anything.
    pub fn disabled() -> Self {
        let config = CacheConfig {
            enabled: false,
            ..CacheConfig::default()
        };
        Self::new(Arc::new(MemoryStore::new()), config)
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    pub async fn get(&self, key: &str) -> Option<Vec<u8>> {
        if !self.config.enabled {
            return None;
        }
        match self.store.get(key).await {
            Ok(Some(bytes)) => {
                log::debug!("Cache hit: {key}");
                Some(bytes)
            }
            Ok(None) => {
                log::debug!("Cache miss: {key}");
                None
            }
            Err(e) => {
                log::warn!("Cache read failed for {key}: {e}");
                None
            }
        }
    }

    pub async fn put(&self, key: &str, bytes: &[u8]) {
        if !self.config.enabled {
            return;
        }
        if let Err(e) = self.store.put(key, bytes).await {
            log::warn!("Cache write failed for {key}: {e}");
            return;
        }
        self.enforce_eviction().await;
    }

    pub async fn remove(&self, key: &str) {
        if let Err(e) = self.store.delete(key).await {
            log::warn!("Cache delete failed for {key}: {e}");
        }
    }

    pub async fn clear(&self) {
        if let Err(e) = self.store.clear().await {
            log::warn!("Cache clear failed: {e}");
        }
    }

    pub async fn num_entries(&self) -> u64 {
        self.store.count().await.unwrap_or_else(|e| {
            log::warn!("Cache count failed: {e}");
            0
        })
    }

    pub async fn size_in_bytes(&self) -> u64 {
        self.store.size().await.unwrap_or_else(|e| {
            log::warn!("Cache size failed: {e}");
            0
        })
    }

    /// Key under which a details page is aliased by its content hash.
    pub fn hash_key(hash: &str) -> String {
        format!("{HASH_PREFIX}{hash}")
    }

    /// Record that fetching `url` just failed.
    pub async fn mark_failed(&self, url: &str) {
        let now = Utc::now().timestamp_millis();
        self.put(&failed_key(url), &now.to_be_bytes()).await;
    }

    /// Whether a fetch of `url` failed within the configured lifetime.
    pub async fn recently_failed(&self, url: &str) -> bool {
        let key = failed_key(url);
        let Some(bytes) = self.get(&key).await else {
            return false;
        };
        let Ok(raw) = <[u8; 8]>::try_from(bytes.as_slice()) else {
            log::debug!("Discarding malformed failure record for {url}");
            self.remove(&key).await;
            return false;
        };

        let failed_at = i64::from_be_bytes(raw);
        let age_ms = Utc::now().timestamp_millis().saturating_sub(failed_at);
        let ttl_ms = i64::try_from(self.config.failed_ttl().as_millis()).unwrap_or(i64::MAX);
        if age_ms < ttl_ms {
            true
        } else {
            self.remove(&key).await;
            false
        }
    }

    async fn enforce_eviction(&self) {
        let EvictionPolicy::TruncateAbove { max_bytes } = self.config.eviction else {
            return;
        };
        let size = self.size_in_bytes().await;
        if size > max_bytes {
            log::info!("Crawl cache holds {size} bytes (limit {max_bytes}), truncating");
            self.clear().await;
        }
    }
}

fn failed_key(url: &str) -> String {
    format!("{FAILED_PREFIX}{url}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn memory_cache(config: CacheConfig) -> CrawlCache {
        CrawlCache::new(Arc::new(MemoryStore::new()), config)
    }

    #[tokio::test]
    async fn test_round_trip_and_remove() {
        let cache = memory_cache(CacheConfig::default());
        cache.put("https://x/item/1", b"<html>1</html>").await;

        assert_eq!(
            cache.get("https://x/item/1").await,
            Some(b"<html>1</html>".to_vec())
        );
        assert_eq!(cache.num_entries().await, 1);
        assert_eq!(cache.size_in_bytes().await, 14);

        cache.remove("https://x/item/1").await;
        assert_eq!(cache.get("https://x/item/1").await, None);
    }

    #[tokio::test]
    async fn test_disabled_put_is_noop() {
        let cache = CrawlCache::disabled();
        cache.put("k", b"v").await;
        assert_eq!(cache.get("k").await, None);
        assert_eq!(cache.num_entries().await, 0);
        assert!(!cache.is_enabled());
    }

    #[tokio::test]
    async fn test_local_store_backed_cache() {
        let tmp = TempDir::new().unwrap();
        let config = CacheConfig {
            dir: Some(tmp.path().to_path_buf()),
            ..CacheConfig::default()
        };
        let cache = CrawlCache::from_config(&config);
        cache.put("a", b"12345").await;
        cache.put("b", b"678").await;

        let reopened = CrawlCache::new(Arc::new(LocalStore::new(tmp.path())), config);
        assert_eq!(reopened.get("a").await, Some(b"12345".to_vec()));
        assert_eq!(reopened.size_in_bytes().await, 8);

        reopened.clear().await;
        assert_eq!(cache.num_entries().await, 0);
    }

    #[tokio::test]
    async fn test_truncate_above_limit() {
        let cache = memory_cache(CacheConfig {
            eviction: EvictionPolicy::TruncateAbove { max_bytes: 10 },
            ..CacheConfig::default()
        });
        cache.put("a", b"123456").await;
        assert_eq!(cache.num_entries().await, 1);

        cache.put("b", b"123456").await;
        assert_eq!(cache.num_entries().await, 0);
    }

    #[tokio::test]
    async fn test_negative_cache_lifetime() {
        let cache = memory_cache(CacheConfig::default());
        assert!(!cache.recently_failed("https://x/item/1").await);

        cache.mark_failed("https://x/item/1").await;
        assert!(cache.recently_failed("https://x/item/1").await);
        assert!(!cache.recently_failed("https://x/item/2").await);

        let stale = Utc::now().timestamp_millis() - 11 * 60 * 1000;
        cache.put("failed:https://x/item/1", &stale.to_be_bytes()).await;
        assert!(!cache.recently_failed("https://x/item/1").await);
        assert_eq!(cache.get("failed:https://x/item/1").await, None);
    }

    #[tokio::test]
    async fn test_malformed_failure_record_ignored() {
        let cache = memory_cache(CacheConfig::default());
        cache.put("failed:https://x/1", b"nope").await;
        assert!(!cache.recently_failed("https://x/1").await);
    }
}
