//! In-memory cache backend.
//!
//! Expiry is decided by the coordinator so stale values can still be served
//! while a recompute runs. The backend only forgets an entry once it is
//! past its TTL plus the stale grace, or when capacity forces it out.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use moka::Expiry;
use moka::future::Cache;
use resource_controller_sdk::{CacheBackend, CacheEntry, CacheError};

use crate::config::CacheConfig;

/// Keeps each entry for its own TTL plus `grace`.
struct StaleGrace {
    grace: Duration,
}

impl Expiry<String, CacheEntry> for StaleGrace {
    fn expire_after_create(&self, _key: &String, entry: &CacheEntry, _created_at: Instant) -> Option<Duration> {
        Some(entry.ttl.saturating_add(self.grace))
    }

    fn expire_after_update(
        &self,
        _key: &String,
        entry: &CacheEntry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(entry.ttl.saturating_add(self.grace))
    }
}

pub struct InMemoryCacheBackend {
    entries: Cache<String, CacheEntry>,
}

impl InMemoryCacheBackend {
    /// Hold at most `max_entries`, each until `grace` past its TTL.
    #[must_use]
    pub fn new(max_entries: usize, grace: Duration) -> Self {
        let entries = Cache::builder()
            .max_capacity(u64::try_from(max_entries).unwrap_or(u64::MAX))
            .expire_after(StaleGrace { grace })
            .build();
        Self { entries }
    }

    #[must_use]
    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.max_entries, config.stale_grace)
    }

    /// Number of live entries once pending evictions have run.
    pub async fn entry_count(&self) -> u64 {
        self.entries.run_pending_tasks().await;
        self.entries.entry_count()
    }
}

impl Default for InMemoryCacheBackend {
    fn default() -> Self {
        Self::from_config(&CacheConfig::default())
    }
}

#[async_trait]
impl CacheBackend for InMemoryCacheBackend {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        Ok(self.entries.get(key).await)
    }

    async fn put(&self, entry: CacheEntry) -> Result<(), CacheError> {
        self.entries.insert(entry.key.clone(), entry).await;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), CacheError> {
        self.entries.invalidate(key).await;
        Ok(())
    }

    async fn remove_prefix(&self, prefix: &str) -> Result<usize, CacheError> {
        let doomed: Vec<String> = self
            .entries
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key.as_ref().clone())
            .collect();
        for key in &doomed {
            self.entries.invalidate(key).await;
        }
        Ok(doomed.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn entry(key: &str, ttl: Duration) -> CacheEntry {
        CacheEntry {
            key: key.to_owned(),
            value: Bytes::from_static(b"[]"),
            stored_at: tokio::time::Instant::now(),
            ttl,
            delta: Duration::ZERO,
        }
    }

    #[tokio::test]
    async fn test_cache_miss_when_no_entry_exists() {
        let backend = InMemoryCacheBackend::default();
        assert!(backend.get("article:index:0").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_put_overwrites_and_remove_prefix_counts() {
        // Arrange
        let backend = InMemoryCacheBackend::default();
        let ttl = Duration::from_secs(60);
        backend.put(entry("article:index:a", ttl)).await.unwrap();
        backend.put(entry("article:view:b", ttl)).await.unwrap();
        backend.put(entry("topic:index:a", ttl)).await.unwrap();
        backend.put(entry("article:index:a", ttl)).await.unwrap();

        // Act
        let removed = backend.remove_prefix("article:").await.unwrap();

        // Assert
        assert_eq!(removed, 2);
        assert_eq!(backend.entry_count().await, 1);
        assert!(backend.get("topic:index:a").await.unwrap().is_some());
        assert!(backend.get("article:view:b").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_capacity_bounds_distinct_keys() {
        let backend = InMemoryCacheBackend::new(8, Duration::from_secs(60));

        for n in 0..64 {
            backend
                .put(entry(&format!("article:index:{n}"), Duration::from_secs(60)))
                .await
                .unwrap();
        }

        assert!(backend.entry_count().await <= 8);
    }

    #[tokio::test]
    async fn test_entries_outlive_ttl_by_the_grace_only() {
        let backend = InMemoryCacheBackend::new(16, Duration::from_millis(100));
        backend
            .put(entry("article:view:1", Duration::from_millis(50)))
            .await
            .unwrap();

        // past the TTL but inside the grace: still there for stale serving
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(backend.get("article:view:1").await.unwrap().is_some());

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(backend.get("article:view:1").await.unwrap().is_none());
        assert_eq!(backend.entry_count().await, 0);
    }
}
