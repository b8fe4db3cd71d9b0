//! Read-result cache with probabilistic early recomputation ("xfetch").
//!
//! A due entry is handed to exactly one caller as a miss (the claim holder);
//! everyone else keeps receiving the stale value until the holder `put`s,
//! releases the claim, or the claim times out. Backend failures are misses.
//!
//! Each resource type carries a generation that invalidation bumps. A read
//! remembers the generation it started under and its result is only kept
//! while that generation is still current, so a snapshot taken before a
//! write can never outlive the write's invalidation.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use bytes::Bytes;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use rand::Rng;
use resource_controller_sdk::{CacheBackend, CacheEntry, CacheError, ConfigOptions};
use sha2::{Digest, Sha256};
use tokio::time::Instant;

/// `<type>:<method>:<16 hex chars of sha256(material)>`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    text: String,
    resource_type: String,
}

impl CacheKey {
    /// `material` is the normalized query (plus the id for single reads).
    #[must_use]
    pub fn derive(resource_type: &str, method: &str, material: &str) -> Self {
        let digest = hex::encode(Sha256::digest(material.as_bytes()));
        Self {
            text: format!("{resource_type}:{method}:{}", &digest[..16]),
            resource_type: resource_type.to_owned(),
        }
    }

    /// Prefix shared by every key of `resource_type`.
    #[must_use]
    pub fn type_prefix(resource_type: &str) -> String {
        format!("{resource_type}:")
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub fn resource_type(&self) -> &str {
        &self.resource_type
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Invalidation counter of one resource type, read before a recompute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Generation(u64);

/// Whether an entry of `age` should be recomputed now:
/// `age + delta * beta * |ln u| >= ttl` for `u` in `(0, 1]`.
#[must_use]
pub fn should_recompute_early(age: Duration, delta: Duration, ttl: Duration, beta: f64, u: f64) -> bool {
    let gap = delta.as_secs_f64() * beta * -u.ln();
    age.as_secs_f64() + gap >= ttl.as_secs_f64()
}

fn draw_unit() -> f64 {
    rand::rng().random_range(f64::EPSILON..1.0)
}

pub struct CacheCoordinator {
    backend: Arc<dyn CacheBackend>,
    /// Keys currently being recomputed, with the time the claim was taken.
    claims: DashMap<String, Instant>,
    generations: DashMap<String, AtomicU64>,
    claim_timeout: Duration,
    call_timeout: Duration,
}

impl CacheCoordinator {
    #[must_use]
    pub fn new(backend: Arc<dyn CacheBackend>, claim_timeout: Duration, call_timeout: Duration) -> Self {
        Self {
            backend,
            claims: DashMap::new(),
            generations: DashMap::new(),
            claim_timeout,
            call_timeout,
        }
    }

    /// Current generation of the type `key` belongs to.
    #[must_use]
    pub fn generation(&self, key: &CacheKey) -> Generation {
        Generation(
            self.generations
                .get(key.resource_type())
                .map_or(0, |g| g.load(Ordering::SeqCst)),
        )
    }

    fn is_current(&self, key: &CacheKey, observed: Generation) -> bool {
        self.generation(key) == observed
    }

    async fn call<T>(&self, fut: impl Future<Output = Result<T, CacheError>>) -> Result<T, CacheError> {
        tokio::time::timeout(self.call_timeout, fut)
            .await
            .unwrap_or_else(|_| Err(CacheError::Timeout))
    }

    /// Look up `key`; `None` tells the caller to recompute and `put`.
    #[tracing::instrument(skip_all, fields(key = %key))]
    pub async fn get(&self, key: &CacheKey, options: &ConfigOptions) -> Option<Bytes> {
        let entry = match self.call(self.backend.get(key.as_str())).await {
            Ok(Some(entry)) => entry,
            Ok(None) => {
                tracing::debug!("Cache miss");
                return None;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Cache backend read failed; treating as miss");
                return None;
            }
        };
        let now = Instant::now();

        if !options.is_xfetch() {
            if entry.is_expired(now) {
                tracing::debug!("Cache entry expired");
                if let Err(e) = self.call(self.backend.remove(key.as_str())).await {
                    tracing::warn!(error = %e, "Failed to drop expired cache entry");
                }
                return None;
            }
            tracing::debug!("Cache hit");
            return Some(entry.value);
        }

        let due = should_recompute_early(
            entry.age(now),
            entry.delta,
            entry.ttl,
            options.cache_beta(),
            draw_unit(),
        );
        if due && self.try_claim(key, now) {
            tracing::debug!(age_ms = entry.age(now).as_millis(), "Early recompute claimed");
            return None;
        }
        tracing::debug!(stale = entry.is_expired(now), "Cache hit");
        Some(entry.value)
    }

    fn try_claim(&self, key: &CacheKey, now: Instant) -> bool {
        match self.claims.entry(key.as_str().to_owned()) {
            Entry::Vacant(slot) => {
                slot.insert(now);
                true
            }
            Entry::Occupied(mut slot) => {
                if now.saturating_duration_since(*slot.get()) >= self.claim_timeout {
                    slot.insert(now);
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Store a value computed under `observed`; `delta` is what computing
    /// it cost. Nothing is kept when the type was invalidated in between.
    /// Releases any claim on `key`.
    #[tracing::instrument(skip_all, fields(key = %key))]
    pub async fn put(&self, key: &CacheKey, observed: Generation, value: Bytes, ttl: Duration, delta: Duration) {
        self.store(key, observed, value, ttl, delta).await;
        self.release(key);
    }

    async fn store(&self, key: &CacheKey, observed: Generation, value: Bytes, ttl: Duration, delta: Duration) {
        if !self.is_current(key, observed) {
            tracing::debug!("Type invalidated during recompute; result not cached");
            return;
        }
        let entry = CacheEntry {
            key: key.as_str().to_owned(),
            value,
            stored_at: Instant::now(),
            ttl,
            delta,
        };
        if let Err(e) = self.call(self.backend.put(entry)).await {
            tracing::warn!(error = %e, "Cache backend write failed");
            return;
        }
        // An invalidation that bumped the generation while the write was in
        // flight may have cleared the type before this entry landed.
        if self.is_current(key, observed) {
            return;
        }
        tracing::debug!("Type invalidated during cache write; dropping entry");
        if let Err(e) = self.call(self.backend.remove(key.as_str())).await {
            tracing::warn!(error = %e, "Failed to drop superseded cache entry");
        }
    }

    /// Give up a claim without storing, e.g. when recomputation failed.
    pub fn release(&self, key: &CacheKey) {
        self.claims.remove(key.as_str());
    }

    fn bump(&self, resource_type: &str) {
        self.generations
            .entry(resource_type.to_owned())
            .or_default()
            .fetch_add(1, Ordering::SeqCst);
    }

    /// Drop one entry. Recomputes of its type that are still running will
    /// not be stored.
    pub async fn invalidate(&self, key: &CacheKey) {
        self.bump(key.resource_type());
        if let Err(e) = self.call(self.backend.remove(key.as_str())).await {
            tracing::warn!(key = %key, error = %e, "Cache invalidation failed");
        }
    }

    /// Drop every cached read of `resource_type`; returns how many entries went.
    pub async fn invalidate_type(&self, resource_type: &str) -> usize {
        self.bump(resource_type);
        let prefix = CacheKey::type_prefix(resource_type);
        match self.call(self.backend.remove_prefix(&prefix)).await {
            Ok(removed) => {
                tracing::debug!(resource_type, removed, "Invalidated cached reads");
                removed
            }
            Err(e) => {
                tracing::warn!(resource_type, error = %e, "Cache invalidation failed");
                0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::cache::InMemoryCacheBackend;
    use async_trait::async_trait;
    use futures::future::join_all;
    use tracing_test::traced_test;

    const TTL: Duration = Duration::from_secs(10);

    fn coordinator() -> CacheCoordinator {
        CacheCoordinator::new(
            Arc::new(InMemoryCacheBackend::default()),
            Duration::from_secs(5),
            Duration::from_millis(200),
        )
    }

    fn plain() -> ConfigOptions {
        let mut options = ConfigOptions::new();
        options.set_is_cached(true);
        options
    }

    fn xfetch() -> ConfigOptions {
        let mut options = plain();
        options.set_is_xfetch(true);
        options
    }

    #[test]
    fn keys_are_deterministic_and_scoped() {
        let a = CacheKey::derive("article", "index", "limit=20&page=1");
        let b = CacheKey::derive("article", "index", "limit=20&page=1");
        let c = CacheKey::derive("article", "index", "limit=20&page=2");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.as_str().starts_with(&CacheKey::type_prefix("article")));
        assert_eq!(a.as_str().len(), "article:index:".len() + 16);
    }

    #[test]
    fn early_recompute_formula() {
        let delta = Duration::from_secs(1);
        // u = 1 gives no head start
        assert!(!should_recompute_early(Duration::from_secs(9), delta, TTL, 1.0, 1.0));
        assert!(should_recompute_early(TTL, delta, TTL, 1.0, 1.0));
        // |ln(e^-2)| = 2 seconds of head start
        let u = (-2.0_f64).exp();
        assert!(should_recompute_early(Duration::from_secs(8), delta, TTL, 1.0, u));
        assert!(!should_recompute_early(Duration::from_secs(7), delta, TTL, 1.0, u));
        // beta = 0 disables the head start
        assert!(!should_recompute_early(Duration::from_secs(9), delta, TTL, 0.0, 1e-9));
    }

    #[tokio::test(start_paused = true)]
    async fn put_then_get_hits_until_ttl_elapses() {
        let cache = coordinator();
        let key = CacheKey::derive("article", "view", "id=1");
        let options = plain();

        assert_eq!(cache.get(&key, &options).await, None);
        cache
            .put(&key, cache.generation(&key), Bytes::from_static(b"{}"), TTL, Duration::from_millis(5))
            .await;
        assert_eq!(cache.get(&key, &options).await, Some(Bytes::from_static(b"{}")));

        tokio::time::advance(TTL).await;
        assert_eq!(cache.get(&key, &options).await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_xfetch_entry_is_recomputed_by_one_caller() {
        let cache = coordinator();
        let key = CacheKey::derive("article", "index", "q");
        let options = xfetch();
        cache
            .put(&key, cache.generation(&key), Bytes::from_static(b"old"), TTL, Duration::from_millis(50))
            .await;
        tokio::time::advance(TTL + Duration::from_secs(1)).await;

        let results = join_all((0..32).map(|_| cache.get(&key, &options))).await;
        let misses = results.iter().filter(|r| r.is_none()).count();
        assert_eq!(misses, 1);
        assert!(
            results
                .iter()
                .flatten()
                .all(|v| v == &Bytes::from_static(b"old"))
        );

        cache
            .put(&key, cache.generation(&key), Bytes::from_static(b"new"), TTL, Duration::from_millis(50))
            .await;
        assert_eq!(cache.get(&key, &options).await, Some(Bytes::from_static(b"new")));
    }

    #[tokio::test(start_paused = true)]
    async fn at_most_one_early_recompute_per_window_across_trials() {
        let options = xfetch();
        let mut recomputed_trials = 0;
        for trial in 0..200 {
            let cache = coordinator();
            let key = CacheKey::derive("article", "index", &format!("trial={trial}"));
            cache
                .put(&key, cache.generation(&key), Bytes::from_static(b"v"), TTL, Duration::from_secs(1))
                .await;
            // Half a second before expiry each caller is due with p = e^-0.5.
            tokio::time::advance(Duration::from_millis(9_500)).await;

            let results = join_all((0..16).map(|_| cache.get(&key, &options))).await;
            let misses = results.iter().filter(|r| r.is_none()).count();
            assert!(misses <= 1, "trial {trial}: {misses} concurrent recomputes");
            recomputed_trials += misses;
        }
        assert!(recomputed_trials > 150, "only {recomputed_trials} early recomputes");
    }

    #[tokio::test(start_paused = true)]
    async fn released_or_timed_out_claims_can_be_retaken() {
        let cache = coordinator();
        let key = CacheKey::derive("topic", "view", "id=7");
        let options = xfetch();
        cache
            .put(&key, cache.generation(&key), Bytes::from_static(b"v"), TTL, Duration::ZERO)
            .await;
        tokio::time::advance(TTL).await;

        assert_eq!(cache.get(&key, &options).await, None);
        assert!(cache.get(&key, &options).await.is_some());
        cache.release(&key);
        assert_eq!(cache.get(&key, &options).await, None);

        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(cache.get(&key, &options).await, None);
    }

    #[tokio::test]
    async fn invalidation_removes_keys_by_key_and_type() {
        let cache = coordinator();
        let options = plain();
        let view = CacheKey::derive("article", "view", "id=1");
        let index = CacheKey::derive("article", "index", "q");
        let other = CacheKey::derive("topic", "index", "q");
        for key in [&view, &index, &other] {
            cache.put(key, cache.generation(key), Bytes::from_static(b"v"), TTL, Duration::ZERO).await;
        }

        cache.invalidate(&view).await;
        assert_eq!(cache.get(&view, &options).await, None);
        assert!(cache.get(&index, &options).await.is_some());

        assert_eq!(cache.invalidate_type("article").await, 1);
        assert_eq!(cache.get(&index, &options).await, None);
        assert!(cache.get(&other, &options).await.is_some());
    }

    #[tokio::test]
    async fn result_computed_before_invalidation_is_not_stored() {
        // Arrange
        let cache = coordinator();
        let options = xfetch();
        let key = CacheKey::derive("article", "index", "q");
        let topic = CacheKey::derive("topic", "index", "q");
        let observed = cache.generation(&key);
        let topic_observed = cache.generation(&topic);
        assert_eq!(cache.get(&key, &options).await, None);

        // Act
        cache.invalidate_type("article").await;
        cache
            .put(&key, observed, Bytes::from_static(b"stale"), TTL, Duration::ZERO)
            .await;
        cache
            .put(&topic, topic_observed, Bytes::from_static(b"t"), TTL, Duration::ZERO)
            .await;

        // Assert
        assert_ne!(cache.generation(&key), observed);
        assert_eq!(cache.get(&key, &options).await, None);
        assert!(cache.get(&topic, &options).await.is_some());
        // a recompute under the new generation is kept
        cache
            .put(&key, cache.generation(&key), Bytes::from_static(b"fresh"), TTL, Duration::ZERO)
            .await;
        assert_eq!(cache.get(&key, &options).await, Some(Bytes::from_static(b"fresh")));
    }

    struct BrokenBackend;

    #[async_trait]
    impl CacheBackend for BrokenBackend {
        async fn get(&self, _key: &str) -> Result<Option<CacheEntry>, CacheError> {
            Err(CacheError::Unavailable("connection refused".to_owned()))
        }

        async fn put(&self, _entry: CacheEntry) -> Result<(), CacheError> {
            Err(CacheError::Unavailable("connection refused".to_owned()))
        }

        async fn remove(&self, _key: &str) -> Result<(), CacheError> {
            Err(CacheError::Unavailable("connection refused".to_owned()))
        }

        async fn remove_prefix(&self, _prefix: &str) -> Result<usize, CacheError> {
            Err(CacheError::Unavailable("connection refused".to_owned()))
        }
    }

    #[tokio::test]
    #[traced_test]
    async fn backend_failures_degrade_to_miss() {
        let cache = CacheCoordinator::new(
            Arc::new(BrokenBackend),
            Duration::from_secs(5),
            Duration::from_millis(200),
        );
        let key = CacheKey::derive("article", "view", "id=1");
        cache.put(&key, cache.generation(&key), Bytes::from_static(b"v"), TTL, Duration::ZERO).await;
        assert_eq!(cache.get(&key, &plain()).await, None);
        assert_eq!(cache.invalidate_type("article").await, 0);
        assert!(logs_contain("Cache backend read failed"));
    }
}
