//! Tenant-scoped response cache with TTL expiry.
//!
//! [`ResponseCache`] sits in front of a [`CacheStore`] and never fails: a
//! store error on read is logged and treated as a miss, a store error on
//! write is logged and dropped. Keys are built with [`compute_fingerprint`].

pub mod fingerprint;
pub mod store;

pub use fingerprint::{canonical_json, compute_fingerprint};
pub use store::{CacheKey, CacheRow, CacheStore, InMemoryCacheStore};

use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::clock::{Clock, SystemClock};

/// A cached response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub data: Value,
    /// Process version that produced `data`.
    pub version: String,
    pub cached_at: DateTime<Utc>,
    /// Echo of the fingerprint the entry is stored under.
    pub input_hash: String,
}

/// Read-through/write-through cache over a [`CacheStore`].
pub struct ResponseCache {
    store: Arc<dyn CacheStore>,
    clock: Arc<dyn Clock>,
}

impl ResponseCache {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
        }
    }

    /// Replace the time source used for `cached_at` and expiry.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// The unexpired entry for this key, or `None` on a miss or store error.
    pub async fn get(&self, tenant_id: &str, process_id: &str, input_hash: &str) -> Option<CacheEntry> {
        let key = CacheKey::new(tenant_id, process_id, input_hash);
        match self.store.get_unexpired(&key, self.clock.now()).await {
            Ok(row) => row.map(|row| row.entry),
            Err(e) => {
                tracing::warn!(
                    tenant_id,
                    process_id,
                    error = %e,
                    "cache read failed, treating as miss"
                );
                None
            }
        }
    }

    /// Store `data` for `ttl_seconds`, replacing any existing entry.
    ///
    /// A zero TTL stores nothing. Store errors are logged and swallowed.
    pub async fn set(
        &self,
        tenant_id: &str,
        process_id: &str,
        input_hash: &str,
        data: Value,
        version: &str,
        ttl_seconds: u64,
    ) {
        if ttl_seconds == 0 {
            return;
        }
        let now = self.clock.now();
        let ttl = ChronoDuration::seconds(ttl_seconds.min(i64::MAX as u64 / 1000) as i64);
        let row = CacheRow {
            key: CacheKey::new(tenant_id, process_id, input_hash),
            entry: CacheEntry {
                data,
                version: version.to_string(),
                cached_at: now,
                input_hash: input_hash.to_string(),
            },
            expires_at: now.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC),
        };

        if let Err(e) = self.store.upsert(row).await {
            tracing::warn!(
                tenant_id,
                process_id,
                error = %e,
                "cache write failed, response not cached"
            );
        }
    }

    /// Remove every entry of a process, e.g. after a version promotion.
    pub async fn invalidate(&self, tenant_id: &str, process_id: &str) -> anyhow::Result<u64> {
        let removed = self.store.delete_by_process(tenant_id, process_id).await?;
        tracing::info!(tenant_id, process_id, removed, "cache invalidated");
        Ok(removed)
    }
}

impl std::fmt::Debug for ResponseCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseCache").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use async_trait::async_trait;
    use serde_json::json;
    use std::time::Duration;

    fn cache_with_clock() -> (ResponseCache, Arc<InMemoryCacheStore>, Arc<ManualClock>) {
        let store = Arc::new(InMemoryCacheStore::new());
        let clock = Arc::new(ManualClock::default());
        let cache = ResponseCache::new(store.clone()).with_clock(clock.clone());
        (cache, store, clock)
    }

    #[tokio::test]
    async fn test_round_trip() {
        let (cache, _store, clock) = cache_with_clock();
        let hash = compute_fingerprint("t1", "p1", &json!({"q": 1}));

        assert!(cache.get("t1", "p1", &hash).await.is_none());
        cache.set("t1", "p1", &hash, json!({"a": 1}), "3", 60).await;

        let entry = cache.get("t1", "p1", &hash).await.unwrap();
        assert_eq!(entry.data, json!({"a": 1}));
        assert_eq!(entry.version, "3");
        assert_eq!(entry.input_hash, hash);
        assert_eq!(entry.cached_at, clock.now());
    }

    #[tokio::test]
    async fn test_expires_after_ttl() {
        let (cache, _store, clock) = cache_with_clock();
        cache.set("t", "p", "h", json!(1), "1", 60).await;

        clock.advance(Duration::from_secs(59));
        assert!(cache.get("t", "p", "h").await.is_some());
        clock.advance(Duration::from_secs(1));
        assert!(cache.get("t", "p", "h").await.is_none());
    }

    #[tokio::test]
    async fn test_tenant_isolation() {
        let (cache, _store, _clock) = cache_with_clock();
        cache.set("tenant-a", "p", "h", json!("a"), "1", 60).await;
        assert!(cache.get("tenant-b", "p", "h").await.is_none());
        assert!(cache.get("tenant-a", "other", "h").await.is_none());
    }

    #[tokio::test]
    async fn test_upsert_last_write_wins() {
        let (cache, store, _clock) = cache_with_clock();
        cache.set("t", "p", "h", json!("old"), "1", 60).await;
        cache.set("t", "p", "h", json!("new"), "2", 60).await;

        let entry = cache.get("t", "p", "h").await.unwrap();
        assert_eq!(entry.data, json!("new"));
        assert_eq!(entry.version, "2");
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_zero_ttl_is_not_stored() {
        let (cache, store, _clock) = cache_with_clock();
        cache.set("t", "p", "h", json!(1), "1", 0).await;
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_huge_ttl_is_clamped() {
        let (cache, store, clock) = cache_with_clock();
        cache.set("t", "p", "h", json!(1), "1", u64::MAX).await;

        assert_eq!(store.len(), 1);
        clock.advance(Duration::from_secs(10 * 365 * 24 * 3600));
        assert!(cache.get("t", "p", "h").await.is_some());
    }

    #[tokio::test]
    async fn test_invalidate() {
        let (cache, _store, _clock) = cache_with_clock();
        cache.set("t", "p", "h1", json!(1), "1", 60).await;
        cache.set("t", "p", "h2", json!(2), "1", 60).await;
        cache.set("t", "q", "h1", json!(3), "1", 60).await;

        assert_eq!(cache.invalidate("t", "p").await.unwrap(), 2);
        assert!(cache.get("t", "p", "h1").await.is_none());
        assert!(cache.get("t", "q", "h1").await.is_some());
    }

    struct BrokenStore;

    #[async_trait]
    impl CacheStore for BrokenStore {
        async fn get_unexpired(&self, _: &CacheKey, _: DateTime<Utc>) -> anyhow::Result<Option<CacheRow>> {
            anyhow::bail!("connection refused")
        }
        async fn upsert(&self, _: CacheRow) -> anyhow::Result<()> {
            anyhow::bail!("connection refused")
        }
        async fn delete_by_process(&self, _: &str, _: &str) -> anyhow::Result<u64> {
            anyhow::bail!("connection refused")
        }
    }

    #[tokio::test]
    async fn test_store_failures_degrade() {
        let cache = ResponseCache::new(Arc::new(BrokenStore));
        cache.set("t", "p", "h", json!(1), "1", 60).await;
        assert!(cache.get("t", "p", "h").await.is_none());
        assert!(cache.invalidate("t", "p").await.is_err());
    }
}
