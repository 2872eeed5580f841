//! Storage behind the response cache.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::CacheEntry;

/// Composite identity of a cache row.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub tenant_id: String,
    pub process_id: String,
    pub input_hash: String,
}

impl CacheKey {
    pub fn new(
        tenant_id: impl Into<String>,
        process_id: impl Into<String>,
        input_hash: impl Into<String>,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            process_id: process_id.into(),
            input_hash: input_hash.into(),
        }
    }
}

/// One stored row.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheRow {
    pub key: CacheKey,
    pub entry: CacheEntry,
    pub expires_at: DateTime<Utc>,
}

/// Row store for cached responses.
///
/// Implementations own concurrency: `upsert` must be last-write-wins per key.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// The row for `key` if it exists and `expires_at > now`.
    async fn get_unexpired(&self, key: &CacheKey, now: DateTime<Utc>) -> anyhow::Result<Option<CacheRow>>;

    /// Insert or overwrite the row for `row.key`.
    async fn upsert(&self, row: CacheRow) -> anyhow::Result<()>;

    /// Delete every row of one process for one tenant. Returns the count.
    async fn delete_by_process(&self, tenant_id: &str, process_id: &str) -> anyhow::Result<u64>;
}

/// Process-local [`CacheStore`].
///
/// Expired rows are not swept; they are ignored on read and replaced on the
/// next write.
#[derive(Debug, Default)]
pub struct InMemoryCacheStore {
    rows: Mutex<HashMap<CacheKey, CacheRow>>,
}

impl InMemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every row.
    pub fn clear(&self) {
        self.rows().clear();
    }

    /// Number of stored rows, expired ones included.
    pub fn len(&self) -> usize {
        self.rows().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn rows(&self) -> MutexGuard<'_, HashMap<CacheKey, CacheRow>> {
        self.rows.lock().unwrap_or_else(|poison| poison.into_inner())
    }
}

#[async_trait]
impl CacheStore for InMemoryCacheStore {
    async fn get_unexpired(&self, key: &CacheKey, now: DateTime<Utc>) -> anyhow::Result<Option<CacheRow>> {
        Ok(self.rows().get(key).filter(|row| row.expires_at > now).cloned())
    }

    async fn upsert(&self, row: CacheRow) -> anyhow::Result<()> {
        self.rows().insert(row.key.clone(), row);
        Ok(())
    }

    async fn delete_by_process(&self, tenant_id: &str, process_id: &str) -> anyhow::Result<u64> {
        let mut rows = self.rows();
        let before = rows.len();
        rows.retain(|key, _| !(key.tenant_id == tenant_id && key.process_id == process_id));
        Ok((before - rows.len()) as u64)
    }
}
