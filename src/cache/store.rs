use crate::error::{SearchError, SearchResult};
use crate::types::{CacheEntry, NormalizedQuery};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use tracing::debug;

/// Field a secondary index is built on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexField {
    Query,
    LastAccessed,
    AccessCount,
}

/// Secondary index definition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IndexSpec {
    pub name: &'static str,
    pub field: IndexField,
    pub unique: bool,
}

impl IndexSpec {
    pub const LAST_ACCESSED: IndexSpec = IndexSpec {
        name: "idx_cache_entries_last_accessed",
        field: IndexField::LastAccessed,
        unique: false,
    };
    pub const ACCESS_COUNT: IndexSpec = IndexSpec {
        name: "idx_cache_entries_access_count",
        field: IndexField::AccessCount,
        unique: false,
    };
    pub const QUERY_LOOKUP: IndexSpec = IndexSpec {
        name: "idx_cache_entries_query",
        field: IndexField::Query,
        unique: false,
    };
    pub const QUERY_UNIQUE: IndexSpec = IndexSpec {
        name: "idx_cache_entries_query_unique",
        field: IndexField::Query,
        unique: true,
    };
}

/// Storage usage reported by a backend
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StorageEstimate {
    pub used_bytes: u64,
    pub quota_bytes: u64,
}

impl StorageEstimate {
    pub fn usage_ratio(&self) -> f64 {
        if self.quota_bytes == 0 {
            return 0.0;
        }
        self.used_bytes as f64 / self.quota_bytes as f64
    }
}

/// Storage port for cache entries.
///
/// Implementations replace whole entries atomically: a concurrent reader sees
/// either the previous entry or the new one, never a partial record.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Short backend name for logs and stats
    fn backend_name(&self) -> &'static str;

    async fn get(&self, id: &str) -> SearchResult<Option<CacheEntry>>;

    /// Insert or replace the entry stored under `entry.id`
    async fn put(&self, entry: &CacheEntry) -> SearchResult<()>;

    /// Returns whether an entry was removed
    async fn delete(&self, id: &str) -> SearchResult<bool>;

    /// Record a read of the entry written at `written_at`: bumps
    /// `last_accessed` and `access_count` only. No-op when the entry is gone
    /// or has been rewritten since; returns whether it was updated.
    async fn touch(&self, id: &str, written_at: DateTime<Utc>, accessed_at: DateTime<Utc>) -> SearchResult<bool>;

    /// Delete the entry only if it is still the one written at `written_at`
    async fn delete_if_unchanged(&self, id: &str, written_at: DateTime<Utc>) -> SearchResult<bool>;

    /// Consistent snapshot of all entries
    async fn iterate(&self) -> SearchResult<Vec<CacheEntry>>;

    async fn count(&self) -> SearchResult<usize>;

    async fn clear(&self) -> SearchResult<()>;

    async fn schema_version(&self) -> SearchResult<u32>;

    async fn set_schema_version(&self, version: u32) -> SearchResult<()>;

    /// Create a secondary index if it does not exist yet
    async fn create_index(&self, spec: &IndexSpec) -> SearchResult<()>;

    /// Usage against quota, when the backend knows both
    async fn storage_estimate(&self) -> SearchResult<Option<StorageEstimate>>;

    async fn health_check(&self) -> SearchResult<()>;
}

/// In-memory store backed by a sharded concurrent map
pub struct MemoryStore {
    entries: DashMap<String, CacheEntry>,
    schema_version: AtomicU32,
    indexes: Mutex<HashSet<IndexSpec>>,
    unique_query: AtomicBool,
    quota_bytes: Option<u64>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            schema_version: AtomicU32::new(0),
            indexes: Mutex::new(HashSet::new()),
            unique_query: AtomicBool::new(false),
            quota_bytes: None,
        }
    }

    /// Store that reports usage against a byte budget
    pub fn with_quota(quota_bytes: u64) -> Self {
        Self {
            quota_bytes: Some(quota_bytes),
            ..Self::new()
        }
    }

    /// Names of indexes created so far
    pub fn index_names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.indexes.lock().iter().map(|spec| spec.name).collect();
        names.sort_unstable();
        names
    }

    fn used_bytes(&self) -> u64 {
        self.entries.iter().map(|entry| entry.value().estimated_size()).sum()
    }

    fn query_held_elsewhere(&self, query: &NormalizedQuery, id: &str) -> bool {
        self.entries
            .iter()
            .any(|entry| entry.key() != id && &entry.value().query == query)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, id: &str) -> SearchResult<Option<CacheEntry>> {
        Ok(self.entries.get(id).map(|entry| entry.value().clone()))
    }

    async fn put(&self, entry: &CacheEntry) -> SearchResult<()> {
        if self.unique_query.load(Ordering::Acquire) && self.query_held_elsewhere(&entry.query, &entry.id) {
            return Err(SearchError::CacheError(format!(
                "Unique index violation on query '{}'",
                entry.query
            )));
        }

        if let Some(quota) = self.quota_bytes {
            let replaced = self
                .entries
                .get(&entry.id)
                .map(|existing| existing.value().estimated_size())
                .unwrap_or(0);
            let used = self.used_bytes() - replaced + entry.estimated_size();
            if used > quota {
                return Err(SearchError::StorageQuotaExceeded { used, quota });
            }
        }

        self.entries.insert(entry.id.clone(), entry.clone());
        Ok(())
    }

    async fn delete(&self, id: &str) -> SearchResult<bool> {
        Ok(self.entries.remove(id).is_some())
    }

    async fn touch(&self, id: &str, written_at: DateTime<Utc>, accessed_at: DateTime<Utc>) -> SearchResult<bool> {
        match self.entries.get_mut(id) {
            Some(mut entry) if entry.timestamp == written_at => {
                let last_accessed = entry.last_accessed;
                entry.touch(accessed_at.max(last_accessed));
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete_if_unchanged(&self, id: &str, written_at: DateTime<Utc>) -> SearchResult<bool> {
        Ok(self
            .entries
            .remove_if(id, |_, entry| entry.timestamp == written_at)
            .is_some())
    }

    async fn iterate(&self) -> SearchResult<Vec<CacheEntry>> {
        Ok(self.entries.iter().map(|entry| entry.value().clone()).collect())
    }

    async fn count(&self) -> SearchResult<usize> {
        Ok(self.entries.len())
    }

    async fn clear(&self) -> SearchResult<()> {
        self.entries.clear();
        Ok(())
    }

    async fn schema_version(&self) -> SearchResult<u32> {
        Ok(self.schema_version.load(Ordering::Acquire))
    }

    async fn set_schema_version(&self, version: u32) -> SearchResult<()> {
        self.schema_version.store(version, Ordering::Release);
        Ok(())
    }

    async fn create_index(&self, spec: &IndexSpec) -> SearchResult<()> {
        if spec.unique && spec.field == IndexField::Query {
            let mut seen = HashSet::new();
            for entry in self.entries.iter() {
                if !seen.insert(entry.value().query.clone()) {
                    return Err(SearchError::CacheError(format!(
                        "Cannot create {}: duplicate query '{}'",
                        spec.name,
                        entry.value().query
                    )));
                }
            }
            self.unique_query.store(true, Ordering::Release);
        }

        if self.indexes.lock().insert(*spec) {
            debug!("Created in-memory index {}", spec.name);
        }
        Ok(())
    }

    async fn storage_estimate(&self) -> SearchResult<Option<StorageEstimate>> {
        Ok(self.quota_bytes.map(|quota_bytes| StorageEstimate {
            used_bytes: self.used_bytes(),
            quota_bytes,
        }))
    }

    async fn health_check(&self) -> SearchResult<()> {
        Ok(())
    }
}
