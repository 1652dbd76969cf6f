/// Schema migrations for cache stores
///
/// Versions:
/// - 1: secondary indexes on `last_accessed`, `access_count` and `query`
/// - 2: entries deduplicated by normalized query, then a unique `query` index
///
/// Every step can be re-run safely. A step that fails leaves the stored
/// version untouched and the existing entries readable.

use super::store::{CacheStore, IndexSpec};
use crate::error::SearchResult;
use crate::types::{CacheEntry, NormalizedQuery};
use std::collections::HashMap;
use tracing::{debug, info, warn};

pub const CURRENT_SCHEMA_VERSION: u32 = 2;

/// Outcome of a migration run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MigrationReport {
    pub from_version: u32,
    pub to_version: u32,
    pub duplicates_removed: usize,
    /// Whether the unique query index is in place after the run
    pub unique_index: bool,
}

pub struct Migrator;

impl Migrator {
    /// Bring `store` up to `CURRENT_SCHEMA_VERSION`
    pub async fn run(store: &dyn CacheStore) -> SearchResult<MigrationReport> {
        let from_version = store.schema_version().await?;
        let mut report = MigrationReport {
            from_version,
            to_version: from_version,
            duplicates_removed: 0,
            unique_index: from_version >= 2,
        };

        if from_version >= CURRENT_SCHEMA_VERSION {
            debug!(version = from_version, backend = store.backend_name(), "Cache schema up to date");
            return Ok(report);
        }

        if from_version < 1 {
            for spec in [IndexSpec::LAST_ACCESSED, IndexSpec::ACCESS_COUNT, IndexSpec::QUERY_LOOKUP] {
                store.create_index(&spec).await?;
            }
            store.set_schema_version(1).await?;
            report.to_version = 1;
            info!(backend = store.backend_name(), "Cache schema migrated to version 1");
        }

        report.duplicates_removed = Self::deduplicate(store).await?;

        match store.create_index(&IndexSpec::QUERY_UNIQUE).await {
            Ok(()) => {
                store.set_schema_version(2).await?;
                report.to_version = 2;
                report.unique_index = true;
                info!(
                    backend = store.backend_name(),
                    duplicates_removed = report.duplicates_removed,
                    "Cache schema migrated to version 2"
                );
            }
            Err(e) => {
                warn!(
                    backend = store.backend_name(),
                    error = %e,
                    "Unique query index not created, staying on schema version {}",
                    report.to_version
                );
            }
        }

        Ok(report)
    }

    /// Collapse entries sharing a normalized query onto the newest one,
    /// stored under the deterministic id. Returns how many records were removed.
    async fn deduplicate(store: &dyn CacheStore) -> SearchResult<usize> {
        let mut groups: HashMap<NormalizedQuery, Vec<CacheEntry>> = HashMap::new();
        for entry in store.iterate().await? {
            groups
                .entry(NormalizedQuery::new(entry.query.as_str()))
                .or_default()
                .push(entry);
        }

        let mut removed = 0;
        for (query, mut group) in groups {
            let canonical_id = query.entry_id();
            let needs_rekey = group.iter().any(|e| e.id != canonical_id || e.query != query);
            if group.len() == 1 && !needs_rekey {
                continue;
            }

            // Newest first; the canonical id wins timestamp ties
            group.sort_by(|a, b| {
                b.timestamp
                    .cmp(&a.timestamp)
                    .then_with(|| (b.id == canonical_id).cmp(&(a.id == canonical_id)))
            });

            let mut survivor = group[0].clone();
            survivor.id = canonical_id.clone();
            survivor.query = query.clone();

            // Survivor is written before anything is deleted
            store.put(&survivor).await?;
            for stale in group.iter().filter(|e| e.id != canonical_id) {
                store.delete(&stale.id).await?;
            }
            removed += group.len() - 1;

            debug!(query = %query, records = group.len(), "Deduplicated cache entries");
        }

        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::store::{MemoryStore, StorageEstimate};
    use crate::cache::CacheManager;
    use crate::config::Config;
    use crate::error::SearchError;
    use crate::types::{CachePriority, CacheSource};
    use async_trait::async_trait;
    use chrono::{DateTime, Duration, Utc};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Memory store whose unique query index cannot be built until allowed
    struct UniqueIndexRefusingStore {
        inner: MemoryStore,
        refuse_unique: AtomicBool,
        unique_attempts: AtomicUsize,
    }

    impl UniqueIndexRefusingStore {
        fn new() -> Self {
            Self {
                inner: MemoryStore::new(),
                refuse_unique: AtomicBool::new(true),
                unique_attempts: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl CacheStore for UniqueIndexRefusingStore {
        fn backend_name(&self) -> &'static str {
            "refusing"
        }

        async fn get(&self, id: &str) -> SearchResult<Option<CacheEntry>> {
            self.inner.get(id).await
        }

        async fn put(&self, entry: &CacheEntry) -> SearchResult<()> {
            self.inner.put(entry).await
        }

        async fn delete(&self, id: &str) -> SearchResult<bool> {
            self.inner.delete(id).await
        }

        async fn touch(&self, id: &str, written_at: DateTime<Utc>, accessed_at: DateTime<Utc>) -> SearchResult<bool> {
            self.inner.touch(id, written_at, accessed_at).await
        }

        async fn delete_if_unchanged(&self, id: &str, written_at: DateTime<Utc>) -> SearchResult<bool> {
            self.inner.delete_if_unchanged(id, written_at).await
        }

        async fn iterate(&self) -> SearchResult<Vec<CacheEntry>> {
            self.inner.iterate().await
        }

        async fn count(&self) -> SearchResult<usize> {
            self.inner.count().await
        }

        async fn clear(&self) -> SearchResult<()> {
            self.inner.clear().await
        }

        async fn schema_version(&self) -> SearchResult<u32> {
            self.inner.schema_version().await
        }

        async fn set_schema_version(&self, version: u32) -> SearchResult<()> {
            self.inner.set_schema_version(version).await
        }

        async fn create_index(&self, spec: &IndexSpec) -> SearchResult<()> {
            if *spec == IndexSpec::QUERY_UNIQUE {
                self.unique_attempts.fetch_add(1, Ordering::SeqCst);
                if self.refuse_unique.load(Ordering::SeqCst) {
                    return Err(SearchError::DatabaseError("index build aborted".to_string()));
                }
            }
            self.inner.create_index(spec).await
        }

        async fn storage_estimate(&self) -> SearchResult<Option<StorageEstimate>> {
            self.inner.storage_estimate().await
        }

        async fn health_check(&self) -> SearchResult<()> {
            self.inner.health_check().await
        }
    }

    fn legacy_entry(id: &str, raw_query: &str, age_secs: i64) -> CacheEntry {
        let written = Utc::now() - Duration::seconds(age_secs);
        CacheEntry {
            id: id.to_string(),
            query: NormalizedQuery::from_canonical(raw_query.to_string()),
            results: vec![serde_json::json!({ "written": age_secs })],
            timestamp: written,
            ttl_ms: 3_600_000,
            source: CacheSource::Api,
            last_accessed: written,
            access_count: 1,
            priority: CachePriority::Medium,
            metadata: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn test_fresh_store_reaches_current_version() {
        let store = MemoryStore::new();
        let report = tokio_test::assert_ok!(Migrator::run(&store).await);

        assert_eq!(report.from_version, 0);
        assert_eq!(report.to_version, CURRENT_SCHEMA_VERSION);
        assert!(report.unique_index);
        assert_eq!(store.schema_version().await.unwrap(), CURRENT_SCHEMA_VERSION);
        assert_eq!(store.index_names().len(), 4);
    }

    #[tokio::test]
    async fn test_dedup_keeps_latest_timestamp() {
        let store = MemoryStore::new();
        store.put(&legacy_entry("legacy-1", "New  York", 300)).await.unwrap();
        store.put(&legacy_entry("legacy-2", "new york", 10)).await.unwrap();
        store.put(&legacy_entry("legacy-3", " NEW YORK ", 100)).await.unwrap();
        store.put(&legacy_entry("legacy-4", "boston", 50)).await.unwrap();

        let report = tokio_test::assert_ok!(Migrator::run(&store).await);
        assert_eq!(report.duplicates_removed, 2);
        assert_eq!(store.count().await.unwrap(), 2);

        let query = NormalizedQuery::new("new york");
        let survivor = store.get(&query.entry_id()).await.unwrap().unwrap();
        assert_eq!(survivor.query, query);
        assert_eq!(survivor.results[0]["written"], 10);
    }

    #[tokio::test]
    async fn test_rerun_is_idempotent() {
        let store = MemoryStore::new();
        store.put(&legacy_entry("a", "paris", 20)).await.unwrap();
        store.put(&legacy_entry("b", "Paris", 10)).await.unwrap();

        let first = tokio_test::assert_ok!(Migrator::run(&store).await);
        let snapshot = store.iterate().await.unwrap();

        let second = tokio_test::assert_ok!(Migrator::run(&store).await);
        assert_eq!(second.from_version, first.to_version);
        assert_eq!(second.duplicates_removed, 0);
        assert_eq!(store.iterate().await.unwrap().len(), snapshot.len());
    }

    #[tokio::test]
    async fn test_interrupted_version_one_resumes() {
        let store = MemoryStore::new();
        store.set_schema_version(1).await.unwrap();
        store.put(&legacy_entry("x", "rome", 20)).await.unwrap();
        store.put(&legacy_entry("y", "ROME", 5)).await.unwrap();

        let report = tokio_test::assert_ok!(Migrator::run(&store).await);
        assert_eq!(report.from_version, 1);
        assert_eq!(report.to_version, 2);
        assert_eq!(report.duplicates_removed, 1);
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_failed_unique_index_leaves_data_queryable() {
        let store = Arc::new(UniqueIndexRefusingStore::new());
        store.put(&legacy_entry("old-1", "Vienna", 60)).await.unwrap();
        store.put(&legacy_entry("old-2", "vienna ", 30)).await.unwrap();

        let report = tokio_test::assert_ok!(Migrator::run(store.as_ref()).await);
        assert!(!report.unique_index);
        assert_eq!(report.to_version, 1);
        assert_eq!(report.duplicates_removed, 1);
        assert_eq!(store.schema_version().await.unwrap(), 1);

        // Construction migrates again and still serves reads and writes
        let cache = CacheManager::new(&Config::default(), store.clone()).await;
        assert_eq!(store.unique_attempts.load(Ordering::SeqCst), 2);
        let entry = cache.get("VIENNA").await.unwrap();
        assert_eq!(entry.results[0]["written"], 30);
        cache.put("graz", vec![serde_json::json!({ "name": "Graz" })], CacheSource::Api).await;
        assert!(cache.contains("graz").await);

        store.refuse_unique.store(false, Ordering::SeqCst);
        let retried = tokio_test::assert_ok!(Migrator::run(store.as_ref()).await);
        assert_eq!(retried.from_version, 1);
        assert_eq!(retried.to_version, 2);
        assert!(retried.unique_index);
        assert_eq!(store.unique_attempts.load(Ordering::SeqCst), 3);
        assert_eq!(store.schema_version().await.unwrap(), CURRENT_SCHEMA_VERSION);
    }
}
