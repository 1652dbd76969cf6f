/// Caching module
///
/// This module implements the fuzzy-tolerant result cache:
/// - Deduplicated, TTL-bound entries keyed by normalized query
/// - Capacity control with per-category eviction strategies
/// - Approximate key matching on exact misses
/// - Storage quota relief and schema migrations over a pluggable store

pub mod eviction;
pub mod fuzzy;
pub mod migration;
pub mod stats;
pub mod store;


pub use eviction::{EvictionMode, EvictionPolicy, EvictionStrategy};
pub use fuzzy::{FuzzyCacheLookup, FuzzyMatch};
pub use migration::{MigrationReport, Migrator, CURRENT_SCHEMA_VERSION};
pub use stats::{CacheMetricsTracker, CacheStatistics};
pub use store::{CacheStore, IndexField, IndexSpec, MemoryStore, StorageEstimate};

use crate::clock::{Clock, SystemClock};
use crate::config::{CacheConfig, Config};
use crate::database::PostgresStore;
use crate::error::SearchError;
use crate::observability::{sanitize_query, LoggingService};
use crate::types::{CacheEntry, CachePriority, CacheSource, NormalizedQuery, ResultRecord};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use serde_json::json;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

/// Share of the remaining entries removed per quota-relief round
const QUOTA_RELIEF_BATCH_DIVISOR: usize = 10;

/// How a lookup was satisfied
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HitKind {
    Exact,
    Fuzzy { similarity: f64 },
}

/// Entry returned by a cache lookup
#[derive(Debug, Clone)]
pub struct CacheHit {
    pub entry: CacheEntry,
    pub kind: HitKind,
}

/// Write options beyond the query and results
#[derive(Debug, Clone)]
pub struct PutOptions {
    pub source: CacheSource,
    pub priority: CachePriority,
    pub metadata: HashMap<String, Value>,
    /// Replaces the per-source TTL for this write
    pub ttl_override: Option<Duration>,
}

impl Default for PutOptions {
    fn default() -> Self {
        Self {
            source: CacheSource::Api,
            priority: CachePriority::default(),
            metadata: HashMap::new(),
            ttl_override: None,
        }
    }
}

impl PutOptions {
    pub fn source(source: CacheSource) -> Self {
        Self {
            source,
            ..Self::default()
        }
    }

    pub fn with_priority(mut self, priority: CachePriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_metadata(mut self, metadata: HashMap<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl_override = Some(ttl);
        self
    }
}

/// Entries removed by one housekeeping pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaintenanceReport {
    pub expired_removed: usize,
    pub evicted: usize,
}

impl MaintenanceReport {
    pub fn total(&self) -> usize {
        self.expired_removed + self.evicted
    }
}

/// Result cache over a pluggable store.
///
/// Store failures never escape `lookup`/`get`/`put`: they are logged and
/// counted in the metrics tracker, and the call degrades to a miss or a no-op.
///
/// Reads never write whole entries back. Access bookkeeping and expiry
/// deletes are conditional on the entry's write time, so a read racing a
/// `put` or an eviction cannot restore stale or evicted data.
pub struct CacheManager {
    store: Arc<dyn CacheStore>,
    config: CacheConfig,
    fuzzy: FuzzyCacheLookup,
    policy: EvictionPolicy,
    metrics: Arc<CacheMetricsTracker>,
    clock: Arc<dyn Clock>,
    logging: LoggingService,
    /// Serializes capacity control and expiry sweeps
    housekeeping: Mutex<()>,
}

impl CacheManager {
    /// Create a cache manager over `store`, migrating it to the current schema
    pub async fn new(config: &Config, store: Arc<dyn CacheStore>) -> Self {
        Self::from_parts(config, store, Arc::new(SystemClock), Arc::new(CacheMetricsTracker::new())).await
    }

    /// Create a cache manager with an explicit clock and metrics tracker
    pub async fn from_parts(
        config: &Config,
        store: Arc<dyn CacheStore>,
        clock: Arc<dyn Clock>,
        metrics: Arc<CacheMetricsTracker>,
    ) -> Self {
        match Migrator::run(store.as_ref()).await {
            Ok(report) => debug!(?report, backend = store.backend_name(), "Cache migrations complete"),
            Err(e) => warn!(
                error = %e,
                backend = store.backend_name(),
                "Cache migration failed, continuing on existing schema"
            ),
        }

        Self {
            store,
            config: config.cache.clone(),
            fuzzy: FuzzyCacheLookup::new(&config.fuzzy),
            policy: EvictionPolicy::from_config(&config.cache),
            metrics,
            clock,
            logging: LoggingService::new(),
            housekeeping: Mutex::new(()),
        }
    }

    /// Open the configured backing store, degrading to memory when it is unavailable
    pub async fn connect(config: &Config, metrics: Arc<CacheMetricsTracker>) -> Self {
        let quota = config.cache.storage_quota_bytes;
        let store: Arc<dyn CacheStore> = match &config.database {
            Some(database) => match PostgresStore::connect(database.clone(), quota).await {
                Ok(postgres) => {
                    info!("Result cache backed by Postgres");
                    Arc::new(postgres)
                }
                Err(e) => {
                    warn!(error = %e, "Cache storage unavailable, serving from memory only");
                    Arc::new(memory_store(quota))
                }
            },
            None => {
                info!("No DATABASE_URL configured, result cache is in-memory");
                Arc::new(memory_store(quota))
            }
        };

        Self::from_parts(config, store, Arc::new(SystemClock), metrics).await
    }

    /// Look up a query, falling back to approximate matching on an exact miss
    #[instrument(skip(self))]
    pub async fn lookup(&self, raw_query: &str) -> Option<CacheHit> {
        let started = Instant::now();
        let query = NormalizedQuery::new(raw_query);
        self.metrics.record_request();

        if query.is_empty() {
            self.metrics.record_miss();
            return None;
        }

        let hit = self.find(&query).await;
        if hit.is_none() {
            self.metrics.record_miss();
            debug!(query = %query, "Cache miss");
        }
        self.logging.log_cache_operation(
            "lookup",
            query.as_str(),
            hit.is_some(),
            Some(started.elapsed().as_secs_f64() * 1000.0),
        );
        hit
    }

    async fn find(&self, query: &NormalizedQuery) -> Option<CacheHit> {
        let now = self.clock.now();
        match self.store.get(&query.entry_id()).await {
            Ok(Some(mut entry)) if entry.is_valid_at(now) => {
                self.record_access(&entry, now).await;
                entry.touch(now);
                self.metrics.record_hit(false);
                debug!(query = %query, "Cache hit");
                return Some(CacheHit {
                    entry,
                    kind: HitKind::Exact,
                });
            }
            Ok(Some(expired)) => {
                debug!(query = %query, "Cache entry expired");
                self.remove_unchanged(&expired).await;
            }
            Ok(None) => {}
            Err(e) => self.read_failed("lookup", query, &e),
        }

        self.fuzzy_lookup(query, now).await
    }

    /// Cached entry for a query, exact or approximate
    pub async fn get(&self, raw_query: &str) -> Option<CacheEntry> {
        self.lookup(raw_query).await.map(|hit| hit.entry)
    }

    /// Store results for a query with default options
    pub async fn put(&self, raw_query: &str, results: Vec<ResultRecord>, source: CacheSource) {
        self.put_with(raw_query, results, PutOptions::source(source)).await
    }

    /// Store results for a query, replacing any entry for the same normalized query
    #[instrument(skip(self, results, options), fields(source = options.source.as_str(), results = results.len()))]
    pub async fn put_with(&self, raw_query: &str, results: Vec<ResultRecord>, options: PutOptions) {
        let query = NormalizedQuery::new(raw_query);
        if query.is_empty() {
            debug!("Ignoring cache write for empty query");
            return;
        }

        let now = self.clock.now();
        let id = query.entry_id();
        let previous_count = match self.store.get(&id).await {
            Ok(Some(existing)) if existing.is_valid_at(now) => existing.access_count,
            Ok(_) => 0,
            Err(e) => {
                self.read_failed("put", &query, &e);
                0
            }
        };

        let ttl = options
            .ttl_override
            .unwrap_or_else(|| self.config.ttl_for(options.source));
        let entry = CacheEntry {
            id,
            query,
            results,
            timestamp: now,
            ttl_ms: ttl.as_millis() as u64,
            source: options.source,
            last_accessed: now,
            access_count: previous_count.saturating_add(1),
            priority: options.priority,
            metadata: options.metadata,
        };

        match self.store.put(&entry).await {
            Ok(()) => {}
            Err(SearchError::StorageQuotaExceeded { used, quota }) => {
                warn!(used, quota, query = %entry.query, "Storage quota exceeded, evicting");
                self.relieve_quota_pressure(entry.estimated_size()).await;
                if let Err(e) = self.store.put(&entry).await {
                    self.write_failed("put", &entry.query, &e);
                    return;
                }
            }
            Err(e) => {
                self.write_failed("put", &entry.query, &e);
                return;
            }
        }

        debug!(query = %entry.query, ttl_ms = entry.ttl_ms, "Cached results");
        self.logging.log_cache_operation("put", entry.query.as_str(), false, None);
        self.enforce_capacity_after_write().await;
    }

    /// Remove the entry for a query; returns whether one existed
    pub async fn delete(&self, raw_query: &str) -> bool {
        let query = NormalizedQuery::new(raw_query);
        match self.store.delete(&query.entry_id()).await {
            Ok(removed) => removed,
            Err(e) => {
                self.write_failed("delete", &query, &e);
                false
            }
        }
    }

    /// Whether a live entry exists for the exact normalized query.
    /// Does not count as a request and does not touch the entry.
    pub async fn contains(&self, raw_query: &str) -> bool {
        let id = NormalizedQuery::new(raw_query).entry_id();
        match self.store.get(&id).await {
            Ok(Some(entry)) => entry.is_valid_at(self.clock.now()),
            Ok(None) => false,
            Err(e) => {
                self.metrics.record_read_failure();
                debug!(error = %e, "Cache presence check failed");
                false
            }
        }
    }

    /// Number of stored entries, live or expired
    pub async fn len(&self) -> usize {
        match self.store.count().await {
            Ok(count) => count,
            Err(e) => {
                self.metrics.record_read_failure();
                debug!(error = %e, "Cache count failed");
                0
            }
        }
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Live entries written by `source`
    pub async fn entries_by_source(&self, source: CacheSource) -> Vec<CacheEntry> {
        let now = self.clock.now();
        self.snapshot()
            .await
            .into_iter()
            .filter(|entry| entry.source == source && entry.is_valid_at(now))
            .collect()
    }

    /// Remove every entry
    pub async fn clear(&self) {
        let _guard = self.housekeeping.lock().await;
        match self.store.clear().await {
            Ok(()) => {
                self.metrics.record_entry_count(0);
                info!("Cache cleared");
            }
            Err(e) => {
                self.metrics.record_write_failure();
                warn!(error = %e, "Cache clear failed");
            }
        }
    }

    /// Delete expired entries; returns how many were removed
    pub async fn cleanup_expired(&self) -> usize {
        let _guard = self.housekeeping.lock().await;
        let entries = self.snapshot().await;
        let removed = self.remove_expired(&entries, self.clock.now()).await;
        self.publish_entry_count().await;
        removed
    }

    /// Expiry sweep followed by capacity and quota control
    pub async fn run_maintenance(&self) -> MaintenanceReport {
        let mut report = MaintenanceReport {
            expired_removed: self.cleanup_expired().await,
            evicted: 0,
        };
        let capacity = self.enforce_capacity().await;
        report.expired_removed += capacity.expired_removed;
        report.evicted += capacity.evicted;
        if report.total() > 0 {
            info!(
                expired_removed = report.expired_removed,
                evicted = report.evicted,
                "Cache maintenance complete"
            );
        }
        report
    }

    /// Counters plus the current entry breakdown
    pub async fn stats(&self) -> CacheStatistics {
        let mut stats = self.metrics.snapshot();
        for entry in self.snapshot().await {
            *stats
                .entries_by_source
                .entry(entry.source.as_str().to_string())
                .or_default() += 1;
            *stats
                .entries_by_priority
                .entry(entry.priority.as_str().to_string())
                .or_default() += 1;
        }
        stats
    }

    pub fn metrics(&self) -> Arc<CacheMetricsTracker> {
        self.metrics.clone()
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn backend_name(&self) -> &'static str {
        self.store.backend_name()
    }

    /// Write-path capacity check. Only the entry count is read unless it is
    /// over the cleanup trigger, and the pass is skipped while maintenance
    /// holds the housekeeping lock since maintenance enforces capacity itself.
    async fn enforce_capacity_after_write(&self) {
        let count = match self.store.count().await {
            Ok(count) => count,
            Err(e) => {
                self.metrics.record_read_failure();
                debug!(error = %e, "Cache count failed");
                return;
            }
        };
        if count <= self.config.cleanup_trigger() {
            return;
        }

        match self.housekeeping.try_lock() {
            Ok(_guard) => {
                self.enforce_capacity_locked().await;
            }
            Err(_) => debug!(count, "Housekeeping in progress, deferring capacity control"),
        }
    }

    async fn enforce_capacity(&self) -> MaintenanceReport {
        let _guard = self.housekeeping.lock().await;
        self.enforce_capacity_locked().await
    }

    /// Capacity control: runs once the entry count exceeds the cleanup trigger.
    /// Expired entries go first, then the eviction policy brings the count
    /// down to the evict target. Storage quota is checked afterwards.
    async fn enforce_capacity_locked(&self) -> MaintenanceReport {
        let mut report = MaintenanceReport::default();

        let entries = self.snapshot().await;
        if entries.len() > self.config.cleanup_trigger() {
            let now = self.clock.now();
            report.expired_removed = self.remove_expired(&entries, now).await;

            let live: Vec<CacheEntry> = entries.into_iter().filter(|e| e.is_valid_at(now)).collect();
            let target = self.config.evict_target();
            if live.len() > target {
                let victims = self
                    .policy
                    .select_victims(&live, live.len() - target, now, EvictionMode::SizeDriven);
                report.evicted = self.remove_victims(&live, &victims).await;
                self.metrics.record_evictions(report.evicted);
                info!(
                    evicted = report.evicted,
                    target,
                    strategy = %self.config.eviction_strategy,
                    "Evicted cache entries over capacity"
                );
            }
        }

        report.evicted += self.relieve_quota_pressure_locked(0).await;
        self.publish_entry_count().await;
        report
    }

    /// Quota-emergency eviction, ignoring priority, until usage including
    /// `incoming_bytes` is back under the emergency ratio
    async fn relieve_quota_pressure(&self, incoming_bytes: u64) -> usize {
        let _guard = self.housekeeping.lock().await;
        self.relieve_quota_pressure_locked(incoming_bytes).await
    }

    async fn relieve_quota_pressure_locked(&self, incoming_bytes: u64) -> usize {
        let mut evicted = 0;
        loop {
            let estimate = match self.store.storage_estimate().await {
                Ok(Some(estimate)) => estimate,
                Ok(None) => return evicted,
                Err(e) => {
                    debug!(error = %e, "Storage estimate unavailable");
                    return evicted;
                }
            };
            if estimate.quota_bytes == 0 {
                return evicted;
            }

            let ratio = (estimate.used_bytes + incoming_bytes) as f64 / estimate.quota_bytes as f64;
            if ratio <= self.config.quota_emergency_ratio {
                break;
            }

            let entries = self.snapshot().await;
            if entries.is_empty() {
                break;
            }
            let batch = (entries.len() / QUOTA_RELIEF_BATCH_DIVISOR).max(1);
            let victims = self
                .policy
                .select_victims(&entries, batch, self.clock.now(), EvictionMode::QuotaEmergency);
            let removed = self.remove_victims(&entries, &victims).await;
            if removed == 0 {
                break;
            }
            evicted += removed;
            warn!(removed, usage_ratio = ratio, "Evicted cache entries under storage pressure");
        }

        if evicted > 0 {
            self.metrics.record_evictions(evicted);
        }
        evicted
    }

    async fn fuzzy_lookup(&self, query: &NormalizedQuery, now: DateTime<Utc>) -> Option<CacheHit> {
        if !self.fuzzy.is_enabled() {
            return None;
        }

        let entries = match self.store.iterate().await {
            Ok(entries) => entries,
            Err(e) => {
                self.read_failed("approximate lookup", query, &e);
                return None;
            }
        };

        let FuzzyMatch { mut entry, similarity } = self.fuzzy.find(query, &entries, now)?;
        self.record_access(&entry, now).await;
        entry.touch(now);
        self.metrics.record_hit(true);
        debug!(query = %query, matched = %entry.query, similarity, "Approximate cache hit");

        Some(CacheHit {
            entry,
            kind: HitKind::Fuzzy { similarity },
        })
    }

    /// Persist access bookkeeping for the entry version that was read.
    /// Skipped by the store if the entry has since been rewritten or removed.
    async fn record_access(&self, entry: &CacheEntry, now: DateTime<Utc>) {
        match self.store.touch(&entry.id, entry.timestamp, now).await {
            Ok(true) => {}
            Ok(false) => debug!(entry_id = %entry.id, "Entry changed during read, access not recorded"),
            Err(e) => {
                self.metrics.record_write_failure();
                debug!(error = %e, entry_id = %entry.id, "Could not record cache access");
            }
        }
    }

    async fn remove_expired(&self, entries: &[CacheEntry], now: DateTime<Utc>) -> usize {
        let mut removed = 0;
        for entry in entries.iter().filter(|entry| !entry.is_valid_at(now)) {
            if self.remove_unchanged(entry).await {
                removed += 1;
            }
        }
        if removed > 0 {
            self.metrics.record_expired(removed);
            debug!(removed, "Removed expired cache entries");
        }
        removed
    }

    async fn remove_victims(&self, entries: &[CacheEntry], victims: &[String]) -> usize {
        let by_id: HashMap<&str, &CacheEntry> = entries.iter().map(|e| (e.id.as_str(), e)).collect();
        let mut removed = 0;
        for id in victims {
            if let Some(entry) = by_id.get(id.as_str()) {
                if self.remove_unchanged(entry).await {
                    removed += 1;
                }
            }
        }
        removed
    }

    /// Delete `entry` unless a concurrent write replaced it
    async fn remove_unchanged(&self, entry: &CacheEntry) -> bool {
        match self.store.delete_if_unchanged(&entry.id, entry.timestamp).await {
            Ok(removed) => removed,
            Err(e) => {
                self.write_failed("delete", &entry.query, &e);
                false
            }
        }
    }

    fn read_failed(&self, operation: &str, query: &NormalizedQuery, error: &SearchError) {
        self.metrics.record_read_failure();
        self.log_store_failure(operation, query, error);
    }

    fn write_failed(&self, operation: &str, query: &NormalizedQuery, error: &SearchError) {
        self.metrics.record_write_failure();
        self.log_store_failure(operation, query, error);
    }

    fn log_store_failure(&self, operation: &str, query: &NormalizedQuery, error: &SearchError) {
        let context = HashMap::from([
            ("operation".to_string(), json!(operation)),
            ("backend".to_string(), json!(self.store.backend_name())),
            ("query".to_string(), json!(sanitize_query(query.as_str()))),
        ]);
        self.logging.log_error(error, Some(context));
    }

    async fn snapshot(&self) -> Vec<CacheEntry> {
        match self.store.iterate().await {
            Ok(entries) => entries,
            Err(e) => {
                self.metrics.record_read_failure();
                warn!(error = %e, "Cache scan failed");
                Vec::new()
            }
        }
    }

    async fn publish_entry_count(&self) {
        if let Ok(count) = self.store.count().await {
            self.metrics.record_entry_count(count);
        }
    }
}

fn memory_store(quota_bytes: Option<u64>) -> MemoryStore {
    match quota_bytes {
        Some(quota) => MemoryStore::with_quota(quota),
        None => MemoryStore::new(),
    }
}
