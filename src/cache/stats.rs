use crate::observability::MetricsRegistry;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time copy of the cache counters
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStatistics {
    pub total_requests: u64,
    pub cache_hits: u64,
    pub fuzzy_hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expired_removed: u64,
    pub write_failures: u64,
    pub read_failures: u64,
    /// Entry count by source, filled in by `CacheManager::stats`
    pub entries_by_source: HashMap<String, usize>,
    /// Entry count by priority, filled in by `CacheManager::stats`
    pub entries_by_priority: HashMap<String, usize>,
}

impl CacheStatistics {
    /// `cache_hits / total_requests`, 0 when nothing was requested
    pub fn hit_rate(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            self.cache_hits as f64 / self.total_requests as f64
        }
    }
}

/// Hit/miss counters for the result cache.
///
/// Counters are lock-free and read-only from outside the cache. When a
/// Prometheus registry is attached, every increment is mirrored there.
#[derive(Default)]
pub struct CacheMetricsTracker {
    total_requests: AtomicU64,
    cache_hits: AtomicU64,
    fuzzy_hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    expired_removed: AtomicU64,
    write_failures: AtomicU64,
    read_failures: AtomicU64,
    registry: Option<MetricsRegistry>,
}

impl CacheMetricsTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_registry(registry: MetricsRegistry) -> Self {
        Self {
            registry: Some(registry),
            ..Self::default()
        }
    }

    pub(crate) fn record_request(&self) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        if let Some(registry) = &self.registry {
            registry.metrics.cache_requests_total.inc();
        }
        self.publish_ratio();
    }

    pub(crate) fn record_hit(&self, fuzzy: bool) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
        if fuzzy {
            self.fuzzy_hits.fetch_add(1, Ordering::Relaxed);
        }
        if let Some(registry) = &self.registry {
            registry.metrics.cache_hits_total.inc();
            if fuzzy {
                registry.metrics.cache_fuzzy_hits_total.inc();
            }
        }
        self.publish_ratio();
    }

    pub(crate) fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
        if let Some(registry) = &self.registry {
            registry.metrics.cache_misses_total.inc();
        }
    }

    pub(crate) fn record_evictions(&self, count: usize) {
        self.evictions.fetch_add(count as u64, Ordering::Relaxed);
        if let Some(registry) = &self.registry {
            registry.metrics.cache_evictions_total.inc_by(count as f64);
        }
    }

    pub(crate) fn record_expired(&self, count: usize) {
        self.expired_removed.fetch_add(count as u64, Ordering::Relaxed);
        if let Some(registry) = &self.registry {
            registry.metrics.cache_expired_removed_total.inc_by(count as f64);
        }
    }

    pub(crate) fn record_write_failure(&self) {
        self.write_failures.fetch_add(1, Ordering::Relaxed);
        if let Some(registry) = &self.registry {
            registry.metrics.cache_write_failures_total.inc();
        }
    }

    pub(crate) fn record_read_failure(&self) {
        self.read_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_entry_count(&self, count: usize) {
        if let Some(registry) = &self.registry {
            registry.metrics.cache_entries.set(count as f64);
        }
    }

    pub fn total_requests(&self) -> u64 {
        self.total_requests.load(Ordering::Relaxed)
    }

    pub fn cache_hits(&self) -> u64 {
        self.cache_hits.load(Ordering::Relaxed)
    }

    pub fn hit_rate(&self) -> f64 {
        self.snapshot().hit_rate()
    }

    pub fn snapshot(&self) -> CacheStatistics {
        CacheStatistics {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            fuzzy_hits: self.fuzzy_hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            expired_removed: self.expired_removed.load(Ordering::Relaxed),
            write_failures: self.write_failures.load(Ordering::Relaxed),
            read_failures: self.read_failures.load(Ordering::Relaxed),
            ..CacheStatistics::default()
        }
    }

    /// Zero all counters
    pub fn reset(&self) {
        for counter in [
            &self.total_requests,
            &self.cache_hits,
            &self.fuzzy_hits,
            &self.misses,
            &self.evictions,
            &self.expired_removed,
            &self.write_failures,
            &self.read_failures,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
        self.publish_ratio();
    }

    fn publish_ratio(&self) {
        if let Some(registry) = &self.registry {
            registry.metrics.cache_hit_ratio.set(self.hit_rate());
        }
    }
}
