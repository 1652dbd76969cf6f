use prometheus::{
    Counter, Histogram, Gauge, Registry, Encoder, TextEncoder,
    HistogramOpts,
};
use std::sync::Arc;
use std::time::Instant;
use crate::error::{SearchError, SearchResult};

/// Prometheus metrics registry and collectors
#[derive(Clone)]
pub struct MetricsRegistry {
    registry: Arc<Registry>,
    pub metrics: Arc<Metrics>,
}

/// All application metrics
pub struct Metrics {
    // Cache request metrics
    pub cache_requests_total: Counter,
    pub cache_hits_total: Counter,
    pub cache_fuzzy_hits_total: Counter,
    pub cache_misses_total: Counter,
    pub cache_hit_ratio: Gauge,

    // Cache housekeeping metrics
    pub cache_entries: Gauge,
    pub cache_evictions_total: Counter,
    pub cache_expired_removed_total: Counter,
    pub cache_write_failures_total: Counter,

    // Autocorrect metrics
    pub autocorrect_duration_seconds: Histogram,

    // Lookup metrics
    pub lookup_duration_seconds: Histogram,
    pub lookup_timeouts_total: Counter,
}

impl MetricsRegistry {
    /// Create a new metrics registry with all collectors
    pub fn new() -> SearchResult<Self> {
        let registry = Arc::new(Registry::new());
        let metrics = Arc::new(Metrics::new(&registry)?);

        Ok(Self {
            registry,
            metrics,
        })
    }

    /// Get metrics in Prometheus text format
    pub fn gather(&self) -> SearchResult<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();

        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)
            .map_err(|e| SearchError::Internal(format!("Failed to encode metrics: {}", e)))?;

        String::from_utf8(buffer)
            .map_err(|e| SearchError::Internal(format!("Failed to convert metrics to string: {}", e)))
    }

    /// Get the underlying registry
    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }
}

fn counter(registry: &Registry, name: &str, help: &str) -> SearchResult<Counter> {
    let counter = Counter::new(name, help)
        .map_err(|e| SearchError::Internal(format!("Failed to create {} metric: {}", name, e)))?;
    registry.register(Box::new(counter.clone()))
        .map_err(|e| SearchError::Internal(format!("Failed to register {}: {}", name, e)))?;
    Ok(counter)
}

fn gauge(registry: &Registry, name: &str, help: &str) -> SearchResult<Gauge> {
    let gauge = Gauge::new(name, help)
        .map_err(|e| SearchError::Internal(format!("Failed to create {} metric: {}", name, e)))?;
    registry.register(Box::new(gauge.clone()))
        .map_err(|e| SearchError::Internal(format!("Failed to register {}: {}", name, e)))?;
    Ok(gauge)
}

fn histogram(registry: &Registry, name: &str, help: &str, buckets: Vec<f64>) -> SearchResult<Histogram> {
    let histogram = Histogram::with_opts(HistogramOpts::new(name, help).buckets(buckets))
        .map_err(|e| SearchError::Internal(format!("Failed to create {} metric: {}", name, e)))?;
    registry.register(Box::new(histogram.clone()))
        .map_err(|e| SearchError::Internal(format!("Failed to register {}: {}", name, e)))?;
    Ok(histogram)
}

impl Metrics {
    fn new(registry: &Registry) -> SearchResult<Self> {
        Ok(Self {
            cache_requests_total: counter(registry, "cache_requests_total", "Total number of cache lookups")?,
            cache_hits_total: counter(registry, "cache_hits_total", "Total number of cache hits, exact or fuzzy")?,
            cache_fuzzy_hits_total: counter(registry, "cache_fuzzy_hits_total", "Cache hits served by approximate key matching")?,
            cache_misses_total: counter(registry, "cache_misses_total", "Total number of cache misses")?,
            cache_hit_ratio: gauge(registry, "cache_hit_ratio", "Cache hits divided by cache lookups")?,

            cache_entries: gauge(registry, "cache_entries", "Number of entries currently stored")?,
            cache_evictions_total: counter(registry, "cache_evictions_total", "Entries removed by the eviction policy")?,
            cache_expired_removed_total: counter(registry, "cache_expired_removed_total", "Expired entries removed")?,
            cache_write_failures_total: counter(registry, "cache_write_failures_total", "Failed cache writes and deletes")?,

            autocorrect_duration_seconds: histogram(
                registry,
                "autocorrect_duration_seconds",
                "Duration of autocorrect ranking in seconds",
                vec![0.0001, 0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1],
            )?,

            lookup_duration_seconds: histogram(
                registry,
                "lookup_duration_seconds",
                "Duration of external lookups in seconds",
                vec![0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0],
            )?,
            lookup_timeouts_total: counter(registry, "lookup_timeouts_total", "External lookups that timed out")?,
        })
    }
}

/// Timer helper for measuring durations
pub struct Timer {
    start: Instant,
    histogram: Histogram,
}

impl Timer {
    pub fn new(histogram: Histogram) -> Self {
        Self {
            start: Instant::now(),
            histogram,
        }
    }

    pub fn observe(self) {
        let duration = self.start.elapsed();
        self.histogram.observe(duration.as_secs_f64());
    }
}

/// Macro for timing operations
#[macro_export]
macro_rules! time_operation {
    ($histogram:expr, $operation:expr) => {{
        let timer = $crate::observability::metrics::Timer::new($histogram.clone());
        let result = $operation;
        timer.observe();
        result
    }};
}
