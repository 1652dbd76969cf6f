pub mod metrics;
pub mod tracing;
pub mod logging;

pub use metrics::{Metrics, MetricsRegistry, Timer};
pub use self::tracing::{TracingService, init_tracing};
pub use logging::{LoggingService, sanitize_query};

use crate::error::SearchResult;

/// Observability service that combines metrics, tracing, and logging
pub struct ObservabilityService {
    pub metrics: MetricsRegistry,
    pub tracing: TracingService,
    pub logging: LoggingService,
}

impl ObservabilityService {
    /// Initialize all observability components
    pub fn new() -> SearchResult<Self> {
        Ok(Self {
            metrics: MetricsRegistry::new()?,
            tracing: TracingService::new(),
            logging: LoggingService::new(),
        })
    }

    /// Install the global tracing subscriber
    pub fn init_global(&self) -> SearchResult<()> {
        init_tracing()
    }
}
