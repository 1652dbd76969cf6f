use std::env;
use tracing::subscriber::set_global_default;
use tracing_subscriber::{
    fmt::{self, format::JsonFields},
    layer::SubscriberExt,
    EnvFilter, Registry,
};
use crate::error::{SearchError, SearchResult};

/// Filter used when `RUST_LOG` is not set
pub const DEFAULT_FILTER: &str = "info,city_search_cache=debug";

/// Service identity attached to emitted spans
pub struct TracingService {
    service_name: String,
}

impl TracingService {
    pub fn new() -> Self {
        let service_name = env::var("SERVICE_NAME")
            .unwrap_or_else(|_| "city-search-cache".to_string());

        Self { service_name }
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }
}

impl Default for TracingService {
    fn default() -> Self {
        Self::new()
    }
}

/// Initialize global tracing subscriber with JSON formatting
pub fn init_tracing() -> SearchResult<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let formatting_layer = fmt::layer()
        .json()
        .with_current_span(false)
        .with_span_list(true)
        .with_writer(std::io::stderr)
        .fmt_fields(JsonFields::new());

    let subscriber = Registry::default()
        .with(env_filter)
        .with(formatting_layer);

    set_global_default(subscriber)
        .map_err(|e| SearchError::Internal(format!("Failed to set global subscriber: {}", e)))?;

    Ok(())
}

/// Macro for creating spans with automatic trace_id injection
#[macro_export]
macro_rules! trace_span {
    ($level:expr, $name:expr) => {
        tracing::span!($level, $name, trace_id = %uuid::Uuid::new_v4())
    };
    ($level:expr, $name:expr, $($field:tt)*) => {
        tracing::span!($level, $name, trace_id = %uuid::Uuid::new_v4(), $($field)*)
    };
}

/// Macro for creating info spans with trace_id
#[macro_export]
macro_rules! info_span {
    ($name:expr) => {
        $crate::trace_span!(tracing::Level::INFO, $name)
    };
    ($name:expr, $($field:tt)*) => {
        $crate::trace_span!(tracing::Level::INFO, $name, $($field)*)
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing::info;

    #[test]
    fn test_tracing_service_name() {
        let service = TracingService::new();
        assert!(!service.service_name().is_empty());
    }

    #[test]
    fn test_tracing_initialization() {
        // A second install fails, which is reported rather than panicking
        match init_tracing() {
            Ok(()) => info!("Tracing initialized"),
            Err(e) => assert!(matches!(e, SearchError::Internal(_))),
        }
        assert!(init_tracing().is_err());
    }

    #[test]
    fn test_span_macros() {
        let _span = info_span!("test_span");
        let _span_with_fields = crate::trace_span!(tracing::Level::DEBUG, "test_span_with_fields", field1 = "value1");
    }
}
