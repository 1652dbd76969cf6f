use regex::Regex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::env;
use std::sync::OnceLock;
use tracing::{event, Level};
use uuid::Uuid;
use crate::error::SearchError;

/// Longest query text written to logs, in characters
const MAX_LOGGED_QUERY_CHARS: usize = 100;

/// Structured JSON logging service with trace_id injection
#[derive(Clone)]
pub struct LoggingService {
    service_name: String,
    service_version: String,
    environment: String,
}

impl LoggingService {
    pub fn new() -> Self {
        let service_name = env::var("SERVICE_NAME")
            .unwrap_or_else(|_| "city-search-cache".to_string());

        let service_version = env::var("SERVICE_VERSION")
            .unwrap_or_else(|_| env!("CARGO_PKG_VERSION").to_string());

        let environment = env::var("ENVIRONMENT")
            .unwrap_or_else(|_| "development".to_string());

        Self {
            service_name,
            service_version,
            environment,
        }
    }

    /// Log a structured message with trace_id
    pub fn log_structured(&self, level: Level, message: &str, fields: Option<HashMap<String, Value>>) {
        let trace_id = Uuid::new_v4();

        let mut log_entry = json!({
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "level": level.to_string().to_uppercase(),
            "message": message,
            "trace_id": trace_id.to_string(),
            "service": {
                "name": self.service_name,
                "version": self.service_version,
                "environment": self.environment
            }
        });

        if let Some(fields) = fields {
            if let Value::Object(ref mut map) = log_entry {
                map.extend(fields);
            }
        }

        match level {
            Level::ERROR => event!(Level::ERROR, %trace_id, "{}", log_entry),
            Level::WARN => event!(Level::WARN, %trace_id, "{}", log_entry),
            Level::INFO => event!(Level::INFO, %trace_id, "{}", log_entry),
            Level::DEBUG => event!(Level::DEBUG, %trace_id, "{}", log_entry),
            Level::TRACE => event!(Level::TRACE, %trace_id, "{}", log_entry),
        }
    }

    /// Log a handled query and where its answer came from
    pub fn log_query(&self, query: &str, origin: &str, result_count: usize, duration_ms: f64) {
        let fields = HashMap::from([
            ("query".to_string(), json!(sanitize_query(query))),
            ("query_chars".to_string(), json!(query.chars().count())),
            ("origin".to_string(), json!(origin)),
            ("result_count".to_string(), json!(result_count)),
            ("duration_ms".to_string(), json!(duration_ms)),
        ]);

        self.log_structured(Level::INFO, "Query handled", Some(fields));
    }

    /// Log error with context
    pub fn log_error(&self, error: &SearchError, context: Option<HashMap<String, Value>>) {
        let mut fields = HashMap::from([
            ("error_type".to_string(), json!(error.error_type())),
            ("error_message".to_string(), json!(error.to_string())),
        ]);

        if let Some(context) = context {
            fields.extend(context);
        }

        self.log_structured(Level::ERROR, "Error occurred", Some(fields));
    }

    /// Log cache operation
    pub fn log_cache_operation(&self, operation: &str, query: &str, hit: bool, duration_ms: Option<f64>) {
        let mut fields = HashMap::from([
            ("operation".to_string(), json!(operation)),
            ("query".to_string(), json!(sanitize_query(query))),
            ("hit".to_string(), json!(hit)),
        ]);

        if let Some(duration) = duration_ms {
            fields.insert("duration_ms".to_string(), json!(duration));
        }

        self.log_structured(Level::DEBUG, "Cache operation", Some(fields));
    }
}

impl Default for LoggingService {
    fn default() -> Self {
        Self::new()
    }
}

fn control_chars() -> Option<&'static Regex> {
    static CONTROL_CHARS: OnceLock<Option<Regex>> = OnceLock::new();
    CONTROL_CHARS
        .get_or_init(|| Regex::new(r"[\p{Cc}\p{Cf}]+").ok())
        .as_ref()
}

/// Strip control characters and truncate query text for logging
pub fn sanitize_query(query: &str) -> String {
    let stripped = match control_chars() {
        Some(pattern) => pattern.replace_all(query, "").into_owned(),
        None => query.chars().filter(|c| !c.is_control()).collect(),
    };

    if stripped.chars().count() > MAX_LOGGED_QUERY_CHARS {
        let mut truncated: String = stripped.chars().take(MAX_LOGGED_QUERY_CHARS - 3).collect();
        truncated.push_str("...");
        truncated
    } else {
        stripped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logging_service_creation() {
        let service = LoggingService::new();
        assert!(!service.service_name.is_empty());
        assert!(!service.service_version.is_empty());
    }

    #[test]
    fn test_query_sanitization() {
        assert_eq!(sanitize_query("new\u{0007} york\n"), "new york");
        assert_eq!(sanitize_query("zürich"), "zürich");

        let long_query = "ä".repeat(150);
        let sanitized = sanitize_query(&long_query);
        assert_eq!(sanitized.chars().count(), MAX_LOGGED_QUERY_CHARS);
        assert!(sanitized.ends_with("..."));
    }

    #[test]
    fn test_structured_logging() {
        let service = LoggingService::new();

        let mut fields = HashMap::new();
        fields.insert("test_field".to_string(), json!("test_value"));
        fields.insert("numeric_field".to_string(), json!(42));

        service.log_structured(Level::INFO, "Test message", Some(fields));
    }

    #[test]
    fn test_query_logging_methods() {
        let service = LoggingService::new();

        service.log_query("paris", "cache", 3, 0.4);
        service.log_cache_operation("lookup", "paris", true, Some(0.1));
        service.log_error(&SearchError::LookupTimeout(std::time::Duration::from_secs(5)), None);
    }
}
