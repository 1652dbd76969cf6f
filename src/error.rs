use std::time::Duration;
use thiserror::Error;

/// Main error type for the city search core
#[derive(Debug, Clone, Error)]
pub enum SearchError {
    /// Backing persistence cannot be opened or reached
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    /// Platform storage quota is (nearly) exhausted
    #[error("Storage quota exceeded: {used} of {quota} bytes in use")]
    StorageQuotaExceeded { used: u64, quota: u64 },

    /// A gazetteer record could not be interpreted
    #[error("Malformed candidate data: {0}")]
    MalformedCandidateData(String),

    /// External lookup collaborator did not answer in time
    #[error("Lookup timed out after {0:?}")]
    LookupTimeout(Duration),

    /// Lookup was cancelled because a newer query superseded it
    #[error("Lookup cancelled")]
    LookupCancelled,

    /// External lookup collaborator reported a failure
    #[error("Lookup failed: {0}")]
    LookupFailed(String),

    /// Database connection or query error
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// Cache operation error
    #[error("Cache error: {0}")]
    CacheError(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SearchError {
    /// Check if error comes from the persistence layer
    pub fn is_storage_error(&self) -> bool {
        matches!(
            self,
            SearchError::StorageUnavailable(_)
                | SearchError::StorageQuotaExceeded { .. }
                | SearchError::DatabaseError(_)
        )
    }

    /// Check if a lookup failing with this error is worth another attempt
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SearchError::LookupFailed(_) | SearchError::StorageUnavailable(_) | SearchError::DatabaseError(_)
        )
    }

    /// Stable label used by structured logs and metrics
    pub fn error_type(&self) -> &'static str {
        match self {
            SearchError::StorageUnavailable(_) => "storage_unavailable",
            SearchError::StorageQuotaExceeded { .. } => "storage_quota_exceeded",
            SearchError::MalformedCandidateData(_) => "malformed_candidate_data",
            SearchError::LookupTimeout(_) => "lookup_timeout",
            SearchError::LookupCancelled => "lookup_cancelled",
            SearchError::LookupFailed(_) => "lookup_failed",
            SearchError::DatabaseError(_) => "database_error",
            SearchError::CacheError(_) => "cache_error",
            SearchError::ConfigError(_) => "config_error",
            SearchError::SerializationError(_) => "serialization_error",
            SearchError::Internal(_) => "internal_error",
        }
    }
}

impl From<serde_json::Error> for SearchError {
    fn from(err: serde_json::Error) -> Self {
        SearchError::SerializationError(err.to_string())
    }
}

/// Result type alias for search operations
pub type SearchResult<T> = Result<T, SearchError>;

/// Validation error for configuration values
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Invalid capacity: {0}")]
    InvalidCapacity(String),

    #[error("Invalid ratio: {0}")]
    InvalidRatio(String),

    #[error("Invalid threshold: {0}")]
    InvalidThreshold(String),

    #[error("Invalid duration: {0}")]
    InvalidDuration(String),
}

impl From<ValidationError> for SearchError {
    fn from(err: ValidationError) -> Self {
        SearchError::ConfigError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_error_classification() {
        assert!(SearchError::StorageUnavailable("down".to_string()).is_storage_error());
        assert!(SearchError::StorageQuotaExceeded { used: 10, quota: 8 }.is_storage_error());
        assert!(!SearchError::LookupCancelled.is_storage_error());
    }

    #[test]
    fn test_retryable_errors() {
        assert!(SearchError::LookupFailed("503".to_string()).is_retryable());
        assert!(!SearchError::LookupTimeout(Duration::from_secs(1)).is_retryable());
        assert!(!SearchError::LookupCancelled.is_retryable());
        assert!(!SearchError::ConfigError("bad".to_string()).is_retryable());
    }

    #[test]
    fn test_validation_error_conversion() {
        let err: SearchError = ValidationError::InvalidRatio("1.5".to_string()).into();
        assert_eq!(err.error_type(), "config_error");
        assert!(err.to_string().contains("1.5"));
    }
}
