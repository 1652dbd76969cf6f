use std::collections::HashMap;
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::cache::EvictionStrategy;
use crate::error::{SearchError, SearchResult, ValidationError};
use crate::types::CacheSource;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Result cache configuration
    pub cache: CacheConfig,
    /// Approximate cache-key matching
    pub fuzzy: FuzzyConfig,
    /// Autocorrect engine configuration
    pub autocorrect: AutocorrectConfig,
    /// External lookup coordination
    pub lookup: LookupConfig,
    /// Optional relational backing store
    pub database: Option<DatabaseConfig>,
}

/// Result cache configuration
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of entries (`MAX_CACHE_SIZE`)
    pub max_cache_size: usize,
    /// Fraction of capacity that triggers housekeeping
    pub cleanup_threshold: f64,
    /// Fraction of capacity eviction brings the cache down to
    pub evict_target_ratio: f64,
    /// TTL used when no per-source override exists
    pub default_ttl: Duration,
    /// Per-source TTL overrides
    pub source_ttls: HashMap<CacheSource, Duration>,
    /// Strategy used when a category has no override
    pub eviction_strategy: EvictionStrategy,
    /// Per-category eviction strategy overrides
    pub category_strategies: HashMap<CacheSource, EvictionStrategy>,
    /// Storage budget in bytes, if the backend cannot report one itself
    pub storage_quota_bytes: Option<u64>,
    /// Usage/quota ratio that triggers emergency eviction
    pub quota_emergency_ratio: f64,
    /// Period of the background maintenance task
    pub cleanup_interval: Duration,
}

/// How a fuzzy-matched hit decides freshness
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FuzzyFreshness {
    /// Inherit the matched entry's timestamp and TTL unchanged
    Inherit,
    /// Additionally require the matched entry to be younger than this
    MaxAge(Duration),
}

/// Approximate cache-key matching configuration
#[derive(Debug, Clone)]
pub struct FuzzyConfig {
    pub enabled: bool,
    /// Similarity a stored query must exceed to serve as a hit
    pub threshold: f64,
    pub freshness: FuzzyFreshness,
}

/// Autocorrect engine configuration
#[derive(Debug, Clone)]
pub struct AutocorrectConfig {
    /// Default number of suggestions returned
    pub max_suggestions: usize,
    /// Memo entries kept before a wholesale clear
    pub memo_limit: usize,
}

/// External lookup coordination
#[derive(Debug, Clone)]
pub struct LookupConfig {
    pub timeout: Duration,
    pub debounce_min: Duration,
    pub debounce_max: Duration,
    pub max_retries: u32,
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Postgres connection URL
    pub url: String,
    /// Maximum database connections
    pub max_connections: u32,
    /// Connection timeout in seconds
    pub connection_timeout_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            max_cache_size: 500,
            cleanup_threshold: 0.8,
            evict_target_ratio: 0.6,
            default_ttl: Duration::from_secs(24 * 60 * 60),
            source_ttls: HashMap::from([
                (CacheSource::Api, Duration::from_secs(12 * 60 * 60)),
                (CacheSource::Autocorrect, Duration::from_secs(30 * 24 * 60 * 60)),
                (CacheSource::Prefetch, Duration::from_secs(7 * 24 * 60 * 60)),
            ]),
            eviction_strategy: EvictionStrategy::Lru,
            category_strategies: HashMap::new(),
            storage_quota_bytes: None,
            quota_emergency_ratio: 0.9,
            cleanup_interval: Duration::from_secs(300),
        }
    }
}

impl Default for FuzzyConfig {
    fn default() -> Self {
        FuzzyConfig {
            enabled: true,
            threshold: 0.8,
            freshness: FuzzyFreshness::Inherit,
        }
    }
}

impl Default for AutocorrectConfig {
    fn default() -> Self {
        AutocorrectConfig {
            max_suggestions: 5,
            memo_limit: 10_000,
        }
    }
}

impl Default for LookupConfig {
    fn default() -> Self {
        LookupConfig {
            timeout: Duration::from_millis(5000),
            debounce_min: Duration::from_millis(150),
            debounce_max: Duration::from_millis(400),
            max_retries: 2,
        }
    }
}

impl CacheConfig {
    /// TTL for entries written by `source`
    pub fn ttl_for(&self, source: CacheSource) -> Duration {
        self.source_ttls.get(&source).copied().unwrap_or(self.default_ttl)
    }

    /// Entry count above which housekeeping runs
    pub fn cleanup_trigger(&self) -> usize {
        scaled(self.max_cache_size, self.cleanup_threshold)
    }

    /// Entry count eviction brings the cache down to
    pub fn evict_target(&self) -> usize {
        scaled(self.max_cache_size, self.evict_target_ratio)
    }

    pub fn validate(&self) -> SearchResult<()> {
        if self.max_cache_size == 0 {
            return Err(ValidationError::InvalidCapacity("MAX_CACHE_SIZE must be greater than 0".to_string()).into());
        }
        for (name, ratio) in [
            ("CLEANUP_THRESHOLD", self.cleanup_threshold),
            ("EVICT_TARGET_RATIO", self.evict_target_ratio),
            ("STORAGE_QUOTA_EMERGENCY_RATIO", self.quota_emergency_ratio),
        ] {
            if !(ratio > 0.0 && ratio <= 1.0) {
                return Err(ValidationError::InvalidRatio(format!("{} must be in (0, 1], got {}", name, ratio)).into());
            }
        }
        if self.evict_target_ratio > self.cleanup_threshold {
            return Err(ValidationError::InvalidRatio(
                "EVICT_TARGET_RATIO cannot exceed CLEANUP_THRESHOLD".to_string(),
            )
            .into());
        }
        if self.default_ttl.is_zero() {
            return Err(ValidationError::InvalidDuration("DEFAULT_TTL_SECS must be greater than 0".to_string()).into());
        }
        if self.cleanup_interval.is_zero() {
            return Err(ValidationError::InvalidDuration("CLEANUP_INTERVAL_SECS must be greater than 0".to_string()).into());
        }
        Ok(())
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> SearchResult<Self> {
        // Load .env file if it exists
        if let Err(e) = dotenvy::dotenv() {
            tracing::warn!("Could not load .env file: {}", e);
        }

        let defaults = Config::default();

        let mut source_ttls = defaults.cache.source_ttls.clone();
        let mut category_strategies = HashMap::new();
        for source in CacheSource::ALL {
            let suffix = source.as_str().to_ascii_uppercase();
            if let Some(secs) = parse_optional::<u64>(&format!("TTL_{}_SECS", suffix))? {
                source_ttls.insert(source, Duration::from_secs(secs));
            }
            if let Some(strategy) = parse_optional::<EvictionStrategy>(&format!("EVICTION_STRATEGY_{}", suffix))? {
                category_strategies.insert(source, strategy);
            }
        }

        let config = Config {
            cache: CacheConfig {
                max_cache_size: parse_or("MAX_CACHE_SIZE", defaults.cache.max_cache_size)?,
                cleanup_threshold: parse_or("CLEANUP_THRESHOLD", defaults.cache.cleanup_threshold)?,
                evict_target_ratio: parse_or("EVICT_TARGET_RATIO", defaults.cache.evict_target_ratio)?,
                default_ttl: Duration::from_secs(parse_or("DEFAULT_TTL_SECS", defaults.cache.default_ttl.as_secs())?),
                source_ttls,
                eviction_strategy: parse_or("EVICTION_STRATEGY", defaults.cache.eviction_strategy)?,
                category_strategies,
                storage_quota_bytes: parse_optional("STORAGE_QUOTA_BYTES")?,
                quota_emergency_ratio: parse_or("STORAGE_QUOTA_EMERGENCY_RATIO", defaults.cache.quota_emergency_ratio)?,
                cleanup_interval: Duration::from_secs(parse_or(
                    "CLEANUP_INTERVAL_SECS",
                    defaults.cache.cleanup_interval.as_secs(),
                )?),
            },
            fuzzy: FuzzyConfig {
                enabled: parse_or("FUZZY_MATCH_ENABLED", defaults.fuzzy.enabled)?,
                threshold: parse_or("FUZZY_MATCH_THRESHOLD", defaults.fuzzy.threshold)?,
                freshness: match env::var("FUZZY_FRESHNESS") {
                    Ok(value) => parse_freshness(&value)?,
                    Err(_) => defaults.fuzzy.freshness,
                },
            },
            autocorrect: AutocorrectConfig {
                max_suggestions: parse_or("MAX_SUGGESTIONS", defaults.autocorrect.max_suggestions)?,
                memo_limit: parse_or("AUTOCORRECT_MEMO_LIMIT", defaults.autocorrect.memo_limit)?,
            },
            lookup: LookupConfig {
                timeout: Duration::from_millis(parse_or("LOOKUP_TIMEOUT_MS", 5000u64)?),
                debounce_min: Duration::from_millis(parse_or("DEBOUNCE_MIN_MS", 150u64)?),
                debounce_max: Duration::from_millis(parse_or("DEBOUNCE_MAX_MS", 400u64)?),
                max_retries: parse_or("LOOKUP_MAX_RETRIES", defaults.lookup.max_retries)?,
            },
            database: match env::var("DATABASE_URL") {
                Ok(url) if !url.trim().is_empty() => Some(DatabaseConfig {
                    url,
                    max_connections: parse_or("DB_MAX_CONNECTIONS", 5u32)?,
                    connection_timeout_secs: parse_or("DB_CONNECTION_TIMEOUT_SECS", 5u64)?,
                }),
                _ => None,
            },
        };

        // Validate configuration
        config.validate()?;

        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> SearchResult<()> {
        self.cache.validate()?;

        if !(0.0..=1.0).contains(&self.fuzzy.threshold) {
            return Err(ValidationError::InvalidThreshold(format!(
                "FUZZY_MATCH_THRESHOLD must be in [0, 1], got {}",
                self.fuzzy.threshold
            ))
            .into());
        }

        if self.autocorrect.max_suggestions == 0 {
            return Err(SearchError::ConfigError("MAX_SUGGESTIONS must be greater than 0".to_string()));
        }

        if self.lookup.timeout.is_zero() {
            return Err(ValidationError::InvalidDuration("LOOKUP_TIMEOUT_MS must be greater than 0".to_string()).into());
        }

        if self.lookup.debounce_min > self.lookup.debounce_max {
            return Err(ValidationError::InvalidDuration(
                "DEBOUNCE_MIN_MS cannot exceed DEBOUNCE_MAX_MS".to_string(),
            )
            .into());
        }

        if let Some(database) = &self.database {
            if !database.url.starts_with("postgres://") && !database.url.starts_with("postgresql://") {
                return Err(SearchError::ConfigError(
                    "DATABASE_URL must start with postgres:// or postgresql://".to_string(),
                ));
            }
            if database.max_connections == 0 {
                return Err(SearchError::ConfigError("DB_MAX_CONNECTIONS must be greater than 0".to_string()));
            }
        }

        Ok(())
    }
}

/// `capacity * ratio`, floored, tolerant of binary rounding
fn scaled(capacity: usize, ratio: f64) -> usize {
    (capacity as f64 * ratio + 1e-9).floor() as usize
}

fn parse_or<T>(key: &str, default: T) -> SearchResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    Ok(parse_optional(key)?.unwrap_or(default))
}

fn parse_optional<T>(key: &str) -> SearchResult<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| SearchError::ConfigError(format!("Invalid {}: {}", key, e))),
        Err(_) => Ok(None),
    }
}

/// Parse `inherit` or `max_age:<secs>`
fn parse_freshness(value: &str) -> SearchResult<FuzzyFreshness> {
    let value = value.trim().to_ascii_lowercase();
    if value == "inherit" {
        return Ok(FuzzyFreshness::Inherit);
    }
    value
        .strip_prefix("max_age:")
        .and_then(|secs| secs.trim().parse::<u64>().ok())
        .map(|secs| FuzzyFreshness::MaxAge(Duration::from_secs(secs)))
        .ok_or_else(|| SearchError::ConfigError(format!("Invalid FUZZY_FRESHNESS: {}", value)))
}
