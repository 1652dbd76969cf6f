use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::SearchError;
use crate::query;

/// Opaque result record produced by the lookup collaborator
pub type ResultRecord = Value;

/// Canonical query text used as the dedup key.
///
/// Only constructed through [`query::normalize`], so every read and write path
/// agrees on the same key for the same input.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NormalizedQuery(String);

impl NormalizedQuery {
    /// Normalize raw query text
    pub fn new(raw: &str) -> Self {
        query::normalize(raw)
    }

    pub(crate) fn from_canonical(canonical: String) -> Self {
        NormalizedQuery(canonical)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Length in characters, not bytes
    pub fn char_len(&self) -> usize {
        self.0.chars().count()
    }

    /// Deterministic entry id for this query
    pub fn entry_id(&self) -> String {
        query::entry_id(self)
    }
}

impl fmt::Display for NormalizedQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for NormalizedQuery {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Who produced a cached result bundle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheSource {
    Api,
    Autocorrect,
    Prefetch,
}

impl CacheSource {
    pub const ALL: [CacheSource; 3] = [CacheSource::Api, CacheSource::Autocorrect, CacheSource::Prefetch];

    pub fn as_str(&self) -> &'static str {
        match self {
            CacheSource::Api => "api",
            CacheSource::Autocorrect => "autocorrect",
            CacheSource::Prefetch => "prefetch",
        }
    }
}

impl fmt::Display for CacheSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CacheSource {
    type Err = SearchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "api" => Ok(CacheSource::Api),
            "autocorrect" => Ok(CacheSource::Autocorrect),
            "prefetch" => Ok(CacheSource::Prefetch),
            other => Err(SearchError::CacheError(format!("Unknown cache source: {}", other))),
        }
    }
}

/// Eviction priority of a cache entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CachePriority {
    Low,
    #[default]
    Medium,
    High,
}

impl CachePriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            CachePriority::Low => "low",
            CachePriority::Medium => "medium",
            CachePriority::High => "high",
        }
    }
}

impl FromStr for CachePriority {
    type Err = SearchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(CachePriority::Low),
            "medium" => Ok(CachePriority::Medium),
            "high" => Ok(CachePriority::High),
            other => Err(SearchError::CacheError(format!("Unknown cache priority: {}", other))),
        }
    }
}

/// Cached result bundle with TTL and access metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Deterministic id derived from `query`
    pub id: String,
    /// Normalized query this entry answers
    pub query: NormalizedQuery,
    /// Opaque result records
    pub results: Vec<ResultRecord>,
    /// Last write time
    pub timestamp: DateTime<Utc>,
    /// Time-to-live in milliseconds, measured from `timestamp`
    pub ttl_ms: u64,
    /// Producer of the results
    pub source: CacheSource,
    /// Last read or write time
    pub last_accessed: DateTime<Utc>,
    /// Number of reads and writes
    pub access_count: u64,
    /// Eviction priority
    pub priority: CachePriority,
    /// Free-form metadata supplied by the writer
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

impl CacheEntry {
    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }

    /// Milliseconds elapsed since the last write
    pub fn age_ms(&self, now: DateTime<Utc>) -> i64 {
        (now - self.timestamp).num_milliseconds()
    }

    /// Entry is valid iff `now - timestamp < ttl`
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.age_ms(now) < self.ttl_ms as i64
    }

    /// Record a read or write at `now`
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_accessed = now;
        self.access_count = self.access_count.saturating_add(1);
    }

    /// Rough serialized footprint, used for storage quota estimates
    pub fn estimated_size(&self) -> u64 {
        serde_json::to_vec(self).map(|bytes| bytes.len() as u64).unwrap_or(0)
    }
}

/// Which stage of the autocorrect pipeline produced a candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CorrectionAlgorithm {
    Exact,
    Prefix,
    Misspelling,
    Levenshtein,
    Phonetic,
    Fuzzy,
}

impl CorrectionAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            CorrectionAlgorithm::Exact => "exact",
            CorrectionAlgorithm::Prefix => "prefix",
            CorrectionAlgorithm::Misspelling => "misspelling",
            CorrectionAlgorithm::Levenshtein => "levenshtein",
            CorrectionAlgorithm::Phonetic => "phonetic",
            CorrectionAlgorithm::Fuzzy => "fuzzy",
        }
    }
}

/// A proposed spelling correction (never persisted)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrectionCandidate {
    /// Query as typed
    pub original: String,
    /// Proposed candidate name
    pub corrected: String,
    /// Confidence in [0, 1]
    pub confidence: f64,
    /// Producing algorithm
    pub algorithm: CorrectionAlgorithm,
}

/// Gazetteer record supplied by the geocoding collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CityCandidate {
    pub name: String,
    pub country: String,
    pub lat: f64,
    pub lon: f64,
}

impl CityCandidate {
    pub fn new(name: impl Into<String>, country: impl Into<String>, lat: f64, lon: f64) -> Self {
        Self {
            name: name.into(),
            country: country.into(),
            lat,
            lon,
        }
    }

    /// Interpret one raw gazetteer record.
    ///
    /// Accepts `lat`/`lon` as numbers or numeric strings; `longitude`/`latitude`
    /// are accepted as aliases.
    pub fn from_value(value: &Value) -> Result<Self, SearchError> {
        let obj = value
            .as_object()
            .ok_or_else(|| SearchError::MalformedCandidateData("record is not an object".to_string()))?;

        let name = obj
            .get("name")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .ok_or_else(|| SearchError::MalformedCandidateData("missing name".to_string()))?;

        let country = obj.get("country").and_then(Value::as_str).unwrap_or_default();

        let lat = coordinate(obj.get("lat").or_else(|| obj.get("latitude")))
            .filter(|lat| (-90.0..=90.0).contains(lat))
            .ok_or_else(|| SearchError::MalformedCandidateData(format!("invalid latitude for {}", name)))?;
        let lon = coordinate(obj.get("lon").or_else(|| obj.get("longitude")))
            .filter(|lon| (-180.0..=180.0).contains(lon))
            .ok_or_else(|| SearchError::MalformedCandidateData(format!("invalid longitude for {}", name)))?;

        Ok(CityCandidate::new(name, country, lat, lon))
    }
}

fn coordinate(value: Option<&Value>) -> Option<f64> {
    let parsed = match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite())
}

/// Parse a batch of gazetteer records, skipping malformed ones
pub fn parse_candidates(values: &[Value]) -> Vec<CityCandidate> {
    values
        .iter()
        .enumerate()
        .filter_map(|(index, value)| match CityCandidate::from_value(value) {
            Ok(candidate) => Some(candidate),
            Err(e) => {
                tracing::warn!(index, error = %e, "Skipping gazetteer record");
                None
            }
        })
        .collect()
}
