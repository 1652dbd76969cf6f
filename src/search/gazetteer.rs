/// Gazetteer file loading and a local lookup provider over it
///
/// Reads a JSON array of city records and keeps the well-formed ones.

use super::coordinator::LookupProvider;
use crate::error::{SearchError, SearchResult};
use crate::types::{parse_candidates, CityCandidate, NormalizedQuery, ResultRecord};
use async_trait::async_trait;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Records returned per lookup
const MAX_LOOKUP_RESULTS: usize = 10;

/// Load candidates from a JSON file holding an array of records.
///
/// Malformed records are skipped; a missing file or a document that is
/// not an array is an error.
pub async fn load_candidates(path: impl AsRef<Path>) -> SearchResult<Vec<CityCandidate>> {
    let path = path.as_ref();
    let raw = tokio::fs::read(path).await.map_err(|e| {
        SearchError::MalformedCandidateData(format!("Failed to read {}: {}", path.display(), e))
    })?;

    let document: Value = serde_json::from_slice(&raw)?;
    let records = document.as_array().ok_or_else(|| {
        SearchError::MalformedCandidateData(format!("{} does not contain a JSON array", path.display()))
    })?;

    let candidates = parse_candidates(records);
    info!(
        path = %path.display(),
        loaded = candidates.len(),
        skipped = records.len() - candidates.len(),
        "Gazetteer loaded"
    );
    Ok(candidates)
}

/// Lookup provider answering from an in-process gazetteer.
///
/// Matches names starting with the query, exact matches first.
pub struct GazetteerLookup {
    candidates: Arc<Vec<CityCandidate>>,
}

impl GazetteerLookup {
    pub fn new(candidates: Arc<Vec<CityCandidate>>) -> Self {
        Self { candidates }
    }
}

#[async_trait]
impl LookupProvider for GazetteerLookup {
    async fn lookup(&self, query: &NormalizedQuery) -> SearchResult<Vec<ResultRecord>> {
        let needle = query.as_str();
        let mut matches: Vec<&CityCandidate> = self
            .candidates
            .iter()
            .filter(|c| NormalizedQuery::new(&c.name).as_str().starts_with(needle))
            .collect();
        matches.sort_by_key(|c| NormalizedQuery::new(&c.name).as_str() != needle);

        matches
            .into_iter()
            .take(MAX_LOOKUP_RESULTS)
            .map(|c| serde_json::to_value(c).map_err(SearchError::from))
            .collect()
    }
}
