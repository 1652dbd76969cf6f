/// Approximate cache-key matching
///
/// On an exact-key miss, every valid entry's stored query is compared with
/// the incoming query. The most similar one is served when its similarity
/// strictly exceeds the configured threshold.

use crate::config::{FuzzyConfig, FuzzyFreshness};
use crate::types::{CacheEntry, NormalizedQuery};
use chrono::{DateTime, Utc};

/// Edit-distance similarity in [0, 1]; adjacent transpositions count as one edit
pub fn similarity(a: &str, b: &str) -> f64 {
    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 {
        return 1.0;
    }
    let distance = strsim::osa_distance(a, b);
    1.0 - distance as f64 / max_len as f64
}

/// Entry selected by approximate matching
#[derive(Debug, Clone)]
pub struct FuzzyMatch {
    pub entry: CacheEntry,
    pub similarity: f64,
}

#[derive(Debug, Clone)]
pub struct FuzzyCacheLookup {
    enabled: bool,
    threshold: f64,
    freshness: FuzzyFreshness,
}

impl FuzzyCacheLookup {
    pub fn new(config: &FuzzyConfig) -> Self {
        Self {
            enabled: config.enabled,
            threshold: config.threshold,
            freshness: config.freshness,
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Best near-duplicate of `query` among `entries`
    pub fn find(&self, query: &NormalizedQuery, entries: &[CacheEntry], now: DateTime<Utc>) -> Option<FuzzyMatch> {
        if !self.enabled || query.is_empty() {
            return None;
        }

        let mut best: Option<(f64, &CacheEntry)> = None;
        for entry in entries {
            if &entry.query == query || !entry.is_valid_at(now) || !self.is_fresh_enough(entry, now) {
                continue;
            }

            let score = similarity(query.as_str(), entry.query.as_str());
            if score <= self.threshold {
                continue;
            }

            // Ties go to the most recently written entry
            let better = match best {
                None => true,
                Some((best_score, best_entry)) => {
                    score > best_score || (score == best_score && entry.timestamp > best_entry.timestamp)
                }
            };
            if better {
                best = Some((score, entry));
            }
        }

        best.map(|(similarity, entry)| FuzzyMatch {
            entry: entry.clone(),
            similarity,
        })
    }

    fn is_fresh_enough(&self, entry: &CacheEntry, now: DateTime<Utc>) -> bool {
        match self.freshness {
            FuzzyFreshness::Inherit => true,
            FuzzyFreshness::MaxAge(max_age) => (entry.age_ms(now).max(0) as u128) < max_age.as_millis(),
        }
    }
}
