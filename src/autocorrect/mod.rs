/// Autocorrect module
///
/// Ranks correction candidates for a noisy place-name query against a
/// gazetteer using five stages:
/// - Exact and prefix matching
/// - Known-misspelling dictionary
/// - Levenshtein edit distance
/// - Soundex-style phonetic codes
/// - In-order subsequence scoring
///
/// Every stage appends to one candidate pool which is then sorted by
/// confidence and deduplicated by corrected value.

pub mod fuzzy;
pub mod levenshtein;
pub mod misspellings;
pub mod phonetic;


use crate::config::AutocorrectConfig;
use crate::query::normalize;
use crate::types::{CityCandidate, CorrectionAlgorithm, CorrectionCandidate};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use tracing::debug;

const EXACT_CONFIDENCE: f64 = 1.0;
const PREFIX_CONFIDENCE: f64 = 0.95;
const PREFIX_MIN_LEN: usize = 3;
const MISSPELLING_CONFIDENCE: f64 = 0.9;
const LEVENSHTEIN_WEIGHT: f64 = 0.8;
const PHONETIC_CONFIDENCE: f64 = 0.7;

/// Acceptance and weighting of the subsequence stage
#[derive(Debug, Clone, Copy)]
struct FuzzyStage {
    min_score: f64,
    weight: f64,
}

/// Single best-match queries are stricter than multi-suggestion queries
const BEST_MATCH_FUZZY: FuzzyStage = FuzzyStage { min_score: 0.5, weight: 0.75 };
const SUGGESTION_FUZZY: FuzzyStage = FuzzyStage { min_score: 0.4, weight: 0.7 };

/// Process-local memo of phonetic codes and pairwise subsequence scores
#[derive(Debug, Default)]
struct Memo {
    phonetic: HashMap<String, String>,
    fuzzy: HashMap<(String, String), f64>,
}

impl Memo {
    fn len(&self) -> usize {
        self.phonetic.len() + self.fuzzy.len()
    }
}

/// Multi-algorithm spelling corrector for place names
pub struct AutocorrectEngine {
    /// Misspelled variant -> canonical name
    misspellings: HashMap<String, String>,
    memo: RwLock<Memo>,
    config: AutocorrectConfig,
}

impl AutocorrectEngine {
    /// Create an engine with the built-in misspelling dictionary
    pub fn new(config: AutocorrectConfig) -> Self {
        Self {
            misspellings: misspellings::variant_index(),
            memo: RwLock::new(Memo::default()),
            config,
        }
    }

    /// Add or override a known misspelling
    pub fn add_misspelling(&mut self, variant: &str, canonical: &str) {
        self.misspellings
            .insert(canonical_text(variant), canonical_text(canonical));
    }

    /// Highest-confidence correction, or `None` for empty input or no match
    pub fn find_best_correction(&self, query: &str, candidates: &[CityCandidate]) -> Option<CorrectionCandidate> {
        let needle = canonical_text(query);
        if needle.is_empty() || candidates.is_empty() {
            return None;
        }

        // A true equality match short-circuits the pipeline
        if let Some(exact) = candidates.iter().find(|c| canonical_text(&c.name) == needle) {
            return Some(correction(query, &exact.name, EXACT_CONFIDENCE, CorrectionAlgorithm::Exact));
        }

        let pool = self.collect(query, &needle, candidates, BEST_MATCH_FUZZY);
        let best = rank(pool).into_iter().next();
        debug!(query = %query, best = ?best.as_ref().map(|c| &c.corrected), "Best correction");
        best
    }

    /// Up to `max_suggestions` ranked corrections
    pub fn get_suggestions(
        &self,
        query: &str,
        candidates: &[CityCandidate],
        max_suggestions: usize,
    ) -> Vec<CorrectionCandidate> {
        let needle = canonical_text(query);
        if needle.is_empty() || candidates.is_empty() || max_suggestions == 0 {
            return Vec::new();
        }

        let mut ranked = rank(self.collect(query, &needle, candidates, SUGGESTION_FUZZY));
        ranked.truncate(max_suggestions);
        ranked
    }

    /// Ranked corrections using the configured suggestion count
    pub fn suggestions(&self, query: &str, candidates: &[CityCandidate]) -> Vec<CorrectionCandidate> {
        self.get_suggestions(query, candidates, self.config.max_suggestions)
    }

    /// Best corrected text, or the query unchanged when nothing matches
    pub fn correct_query(&self, query: &str, candidates: &[CityCandidate]) -> String {
        self.find_best_correction(query, candidates)
            .map(|c| c.corrected)
            .unwrap_or_else(|| query.to_string())
    }

    /// Drop all memoized codes and scores
    pub fn clear_memo(&self) {
        let mut memo = self.memo.write();
        memo.phonetic.clear();
        memo.fuzzy.clear();
    }

    /// Number of memoized values currently held
    pub fn memo_len(&self) -> usize {
        self.memo.read().len()
    }

    fn collect(
        &self,
        original: &str,
        needle: &str,
        candidates: &[CityCandidate],
        fuzzy_stage: FuzzyStage,
    ) -> Vec<CorrectionCandidate> {
        let mut pool = Vec::new();
        let needle_len = needle.chars().count();
        let needle_code = self.phonetic_code(needle);

        // Exact / prefix
        for candidate in candidates {
            let name = canonical_text(&candidate.name);
            if name == needle {
                pool.push(correction(original, &candidate.name, EXACT_CONFIDENCE, CorrectionAlgorithm::Exact));
            } else if needle_len >= PREFIX_MIN_LEN && name.starts_with(needle) {
                pool.push(correction(original, &candidate.name, PREFIX_CONFIDENCE, CorrectionAlgorithm::Prefix));
            }
        }

        // Known misspellings
        if let Some(canonical) = self.misspellings.get(needle) {
            if let Some(candidate) = candidates
                .iter()
                .find(|c| canonical_text(&c.name).contains(canonical.as_str()))
            {
                pool.push(correction(
                    original,
                    &candidate.name,
                    MISSPELLING_CONFIDENCE,
                    CorrectionAlgorithm::Misspelling,
                ));
            }
        }

        for candidate in candidates {
            let name = canonical_text(&candidate.name);
            if name.is_empty() {
                continue;
            }

            // Edit distance
            let distance = levenshtein::distance(needle, &name);
            let name_len = name.chars().count();
            if distance as f64 <= levenshtein::max_accepted_distance(needle_len, name_len) {
                let max_len = needle_len.max(name_len) as f64;
                let similarity = (max_len - distance as f64) / max_len;
                pool.push(correction(
                    original,
                    &candidate.name,
                    similarity * LEVENSHTEIN_WEIGHT,
                    CorrectionAlgorithm::Levenshtein,
                ));
            }

            // Phonetic
            if phonetic::matches(&needle_code, &self.phonetic_code(&name)) {
                pool.push(correction(
                    original,
                    &candidate.name,
                    PHONETIC_CONFIDENCE,
                    CorrectionAlgorithm::Phonetic,
                ));
            }

            // Subsequence
            let score = self.subsequence_score(needle, &name);
            if score >= fuzzy_stage.min_score {
                pool.push(correction(
                    original,
                    &candidate.name,
                    score * fuzzy_stage.weight,
                    CorrectionAlgorithm::Fuzzy,
                ));
            }
        }

        self.enforce_memo_limit();
        pool
    }

    fn phonetic_code(&self, text: &str) -> String {
        if let Some(code) = self.memo.read().phonetic.get(text) {
            return code.clone();
        }
        let code = phonetic::code(text);
        self.memo.write().phonetic.insert(text.to_string(), code.clone());
        code
    }

    fn subsequence_score(&self, needle: &str, name: &str) -> f64 {
        let key = (needle.to_string(), name.to_string());
        if let Some(score) = self.memo.read().fuzzy.get(&key) {
            return *score;
        }
        let score = fuzzy::subsequence_score(needle, name);
        self.memo.write().fuzzy.insert(key, score);
        score
    }

    fn enforce_memo_limit(&self) {
        let len = self.memo_len();
        if len > self.config.memo_limit {
            debug!(memo_len = len, limit = self.config.memo_limit, "Clearing autocorrect memo");
            self.clear_memo();
        }
    }
}

impl Default for AutocorrectEngine {
    fn default() -> Self {
        Self::new(AutocorrectConfig::default())
    }
}

/// Names and queries are compared in the same form the cache keys them by
fn canonical_text(text: &str) -> String {
    normalize(text).as_str().to_string()
}

fn correction(original: &str, corrected: &str, confidence: f64, algorithm: CorrectionAlgorithm) -> CorrectionCandidate {
    CorrectionCandidate {
        original: original.to_string(),
        corrected: corrected.to_string(),
        confidence: confidence.clamp(0.0, 1.0),
        algorithm,
    }
}

/// Sort by descending confidence and keep the first occurrence of each corrected value
fn rank(mut pool: Vec<CorrectionCandidate>) -> Vec<CorrectionCandidate> {
    // Stable sort keeps pipeline order among equal confidences
    pool.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    let mut seen = HashSet::new();
    pool.retain(|c| seen.insert(c.corrected.clone()));
    pool
}
