/// Query normalization and cache-key derivation
///
/// Every cache read and write goes through [`normalize`]; the dedup invariant
/// (one live entry per normalized query) depends on it.

use crate::types::NormalizedQuery;

/// Lowercase, trim and collapse internal whitespace to single spaces.
///
/// Pure and total; `normalize(normalize(x)) == normalize(x)`.
pub fn normalize(raw: &str) -> NormalizedQuery {
    let canonical = raw
        .split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ");
    NormalizedQuery::from_canonical(canonical)
}

/// Stable content hash of a normalized query, used as the primary key.
///
/// farmhash fingerprints are stable across processes and platforms, so ids
/// written by one run are found by the next.
pub fn entry_id(query: &NormalizedQuery) -> String {
    format!("q_{:016x}", farmhash::fingerprint64(query.as_str().as_bytes()))
}
