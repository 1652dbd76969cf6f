/// In-order subsequence scoring

const MATCH_POINTS: f64 = 10.0;
const COMPLETION_BONUS: f64 = 20.0;
const NORMALIZER_PER_CHAR: f64 = 15.0;

/// Score in [0, 1] rewarding query characters found in order within `candidate`.
///
/// Both inputs are expected lowercased already.
pub fn subsequence_score(query: &str, candidate: &str) -> f64 {
    let query: Vec<char> = query.chars().collect();
    if query.is_empty() {
        return 0.0;
    }

    let mut matched = 0usize;
    let mut score = 0.0;
    for c in candidate.chars() {
        if matched < query.len() && c == query[matched] {
            score += MATCH_POINTS;
            matched += 1;
        }
    }
    if matched == query.len() {
        score += COMPLETION_BONUS;
    }

    (score / (query.len() as f64 * NORMALIZER_PER_CHAR)).clamp(0.0, 1.0)
}
