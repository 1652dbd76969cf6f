/// Levenshtein edit distance
///
/// Classic O(n·m) dynamic programme over Unicode scalar values. Substitution
/// costs 0 when the characters are equal and 1 otherwise; each cell takes the
/// minimum of deletion + 1, insertion + 1 and substitution + cost.

/// Minimum number of single-character edits turning `a` into `b`
pub fn distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();

    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    // Two rolling rows of the (a.len()+1) x (b.len()+1) matrix
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0usize; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = if ca == cb { 0 } else { 1 };
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

/// `(maxLen - distance) / maxLen`, 1.0 for two empty strings
pub fn similarity(a: &str, b: &str) -> f64 {
    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 {
        return 1.0;
    }
    let d = distance(a, b);
    (max_len - d.min(max_len)) as f64 / max_len as f64
}

/// Edit budget accepted for a pair of lengths: `max(2, 0.3 * maxLen)`
pub fn max_accepted_distance(query_len: usize, candidate_len: usize) -> f64 {
    (0.3 * query_len.max(candidate_len) as f64).max(2.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_distances() {
        assert_eq!(distance("kitten", "sitting"), 3);
        assert_eq!(distance("flaw", "lawn"), 2);
        assert_eq!(distance("", "abc"), 3);
        assert_eq!(distance("abc", ""), 3);
        assert_eq!(distance("new york", "new yrok"), 2);
    }

    #[test]
    fn test_identity_and_symmetry() {
        for (a, b) in [("kitten", "sitting"), ("london", "londres"), ("münchen", "munich"), ("", "x")] {
            assert_eq!(distance(a, a), 0);
            assert_eq!(distance(a, b), distance(b, a));
        }
    }

    #[test]
    fn test_distance_counts_characters_not_bytes() {
        assert_eq!(distance("zürich", "zurich"), 1);
        assert_eq!(distance("são paulo", "sao paulo"), 1);
    }

    #[test]
    fn test_similarity_bounds() {
        assert_eq!(similarity("", ""), 1.0);
        assert_eq!(similarity("abc", "abc"), 1.0);
        assert_eq!(similarity("abc", "xyz"), 0.0);
        assert!((similarity("kitten", "sitting") - 4.0 / 7.0).abs() < 1e-9);
    }

    #[test]
    fn test_max_accepted_distance() {
        assert_eq!(max_accepted_distance(3, 4), 2.0);
        assert!((max_accepted_distance(10, 12) - 3.6).abs() < 1e-9);
    }
}
