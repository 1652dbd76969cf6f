/// Eviction policy
///
/// Decides which entries to remove under size or quota pressure:
/// - LRU: oldest `last_accessed` first
/// - LFU: lowest `access_count` first
/// - Adaptive: lowest `access_count * 0.7 - age * (-0.3)` first
///
/// Strategies are chosen per category (entry source). High-priority entries
/// are only taken by size-driven eviction once nothing else is left; the
/// quota-emergency path ignores priority.

use crate::config::CacheConfig;
use crate::error::SearchError;
use crate::types::{CacheEntry, CachePriority, CacheSource};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

const ADAPTIVE_FREQUENCY_WEIGHT: f64 = 0.7;
const ADAPTIVE_AGE_WEIGHT: f64 = -0.3;

/// Ordering rule for eviction candidates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EvictionStrategy {
    Lru,
    Lfu,
    Adaptive,
}

impl EvictionStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvictionStrategy::Lru => "lru",
            EvictionStrategy::Lfu => "lfu",
            EvictionStrategy::Adaptive => "adaptive",
        }
    }

    /// Eviction score; lower scores are evicted first
    pub fn score(&self, entry: &CacheEntry, now: DateTime<Utc>) -> f64 {
        match self {
            EvictionStrategy::Lru => entry.last_accessed.timestamp_millis() as f64,
            EvictionStrategy::Lfu => entry.access_count as f64,
            EvictionStrategy::Adaptive => {
                let age_ms = (now - entry.last_accessed).num_milliseconds().max(0) as f64;
                entry.access_count as f64 * ADAPTIVE_FREQUENCY_WEIGHT - age_ms * ADAPTIVE_AGE_WEIGHT
            }
        }
    }
}

impl fmt::Display for EvictionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EvictionStrategy {
    type Err = SearchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lru" => Ok(EvictionStrategy::Lru),
            "lfu" => Ok(EvictionStrategy::Lfu),
            "adaptive" => Ok(EvictionStrategy::Adaptive),
            other => Err(SearchError::ConfigError(format!(
                "Unknown eviction strategy '{}', expected lru|lfu|adaptive",
                other
            ))),
        }
    }
}

/// Why entries are being evicted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictionMode {
    /// Entry count above target; high priority is protected while possible
    SizeDriven,
    /// Storage quota nearly exhausted; priority is ignored
    QuotaEmergency,
}

/// Per-category eviction strategy selection
#[derive(Debug, Clone)]
pub struct EvictionPolicy {
    default_strategy: EvictionStrategy,
    category_strategies: HashMap<CacheSource, EvictionStrategy>,
}

impl EvictionPolicy {
    pub fn new(default_strategy: EvictionStrategy) -> Self {
        Self {
            default_strategy,
            category_strategies: HashMap::new(),
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self {
            default_strategy: config.eviction_strategy,
            category_strategies: config.category_strategies.clone(),
        }
    }

    pub fn with_category(mut self, source: CacheSource, strategy: EvictionStrategy) -> Self {
        self.category_strategies.insert(source, strategy);
        self
    }

    pub fn strategy_for(&self, source: CacheSource) -> EvictionStrategy {
        self.category_strategies
            .get(&source)
            .copied()
            .unwrap_or(self.default_strategy)
    }

    /// All entries in eviction order, first to go first.
    ///
    /// Entries sharing a strategy are compared directly. When categories use
    /// different strategies, their orderings are interleaved by relative rank.
    pub fn eviction_order<'a>(&self, entries: &'a [CacheEntry], now: DateTime<Utc>) -> Vec<&'a CacheEntry> {
        let mut groups: HashMap<EvictionStrategy, Vec<(f64, &'a CacheEntry)>> = HashMap::new();
        for entry in entries {
            let strategy = self.strategy_for(entry.source);
            groups
                .entry(strategy)
                .or_default()
                .push((strategy.score(entry, now), entry));
        }

        let mut ranked: Vec<(f64, &'a CacheEntry)> = Vec::with_capacity(entries.len());
        for (_, mut group) in groups {
            group.sort_by(|(score_a, a), (score_b, b)| {
                score_a
                    .total_cmp(score_b)
                    .then(a.last_accessed.cmp(&b.last_accessed))
                    .then_with(|| a.id.cmp(&b.id))
            });
            let len = group.len() as f64;
            ranked.extend(
                group
                    .into_iter()
                    .enumerate()
                    .map(|(position, (_, entry))| (position as f64 / len, entry)),
            );
        }

        ranked.sort_by(|(rank_a, a), (rank_b, b)| {
            rank_a
                .total_cmp(rank_b)
                .then(a.last_accessed.cmp(&b.last_accessed))
                .then_with(|| a.id.cmp(&b.id))
        });
        ranked.into_iter().map(|(_, entry)| entry).collect()
    }

    /// Ids of up to `count` entries to evict
    pub fn select_victims(
        &self,
        entries: &[CacheEntry],
        count: usize,
        now: DateTime<Utc>,
        mode: EvictionMode,
    ) -> Vec<String> {
        if count == 0 {
            return Vec::new();
        }

        let order = self.eviction_order(entries, now);
        let ordered: Vec<&CacheEntry> = match mode {
            EvictionMode::QuotaEmergency => order,
            EvictionMode::SizeDriven => {
                let (high, rest): (Vec<_>, Vec<_>) =
                    order.into_iter().partition(|entry| entry.priority == CachePriority::High);
                rest.into_iter().chain(high).collect()
            }
        };

        ordered.into_iter().take(count).map(|entry| entry.id.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NormalizedQuery;
    use chrono::{Duration, TimeZone};
    use std::collections::HashMap as Map;

    fn base_time() -> DateTime<Utc> {
        Utc.timestamp_millis_opt(1_700_000_000_000).unwrap()
    }

    fn entry(name: &str, accessed_secs_ago: i64, access_count: u64, priority: CachePriority) -> CacheEntry {
        let query = NormalizedQuery::new(name);
        let last_accessed = base_time() - Duration::seconds(accessed_secs_ago);
        CacheEntry {
            id: query.entry_id(),
            query,
            results: vec![],
            timestamp: last_accessed,
            ttl_ms: 3_600_000,
            source: CacheSource::Api,
            last_accessed,
            access_count,
            priority,
            metadata: Map::new(),
        }
    }

    fn names(policy: &EvictionPolicy, entries: &[CacheEntry]) -> Vec<String> {
        policy
            .eviction_order(entries, base_time())
            .into_iter()
            .map(|e| e.query.to_string())
            .collect()
    }

    #[test]
    fn test_lru_orders_by_last_access() {
        let entries = vec![
            entry("b", 10, 1, CachePriority::Medium),
            entry("a", 30, 9, CachePriority::Medium),
            entry("c", 5, 1, CachePriority::Medium),
        ];
        assert_eq!(names(&EvictionPolicy::new(EvictionStrategy::Lru), &entries), ["a", "b", "c"]);
    }

    #[test]
    fn test_lfu_orders_by_access_count() {
        let entries = vec![
            entry("b", 10, 5, CachePriority::Medium),
            entry("a", 30, 9, CachePriority::Medium),
            entry("c", 5, 1, CachePriority::Medium),
        ];
        assert_eq!(names(&EvictionPolicy::new(EvictionStrategy::Lfu), &entries), ["c", "b", "a"]);
    }

    #[test]
    fn test_adaptive_score_formula() {
        let e = entry("a", 2, 10, CachePriority::Medium);
        let score = EvictionStrategy::Adaptive.score(&e, base_time());
        assert!((score - (10.0 * 0.7 + 2000.0 * 0.3)).abs() < 1e-9);
    }

    #[test]
    fn test_size_driven_protects_high_priority() {
        let policy = EvictionPolicy::new(EvictionStrategy::Lru);
        let entries = vec![
            entry("old-high", 100, 1, CachePriority::High),
            entry("mid", 50, 1, CachePriority::Low),
            entry("new", 10, 1, CachePriority::Medium),
        ];

        let victims = policy.select_victims(&entries, 2, base_time(), EvictionMode::SizeDriven);
        assert_eq!(victims, vec![entries[1].id.clone(), entries[2].id.clone()]);

        // Only high priority left to take
        let victims = policy.select_victims(&entries, 3, base_time(), EvictionMode::SizeDriven);
        assert_eq!(victims.last(), Some(&entries[0].id));
    }

    #[test]
    fn test_quota_emergency_ignores_priority() {
        let policy = EvictionPolicy::new(EvictionStrategy::Lru);
        let entries = vec![
            entry("old-high", 100, 1, CachePriority::High),
            entry("new", 10, 1, CachePriority::Medium),
        ];
        let victims = policy.select_victims(&entries, 1, base_time(), EvictionMode::QuotaEmergency);
        assert_eq!(victims, vec![entries[0].id.clone()]);
    }

    #[test]
    fn test_per_category_strategies_interleave() {
        let policy = EvictionPolicy::new(EvictionStrategy::Lru).with_category(CacheSource::Prefetch, EvictionStrategy::Lfu);

        let mut p1 = entry("p1", 1, 1, CachePriority::Medium);
        p1.source = CacheSource::Prefetch;
        let mut p2 = entry("p2", 500, 50, CachePriority::Medium);
        p2.source = CacheSource::Prefetch;
        let a1 = entry("a1", 300, 1, CachePriority::Medium);
        let a2 = entry("a2", 20, 1, CachePriority::Medium);

        let order = names(&policy, &[p1, p2, a1, a2]);
        // Rank 0 of each group first (older access breaks the tie), then rank 1
        assert_eq!(order, ["a1", "p1", "p2", "a2"]);
    }

    #[test]
    fn test_strategy_parsing() {
        assert_eq!("LRU".parse::<EvictionStrategy>().unwrap(), EvictionStrategy::Lru);
        assert_eq!(" adaptive ".parse::<EvictionStrategy>().unwrap(), EvictionStrategy::Adaptive);
        assert!("fifo".parse::<EvictionStrategy>().is_err());
    }

    #[test]
    fn test_strategy_resolution_from_config() {
        let mut cache = CacheConfig::default();
        cache.category_strategies.insert(CacheSource::Autocorrect, EvictionStrategy::Lfu);
        let policy = EvictionPolicy::from_config(&cache);

        assert_eq!(policy.strategy_for(CacheSource::Api), EvictionStrategy::Lru);
        assert_eq!(policy.strategy_for(CacheSource::Autocorrect), EvictionStrategy::Lfu);
    }
}
