/// City search service that ties the result cache, the lookup coordinator
/// and the autocorrect engine together
///
/// This module implements the query pipeline:
/// - Exact and approximate cache lookups
/// - Coordinated external lookups on a miss, cached on success
/// - Spelling suggestions against the loaded gazetteer
/// - Cache warming and the periodic maintenance task

use super::coordinator::{LookupCoordinator, LookupOutcome, LookupProvider};
use crate::autocorrect::AutocorrectEngine;
use crate::cache::{CacheManager, HitKind, PutOptions};
use crate::config::{Config, LookupConfig};
use crate::observability::MetricsRegistry;
use crate::types::{CachePriority, CacheSource, CityCandidate, CorrectionCandidate, NormalizedQuery, ResultRecord};
use futures::stream::{self, StreamExt};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Concurrent lookups issued while warming the cache
const PREFETCH_CONCURRENCY: usize = 4;

/// Where the results of a search came from
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SearchOrigin {
    Cache,
    FuzzyCache { similarity: f64 },
    Lookup,
    /// Nothing cached and the lookup produced nothing
    NoResult,
    /// A newer search replaced this one
    Superseded,
}

/// Results of one search
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub query: NormalizedQuery,
    pub results: Vec<ResultRecord>,
    pub origin: SearchOrigin,
}

impl SearchOutcome {
    fn empty(query: NormalizedQuery, origin: SearchOrigin) -> Self {
        Self {
            query,
            results: Vec::new(),
            origin,
        }
    }
}

/// Search with the correction that was applied, if any
#[derive(Debug, Clone)]
pub struct CorrectedSearch {
    pub correction: Option<CorrectionCandidate>,
    pub outcome: SearchOutcome,
}

/// Complete city search service
pub struct CitySearchService {
    cache: Arc<CacheManager>,
    autocorrect: AutocorrectEngine,
    coordinator: LookupCoordinator,
    provider: Arc<dyn LookupProvider>,
    /// Gazetteer used for suggestions
    candidates: RwLock<Arc<Vec<CityCandidate>>>,
    lookup_config: LookupConfig,
    cleanup_interval: Duration,
    metrics: Option<MetricsRegistry>,
    shutdown: CancellationToken,
    maintenance: Mutex<Option<JoinHandle<()>>>,
}

impl CitySearchService {
    /// Create a new search service
    pub fn new(
        config: &Config,
        cache: Arc<CacheManager>,
        provider: Arc<dyn LookupProvider>,
        candidates: Vec<CityCandidate>,
        metrics: Option<MetricsRegistry>,
    ) -> Self {
        let mut coordinator = LookupCoordinator::new(config.lookup.clone());
        if let Some(registry) = &metrics {
            coordinator = coordinator.with_metrics(registry.clone());
        }

        info!(
            candidates = candidates.len(),
            backend = cache.backend_name(),
            "City search service created"
        );

        Self {
            cache,
            autocorrect: AutocorrectEngine::new(config.autocorrect.clone()),
            coordinator,
            provider,
            candidates: RwLock::new(Arc::new(candidates)),
            lookup_config: config.lookup.clone(),
            cleanup_interval: config.cache.cleanup_interval,
            metrics,
            shutdown: CancellationToken::new(),
            maintenance: Mutex::new(None),
        }
    }

    /// Search the cache, falling back to a coordinated lookup on a miss
    #[instrument(skip(self))]
    pub async fn search(&self, raw_query: &str) -> SearchOutcome {
        let query = NormalizedQuery::new(raw_query);
        if query.is_empty() {
            return SearchOutcome::empty(query, SearchOrigin::NoResult);
        }

        if let Some(hit) = self.cache.lookup(raw_query).await {
            let origin = match hit.kind {
                HitKind::Exact => SearchOrigin::Cache,
                HitKind::Fuzzy { similarity } => SearchOrigin::FuzzyCache { similarity },
            };
            return SearchOutcome {
                query,
                results: hit.entry.results,
                origin,
            };
        }

        match self.coordinator.run(&query, self.provider.as_ref()).await {
            LookupOutcome::Results(results) => {
                self.cache.put(raw_query, results.clone(), CacheSource::Api).await;
                debug!(query = %query, results = results.len(), "Lookup results cached");
                SearchOutcome {
                    query,
                    results,
                    origin: SearchOrigin::Lookup,
                }
            }
            LookupOutcome::NoResult => SearchOutcome::empty(query, SearchOrigin::NoResult),
            LookupOutcome::Superseded => SearchOutcome::empty(query, SearchOrigin::Superseded),
        }
    }

    /// Ranked spelling suggestions against the loaded gazetteer
    pub fn suggest(&self, raw_query: &str) -> Vec<CorrectionCandidate> {
        let candidates = self.candidates();
        match &self.metrics {
            Some(registry) => crate::time_operation!(
                registry.metrics.autocorrect_duration_seconds,
                self.autocorrect.suggestions(raw_query, &candidates)
            ),
            None => self.autocorrect.suggestions(raw_query, &candidates),
        }
    }

    /// Search for the best correction of the query.
    ///
    /// Results found for a corrected query are also cached under the query as
    /// typed, so the same misspelling is served from cache next time.
    #[instrument(skip(self))]
    pub async fn search_with_correction(&self, raw_query: &str) -> CorrectedSearch {
        let correction = self.autocorrect.find_best_correction(raw_query, &self.candidates());
        let corrected = correction
            .as_ref()
            .map(|c| c.corrected.as_str())
            .filter(|corrected| NormalizedQuery::new(corrected) != NormalizedQuery::new(raw_query));

        let Some(corrected) = corrected else {
            return CorrectedSearch {
                correction,
                outcome: self.search(raw_query).await,
            };
        };

        debug!(query = raw_query, corrected, "Searching corrected query");
        let outcome = self.search(corrected).await;
        if !outcome.results.is_empty() {
            self.cache
                .put(raw_query, outcome.results.clone(), CacheSource::Autocorrect)
                .await;
        }
        CorrectedSearch { correction, outcome }
    }

    /// Warm the cache for `queries`, skipping those already live.
    ///
    /// Prefetch bypasses debounce and supersession so it never cancels an
    /// interactive search. Returns how many queries were cached.
    pub async fn prefetch<I, S>(&self, queries: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let queries: Vec<String> = queries.into_iter().map(|q| q.as_ref().to_string()).collect();

        let cached: Vec<bool> = stream::iter(queries)
            .map(|raw| async move { self.prefetch_one(&raw).await })
            .buffer_unordered(PREFETCH_CONCURRENCY)
            .collect()
            .await;

        let warmed = cached.into_iter().filter(|cached| *cached).count();
        info!(warmed, "Prefetch complete");
        warmed
    }

    async fn prefetch_one(&self, raw_query: &str) -> bool {
        let query = NormalizedQuery::new(raw_query);
        if query.is_empty() || self.cache.contains(raw_query).await {
            return false;
        }

        match timeout(self.lookup_config.timeout, self.provider.lookup(&query)).await {
            Ok(Ok(results)) if !results.is_empty() => {
                let options = PutOptions::source(CacheSource::Prefetch).with_priority(CachePriority::Low);
                self.cache.put_with(raw_query, results, options).await;
                true
            }
            Ok(Ok(_)) => false,
            Ok(Err(e)) => {
                warn!(query = %query, error = %e, "Prefetch lookup failed");
                false
            }
            Err(_) => {
                warn!(query = %query, "Prefetch lookup timed out");
                false
            }
        }
    }

    /// Replace the gazetteer used for suggestions
    pub fn set_candidates(&self, candidates: Vec<CityCandidate>) {
        info!(candidates = candidates.len(), "Gazetteer replaced");
        *self.candidates.write() = Arc::new(candidates);
        self.autocorrect.clear_memo();
    }

    pub fn candidates(&self) -> Arc<Vec<CityCandidate>> {
        self.candidates.read().clone()
    }

    pub fn cache(&self) -> &Arc<CacheManager> {
        &self.cache
    }

    /// Spawn the periodic expiry and capacity sweep. No-op when already running.
    pub fn start_maintenance(&self) {
        let mut slot = self.maintenance.lock();
        if slot.is_some() {
            return;
        }

        let cache = self.cache.clone();
        let token = self.shutdown.clone();
        let period = self.cleanup_interval;

        *slot = Some(tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let report = cache.run_maintenance().await;
                        debug!(
                            expired_removed = report.expired_removed,
                            evicted = report.evicted,
                            "Maintenance tick"
                        );
                    }
                }
            }
            debug!("Maintenance task stopped");
        }));
        info!(interval = ?period, "Cache maintenance started");
    }

    /// Cancel pending lookups and stop the maintenance task
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.coordinator.cancel_pending();

        let handle = self.maintenance.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "Maintenance task ended abnormally");
            }
        }
        info!("City search service shut down");
    }
}
