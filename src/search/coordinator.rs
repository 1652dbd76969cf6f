/// External lookup coordination
///
/// Wraps calls to the lookup collaborator with an adaptive debounce, a
/// timeout and retries. Starting a lookup supersedes the one in flight:
/// the older call is cancelled whether it is still debouncing or already
/// fetching.

use super::retry::{RetryConfig, RetryExecutor};
use crate::config::LookupConfig;
use crate::error::{SearchError, SearchResult};
use crate::observability::{sanitize_query, LoggingService, MetricsRegistry, Timer};
use crate::types::{NormalizedQuery, ResultRecord};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Queries this short or shorter wait the longest before fetching
const SHORT_QUERY_CHARS: usize = 2;
/// Queries this long or longer wait the shortest
const SPECIFIC_QUERY_CHARS: usize = 8;

/// Opaque fetch capability supplied by the gazetteer/geocoding collaborator
#[async_trait]
pub trait LookupProvider: Send + Sync {
    async fn lookup(&self, query: &NormalizedQuery) -> SearchResult<Vec<ResultRecord>>;
}

/// What a coordinated lookup produced
#[derive(Debug, Clone, PartialEq)]
pub enum LookupOutcome {
    Results(Vec<ResultRecord>),
    /// Timed out, failed, or found nothing
    NoResult,
    /// A newer lookup started before this one finished
    Superseded,
}

pub struct LookupCoordinator {
    config: LookupConfig,
    retry: RetryExecutor,
    /// Generation and cancellation handle of the newest lookup
    in_flight: Mutex<Option<(u64, CancellationToken)>>,
    generation: AtomicU64,
    metrics: Option<MetricsRegistry>,
    logging: LoggingService,
}

impl LookupCoordinator {
    pub fn new(config: LookupConfig) -> Self {
        Self {
            retry: RetryExecutor::with_config(RetryConfig::from_lookup(&config)),
            config,
            in_flight: Mutex::new(None),
            generation: AtomicU64::new(0),
            metrics: None,
            logging: LoggingService::new(),
        }
    }

    pub fn with_metrics(mut self, registry: MetricsRegistry) -> Self {
        self.metrics = Some(registry);
        self
    }

    pub fn with_retry(mut self, retry: RetryExecutor) -> Self {
        self.retry = retry;
        self
    }

    /// Debounce interval: longest for very short queries, shortest for
    /// specific ones, linear in between
    pub fn debounce_for(&self, query: &NormalizedQuery) -> Duration {
        let len = query.char_len();
        let (min, max) = (self.config.debounce_min, self.config.debounce_max);
        if len <= SHORT_QUERY_CHARS {
            return max;
        }
        if len >= SPECIFIC_QUERY_CHARS {
            return min;
        }
        let span = (SPECIFIC_QUERY_CHARS - SHORT_QUERY_CHARS) as f64;
        let progress = (len - SHORT_QUERY_CHARS) as f64 / span;
        max - (max - min).mul_f64(progress)
    }

    /// Cancel whatever lookup is currently pending
    pub fn cancel_pending(&self) {
        if let Some((_, token)) = self.in_flight.lock().take() {
            token.cancel();
        }
    }

    /// Debounce, then fetch with retries under the configured timeout.
    /// Never fails: errors and timeouts become `NoResult`.
    pub async fn run(&self, query: &NormalizedQuery, provider: &dyn LookupProvider) -> LookupOutcome {
        let (generation, token) = self.begin();
        let outcome = self.run_with_token(query, provider, &token).await;
        self.finish(generation);
        outcome
    }

    async fn run_with_token(
        &self,
        query: &NormalizedQuery,
        provider: &dyn LookupProvider,
        token: &CancellationToken,
    ) -> LookupOutcome {
        let debounce = self.debounce_for(query);
        tokio::select! {
            biased;
            _ = token.cancelled() => {
                debug!(query = %query, "Lookup superseded while debouncing");
                return LookupOutcome::Superseded;
            }
            _ = sleep(debounce) => {}
        }

        let timer = self
            .metrics
            .as_ref()
            .map(|registry| Timer::new(registry.metrics.lookup_duration_seconds.clone()));
        let fetch = self
            .retry
            .execute_cancellable(|| provider.lookup(query), token);

        let result = tokio::select! {
            biased;
            _ = token.cancelled() => {
                debug!(query = %query, "Lookup superseded while fetching");
                return LookupOutcome::Superseded;
            }
            result = timeout(self.config.timeout, fetch) => result,
        };
        if let Some(timer) = timer {
            timer.observe();
        }

        match result.unwrap_or(Err(SearchError::LookupTimeout(self.config.timeout))) {
            Ok(records) if records.is_empty() => LookupOutcome::NoResult,
            Ok(records) => LookupOutcome::Results(records),
            Err(SearchError::LookupCancelled) => LookupOutcome::Superseded,
            Err(e) => {
                if let (SearchError::LookupTimeout(_), Some(registry)) = (&e, &self.metrics) {
                    registry.metrics.lookup_timeouts_total.inc();
                }
                let context = HashMap::from([
                    ("operation".to_string(), json!("lookup")),
                    ("query".to_string(), json!(sanitize_query(query.as_str()))),
                ]);
                self.logging.log_error(&e, Some(context));
                LookupOutcome::NoResult
            }
        }
    }

    /// Register a new in-flight lookup, cancelling the previous one
    fn begin(&self) -> (u64, CancellationToken) {
        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let token = CancellationToken::new();
        if let Some((_, previous)) = self.in_flight.lock().replace((generation, token.clone())) {
            previous.cancel();
        }
        (generation, token)
    }

    /// Clear the slot unless a newer lookup has taken it
    fn finish(&self, generation: u64) {
        let mut in_flight = self.in_flight.lock();
        if matches!(in_flight.as_ref(), Some((current, _)) if *current == generation) {
            *in_flight = None;
        }
    }
}
