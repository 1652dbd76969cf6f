use anyhow::Context;
use city_search_cache::cache::CacheMetricsTracker;
use city_search_cache::observability::ObservabilityService;
use city_search_cache::{load_candidates, CacheManager, CitySearchService, Config, GazetteerLookup, SearchOrigin};
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::Instrument;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let observability = ObservabilityService::new()?;
    observability.init_global()?;

    tracing::info!(service = observability.tracing.service_name(), "Starting city search");

    let config = Config::from_env()?;
    let gazetteer_path = std::env::args()
        .nth(1)
        .context("usage: city-search <gazetteer.json>")?;
    let candidates = load_candidates(&gazetteer_path)
        .await
        .with_context(|| format!("loading gazetteer {}", gazetteer_path))?;

    let metrics = Arc::new(CacheMetricsTracker::with_registry(observability.metrics.clone()));
    let cache = Arc::new(CacheManager::connect(&config, metrics).await);
    let provider = Arc::new(GazetteerLookup::new(Arc::new(candidates.clone())));
    let service = CitySearchService::new(
        &config,
        cache.clone(),
        provider,
        candidates,
        Some(observability.metrics.clone()),
    );
    service.start_maintenance();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    while let Some(line) = lines.next_line().await? {
        let started = Instant::now();
        let span = city_search_cache::info_span!("query");
        let (outcome, suggestions) = async {
            let outcome = service.search(&line).await;
            let suggestions = match outcome.origin {
                SearchOrigin::Cache | SearchOrigin::FuzzyCache { .. } | SearchOrigin::Lookup => Vec::new(),
                SearchOrigin::NoResult | SearchOrigin::Superseded => service.suggest(&line),
            };
            (outcome, suggestions)
        }
        .instrument(span)
        .await;

        let origin = match outcome.origin {
            SearchOrigin::Cache => "cache",
            SearchOrigin::FuzzyCache { .. } => "fuzzy_cache",
            SearchOrigin::Lookup => "lookup",
            SearchOrigin::NoResult => "no_result",
            SearchOrigin::Superseded => "superseded",
        };
        observability.logging.log_query(
            &line,
            origin,
            outcome.results.len(),
            started.elapsed().as_secs_f64() * 1000.0,
        );

        let answer = json!({
            "query": outcome.query,
            "origin": origin,
            "results": outcome.results,
            "suggestions": suggestions,
        });
        stdout.write_all(format!("{}\n", answer).as_bytes()).await?;
        stdout.flush().await?;
    }

    let stats = cache.stats().await;
    tracing::info!(
        requests = stats.total_requests,
        hit_rate = stats.hit_rate(),
        "Input exhausted, shutting down"
    );
    service.shutdown().await;

    Ok(())
}
