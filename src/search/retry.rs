/// Retry logic with exponential backoff for external lookups
///
/// This module implements retry strategies with exponential backoff and jitter
/// to ride out transient lookup failures without hammering the collaborator.
/// Backoff sleeps end early when the owning lookup is superseded.

use crate::config::LookupConfig;
use crate::error::{SearchError, SearchResult};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use rand::Rng;

/// Retry configuration
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts
    pub max_retries: u32,
    /// Base delay for exponential backoff
    pub base_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Jitter factor (0.0 to 1.0) to add randomness
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(100), // 100ms, 200ms
            max_delay: Duration::from_millis(1000),
            jitter_factor: 0.1, // 10% jitter
        }
    }
}

impl RetryConfig {
    pub fn from_lookup(config: &LookupConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            ..Self::default()
        }
    }
}

/// Retry strategy for lookups
#[derive(Debug, Clone)]
pub enum RetryStrategy {
    /// Exponential backoff with jitter
    ExponentialBackoff(RetryConfig),
    /// No retries
    None,
}

impl Default for RetryStrategy {
    fn default() -> Self {
        Self::ExponentialBackoff(RetryConfig::default())
    }
}

/// Retry executor that handles different retry strategies
#[derive(Debug, Clone)]
pub struct RetryExecutor {
    strategy: RetryStrategy,
}

impl RetryExecutor {
    /// Create a new retry executor with the given strategy
    pub fn new(strategy: RetryStrategy) -> Self {
        Self { strategy }
    }

    /// Create a retry executor with custom exponential backoff config
    pub fn with_config(config: RetryConfig) -> Self {
        Self::new(RetryStrategy::ExponentialBackoff(config))
    }

    /// Execute an operation with retry logic
    pub async fn execute<F, Fut, T>(&self, operation: F) -> SearchResult<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = SearchResult<T>>,
    {
        self.execute_cancellable(operation, &CancellationToken::new()).await
    }

    /// Execute an operation with retry logic, giving up with
    /// `LookupCancelled` once `token` is cancelled
    pub async fn execute_cancellable<F, Fut, T>(&self, operation: F, token: &CancellationToken) -> SearchResult<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = SearchResult<T>>,
    {
        let config = match &self.strategy {
            RetryStrategy::ExponentialBackoff(config) => config,
            RetryStrategy::None => return operation().await,
        };

        let mut last_error = None;

        for attempt in 0..=config.max_retries {
            if token.is_cancelled() {
                return Err(SearchError::LookupCancelled);
            }

            match operation().await {
                Ok(result) => {
                    if attempt > 0 {
                        debug!("Lookup succeeded after {} retries", attempt);
                    }
                    return Ok(result);
                }
                Err(error) => {
                    // Don't retry on persistent errors
                    if !error.is_retryable() {
                        debug!("Not retrying error: {}", error);
                        return Err(error);
                    }
                    last_error = Some(error.clone());

                    // Don't sleep after the last attempt
                    if attempt < config.max_retries {
                        let delay = self.calculate_exponential_delay(attempt, config);
                        warn!(
                            "Lookup failed (attempt {}/{}), retrying in {:?}: {}",
                            attempt + 1,
                            config.max_retries + 1,
                            delay,
                            error
                        );
                        tokio::select! {
                            _ = token.cancelled() => return Err(SearchError::LookupCancelled),
                            _ = sleep(delay) => {}
                        }
                    } else {
                        warn!(
                            "Lookup failed after {} attempts: {}",
                            config.max_retries + 1,
                            error
                        );
                    }
                }
            }
        }

        // Return the last error if all retries failed
        Err(last_error.unwrap_or_else(|| {
            SearchError::Internal("Retry logic error: no attempts made".to_string())
        }))
    }

    /// Calculate exponential backoff delay with jitter
    fn calculate_exponential_delay(&self, attempt: u32, config: &RetryConfig) -> Duration {
        // base_delay * 2^attempt
        let exponential_delay = config.base_delay.as_millis() as u64 * (1u64 << attempt.min(20));
        let exponential_delay = Duration::from_millis(exponential_delay);

        // Cap at max_delay
        let capped_delay = std::cmp::min(exponential_delay, config.max_delay);

        // Add jitter so concurrent clients spread out
        if config.jitter_factor > 0.0 {
            let jitter_range = (capped_delay.as_millis() as f64 * config.jitter_factor) as u64;
            let jitter = rand::thread_rng().gen_range(0..=jitter_range);
            Duration::from_millis(capped_delay.as_millis() as u64 + jitter)
        } else {
            capped_delay
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast_config(max_retries: u32) -> RetryConfig {
        RetryConfig {
            max_retries,
            base_delay: Duration::from_millis(1), // Fast for testing
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_retry_success_on_first_attempt() {
        let executor = RetryExecutor::new(RetryStrategy::default());
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = executor.execute(|| async {
            counter_clone.fetch_add(1, Ordering::SeqCst);
            Ok::<i32, SearchError>(42)
        }).await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retry_success_after_failures() {
        let executor = RetryExecutor::with_config(fast_config(3));
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = executor.execute(|| async {
            let count = counter_clone.fetch_add(1, Ordering::SeqCst);
            if count < 2 {
                Err(SearchError::LookupFailed("Temporary failure".to_string()))
            } else {
                Ok::<i32, SearchError>(42)
            }
        }).await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_exhaustion() {
        let executor = RetryExecutor::with_config(fast_config(2));
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = executor.execute(|| async {
            counter_clone.fetch_add(1, Ordering::SeqCst);
            Err::<i32, SearchError>(SearchError::LookupFailed("Persistent failure".to_string()))
        }).await;

        assert!(matches!(result, Err(SearchError::LookupFailed(_))));
        assert_eq!(counter.load(Ordering::SeqCst), 3); // 1 initial + 2 retries
    }

    #[tokio::test]
    async fn test_no_retry_on_persistent_errors() {
        let executor = RetryExecutor::with_config(fast_config(3));
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = executor.execute(|| async {
            counter_clone.fetch_add(1, Ordering::SeqCst);
            Err::<i32, SearchError>(SearchError::MalformedCandidateData("bad record".to_string()))
        }).await;

        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 1); // No retries
    }

    #[tokio::test]
    async fn test_cancellation_stops_retries() {
        let executor = RetryExecutor::with_config(RetryConfig {
            max_retries: 5,
            base_delay: Duration::from_secs(10),
            max_delay: Duration::from_secs(10),
            jitter_factor: 0.0,
        });
        let token = CancellationToken::new();
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let canceller = token.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let result = executor.execute_cancellable(|| async {
            counter_clone.fetch_add(1, Ordering::SeqCst);
            Err::<i32, SearchError>(SearchError::LookupFailed("down".to_string()))
        }, &token).await;

        assert!(matches!(result, Err(SearchError::LookupCancelled)));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_exponential_backoff_calculation() {
        let config = RetryConfig {
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(300),
            jitter_factor: 0.0, // No jitter for predictable testing
            ..Default::default()
        };
        let executor = RetryExecutor::with_config(config.clone());

        assert_eq!(executor.calculate_exponential_delay(0, &config), Duration::from_millis(100));
        assert_eq!(executor.calculate_exponential_delay(1, &config), Duration::from_millis(200));
        assert_eq!(executor.calculate_exponential_delay(3, &config), Duration::from_millis(300)); // Capped
    }

    #[tokio::test]
    async fn test_no_retry_strategy() {
        let executor = RetryExecutor::new(RetryStrategy::None);
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = executor.execute(|| async {
            counter_clone.fetch_add(1, Ordering::SeqCst);
            Err::<i32, SearchError>(SearchError::LookupFailed("Failure".to_string()))
        }).await;

        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
