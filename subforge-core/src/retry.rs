use crate::error::CoreError;
use crate::error_utils::ErrorExt;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

pub const DEFAULT_RETRYABLE_STATUS_CODES: [u16; 5] = [429, 500, 502, 503, 504];

/// Configuration for retry behavior
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Retries after the first attempt
    pub retries: u32,
    /// Delay before the first retry (in milliseconds)
    pub base_delay_ms: u64,
    /// Multiplier applied to the delay after every retry
    pub backoff_factor: f64,
    /// Upper bound of the random jitter added to each wait (in milliseconds)
    pub max_jitter_ms: u64,
    pub retryable_status_codes: Vec<u16>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            retries: 2,
            base_delay_ms: 500,
            backoff_factor: 2.0,
            max_jitter_ms: 150,
            retryable_status_codes: DEFAULT_RETRYABLE_STATUS_CODES.to_vec(),
        }
    }
}

impl RetryConfig {
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn with_base_delay_ms(mut self, base_delay_ms: u64) -> Self {
        self.base_delay_ms = base_delay_ms;
        self
    }
}

/// Retry strategy based on error type
#[derive(Debug, Clone, PartialEq)]
pub enum RetryStrategy {
    /// Retry with exponential backoff, honouring a server-supplied hint if present
    Retry { retry_after: Option<Duration> },
    /// Don't retry (permanent failures, parse errors, unlisted statuses)
    NoRetry,
}

/// A failure carrying a status retries only if the status is listed; one without
/// a status retries only if it never reached the server.
pub fn get_retry_strategy(error: &CoreError, config: &RetryConfig) -> RetryStrategy {
    let retryable = match error.status_code() {
        Some(status) => config.retryable_status_codes.contains(&status),
        None => error.is_transient(),
    };

    if retryable {
        RetryStrategy::Retry {
            retry_after: error.retry_after(),
        }
    } else {
        RetryStrategy::NoRetry
    }
}

/// Wait before the next attempt: the larger of the hint and the current backoff, plus jitter.
pub fn calculate_delay(
    current_delay_ms: u64,
    retry_after: Option<Duration>,
    config: &RetryConfig,
) -> Duration {
    let hinted_ms = retry_after.map(|d| d.as_millis() as u64).unwrap_or(0);
    let jitter = fastrand::u64(0..=config.max_jitter_ms);
    Duration::from_millis(hinted_ms.max(current_delay_ms) + jitter)
}

/// Retry metrics for monitoring
#[derive(Debug, Clone, Default)]
pub struct RetryMetrics {
    pub total_retries: u64,
    pub successful_retries: u64,
    pub failed_operations: u64,
}

/// Retry executor that wraps operations with retry logic
#[derive(Debug)]
pub struct RetryExecutor {
    config: RetryConfig,
    metrics: Arc<Mutex<RetryMetrics>>,
}

impl RetryExecutor {
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            metrics: Arc::new(Mutex::new(RetryMetrics::default())),
        }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Execute an operation with retry logic. The last failure is returned unmodified.
    pub async fn execute<F, Fut, T>(&self, operation_name: &str, operation: F) -> Result<T, CoreError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, CoreError>>,
    {
        let mut attempt: u32 = 0;
        let mut delay_ms = self.config.base_delay_ms;

        loop {
            match operation().await {
                Ok(result) => {
                    if attempt > 0 {
                        self.update_metrics(|metrics| {
                            metrics.total_retries += attempt as u64;
                            metrics.successful_retries += 1;
                        });
                        info!(
                            "Operation {} succeeded after {} retries",
                            operation_name, attempt
                        );
                    }
                    return Ok(result);
                }
                Err(error) => {
                    let strategy = get_retry_strategy(&error, &self.config);
                    let attempts_remain = attempt < self.config.retries;

                    match strategy {
                        RetryStrategy::Retry { retry_after } if attempts_remain => {
                            attempt += 1;
                            let delay = calculate_delay(delay_ms, retry_after, &self.config);
                            info!(
                                "Retrying {} in {:?} (retry {}/{}) due to: {}",
                                operation_name, delay, attempt, self.config.retries, error
                            );
                            sleep(delay).await;
                            delay_ms = (delay_ms as f64 * self.config.backoff_factor) as u64;
                        }
                        RetryStrategy::Retry { .. } => {
                            warn!(
                                "Operation {} failed after {} retries: {}",
                                operation_name, attempt, error
                            );
                            self.record_failure(attempt);
                            return Err(error);
                        }
                        RetryStrategy::NoRetry => {
                            debug!(
                                "Not retrying {} due to error type: {}",
                                operation_name, error
                            );
                            self.record_failure(attempt);
                            return Err(error);
                        }
                    }
                }
            }
        }
    }

    /// Get current retry metrics
    pub fn get_metrics(&self) -> RetryMetrics {
        self.metrics
            .lock()
            .map(|metrics| metrics.clone())
            .unwrap_or_default()
    }

    fn record_failure(&self, attempt: u32) {
        self.update_metrics(|metrics| {
            metrics.total_retries += attempt as u64;
            metrics.failed_operations += 1;
        });
    }

    fn update_metrics(&self, update: impl FnOnce(&mut RetryMetrics)) {
        if let Ok(mut metrics) = self.metrics.lock() {
            update(&mut metrics);
        }
    }
}

impl Default for RetryExecutor {
    fn default() -> Self {
        Self::new(RetryConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{LlmError, RedditApiError};
    use std::sync::atomic::{AtomicU32, Ordering};

    fn server_error(status_code: u16) -> CoreError {
        CoreError::RedditApi(RedditApiError::ServerError { status_code })
    }

    #[test]
    fn test_retry_config_default() {
        let config = RetryConfig::default();
        assert_eq!(config.retries, 2);
        assert_eq!(config.base_delay_ms, 500);
        assert_eq!(config.backoff_factor, 2.0);
        assert_eq!(config.retryable_status_codes, vec![429, 500, 502, 503, 504]);
    }

    #[test]
    fn test_retry_strategy_for_errors() {
        let config = RetryConfig::default();

        let rate_limited =
            CoreError::RedditApi(RedditApiError::RateLimitExceeded { retry_after: 3 });
        assert_eq!(
            get_retry_strategy(&rate_limited, &config),
            RetryStrategy::Retry {
                retry_after: Some(Duration::from_secs(3))
            }
        );

        assert_eq!(
            get_retry_strategy(&server_error(503), &config),
            RetryStrategy::Retry { retry_after: None }
        );

        let bad_request = CoreError::RedditApi(RedditApiError::RequestFailed {
            endpoint: "/r/rust/top".to_string(),
            status_code: 400,
        });
        assert_eq!(
            get_retry_strategy(&bad_request, &config),
            RetryStrategy::NoRetry
        );

        let timeout = CoreError::Llm(LlmError::RequestTimeout {
            provider: "openai".to_string(),
        });
        assert_eq!(
            get_retry_strategy(&timeout, &config),
            RetryStrategy::Retry { retry_after: None }
        );
    }

    #[test]
    fn test_parse_failures_are_never_retried() {
        let config = RetryConfig::default();
        let malformed = CoreError::RedditApi(RedditApiError::InvalidResponse {
            details: "missing data".to_string(),
        });
        assert_eq!(get_retry_strategy(&malformed, &config), RetryStrategy::NoRetry);

        let parse = CoreError::generation_failed("post ideas", "not JSON");
        assert_eq!(get_retry_strategy(&parse, &config), RetryStrategy::NoRetry);
    }

    #[test]
    fn test_delay_prefers_larger_of_hint_and_backoff() {
        let config = RetryConfig {
            max_jitter_ms: 0,
            ..Default::default()
        };

        assert_eq!(calculate_delay(500, None, &config), Duration::from_millis(500));
        assert_eq!(
            calculate_delay(500, Some(Duration::from_secs(2)), &config),
            Duration::from_millis(2000)
        );
        assert_eq!(
            calculate_delay(4000, Some(Duration::from_secs(1)), &config),
            Duration::from_millis(4000)
        );
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        let config = RetryConfig::default();
        for _ in 0..50 {
            let delay = calculate_delay(500, None, &config);
            assert!(delay >= Duration::from_millis(500));
            assert!(delay <= Duration::from_millis(650));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_executor_success_on_first_attempt() {
        let executor = RetryExecutor::default();

        let result = executor
            .execute("test_operation", || async { Ok::<i32, CoreError>(42) })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(executor.get_metrics().total_retries, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_executor_success_after_two_503s() {
        let executor = RetryExecutor::new(RetryConfig::default().with_retries(2));
        let attempts = Arc::new(AtomicU32::new(0));

        let counter = attempts.clone();
        let result = executor
            .execute("test_operation", move || {
                let counter = counter.clone();
                async move {
                    let attempt = counter.fetch_add(1, Ordering::SeqCst) + 1;
                    if attempt < 3 {
                        Err(server_error(503))
                    } else {
                        Ok(42)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);

        let metrics = executor.get_metrics();
        assert_eq!(metrics.total_retries, 2);
        assert_eq!(metrics.successful_retries, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_executor_does_not_retry_400() {
        let executor = RetryExecutor::default();
        let attempts = Arc::new(AtomicU32::new(0));

        let counter = attempts.clone();
        let result = executor
            .execute("test_operation", move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err::<i32, CoreError>(CoreError::Llm(LlmError::RequestFailed {
                        provider: "openai".to_string(),
                        status_code: 400,
                        message: "bad request".to_string(),
                    }))
                }
            })
            .await;

        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        match result {
            Err(CoreError::Llm(LlmError::RequestFailed { status_code, .. })) => {
                assert_eq!(status_code, 400)
            }
            other => panic!("Expected the original 400 failure, got {:?}", other),
        }
        assert_eq!(executor.get_metrics().failed_operations, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_return_last_error() {
        let executor = RetryExecutor::new(RetryConfig::default().with_retries(2));
        let attempts = Arc::new(AtomicU32::new(0));

        let counter = attempts.clone();
        let started = tokio::time::Instant::now();
        let result = executor
            .execute("test_operation", move || {
                let counter = counter.clone();
                async move {
                    let attempt = counter.fetch_add(1, Ordering::SeqCst) + 1;
                    Err::<i32, CoreError>(server_error(501 + attempt as u16))
                }
            })
            .await;

        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        assert!(matches!(
            result,
            Err(CoreError::RedditApi(RedditApiError::ServerError { status_code: 504 }))
        ));
        // 500ms then 1000ms of backoff, each with at most 150ms jitter.
        let waited = started.elapsed();
        assert!(waited >= Duration::from_millis(1500));
        assert!(waited <= Duration::from_millis(1800));
    }
}
