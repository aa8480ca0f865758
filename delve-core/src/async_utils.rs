//! Async utilities and patterns
//!
//! Provides retry logic, timeouts, and the search rate limiter shared by
//! every branch of a research run.

use crate::error::{DelveError, DelveResult, ErrorContext};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tokio::time::{sleep, sleep_until, timeout, Duration, Instant};
use tracing::{debug, warn};

/// Retry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of attempts (including the first one)
    pub max_attempts: usize,
    /// Initial delay between retries in milliseconds
    pub initial_delay_ms: u64,
    /// Maximum delay between retries in milliseconds
    pub max_delay_ms: u64,
    /// Backoff multiplier (exponential backoff)
    pub backoff_multiplier: f64,
    /// Whether to add jitter to delays
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 1000,
            max_delay_ms: 30000,
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Same backoff, different attempt budget
    pub fn with_attempts(&self, max_attempts: usize) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..self.clone()
        }
    }
}

/// Retry an async operation with exponential backoff.
///
/// The closure receives the 1-based attempt number. Only errors for which
/// [`DelveError::is_recoverable`] holds are retried; anything else is
/// returned immediately.
pub async fn retry_async<F, Fut, T>(
    mut operation: F,
    config: &RetryConfig,
    operation_name: &str,
) -> DelveResult<T>
where
    F: FnMut(usize) -> Fut,
    Fut: std::future::Future<Output = DelveResult<T>>,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 0;
    let mut delay = config.initial_delay_ms;

    loop {
        attempt += 1;

        debug!(
            operation = operation_name,
            attempt = attempt,
            max_attempts = max_attempts,
            "Attempting operation"
        );

        match operation(attempt).await {
            Ok(result) => {
                if attempt > 1 {
                    debug!(
                        operation = operation_name,
                        attempt = attempt,
                        "Operation succeeded after retry"
                    );
                }
                return Ok(result);
            }
            Err(error) => {
                if !error.is_recoverable() || attempt >= max_attempts {
                    warn!(
                        operation = operation_name,
                        attempt = attempt,
                        error = %error,
                        "Operation failed, giving up"
                    );
                    return Err(error);
                }

                // Rate limits get at least the hinted cool-down
                let rate_limited = matches!(
                    error,
                    DelveError::Llm {
                        kind: crate::LlmErrorKind::RateLimited,
                        ..
                    } | DelveError::Search {
                        rate_limited: true,
                        ..
                    }
                );
                let base_delay = match error.retry_delay_ms() {
                    Some(hint) if rate_limited => delay.max(hint).min(config.max_delay_ms),
                    _ => delay,
                };

                warn!(
                    operation = operation_name,
                    attempt = attempt,
                    error = %error,
                    delay_ms = base_delay,
                    "Operation failed, retrying"
                );

                let actual_delay = if config.jitter {
                    let jitter_factor = 0.1;
                    let jitter = (fastrand::f64() - 0.5) * 2.0 * jitter_factor;
                    ((base_delay as f64) * (1.0 + jitter)) as u64
                } else {
                    base_delay
                };

                sleep(Duration::from_millis(actual_delay)).await;

                delay = ((delay as f64) * config.backoff_multiplier) as u64;
                delay = delay.min(config.max_delay_ms);
            }
        }
    }
}

/// Timeout wrapper for async operations
pub async fn with_timeout<F, T>(future: F, timeout_ms: u64, operation_name: &str) -> DelveResult<T>
where
    F: std::future::Future<Output = T>,
{
    match timeout(Duration::from_millis(timeout_ms), future).await {
        Ok(result) => Ok(result),
        Err(_) => Err(DelveError::Timeout {
            operation: operation_name.to_string(),
            duration_ms: timeout_ms,
            context: ErrorContext::new("async_utils")
                .with_operation("timeout")
                .with_metadata("timeout_ms", &timeout_ms.to_string())
                .with_suggestion("Increase timeout duration")
                .with_suggestion("Check network connectivity"),
        }),
    }
}

/// Rate limiter for search calls.
///
/// Two independent bounds apply: at most `max_concurrent` calls are
/// outstanding, and at most `max_per_window` calls start within any rolling
/// window. Callers over either bound wait; nothing is dropped.
#[derive(Debug)]
pub struct SearchLimiter {
    permits: Arc<Semaphore>,
    max_per_window: usize,
    window: Duration,
    starts: Mutex<VecDeque<Instant>>,
}

impl SearchLimiter {
    /// Limiter admitting `per_minute` starts per rolling minute
    pub fn new(max_concurrent: usize, per_minute: usize) -> Self {
        Self::with_window(max_concurrent, per_minute, Duration::from_secs(60))
    }

    pub fn with_window(max_concurrent: usize, max_per_window: usize, window: Duration) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
            max_per_window: max_per_window.max(1),
            window,
            starts: Mutex::new(VecDeque::new()),
        }
    }

    /// Wait for a concurrency slot and a window slot
    pub async fn acquire(&self) -> DelveResult<RateLimitGuard> {
        let permit =
            self.permits
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| DelveError::Internal {
                    message: format!("Failed to acquire search permit: {}", e),
                    source: Some(Box::new(e)),
                    context: ErrorContext::new("search_limiter").with_operation("acquire"),
                })?;

        // The lock is held while sleeping so waiters are admitted in FIFO order
        let mut starts = self.starts.lock().await;
        loop {
            let now = Instant::now();
            while let Some(front) = starts.front() {
                if now.duration_since(*front) >= self.window {
                    starts.pop_front();
                } else {
                    break;
                }
            }

            if starts.len() < self.max_per_window {
                starts.push_back(now);
                break;
            }

            if let Some(front) = starts.front().copied() {
                let wake_at = front + self.window;
                debug!(
                    sleep_ms = wake_at.duration_since(now).as_millis() as u64,
                    "Search rate limit reached, waiting for window"
                );
                sleep_until(wake_at).await;
            }
        }

        Ok(RateLimitGuard { _permit: permit })
    }

    /// Concurrency slots currently free
    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }
}

/// RAII guard for limiter permits
pub struct RateLimitGuard {
    _permit: OwnedSemaphorePermit,
}
