use super::{FetchError, Page, PageToken, Paginator, ReadFilter};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Delay between retry attempts.
#[derive(Clone, Debug, PartialEq)]
pub enum BackoffPolicy {
    Fixed {
        delay: Duration,
    },
    Exponential {
        initial: Duration,
        max: Duration,
        multiplier: f64,
    },
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::Exponential {
            initial: Duration::from_secs(1),
            max: Duration::from_secs(60),
            multiplier: 2.0,
        }
    }
}

impl BackoffPolicy {
    /// Delay before retry number `retry` (0 for the first retry).
    pub fn delay_for(&self, retry: u32) -> Duration {
        match self {
            Self::Fixed { delay } => *delay,
            Self::Exponential {
                initial,
                max,
                multiplier,
            } => {
                let factor = multiplier.powi(retry.min(i32::MAX as u32) as i32);
                let nanos = (initial.as_nanos() as f64 * factor).round();
                if nanos.is_finite() && nanos < max.as_nanos() as f64 {
                    Duration::from_nanos(nanos.max(0.0) as u64)
                } else {
                    *max
                }
            }
        }
    }
}

/// Bounded retry settings. `max_retries = 0` disables retrying.
#[derive(Clone, Debug, PartialEq)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub backoff: BackoffPolicy,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff: BackoffPolicy::default(),
        }
    }
}

/// Wraps a paginator with bounded retry for transient failures.
///
/// Transient failures are retried up to `max_retries` times, then the last
/// failure is returned as-is. Fatal failures are returned immediately.
/// Both the fetch and the backoff sleep race the cancellation token.
pub struct RetryingFetcher {
    paginator: Arc<dyn Paginator>,
    config: RetryConfig,
    cancel: CancellationToken,
    last_attempts: u32,
    last_error: Option<FetchError>,
}

impl RetryingFetcher {
    pub fn new(paginator: Arc<dyn Paginator>, config: RetryConfig, cancel: CancellationToken) -> Self {
        Self {
            paginator,
            config,
            cancel,
            last_attempts: 0,
            last_error: None,
        }
    }

    /// Attempts made by the most recent `fetch` call.
    pub fn last_attempts(&self) -> u32 {
        self.last_attempts
    }

    /// Last failure seen by the most recent `fetch` call, even if a later
    /// attempt succeeded.
    pub fn last_error(&self) -> Option<&FetchError> {
        self.last_error.as_ref()
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub async fn fetch(&mut self, token: &PageToken, filter: &ReadFilter) -> Result<Page, FetchError> {
        self.last_attempts = 0;
        self.last_error = None;
        let mut retries = 0u32;

        loop {
            if self.cancel.is_cancelled() {
                return Err(FetchError::Cancelled);
            }

            self.last_attempts += 1;
            let result = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(FetchError::Cancelled),
                result = self.paginator.fetch(token, filter) => result,
            };

            let err = match result {
                Ok(page) => {
                    debug!(
                        attempts = self.last_attempts,
                        items = page.items.len(),
                        "Fetched page"
                    );
                    return Ok(page);
                }
                Err(err) => err,
            };

            self.last_error = Some(err.clone());

            if !err.is_transient() || retries >= self.config.max_retries {
                return Err(err);
            }

            let delay = self.config.backoff.delay_for(retries);
            retries += 1;
            warn!(
                attempt = self.last_attempts,
                max_retries = self.config.max_retries,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Transient fetch failure, will retry"
            );

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(FetchError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}
