use searchpipe_core::{Config, Error, RequestFailure, Result};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Bounded retry with capped exponential backoff.
///
/// Delay before attempt `n` (n >= 2) is `base_delay * 2^(n-2)`, capped at `max_delay`, so the
/// sequence is non-decreasing and the total sleep is at most `(max_attempts - 1) * max_delay`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

/// Progression of one logical call. `run` drives it; it is never stored beyond that call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryState {
    Attempting(u32),
    Retrying {
        next_attempt: u32,
        delay: Duration,
        last_error: Error,
    },
    Failed {
        attempts: u32,
        error: Error,
    },
}

impl RetryPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_attempts: config.max_attempts().max(1),
            base_delay: config.retry_base_delay(),
            max_delay: config.retry_max_delay(),
        }
    }

    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let exp = (attempt - 2).min(20);
        self.base_delay
            .saturating_mul(1u32 << exp)
            .min(self.max_delay)
    }

    pub fn should_retry(&self, err: &Error, attempt: u32) -> bool {
        attempt < self.max_attempts && err.is_retryable()
    }

    /// Upper bound on time spent sleeping between attempts of one call.
    pub fn max_total_delay(&self) -> Duration {
        (2..=self.max_attempts.max(1))
            .map(|n| self.delay_before(n))
            .sum()
    }

    /// Run `attempt_fn` (called with the 1-based attempt number) until it succeeds, fails
    /// terminally, or attempts run out. Attempts never overlap.
    pub async fn run<T, F, Fut>(&self, mut attempt_fn: F) -> std::result::Result<T, RequestFailure>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut state = RetryState::Attempting(1);
        loop {
            state = match state {
                RetryState::Attempting(n) => match attempt_fn(n).await {
                    Ok(v) => {
                        if n > 1 {
                            debug!(attempt = n, "request succeeded after retry");
                        }
                        return Ok(v);
                    }
                    Err(e) if self.should_retry(&e, n) => RetryState::Retrying {
                        next_attempt: n + 1,
                        delay: self.delay_before(n + 1),
                        last_error: e,
                    },
                    Err(e) => RetryState::Failed {
                        attempts: n,
                        error: e,
                    },
                },
                RetryState::Retrying {
                    next_attempt,
                    delay,
                    last_error,
                } => {
                    warn!(
                        error = %last_error,
                        next_attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        "retrying after transient failure"
                    );
                    tokio::time::sleep(delay).await;
                    RetryState::Attempting(next_attempt)
                }
                RetryState::Failed { attempts, error } => {
                    return Err(RequestFailure::new(error, attempts));
                }
            };
        }
    }
}
