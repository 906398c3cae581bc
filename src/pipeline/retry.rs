//! Bounded exponential-backoff retry around a fallible async operation.
//!
//! Attempts are strictly sequential. After attempt `n` (1-indexed) fails
//! retryably the controller sleeps `base_delay * 2^(n-1)` before attempt
//! `n+1`, so with 1 s base and 3 attempts the waits are 1 s → 2 s. No wait
//! follows the last attempt.
//!
//! Sleeping uses `tokio::time`, so other requests keep being served during a
//! backoff.

use crate::config::ServerConfig;
use crate::error::EngineError;
use crate::pipeline::classify::is_retryable;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Attempt budget and backoff base for one conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts allowed. Zero is treated as one.
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    pub fn from_config(config: &ServerConfig) -> Self {
        Self::new(config.max_retries, config.retry_base_delay)
    }

    fn max_attempts(&self) -> u32 {
        self.max_retries.max(1)
    }

    /// Wait after failed attempt `attempt` (1-indexed).
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(31);
        self.base_delay.saturating_mul(1u32 << exp)
    }

    /// Whether a failure on `attempt` should be followed by another attempt.
    pub fn should_retry(&self, err: &EngineError, attempt: u32) -> bool {
        attempt < self.max_attempts() && is_retryable(err)
    }

    /// Upper bound on total backoff time across all attempts.
    pub fn worst_case_wait(&self) -> Duration {
        (1..self.max_attempts())
            .map(|n| self.backoff_delay(n))
            .fold(Duration::ZERO, Duration::saturating_add)
    }
}

/// Run `operation` until it succeeds, fails non-retryably, or the attempt
/// budget is spent. The closure receives the 1-indexed attempt number.
///
/// The last error is returned unchanged.
pub async fn retry_with_backoff<T, F, Fut>(
    mut operation: F,
    max_retries: u32,
    base_delay: Duration,
) -> Result<T, EngineError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, EngineError>>,
{
    let policy = RetryPolicy::new(max_retries, base_delay);
    let mut attempt = 1;
    loop {
        debug!("retry: attempt {}/{}", attempt, policy.max_attempts());
        match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) if policy.should_retry(&err, attempt) => {
                let delay = policy.backoff_delay(attempt);
                warn!(
                    "retry: attempt {}/{} failed ({}), retrying in {:?}",
                    attempt,
                    policy.max_attempts(),
                    err,
                    delay
                );
                sleep(delay).await;
                attempt += 1;
            }
            Err(err) => {
                warn!(
                    "retry: giving up after attempt {}/{}: {}",
                    attempt,
                    policy.max_attempts(),
                    err
                );
                return Err(err);
            }
        }
    }
}
