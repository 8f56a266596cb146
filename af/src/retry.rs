//! Exponential-backoff retry around unreliable async calls
//!
//! Used around model calls only. Step execution has its own
//! failure-as-data semantics and is never retried here.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

/// Upper bound on any single backoff delay
pub const MAX_DELAY: Duration = Duration::from_secs(60);

/// Retry parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first
    pub max_attempts: u32,
    /// Delay after the first failure
    pub initial_delay: Duration,
    /// Multiplier applied per further attempt
    pub backoff_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(2500),
            backoff_factor: 1.5,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_delay: Duration, backoff_factor: f64) -> Self {
        Self {
            max_attempts,
            initial_delay,
            backoff_factor,
        }
    }

    /// Delay to wait after failed attempt number `attempt` (1-based)
    ///
    /// `initial_delay * backoff_factor^(attempt-1)`, capped at [`MAX_DELAY`].
    /// A product that is negative or not a number also yields the cap.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let nanos = self.initial_delay.as_nanos() as f64 * self.backoff_factor.powi(exponent);
        if nanos.is_nan() || nanos < 0.0 || nanos >= MAX_DELAY.as_nanos() as f64 {
            return MAX_DELAY;
        }
        Duration::from_nanos(nanos.round() as u64)
    }

    /// Run `op` until it succeeds or the attempt cap is reached
    ///
    /// The last error is returned unchanged.
    pub async fn run<T, E, F, Fut>(&self, op: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        self.run_when(op, |_| true).await
    }

    /// Like [`run`](Self::run), but stops early when `should_retry` rejects the error
    pub async fn run_when<T, E, F, Fut, P>(&self, mut op: F, should_retry: P) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
        P: Fn(&E) -> bool,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            debug!(attempt, max_attempts, "RetryPolicy::run_when: attempt");
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt >= max_attempts => {
                    warn!(attempt, error = %e, "Giving up after final attempt");
                    return Err(e);
                }
                Err(e) if !should_retry(&e) => {
                    debug!(attempt, error = %e, "RetryPolicy::run_when: error not retryable");
                    return Err(e);
                }
                Err(e) => {
                    let delay = self.delay_for(attempt);
                    warn!(attempt, delay_ms = delay.as_millis() as u64, error = %e, "Attempt failed, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
