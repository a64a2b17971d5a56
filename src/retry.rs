//! Bounded retry with exponential backoff for non-streaming calls.
//!
//! Retrying is opt-in per call site through [`Idempotency`]: a remote action
//! that may already have applied a side effect is attempted exactly once.

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::warn;

/// Whether a call may safely be repeated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Idempotency {
    /// Read-only or explicitly idempotent; eligible for retry.
    Idempotent,
    /// May have side effects; never retried automatically.
    NonIdempotent,
}

/// Attempt budget and base delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
}

impl RetryPolicy {
    /// Policy with `max_attempts` total attempts (at least one).
    #[must_use]
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Single attempt, no retries.
    #[must_use]
    pub fn once() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Total attempts allowed.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Policy to use at a call site with the given idempotency.
    #[must_use]
    pub fn for_call(self, idempotency: Idempotency) -> Self {
        match idempotency {
            Idempotency::Idempotent => self,
            Idempotency::NonIdempotent => Self {
                max_attempts: 1,
                ..self
            },
        }
    }

    /// Delay after the failure of the attempt at zero-based `attempt_index`:
    /// `base * 2^attempt_index`, saturating.
    #[must_use]
    pub fn delay_for(&self, attempt_index: u32) -> Duration {
        let factor = 2_u32.checked_pow(attempt_index).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }

    /// Run `operation` until it succeeds or the attempt budget is spent.
    ///
    /// Before each retry `on_retry(attempt, &error, delay)` is invoked with
    /// the one-based number of the attempt that just failed.
    ///
    /// # Errors
    ///
    /// Returns the error of the final attempt unchanged.
    pub async fn execute<T, E, F, Fut, R>(&self, mut operation: F, mut on_retry: R) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        R: FnMut(u32, &E, Duration),
    {
        let mut attempt_index = 0;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(error) if attempt_index + 1 < self.max_attempts => {
                    let delay = self.delay_for(attempt_index);
                    on_retry(attempt_index + 1, &error, delay);
                    sleep(delay).await;
                    attempt_index += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }
}

/// Observer that logs each retry at `warn`.
pub fn log_retry<E: std::fmt::Display>(attempt: u32, error: &E, delay: Duration) {
    warn!(
        attempt,
        %error,
        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
        "request failed; retrying"
    );
}
