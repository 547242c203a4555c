//! Retry policy applied explicitly at each call site that needs it.
//!
//! A [`RetryPolicy`] wraps any fallible async operation. The operation receives
//! the zero-based attempt index, so callers can key side effects (diagnostic
//! artifacts, log fields) by attempt.
//!
//! # Backoff
//!
//! - [`Backoff::Exponential`]: `initial_delay * 2^attempt_index` (1s, 2s, 4s...)
//! - [`Backoff::Linear`]: `(attempt_index + 1) * step` (5s, 10s...)
//!
//! No jitter is applied. After the final failed attempt the last error is
//! returned unchanged.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use sciaccess_core::fetch::RetryPolicy;
//!
//! # async fn example() {
//! let policy = RetryPolicy::exponential(3, Duration::from_millis(1));
//! let value: Result<u32, String> = policy
//!     .execute("example", |attempt| async move {
//!         if attempt < 2 { Err(format!("failed #{attempt}")) } else { Ok(attempt) }
//!     })
//!     .await;
//! assert_eq!(value, Ok(2));
//! # }
//! ```

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::{debug, info, warn};

/// Default number of attempts for content fetches.
pub const DEFAULT_FETCH_ATTEMPTS: u32 = 3;

/// Default initial delay for content fetch backoff.
pub const DEFAULT_FETCH_DELAY: Duration = Duration::from_secs(1);

/// How the wait between attempts grows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Doubles the initial delay after every failure.
    Exponential,
    /// Adds one step per failure.
    Linear,
}

/// Decision taken after a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Wait `delay`, then run attempt index `attempt`.
    Retry {
        /// How long to wait before the next attempt.
        delay: Duration,
        /// Zero-based index of the next attempt.
        attempt: u32,
    },
    /// The attempt ceiling has been reached.
    GiveUp,
}

/// Retry configuration: attempt ceiling, base delay and backoff shape.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum attempts including the first one (always >= 1).
    max_attempts: u32,
    /// Initial delay (exponential) or step (linear).
    initial_delay: Duration,
    backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::exponential(DEFAULT_FETCH_ATTEMPTS, DEFAULT_FETCH_DELAY)
    }
}

impl RetryPolicy {
    /// Creates an exponential policy: waits `initial_delay * 2^attempt_index`.
    #[must_use]
    pub fn exponential(max_attempts: u32, initial_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay,
            backoff: Backoff::Exponential,
        }
    }

    /// Creates a linear policy: waits `(attempt_index + 1) * step`.
    #[must_use]
    pub fn linear(max_attempts: u32, step: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay: step,
            backoff: Backoff::Linear,
        }
    }

    /// Creates a policy that never retries.
    #[must_use]
    pub fn single_attempt() -> Self {
        Self::exponential(1, Duration::ZERO)
    }

    /// Returns the attempt ceiling.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Returns the backoff shape.
    #[must_use]
    pub fn backoff(&self) -> Backoff {
        self.backoff
    }

    /// Returns the wait that follows the failure of `attempt_index`.
    #[must_use]
    pub fn delay_for(&self, attempt_index: u32) -> Duration {
        match self.backoff {
            Backoff::Exponential => {
                let factor = 1_u32.checked_shl(attempt_index).unwrap_or(u32::MAX);
                self.initial_delay.saturating_mul(factor)
            }
            Backoff::Linear => self
                .initial_delay
                .saturating_mul(attempt_index.saturating_add(1)),
        }
    }

    /// Decides what happens after attempt `attempt_index` failed.
    #[must_use]
    pub fn decide(&self, attempt_index: u32) -> RetryDecision {
        let next = attempt_index.saturating_add(1);
        if next >= self.max_attempts {
            return RetryDecision::GiveUp;
        }
        RetryDecision::Retry {
            delay: self.delay_for(attempt_index),
            attempt: next,
        }
    }

    /// Runs `operation` until it succeeds or the attempt ceiling is reached.
    ///
    /// Every failure is logged at `warn` and every wait at `info`.
    ///
    /// # Errors
    ///
    /// Returns the error of the last attempt, unchanged.
    pub async fn execute<T, E, F, Fut>(&self, label: &str, operation: F) -> Result<T, E>
    where
        E: Display,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.execute_if(label, operation, |_| true).await
    }

    /// Like [`execute`](Self::execute), but errors rejected by `retryable`
    /// are returned immediately.
    ///
    /// # Errors
    ///
    /// Returns the first non-retryable error, or the error of the last attempt.
    pub async fn execute_if<T, E, F, Fut, P>(
        &self,
        label: &str,
        mut operation: F,
        retryable: P,
    ) -> Result<T, E>
    where
        E: Display,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
    {
        let mut attempt = 0;
        loop {
            match operation(attempt).await {
                Ok(value) => {
                    if attempt > 0 {
                        debug!(operation = label, attempt, "succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(error) => {
                    warn!(
                        operation = label,
                        attempt = attempt + 1,
                        max_attempts = self.max_attempts,
                        error = %error,
                        "attempt failed"
                    );
                    if !retryable(&error) {
                        debug!(operation = label, "error is not retryable");
                        return Err(error);
                    }
                    match self.decide(attempt) {
                        RetryDecision::Retry {
                            delay,
                            attempt: next,
                        } => {
                            info!(
                                operation = label,
                                delay_ms = delay.as_millis(),
                                "waiting before retry"
                            );
                            tokio::time::sleep(delay).await;
                            attempt = next;
                        }
                        RetryDecision::GiveUp => return Err(error),
                    }
                }
            }
        }
    }
}
