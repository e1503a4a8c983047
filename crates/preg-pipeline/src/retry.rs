//! Bounded retry policy
//!
//! [`RetryPolicy`] runs an async operation up to `max_attempts` times.
//! Only transient [`ClientError`]s consume retry budget; permanent ones
//! return at once. Cancellation is checked before every attempt and while
//! waiting between attempts. An attempt already in flight is never
//! interrupted, since the collaborator may have acted on it.

use crate::error::ClientError;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Delay growth between attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backoff {
    /// Same delay before every retry
    #[default]
    Fixed,
    /// Delay doubles per retry, capped at `max_delay_ms`
    Exponential,
}

/// Retry configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts including the first
    pub max_attempts: u32,
    /// Base delay between attempts, in milliseconds
    pub delay_ms: u64,
    /// Delay growth
    pub backoff: Backoff,
    /// Upper bound for exponential delays, in milliseconds
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay_ms: 1_000,
            backoff: Backoff::Fixed,
            max_delay_ms: 30_000,
        }
    }
}

/// Why a retried operation gave up
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryError {
    /// Every attempt failed transiently
    Exhausted { cause: ClientError, attempts: u32 },
    /// A permanent failure stopped the loop early
    Rejected { cause: ClientError, attempts: u32 },
    /// Cancelled before the next attempt
    Cancelled { attempts: u32 },
}

impl RetryPolicy {
    /// Create policy with the given attempt bound and fixed delay
    #[inline]
    #[must_use]
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay_ms: u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            ..Self::default()
        }
    }

    /// Single attempt, no retries
    #[inline]
    #[must_use]
    pub fn no_retry() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Switch to exponential backoff
    #[inline]
    #[must_use]
    pub fn exponential(mut self, max_delay: Duration) -> Self {
        self.backoff = Backoff::Exponential;
        self.max_delay_ms = u64::try_from(max_delay.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Delay to wait after the given failed attempt (1-based)
    #[must_use]
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let ms = match self.backoff {
            Backoff::Fixed => self.delay_ms,
            Backoff::Exponential => {
                let factor = 1u64.checked_shl(attempt.saturating_sub(1)).unwrap_or(u64::MAX);
                self.delay_ms.saturating_mul(factor).min(self.max_delay_ms)
            }
        };
        Duration::from_millis(ms)
    }

    /// Run `op` under this policy
    ///
    /// `op` receives the 1-based attempt number. Returns the value and the
    /// number of attempts it took.
    ///
    /// # Errors
    /// See [`RetryError`].
    pub async fn run<T, F, Fut>(
        &self,
        cancel: &CancellationToken,
        label: &str,
        mut op: F,
    ) -> Result<(T, u32), RetryError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, ClientError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            if cancel.is_cancelled() {
                tracing::warn!(label, attempts = attempt, "cancelled before attempt");
                return Err(RetryError::Cancelled { attempts: attempt });
            }
            attempt += 1;

            let cause = match op(attempt).await {
                Ok(value) => return Ok((value, attempt)),
                Err(cause) => cause,
            };

            if !cause.is_transient() {
                tracing::debug!(label, attempt, error = %cause, "permanent failure, not retrying");
                return Err(RetryError::Rejected { cause, attempts: attempt });
            }
            if attempt >= max_attempts {
                tracing::warn!(label, attempt, error = %cause, "retry budget exhausted");
                return Err(RetryError::Exhausted { cause, attempts: attempt });
            }

            let delay = self.delay_after(attempt);
            tracing::warn!(label, attempt, ?delay, error = %cause, "transient failure, retrying");
            tokio::select! {
                () = cancel.cancelled() => {
                    tracing::warn!(label, attempts = attempt, "cancelled while waiting to retry");
                    return Err(RetryError::Cancelled { attempts: attempt });
                }
                () = tokio::time::sleep(delay) => {}
            }
        }
    }
}
