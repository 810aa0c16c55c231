//! # Retry Policy
//!
//! Bounded retry around a single broker produce call. Only the transient
//! produce category is retried; everything else propagates on the first
//! failure.

use chorus_types::BrokerError;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Backoff schedule between produce attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Constant delay between attempts.
    Fixed(Duration),
    /// Doubling delay starting at `base`, capped at `cap`.
    Exponential {
        /// Delay before the first retry.
        base: Duration,
        /// Upper bound on any single delay.
        cap: Duration,
    },
}

impl Backoff {
    /// Delay before the given retry. The first retry is attempt 1.
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        match self {
            Self::Fixed(delay) => *delay,
            Self::Exponential { base, cap } => {
                let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
                base.saturating_mul(factor).min(*cap)
            }
        }
    }
}

/// Outcome of a retried operation that did not succeed.
#[derive(Debug)]
pub enum RetryError {
    /// The caller-supplied cancellation signal fired mid-attempt or
    /// mid-backoff.
    Cancelled,
    /// The final failure, either after exhausting all attempts or from a
    /// non-retryable category on the first attempt.
    Failed(BrokerError),
}

/// Bounded retry for transient produce failures.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff: Backoff,
}

impl RetryPolicy {
    /// Create a policy. `max_attempts` is the total number of produce
    /// attempts; values below 1 are clamped to 1.
    #[must_use]
    pub fn new(max_attempts: u32, backoff: Backoff) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    /// Total produce attempts this policy allows.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Run `operation` until it succeeds, fails non-transiently, runs out
    /// of attempts, or is cancelled.
    pub async fn run<T, F, Fut>(
        &self,
        cancel: &CancellationToken,
        mut operation: F,
    ) -> Result<T, RetryError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, BrokerError>>,
    {
        let mut attempt = 1;
        loop {
            let result = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(RetryError::Cancelled),
                result = operation() => result,
            };
            match result {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient_produce() && attempt < self.max_attempts => {
                    warn!(
                        attempt,
                        max_attempts = self.max_attempts,
                        error = %err,
                        "transient produce failure; retrying"
                    );
                    let delay = self.backoff.delay(attempt);
                    attempt += 1;
                    tokio::select! {
                        biased;
                        () = cancel.cancelled() => return Err(RetryError::Cancelled),
                        () = tokio::time::sleep(delay) => {}
                    }
                }
                Err(err) => return Err(RetryError::Failed(err)),
            }
        }
    }
}
