//! Bounded exponential backoff driven by error classification.
//!
//! [`RetryPolicy::execute`] re-runs an operation only while its failure
//! classifies as a transient network condition. Permission, validation,
//! conflict, and not-found failures are returned after the first call.

use std::future::Future;
use std::time::Duration;

use tandem_core::classify::Classify;

/// Default number of calls, including the first.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Delay before the first retry.
pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_millis(1000);

/// Growth factor applied per retry.
pub const DEFAULT_MULTIPLIER: u32 = 2;

/// Upper bound for any single delay.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_millis(8000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub multiplier: u32,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_delay: DEFAULT_INITIAL_DELAY,
            multiplier: DEFAULT_MULTIPLIER,
            max_delay: DEFAULT_MAX_DELAY,
        }
    }
}

impl RetryPolicy {
    /// A policy that makes exactly one call.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay after failed attempt number `attempt` (1-based):
    /// `min(initial_delay * multiplier^(attempt - 1), max_delay)`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = self
            .multiplier
            .saturating_pow(attempt.saturating_sub(1));
        self.initial_delay
            .saturating_mul(factor)
            .min(self.max_delay)
    }

    /// Run `operation` until it succeeds, fails with a non-retryable kind,
    /// or `max_attempts` calls have been made.
    ///
    /// `action` names the operation in log output.
    pub async fn execute<T, E, F, Fut>(&self, action: &str, mut operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Classify + std::fmt::Display,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            let err = match operation().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            let kind = err.error_kind();
            if !kind.is_retryable() {
                return Err(err);
            }
            if attempt >= max_attempts {
                tracing::warn!(
                    action,
                    attempts = attempt,
                    kind = %kind,
                    error = %err,
                    "Retry attempts exhausted"
                );
                return Err(err);
            }

            let delay = self.delay_for(attempt);
            tracing::warn!(
                action,
                attempt,
                max_attempts,
                kind = %kind,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Transient failure, retrying"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
