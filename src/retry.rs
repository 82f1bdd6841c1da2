//! Exponential backoff for transient upstream failures inside modules

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::RetrySettings;
use crate::error::{ModuleFailure, UpstreamNetworkError};

/// Backoff policy for one upstream dependency
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub multiplier: f64,
    pub jitter: bool,
    /// Fraction of the computed delay that jitter may add or remove
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_settings(&RetrySettings::default())
    }
}

impl RetryPolicy {
    pub fn from_settings(settings: &RetrySettings) -> Self {
        Self {
            max_attempts: settings.max_attempts.max(1),
            initial_backoff: Duration::from_millis(settings.initial_backoff_ms),
            max_backoff: Duration::from_millis(settings.max_backoff_ms),
            multiplier: settings.multiplier,
            jitter: settings.jitter,
            jitter_factor: 0.3,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_initial_backoff(mut self, initial_backoff: Duration) -> Self {
        self.initial_backoff = initial_backoff;
        self
    }

    pub fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }

    /// Delay before the retry that follows `attempt` (1-based)
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let base = self.initial_backoff.as_millis() as f64
            * self.multiplier.powi((attempt - 1) as i32);
        let capped = base.min(self.max_backoff.as_millis() as f64);

        let delay = if self.jitter && capped > 0.0 && self.jitter_factor > 0.0 {
            let range = capped * self.jitter_factor;
            let jitter = rand::rng().random_range(-range..range);
            (capped + jitter).max(0.0)
        } else {
            capped
        };

        Duration::from_millis(delay as u64)
    }
}

/// Run `operation` until it succeeds, fails with a non-retryable error, or
/// exhausts the policy. The final error is wrapped with the attempt count.
pub async fn retry_with_backoff<F, Fut, T>(
    policy: &RetryPolicy,
    operation_name: &str,
    mut operation: F,
) -> Result<T, ModuleFailure>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, UpstreamNetworkError>>,
{
    let mut attempt = 0;

    loop {
        attempt += 1;

        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(
                        attempt,
                        operation = operation_name,
                        "Upstream call succeeded after retry"
                    );
                }
                return Ok(value);
            }
            Err(err) => {
                let retryable = err.is_retryable();
                warn!(
                    attempt,
                    max_attempts = policy.max_attempts,
                    operation = operation_name,
                    error = %err,
                    retryable,
                    "Upstream call failed"
                );

                if !retryable || attempt >= policy.max_attempts {
                    return Err(ModuleFailure::Upstream {
                        attempts: attempt,
                        source: err,
                    });
                }

                let backoff = policy.backoff_for(attempt);
                debug!(
                    attempt,
                    backoff_ms = backoff.as_millis() as u64,
                    operation = operation_name,
                    "Backing off before retry"
                );
                tokio::time::sleep(backoff).await;
            }
        }
    }
}
