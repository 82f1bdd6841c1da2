//! Per-source pacing for recon lookups

use std::num::NonZeroU32;
use std::time::Duration;

use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};
use tracing::debug;

/// Keyed token bucket: each recon source gets one call per interval
pub struct SourceLimiter {
    limiter: DefaultKeyedRateLimiter<String>,
    interval: Duration,
}

impl SourceLimiter {
    pub fn new(interval: Duration) -> Self {
        let quota = Quota::with_period(interval.max(Duration::from_millis(1)))
            .unwrap_or_else(|| Quota::per_second(NonZeroU32::MIN))
            .allow_burst(NonZeroU32::MIN);
        Self {
            limiter: RateLimiter::keyed(quota),
            interval,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Wait until `source` may be called again
    pub async fn wait(&self, source: &str) {
        let key = source.to_string();
        if self.limiter.check_key(&key).is_ok() {
            return;
        }
        debug!(source, interval_ms = self.interval.as_millis() as u64, "Pacing recon source");
        self.limiter.until_key_ready(&key).await;
    }
}
