//! Usage limits per session and entitlement tier
//!
//! The free tier has a hard lifetime cap on module invocations. Paid tiers
//! have no cap but every invocation waits for a token from the tier's shared
//! bucket. Both paths go through [`QuotaGate::consume`], which performs the
//! single compare-and-increment on the session's usage counter.

mod limiter;

pub use limiter::SourceLimiter;

use std::num::NonZeroU32;

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use tracing::{debug, warn};

use crate::config::{QuotaSettings, RateSettings};
use crate::domain::{AuditEvent, Session, Tier};
use crate::error::ResearchError;

pub struct QuotaGate {
    free_cap: u32,
    premium: DefaultDirectRateLimiter,
    enterprise: DefaultDirectRateLimiter,
}

fn bucket(rate: &RateSettings) -> DefaultDirectRateLimiter {
    let rps = NonZeroU32::new(rate.requests_per_second).unwrap_or(NonZeroU32::MIN);
    let burst = NonZeroU32::new(rate.burst).unwrap_or(rps);
    RateLimiter::direct(Quota::per_second(rps).allow_burst(burst))
}

impl QuotaGate {
    pub fn new(settings: &QuotaSettings) -> Self {
        Self {
            free_cap: settings.free_tier_module_cap,
            premium: bucket(&settings.premium),
            enterprise: bucket(&settings.enterprise),
        }
    }

    /// Lifetime invocation cap for a tier, if any
    pub fn cap_for(&self, tier: Tier) -> Option<u32> {
        match tier {
            Tier::Free => Some(self.free_cap),
            Tier::Premium | Tier::Enterprise => None,
        }
    }

    /// Whether `invocations` more module calls fit in the session's quota.
    ///
    /// Read-only: used before any work starts so an over-quota request fails
    /// without touching the network. [`consume`](Self::consume) is still the
    /// authority once dispatch begins.
    pub fn check(&self, session: &Session, invocations: u32) -> Result<(), ResearchError> {
        let tier = session.tier();
        let Some(cap) = self.cap_for(tier) else {
            return Ok(());
        };

        let used = session.usage().get();
        if used.saturating_add(invocations) > cap {
            return Err(self.reject(session, tier, used, cap));
        }
        Ok(())
    }

    /// Consume one module invocation for `module_id`.
    ///
    /// The tier is read at call time so a concurrent downgrade takes effect
    /// for modules that have not started yet. On refusal the counter is left
    /// unchanged.
    pub async fn consume(&self, session: &Session, module_id: &str) -> Result<u32, ResearchError> {
        let tier = session.tier();

        match tier {
            Tier::Premium => self.premium.until_ready().await,
            Tier::Enterprise => self.enterprise.until_ready().await,
            Tier::Free => {}
        }

        let cap = self.cap_for(tier);
        match session.usage().try_increment(1, cap) {
            Ok(used) => {
                debug!(
                    session_id = session.id(),
                    module = module_id,
                    used,
                    "Quota consumed"
                );
                Ok(used)
            }
            Err(used) => Err(self.reject(session, tier, used, cap.unwrap_or(used))),
        }
    }

    fn reject(&self, session: &Session, tier: Tier, used: u32, cap: u32) -> ResearchError {
        warn!(
            session_id = session.id(),
            tier = %tier,
            used,
            cap,
            "Quota exceeded"
        );
        session.append_audit(AuditEvent::quota(format!(
            "rejected: {used} of {cap} invocations used on {tier} tier"
        )));
        ResearchError::QuotaExceeded { tier, used, cap }
    }
}
