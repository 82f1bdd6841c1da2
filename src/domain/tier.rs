//! Entitlement tier consumed from the billing layer

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU8, Ordering};

/// Resolved subscription level of the caller.
///
/// The tier is never computed here; it arrives already resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Free,
    Premium,
    Enterprise,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Free => "free",
            Tier::Premium => "premium",
            Tier::Enterprise => "enterprise",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "free" | "basic" => Some(Tier::Free),
            "premium" | "pro" => Some(Tier::Premium),
            "enterprise" | "ent" => Some(Tier::Enterprise),
            _ => None,
        }
    }

    /// Whether this tier may run sandbox confirmation at all
    pub fn allows_sandbox(&self) -> bool {
        !matches!(self, Tier::Free)
    }

    fn to_u8(self) -> u8 {
        match self {
            Tier::Free => 0,
            Tier::Premium => 1,
            Tier::Enterprise => 2,
        }
    }

    fn from_u8(raw: u8) -> Self {
        match raw {
            2 => Tier::Enterprise,
            1 => Tier::Premium,
            _ => Tier::Free,
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A tier that can be swapped while a session is live (e.g. a downgrade
/// pushed by the entitlement service mid-dispatch).
#[derive(Debug)]
pub struct TierCell(AtomicU8);

impl TierCell {
    pub fn new(tier: Tier) -> Self {
        Self(AtomicU8::new(tier.to_u8()))
    }

    pub fn get(&self) -> Tier {
        Tier::from_u8(self.0.load(Ordering::Acquire))
    }

    pub fn set(&self, tier: Tier) {
        self.0.store(tier.to_u8(), Ordering::Release);
    }
}
