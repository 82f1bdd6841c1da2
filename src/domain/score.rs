//! Derived confidence score and bounty estimate

use serde::{Deserialize, Serialize};

use super::Severity;

/// Currency tag for bounty estimates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    Usd,
}

impl Currency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Currency::Usd => "USD",
        }
    }
}

/// Estimated payout range in whole currency units
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BountyRange {
    pub min: u64,
    pub max: u64,
    pub currency: Currency,
}

impl BountyRange {
    pub fn new(min: u64, max: u64) -> Self {
        Self {
            min,
            max,
            currency: Currency::Usd,
        }
    }

    pub fn zero() -> Self {
        Self::new(0, 0)
    }

    pub fn is_empty(&self) -> bool {
        self.max == 0
    }

    /// Sum two ranges of the same currency
    pub fn add(self, other: BountyRange) -> BountyRange {
        BountyRange {
            min: self.min.saturating_add(other.min),
            max: self.max.saturating_add(other.max),
            currency: self.currency,
        }
    }
}

impl std::fmt::Display for BountyRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "${} - ${} {}", self.min, self.max, self.currency.as_str())
    }
}

/// Aggregate over one or more findings. Recomputed, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceScore {
    /// Calibrated confidence in [0.0, 1.0]
    pub calibrated: f64,
    pub severity: Severity,
    pub bounty: BountyRange,
    /// Number of findings that contributed
    pub finding_count: usize,
}

impl ConfidenceScore {
    pub fn empty() -> Self {
        Self {
            calibrated: 0.0,
            severity: Severity::Low,
            bounty: BountyRange::zero(),
            finding_count: 0,
        }
    }
}
