//! Bounty estimate table (USD)
//!
//! Ranges track typical public program payouts per severity. Cryptocurrency
//! platform findings are scaled by [`CRYPTO_MULTIPLIER`].

use crate::domain::{BountyRange, Category, Severity};

/// `(severity, min, max)` in whole dollars
pub const BOUNTY_TABLE: [(Severity, u64, u64); 4] = [
    (Severity::Critical, 5_600, 12_000),
    (Severity::High, 1_500, 3_600),
    (Severity::Medium, 240, 640),
    (Severity::Low, 60, 160),
];

/// Payout multiplier for crypto-specific findings, as a ratio (3/2)
pub const CRYPTO_MULTIPLIER: (u64, u64) = (3, 2);

pub fn bounty_for(severity: Severity, category: &Category) -> BountyRange {
    let (min, max) = BOUNTY_TABLE
        .iter()
        .find(|(s, _, _)| *s == severity)
        .map(|(_, min, max)| (*min, *max))
        .unwrap_or((0, 0));

    match category {
        Category::CryptoSpecific => {
            let (num, den) = CRYPTO_MULTIPLIER;
            BountyRange::new(min * num / den, max * num / den)
        }
        _ => BountyRange::new(min, max),
    }
}
