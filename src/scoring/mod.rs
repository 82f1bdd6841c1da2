//! Confidence calibration and bounty estimation
//!
//! All functions here are pure. Inputs are sorted before any floating point
//! work so that permuting the finding sequence cannot change the result.

mod bounty;

pub use bounty::{BOUNTY_TABLE, CRYPTO_MULTIPLIER, bounty_for};

use std::collections::BTreeMap;

use tracing::debug;

use crate::domain::{Category, ConfidenceScore, Severity, VulnerabilityFinding};

/// Each additional corroborating finding in a category counts half as much
/// as the previous one
pub const DIMINISHING_FACTOR: f64 = 0.5;

/// Calibrated-confidence thresholds, highest first
pub const SEVERITY_THRESHOLDS: [(f64, Severity); 3] = [
    (0.90, Severity::Critical),
    (0.70, Severity::High),
    (0.40, Severity::Medium),
];

/// Historical precision weight of a category
pub fn category_weight(category: &Category) -> f64 {
    match category {
        Category::Idor => 0.95,
        Category::CryptoSpecific => 0.90,
        Category::AuthBypass => 0.85,
        Category::BusinessLogic => 0.70,
        Category::Custom(_) => 0.80,
    }
}

/// Highest severity the calibrated confidence alone can justify
pub fn severity_cap(calibrated: f64) -> Severity {
    SEVERITY_THRESHOLDS
        .iter()
        .find(|(threshold, _)| calibrated >= *threshold)
        .map(|(_, severity)| *severity)
        .unwrap_or(Severity::Low)
}

/// Findings split by the scoring floor
#[derive(Debug, Default)]
pub struct Partition {
    pub kept: Vec<VulnerabilityFinding>,
    pub discarded: Vec<VulnerabilityFinding>,
}

#[derive(Debug, Clone)]
pub struct ConfidenceScorer {
    min_confidence: f64,
}

impl Default for ConfidenceScorer {
    fn default() -> Self {
        Self::new(0.10)
    }
}

impl ConfidenceScorer {
    pub fn new(min_confidence: f64) -> Self {
        Self { min_confidence }
    }

    /// Drop findings whose confidence is not a probability or falls below
    /// the floor. Only kept findings are ever published.
    pub fn partition(&self, findings: Vec<VulnerabilityFinding>) -> Partition {
        let (kept, discarded): (Vec<_>, Vec<_>) = findings
            .into_iter()
            .partition(|f| f.has_valid_confidence() && f.confidence >= self.min_confidence);
        if !discarded.is_empty() {
            debug!(
                kept = kept.len(),
                discarded = discarded.len(),
                "Findings below scoring floor dropped"
            );
        }
        Partition { kept, discarded }
    }

    /// Score one category's findings. All findings are assumed to share
    /// `category`; invalid confidences are ignored.
    fn score_category(category: &Category, findings: &[&VulnerabilityFinding]) -> ConfidenceScore {
        let weight = category_weight(category);

        let mut confidences: Vec<f64> = findings
            .iter()
            .filter(|f| f.has_valid_confidence())
            .map(|f| f.confidence)
            .collect();
        if confidences.is_empty() {
            return ConfidenceScore::empty();
        }
        confidences.sort_by(|a, b| b.total_cmp(a));

        let miss: f64 = confidences
            .iter()
            .enumerate()
            .map(|(i, c)| 1.0 - weight * c * DIMINISHING_FACTOR.powi(i as i32))
            .product();
        let calibrated = (1.0 - miss).clamp(0.0, 1.0);

        let worst_raw = findings
            .iter()
            .filter(|f| f.has_valid_confidence())
            .map(|f| f.severity)
            .max()
            .unwrap_or(Severity::Low);
        let severity = severity_cap(calibrated).min(worst_raw);

        ConfidenceScore {
            calibrated,
            severity,
            bounty: bounty_for(severity, category),
            finding_count: confidences.len(),
        }
    }

    /// Per-category scores
    pub fn aggregate_by_category(
        &self,
        findings: &[VulnerabilityFinding],
    ) -> BTreeMap<Category, ConfidenceScore> {
        let mut grouped: BTreeMap<&Category, Vec<&VulnerabilityFinding>> = BTreeMap::new();
        for finding in findings {
            grouped.entry(&finding.category).or_default().push(finding);
        }

        grouped
            .into_iter()
            .map(|(category, group)| (category.clone(), Self::score_category(category, &group)))
            .filter(|(_, score)| score.finding_count > 0)
            .collect()
    }

    /// Overall score: strongest category confidence, worst category
    /// severity, summed bounty
    pub fn aggregate(&self, findings: &[VulnerabilityFinding]) -> ConfidenceScore {
        Self::combine(self.aggregate_by_category(findings).values())
    }

    pub fn combine<'a>(scores: impl IntoIterator<Item = &'a ConfidenceScore>) -> ConfidenceScore {
        scores
            .into_iter()
            .fold(ConfidenceScore::empty(), |acc, score| ConfidenceScore {
                calibrated: acc.calibrated.max(score.calibrated),
                severity: if acc.finding_count == 0 {
                    score.severity
                } else {
                    acc.severity.max(score.severity)
                },
                bounty: acc.bounty.add(score.bounty),
                finding_count: acc.finding_count + score.finding_count,
            })
    }
}
