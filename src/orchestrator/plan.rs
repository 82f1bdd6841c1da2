//! Execution plan for paid tiers

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::domain::{BountyRange, Severity, Tier, VulnerabilityFinding};
use crate::scoring::bounty_for;

pub const ESTIMATED_TIME: &str = "4-6 hours";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestingPhase {
    /// Finding this phase tests
    pub finding_id: String,
    pub title: String,
    /// Proof-of-concept template, or a pointer to the payload appendix
    pub method: String,
    pub expected_bounty: BountyRange,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub testing_phases: Vec<TestingPhase>,
    pub estimated_time: String,
    pub automation_scripts: Vec<String>,
}

impl ExecutionPlan {
    /// Build a plan from the published findings.
    ///
    /// Returns `None` for the free tier, and when nothing reaches HIGH.
    pub fn build(tier: Tier, target: &str, findings: &[VulnerabilityFinding]) -> Option<Self> {
        if tier == Tier::Free {
            return None;
        }

        let mut actionable: Vec<&VulnerabilityFinding> = findings
            .iter()
            .filter(|f| f.severity >= Severity::High)
            .collect();
        if actionable.is_empty() {
            return None;
        }
        actionable.sort_by(|a, b| b.severity.cmp(&a.severity).then_with(|| a.id.cmp(&b.id)));

        let testing_phases = actionable
            .iter()
            .map(|f| TestingPhase {
                finding_id: f.id.clone(),
                title: format!("Test {}", f.title),
                method: f
                    .poc_template
                    .clone()
                    .unwrap_or_else(|| "Use the generated payloads in the appendix".to_string()),
                expected_bounty: bounty_for(f.severity, &f.category),
            })
            .collect();

        let prefix = script_prefix(target);
        let automation_scripts = actionable
            .iter()
            .map(|f| f.category.as_str().to_string())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .map(|category| format!("{prefix}_{category}_scanner"))
            .collect();

        Some(Self {
            testing_phases,
            estimated_time: ESTIMATED_TIME.to_string(),
            automation_scripts,
        })
    }
}

fn script_prefix(target: &str) -> String {
    target
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}
