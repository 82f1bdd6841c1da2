//! Report rendering
//!
//! A [`Report`] is a pure function of a published [`ResearchState`]. Nothing
//! here reads the clock or any other ambient state, so rendering the same
//! state twice yields identical sections.

mod sections;

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::domain::{Category, ConfidenceScore, ResearchState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionKind {
    Summary,
    Category,
    AttackVectors,
    IncompleteModules,
    Sandbox,
    RecommendedTools,
    ExecutionPlan,
    PayloadAppendix,
    Remediation,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSection {
    pub kind: SectionKind,
    pub title: String,
    /// Set for per-category finding sections
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<Category>,
    /// Markdown body
    pub body: String,
}

impl ReportSection {
    fn new(kind: SectionKind, title: impl Into<String>, body: String) -> Self {
        Self {
            kind,
            title: title.into(),
            category: None,
            body,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub session_id: String,
    pub run_number: u32,
    pub target: String,
    pub sections: Vec<ReportSection>,
}

impl Report {
    pub fn section(&self, kind: SectionKind) -> Option<&ReportSection> {
        self.sections.iter().find(|s| s.kind == kind)
    }

    /// Per-category sections in report order
    pub fn category_sections(&self) -> Vec<&ReportSection> {
        self.sections
            .iter()
            .filter(|s| s.kind == SectionKind::Category)
            .collect()
    }

    pub fn to_markdown(&self) -> String {
        let mut md = String::new();
        md.push_str(&format!(
            "# Vulnerability Research Report: {}\n\n",
            self.target
        ));
        md.push_str(&format!("_Session {} run {}_\n\n", self.session_id, self.run_number));
        for section in &self.sections {
            md.push_str(&format!("## {}\n\n", section.title));
            md.push_str(section.body.trim_end());
            md.push_str("\n\n");
        }
        md
    }
}

/// Category order: worst severity first, then calibrated confidence
/// descending, then category name
pub fn compare_categories(
    a: (&Category, &ConfidenceScore),
    b: (&Category, &ConfidenceScore),
) -> Ordering {
    b.1.severity
        .cmp(&a.1.severity)
        .then_with(|| b.1.calibrated.total_cmp(&a.1.calibrated))
        .then_with(|| a.0.as_str().cmp(b.0.as_str()))
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ReportBuilder;

impl ReportBuilder {
    pub fn new() -> Self {
        Self
    }

    pub fn render(&self, state: &ResearchState) -> Report {
        let mut out = vec![sections::summary(state)];

        let mut categories: Vec<(&Category, &ConfidenceScore)> = state
            .category_scores
            .iter()
            .filter(|(_, score)| score.finding_count > 0)
            .collect();
        categories.sort_by(|a, b| compare_categories(*a, *b));
        for (category, score) in categories {
            out.push(sections::category(state, category, score));
        }

        out.extend(sections::attack_vectors(state));
        out.extend(sections::incomplete_modules(state));
        out.extend(sections::sandbox(state));
        out.extend(sections::recommended_tools(state));
        out.extend(sections::execution_plan(state));
        out.extend(sections::payload_appendix(state));
        out.push(sections::remediation(state));

        Report {
            session_id: state.session_id.clone(),
            run_number: state.run_number,
            target: state.target.clone(),
            sections: out,
        }
    }
}
