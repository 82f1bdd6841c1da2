//! Finding model - one candidate vulnerability emitted by one module

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::Category;

/// Severity levels, ordered from least to most severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "CRITICAL",
            Severity::High => "HIGH",
            Severity::Medium => "MEDIUM",
            Severity::Low => "LOW",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "critical" | "crit" => Some(Severity::Critical),
            "high" => Some(Severity::High),
            "medium" | "med" => Some(Severity::Medium),
            "low" | "info" => Some(Severity::Low),
            _ => None,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How an IDOR gap can be enumerated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EnumerationStrategy {
    Sequential,
    UuidPredictable,
    ParameterPollution,
    MethodBypass,
    PathTraversalCombo,
}

impl EnumerationStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnumerationStrategy::Sequential => "sequential",
            EnumerationStrategy::UuidPredictable => "uuid-predictable",
            EnumerationStrategy::ParameterPollution => "parameter-pollution",
            EnumerationStrategy::MethodBypass => "method-bypass",
            EnumerationStrategy::PathTraversalCombo => "path-traversal-combo",
        }
    }
}

impl std::fmt::Display for EnumerationStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifier of a finding, unique within a session (e.g. `3f9a2c1b-IDOR-001`)
pub type FindingId = String;

/// Well-known evidence keys shared between modules and the payload generator
pub mod evidence_keys {
    pub const ENDPOINT: &str = "endpoint";
    pub const METHOD: &str = "method";
    /// Comma-separated list of parameter names
    pub const PARAMETERS: &str = "parameters";
    pub const SAMPLE_VALUE: &str = "sample_value";
    pub const OWNER_FIELD: &str = "owner_field";
}

/// A security finding produced by a single module invocation.
///
/// Immutable once published by the dispatcher; builders are only used by the
/// emitting module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VulnerabilityFinding {
    /// Assigned by the dispatcher on publication; empty while in flight
    pub id: FindingId,
    pub category: Category,
    /// ID of the module that emitted this finding
    pub module_id: String,
    pub title: String,
    pub description: Option<String>,
    /// Raw severity estimate from the module
    pub severity: Severity,
    /// Attribute -> value
    pub evidence: BTreeMap<String, String>,
    /// Module-local confidence in [0.0, 1.0]
    pub confidence: f64,
    pub poc_template: Option<String>,
    /// Only set for enumeration-style findings
    pub strategy: Option<EnumerationStrategy>,
    /// Intel sources that backed this finding
    pub sources: Vec<String>,
}

impl VulnerabilityFinding {
    pub fn new(
        category: Category,
        title: impl Into<String>,
        severity: Severity,
        confidence: f64,
    ) -> Self {
        Self {
            id: String::new(),
            category,
            module_id: String::new(),
            title: title.into(),
            description: None,
            severity,
            evidence: BTreeMap::new(),
            confidence,
            poc_template: None,
            strategy: None,
            sources: Vec::new(),
        }
    }

    /// Generate a finding ID from the session prefix, category and sequence number
    pub fn generate_id(session_prefix: &str, category: &Category, number: u32) -> FindingId {
        format!(
            "{session_prefix}-{}-{:03}",
            category.as_str().to_uppercase(),
            number
        )
    }

    /// Whether the module-local confidence is a usable probability
    pub fn has_valid_confidence(&self) -> bool {
        self.confidence.is_finite() && (0.0..=1.0).contains(&self.confidence)
    }

    /// Parameter names recorded in the evidence
    pub fn parameters(&self) -> Vec<String> {
        self.evidence
            .get(evidence_keys::PARAMETERS)
            .map(|raw| {
                raw.split(',')
                    .map(|p| p.trim())
                    .filter(|p| !p.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn endpoint(&self) -> Option<&str> {
        self.evidence.get(evidence_keys::ENDPOINT).map(|s| s.as_str())
    }

    // Builder methods
    pub fn with_id(mut self, id: impl Into<FindingId>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_module(mut self, module_id: impl Into<String>) -> Self {
        self.module_id = module_id.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_evidence(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.evidence.insert(key.into(), value.into());
        self
    }

    pub fn with_poc(mut self, poc: impl Into<String>) -> Self {
        self.poc_template = Some(poc.into());
        self
    }

    pub fn with_strategy(mut self, strategy: EnumerationStrategy) -> Self {
        self.strategy = Some(strategy);
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.sources.push(source.into());
        self
    }
}
