//! Session entity and the published per-run state

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};

use super::{
    AuditEvent, Category, ConfidenceScore, PayloadArtifact, ResearchRequest, Tier, TierCell,
    VulnerabilityFinding,
};
use crate::modules::ToolRecommendation;
use crate::orchestrator::ExecutionPlan;
use crate::report::Report;
use crate::sandbox::SandboxSummary;

/// Unique identifier for a session (UUID v4)
pub type SessionId = String;

/// Per-session module invocation counter.
///
/// The only state concurrent module tasks mutate; every change goes through
/// a compare-and-increment so two dispatches can never both cross a cap.
#[derive(Debug, Default)]
pub struct UsageCounter(AtomicU32);

impl UsageCounter {
    pub fn new() -> Self {
        Self(AtomicU32::new(0))
    }

    pub fn get(&self) -> u32 {
        self.0.load(Ordering::SeqCst)
    }

    /// Increment by `n` only if the result stays within `cap`.
    /// Returns the new value on success, the unchanged value on refusal.
    pub fn try_increment(&self, n: u32, cap: Option<u32>) -> Result<u32, u32> {
        self.0
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                let next = current.checked_add(n)?;
                match cap {
                    Some(cap) if next > cap => None,
                    _ => Some(next),
                }
            })
            .map(|previous| previous + n)
    }
}

/// How a dispatched module ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ModuleStatus {
    Completed { findings: usize },
    Failed { reason: String },
    /// No module registered for the requested category
    Unavailable,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleOutcome {
    pub category: Category,
    pub module_id: Option<String>,
    #[serde(flatten)]
    pub status: ModuleStatus,
    pub duration_ms: u64,
}

impl ModuleOutcome {
    pub fn succeeded(&self) -> bool {
        matches!(self.status, ModuleStatus::Completed { .. })
    }
}

/// Everything one run publishes after the dispatch barrier. The report is a
/// pure function of this value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchState {
    pub session_id: SessionId,
    pub run_number: u32,
    pub target: String,
    pub tier: Tier,
    pub request: ResearchRequest,
    /// Published findings in publication order (ascending sequence number)
    pub findings: Vec<VulnerabilityFinding>,
    /// Findings dropped by scoring (invalid or below the confidence floor)
    pub discarded: usize,
    pub category_scores: BTreeMap<Category, ConfidenceScore>,
    pub overall: ConfidenceScore,
    pub module_outcomes: Vec<ModuleOutcome>,
    pub attack_vectors: BTreeMap<Category, Vec<String>>,
    pub recommended_tools: Vec<ToolRecommendation>,
    pub sandbox: Option<SandboxSummary>,
    pub artifacts: Vec<PayloadArtifact>,
    pub execution_plan: Option<ExecutionPlan>,
    pub session_created_at: DateTime<Utc>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl ResearchState {
    pub fn finding(&self, id: &str) -> Option<&VulnerabilityFinding> {
        self.findings.iter().find(|f| f.id == id)
    }

    /// Outcomes that did not complete successfully
    pub fn incomplete_modules(&self) -> Vec<&ModuleOutcome> {
        self.module_outcomes.iter().filter(|o| !o.succeeded()).collect()
    }
}

/// Self-contained persisted record of one completed run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub state: ResearchState,
    pub report: Report,
}

impl SessionRecord {
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize session record")
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).context("Failed to parse session record")
    }

    /// Write the record as pretty JSON
    pub fn save_to(&self, path: &Path) -> Result<()> {
        let json = self.to_json()?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write session record: {}", path.display()))
    }
}

/// A research session: quota scope, audit trail and run history for one
/// target. Shared by reference across concurrent runs.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    target: String,
    tier: TierCell,
    created_at: DateTime<Utc>,
    usage: UsageCounter,
    finding_seq: AtomicU32,
    run_seq: AtomicU32,
    audit: Mutex<Vec<AuditEvent>>,
    records: Mutex<Vec<Arc<SessionRecord>>>,
}

impl Session {
    pub fn new(target: impl Into<String>, tier: Tier) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            target: target.into().trim().to_string(),
            tier: TierCell::new(tier),
            created_at: Utc::now(),
            usage: UsageCounter::new(),
            finding_seq: AtomicU32::new(0),
            run_seq: AtomicU32::new(0),
            audit: Mutex::new(Vec::new()),
            records: Mutex::new(Vec::new()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// First 8 characters of the ID, used to prefix finding IDs
    pub fn short_id(&self) -> &str {
        &self.id[..8.min(self.id.len())]
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn tier(&self) -> Tier {
        self.tier.get()
    }

    /// Apply an entitlement change pushed by the billing layer
    pub fn set_tier(&self, tier: Tier) {
        let previous = self.tier.get();
        self.tier.set(tier);
        if previous != tier {
            self.append_audit(AuditEvent::system(format!(
                "tier changed {previous} -> {tier}"
            )));
        }
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn usage(&self) -> &UsageCounter {
        &self.usage
    }

    pub(crate) fn next_finding_number(&self) -> u32 {
        self.finding_seq.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub(crate) fn next_run_number(&self) -> u32 {
        self.run_seq.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn append_audit(&self, event: AuditEvent) {
        if let Ok(mut log) = self.audit.lock() {
            log.push(event);
        }
    }

    pub fn audit_log(&self) -> Vec<AuditEvent> {
        self.audit.lock().map(|log| log.clone()).unwrap_or_default()
    }

    pub(crate) fn push_record(&self, record: Arc<SessionRecord>) {
        if let Ok(mut records) = self.records.lock() {
            records.push(record);
        }
    }

    pub fn records(&self) -> Vec<Arc<SessionRecord>> {
        self.records
            .lock()
            .map(|records| records.clone())
            .unwrap_or_default()
    }

    /// Report of the most recent completed run
    pub fn latest_report(&self) -> Option<Report> {
        self.records
            .lock()
            .ok()
            .and_then(|records| records.last().map(|r| r.report.clone()))
    }
}
