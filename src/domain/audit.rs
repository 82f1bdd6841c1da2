use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The kind of audit entry recorded against a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditKind {
    /// Request accepted or rejected
    Request,
    /// Quota consumed or refused
    Quota,
    /// Module dispatched, finished or failed
    Module,
    /// Sandbox job state change
    Sandbox,
    /// Report generated
    Report,
    /// Anything else worth keeping (tier changes, teardown errors)
    System,
}

impl std::fmt::Display for AuditKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuditKind::Request => write!(f, "request"),
            AuditKind::Quota => write!(f, "quota"),
            AuditKind::Module => write!(f, "module"),
            AuditKind::Sandbox => write!(f, "sandbox"),
            AuditKind::Report => write!(f, "report"),
            AuditKind::System => write!(f, "system"),
        }
    }
}

/// An append-only audit log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub timestamp: DateTime<Utc>,
    pub kind: AuditKind,
    /// Short summary (e.g., "module idor failed: timeout")
    pub summary: String,
    /// Module or sandbox job this entry refers to
    pub subject: Option<String>,
}

impl AuditEvent {
    pub fn new(kind: AuditKind, summary: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            kind,
            summary: summary.into(),
            subject: None,
        }
    }

    pub fn request(summary: impl Into<String>) -> Self {
        Self::new(AuditKind::Request, summary)
    }

    pub fn quota(summary: impl Into<String>) -> Self {
        Self::new(AuditKind::Quota, summary)
    }

    pub fn module(module_id: impl Into<String>, summary: impl Into<String>) -> Self {
        Self::new(AuditKind::Module, summary).about(module_id)
    }

    pub fn sandbox(job_id: impl Into<String>, summary: impl Into<String>) -> Self {
        Self::new(AuditKind::Sandbox, summary).about(job_id)
    }

    pub fn report(summary: impl Into<String>) -> Self {
        Self::new(AuditKind::Report, summary)
    }

    pub fn system(summary: impl Into<String>) -> Self {
        Self::new(AuditKind::System, summary)
    }

    /// Attach the subject (module id or sandbox job id)
    pub fn about(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }
}
