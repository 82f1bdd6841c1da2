//! Sandbox job model and its state machine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::domain::FindingId;
use crate::error::SandboxError;

/// Lifecycle of one confirmation job.
///
/// `Pending → Provisioning → Running → {Completed, Failed, TimedOut} → Cleaned`.
/// Provisioning may also go straight to `Failed`. Every path ends in `Cleaned`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SandboxState {
    /// Waiting for the session's sandbox slot
    Pending,
    Provisioning,
    Running,
    Completed,
    Failed,
    /// Wall-clock limit exceeded; inconclusive rather than broken
    TimedOut,
    /// Environment torn down
    Cleaned,
}

impl SandboxState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SandboxState::Pending => "pending",
            SandboxState::Provisioning => "provisioning",
            SandboxState::Running => "running",
            SandboxState::Completed => "completed",
            SandboxState::Failed => "failed",
            SandboxState::TimedOut => "timed_out",
            SandboxState::Cleaned => "cleaned",
        }
    }

    /// `Completed`, `Failed` or `TimedOut`
    pub fn is_outcome(&self) -> bool {
        matches!(
            self,
            SandboxState::Completed | SandboxState::Failed | SandboxState::TimedOut
        )
    }

    pub fn can_transition_to(&self, next: SandboxState) -> bool {
        use SandboxState::*;
        matches!(
            (self, next),
            (Pending, Provisioning)
                | (Provisioning, Running)
                | (Provisioning, Failed)
                | (Running, Completed)
                | (Running, Failed)
                | (Running, TimedOut)
                | (Completed, Cleaned)
                | (Failed, Cleaned)
                | (TimedOut, Cleaned)
        )
    }
}

impl std::fmt::Display for SandboxState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Limits declared to the provider at provisioning time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceLimits {
    /// Fraction of one CPU
    pub cpu_share: f64,
    pub memory_mb: u64,
    pub wall_clock: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxJob {
    pub id: String,
    pub session_id: String,
    /// Findings sent for confirmation
    pub candidates: Vec<FindingId>,
    pub state: SandboxState,
    /// Terminal outcome reached before cleanup
    pub outcome: Option<SandboxState>,
    pub limits: ResourceLimits,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub confirmed: Vec<FindingId>,
    pub refuted: Vec<FindingId>,
    pub provision_attempts: u32,
    pub error: Option<String>,
    /// Every state entered, in order
    pub history: Vec<SandboxState>,
}

impl SandboxJob {
    pub fn new(session_id: impl Into<String>, candidates: Vec<FindingId>, limits: ResourceLimits) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            session_id: session_id.into(),
            candidates,
            state: SandboxState::Pending,
            outcome: None,
            limits,
            created_at: Utc::now(),
            started_at: None,
            ended_at: None,
            confirmed: Vec::new(),
            refuted: Vec::new(),
            provision_attempts: 0,
            error: None,
            history: vec![SandboxState::Pending],
        }
    }

    pub fn transition(&mut self, next: SandboxState) -> Result<(), SandboxError> {
        if !self.state.can_transition_to(next) {
            return Err(SandboxError::InvalidTransition {
                from: self.state.to_string(),
                to: next.to_string(),
            });
        }

        match next {
            SandboxState::Provisioning => self.started_at = Some(Utc::now()),
            SandboxState::Cleaned => self.ended_at = Some(Utc::now()),
            s if s.is_outcome() => self.outcome = Some(s),
            _ => {}
        }
        self.state = next;
        self.history.push(next);
        Ok(())
    }

    /// Record a failure and move to `Failed`
    pub fn fail(&mut self, error: impl Into<String>) -> Result<(), SandboxError> {
        self.error = Some(error.into());
        self.transition(SandboxState::Failed)
    }

    /// Split the candidates into confirmed and refuted. IDs the provider
    /// reports that were never candidates are ignored.
    pub fn record_confirmed(&mut self, confirmed: &[FindingId]) {
        let (yes, no): (Vec<FindingId>, Vec<FindingId>) = self
            .candidates
            .iter()
            .cloned()
            .partition(|id| confirmed.contains(id));
        self.confirmed = yes;
        self.refuted = no;
    }
}

/// How confirmation ended, from the report's point of view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmationStatus {
    Confirmed,
    /// Failed or timed out: no conclusion either way
    Inconclusive,
}

/// What the session keeps once a job is cleaned up
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SandboxSummary {
    pub job_id: String,
    pub final_state: SandboxState,
    pub outcome: SandboxState,
    pub status: ConfirmationStatus,
    pub confirmed: Vec<FindingId>,
    pub refuted: Vec<FindingId>,
    pub provision_attempts: u32,
    pub error: Option<String>,
}

impl SandboxSummary {
    pub fn from_job(job: &SandboxJob) -> Self {
        let outcome = job.outcome.unwrap_or(SandboxState::Failed);
        Self {
            job_id: job.id.clone(),
            final_state: job.state,
            outcome,
            status: if outcome == SandboxState::Completed {
                ConfirmationStatus::Confirmed
            } else {
                ConfirmationStatus::Inconclusive
            },
            confirmed: job.confirmed.clone(),
            refuted: job.refuted.clone(),
            provision_attempts: job.provision_attempts,
            error: job.error.clone(),
        }
    }

    pub fn is_inconclusive(&self) -> bool {
        self.status == ConfirmationStatus::Inconclusive
    }
}
