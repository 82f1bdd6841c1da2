//! Top-level research coordinator
//!
//! One [`Orchestrator`] serves many sessions. A run goes through:
//! authorization, quota check, recon, module fan-out, the dispatch barrier,
//! scoring, optional sandbox confirmation, payload generation and report
//! rendering. Only quota and authorization failures abort a run.

mod dispatcher;
mod plan;

pub use dispatcher::{DispatchResult, Dispatcher};
pub use plan::{ESTIMATED_TIME, ExecutionPlan, TestingPhase};

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{info, warn};

use crate::config::OrchestratorConfig;
use crate::domain::{
    AuditEvent, ResearchRequest, ResearchState, Session, SessionRecord, Severity, Tier,
    VulnerabilityFinding,
};
use crate::error::ResearchError;
use crate::modules::{ModuleRegistry, ReconGatherer, ReconSource};
use crate::payload::PayloadGenerator;
use crate::quota::{QuotaGate, SourceLimiter};
use crate::report::ReportBuilder;
use crate::retry::RetryPolicy;
use crate::sandbox::{SandboxProvider, SandboxRunner, SandboxState, SandboxSummary};
use crate::scoring::ConfidenceScorer;

pub struct Orchestrator {
    config: OrchestratorConfig,
    dispatcher: Dispatcher,
    quota: Arc<QuotaGate>,
    scorer: ConfidenceScorer,
    recon: ReconGatherer,
    sandbox: Option<SandboxRunner>,
    confirm_min_severity: Severity,
    payloads: PayloadGenerator,
    reports: ReportBuilder,
}

impl Orchestrator {
    /// Build an orchestrator. Rejects invalid configuration.
    pub fn new(
        config: OrchestratorConfig,
        registry: ModuleRegistry,
        sandbox: Option<Arc<dyn SandboxProvider>>,
        recon_sources: Vec<Arc<dyn ReconSource>>,
    ) -> Result<Self, ResearchError> {
        config.validate()?;
        let confirm_min_severity = config.sandbox.min_severity()?;

        let dispatcher = Dispatcher::new(
            registry,
            config.dispatch.max_fan_out,
            config.dispatch.module_timeout(),
        );
        let recon = ReconGatherer::new(
            recon_sources,
            SourceLimiter::new(Duration::from_millis(config.recon.min_interval_ms)),
            RetryPolicy::from_settings(&config.retry),
        );
        let sandbox = sandbox.map(|provider| SandboxRunner::new(provider, config.sandbox.limits()));

        Ok(Self {
            quota: Arc::new(QuotaGate::new(&config.quota)),
            scorer: ConfidenceScorer::new(config.scoring.min_confidence),
            payloads: PayloadGenerator::new(config.payload.formats.clone()),
            reports: ReportBuilder::new(),
            dispatcher,
            recon,
            sandbox,
            confirm_min_severity,
            config,
        })
    }

    /// Orchestrator with default configuration and the built-in modules
    pub fn with_defaults() -> Result<Self, ResearchError> {
        Self::new(
            OrchestratorConfig::default(),
            ModuleRegistry::with_defaults(),
            None,
            Vec::new(),
        )
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn registry(&self) -> &ModuleRegistry {
        self.dispatcher.registry()
    }

    pub fn quota(&self) -> &QuotaGate {
        &self.quota
    }

    pub fn open_session(&self, target: impl Into<String>, tier: Tier) -> Arc<Session> {
        let session = Arc::new(Session::new(target, tier));
        info!(session_id = session.id(), target = session.target(), tier = %tier, "Session opened");
        session.append_audit(AuditEvent::system(format!("session opened on {tier} tier")));
        session
    }

    /// Run one research request against `session`.
    ///
    /// Returns the persisted record of the run. The record is also appended
    /// to the session's history.
    pub async fn run(
        &self,
        session: &Arc<Session>,
        request: ResearchRequest,
    ) -> Result<Arc<SessionRecord>, ResearchError> {
        if !request.is_authorized() {
            warn!(session_id = session.id(), target = request.target(), "Request rejected: no scope authorization");
            session.append_audit(AuditEvent::request("rejected: scope authorization missing"));
            return Err(ResearchError::AuthorizationMissing(request.target().to_string()));
        }
        self.check_session(session, &request)?;

        let categories = request.categories().to_vec();
        self.quota
            .check(session, self.dispatcher.invocations_for(&categories))?;

        let run_number = session.next_run_number();
        let started_at = Utc::now();
        session.append_audit(AuditEvent::request(format!(
            "run {run_number} accepted: {}",
            categories.iter().map(|c| c.as_str()).collect::<Vec<_>>().join(", ")
        )));
        info!(
            session_id = session.id(),
            run = run_number,
            categories = categories.len(),
            "Research run started"
        );

        let recon = self
            .recon
            .gather(
                session.id(),
                request.target(),
                &categories,
                request.observations().to_vec(),
            )
            .await;
        let recommended_tools = recon.tool_recommendations();

        let dispatched = self
            .dispatcher
            .dispatch(session, &self.quota, Arc::new(recon), &categories)
            .await?;

        let partition = self.scorer.partition(dispatched.findings);
        let findings = publish(session, partition.kept);
        let category_scores = self.scorer.aggregate_by_category(&findings);
        let overall = ConfidenceScorer::combine(category_scores.values());

        let sandbox = if request.sandbox_opt_in() && session.tier().allows_sandbox() {
            self.confirm(session, request.target(), &findings).await
        } else {
            None
        };

        let payload_findings: Vec<VulnerabilityFinding> = match &sandbox {
            Some(summary) if summary.outcome == SandboxState::Completed => findings
                .iter()
                .filter(|f| !summary.refuted.contains(&f.id))
                .cloned()
                .collect(),
            _ => findings.clone(),
        };
        let artifacts = self.payloads.build(request.target(), &payload_findings);
        let execution_plan = ExecutionPlan::build(session.tier(), request.target(), &findings);

        let state = ResearchState {
            session_id: session.id().to_string(),
            run_number,
            target: session.target().to_string(),
            tier: session.tier(),
            findings,
            discarded: partition.discarded.len(),
            category_scores,
            overall,
            module_outcomes: dispatched.outcomes,
            attack_vectors: dispatched.attack_vectors,
            recommended_tools,
            sandbox,
            artifacts,
            execution_plan,
            session_created_at: session.created_at(),
            started_at,
            completed_at: Utc::now(),
            request,
        };

        let report = self.reports.render(&state);
        session.append_audit(AuditEvent::report(format!(
            "run {run_number} report generated with {} sections",
            report.sections.len()
        )));
        info!(
            session_id = session.id(),
            run = run_number,
            findings = state.findings.len(),
            incomplete = state.incomplete_modules().len(),
            "Research run completed"
        );

        let record = Arc::new(SessionRecord { state, report });
        session.push_record(Arc::clone(&record));
        Ok(record)
    }

    fn check_session(&self, session: &Session, request: &ResearchRequest) -> Result<(), ResearchError> {
        let mismatch = if request.target() != session.target() {
            Some(format!(
                "target '{}' differs from session target '{}'",
                request.target(),
                session.target()
            ))
        } else if request.tier() != session.tier() {
            Some(format!(
                "tier {} differs from session tier {}",
                request.tier(),
                session.tier()
            ))
        } else {
            None
        };

        match mismatch {
            Some(reason) => {
                warn!(session_id = session.id(), %reason, "Request rejected");
                session.append_audit(AuditEvent::request(format!("rejected: {reason}")));
                Err(ResearchError::SessionMismatch(reason))
            }
            None => Ok(()),
        }
    }

    /// Send eligible findings to the sandbox and wait for the job to clean up.
    /// `None` when there is no provider or nothing to confirm.
    async fn confirm(
        &self,
        session: &Session,
        target: &str,
        findings: &[VulnerabilityFinding],
    ) -> Option<SandboxSummary> {
        let runner = self.sandbox.as_ref()?;
        let candidates: Vec<VulnerabilityFinding> = findings
            .iter()
            .filter(|f| f.severity >= self.confirm_min_severity)
            .cloned()
            .collect();
        if candidates.is_empty() {
            return None;
        }

        let job = runner.confirm(session.id(), target, candidates).wait().await;
        for state in &job.history {
            session.append_audit(AuditEvent::sandbox(&job.id, format!("entered {state}")));
        }
        if let Some(ref error) = job.error {
            session.append_audit(AuditEvent::sandbox(&job.id, format!("error: {error}")));
        }
        Some(SandboxSummary::from_job(&job))
    }
}

/// Assign session-unique IDs to scored findings. The returned list keeps
/// dispatch order, so sequence numbers ascend through it.
fn publish(session: &Session, kept: Vec<VulnerabilityFinding>) -> Vec<VulnerabilityFinding> {
    kept.into_iter()
        .map(|f| {
            let id = VulnerabilityFinding::generate_id(
                session.short_id(),
                &f.category,
                session.next_finding_number(),
            );
            f.with_id(id)
        })
        .collect()
}
