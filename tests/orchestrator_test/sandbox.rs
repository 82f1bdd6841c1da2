//! Sandbox confirmation inside a full run

use std::sync::Arc;

use bountyhub::report::SectionKind;
use bountyhub::sandbox::{SandboxProvider, SandboxState};
use bountyhub::{AuditKind, Category, Severity, Tier};

use crate::common::{self, FaultyProvider, RunBehavior, ScriptedModule, TARGET, finding, idor_finding};

fn modules() -> Vec<ScriptedModule> {
    vec![
        ScriptedModule::returning(
            "idor",
            Category::Idor,
            vec![idor_finding("Sequential order IDs", 0.9), idor_finding("Export leaks IDs", 0.8)],
        ),
        ScriptedModule::returning(
            "business-logic",
            Category::BusinessLogic,
            vec![finding(Category::BusinessLogic, "Coupon stacking", Severity::Low, 0.5)],
        ),
    ]
}

#[tokio::test]
async fn test_provision_fault_retries_once_then_cleans() {
    let provider = Arc::new(FaultyProvider::new(u32::MAX, RunBehavior::ConfirmFirst));
    let orchestrator = common::orchestrator(
        common::registry(modules()),
        Some(Arc::clone(&provider) as Arc<dyn SandboxProvider>),
    );
    let session = orchestrator.open_session(TARGET, Tier::Premium);

    let record = orchestrator
        .run(&session, common::sandbox_request(Tier::Premium, &["idor", "logic"]))
        .await
        .unwrap();

    assert_eq!(provider.provisions(), 2);
    assert_eq!(provider.executions(), 0);
    assert_eq!(provider.teardowns(), 0);

    let summary = record.state.sandbox.as_ref().unwrap();
    assert_eq!(summary.outcome, SandboxState::Failed);
    assert_eq!(summary.final_state, SandboxState::Cleaned);
    assert_eq!(summary.provision_attempts, 2);
    assert!(summary.is_inconclusive());

    let section = record.report.section(SectionKind::Sandbox).unwrap();
    assert!(section.body.contains("inconclusive"));

    let transitions: Vec<String> = session
        .audit_log()
        .into_iter()
        .filter(|e| e.kind == AuditKind::Sandbox && e.summary.starts_with("entered"))
        .map(|e| e.summary)
        .collect();
    assert_eq!(
        transitions,
        vec!["entered pending", "entered provisioning", "entered failed", "entered cleaned"]
    );

    // Payloads are still produced for every published finding
    assert_eq!(record.state.artifacts.len(), 3 * 4);
}

#[tokio::test]
async fn test_single_provision_fault_recovers() {
    let provider = Arc::new(FaultyProvider::new(1, RunBehavior::ConfirmFirst));
    let orchestrator = common::orchestrator(
        common::registry(modules()),
        Some(Arc::clone(&provider) as Arc<dyn SandboxProvider>),
    );
    let session = orchestrator.open_session(TARGET, Tier::Enterprise);

    let record = orchestrator
        .run(&session, common::sandbox_request(Tier::Enterprise, &["idor", "logic"]))
        .await
        .unwrap();

    assert_eq!(provider.provisions(), 2);
    assert_eq!(provider.teardowns(), 1);

    let summary = record.state.sandbox.as_ref().unwrap();
    assert_eq!(summary.outcome, SandboxState::Completed);
    // Only HIGH and above were candidates; the fake confirms the first one
    assert_eq!(summary.confirmed.len(), 1);
    assert_eq!(summary.refuted.len(), 1);

    let refuted = &summary.refuted[0];
    assert!(record.state.artifacts.iter().all(|a| &a.finding_id != refuted));
    assert!(record.state.finding(refuted).is_some());

    let section = record.report.section(SectionKind::Sandbox).unwrap();
    assert!(section.body.contains("**Status:** confirmed"));
}

#[tokio::test]
async fn test_timeout_is_distinct_from_failure() {
    let provider = Arc::new(FaultyProvider::new(0, RunBehavior::TimeOut));
    let orchestrator = common::orchestrator(
        common::registry(modules()),
        Some(Arc::clone(&provider) as Arc<dyn SandboxProvider>),
    );
    let session = orchestrator.open_session(TARGET, Tier::Premium);

    let record = orchestrator
        .run(&session, common::sandbox_request(Tier::Premium, &["idor"]))
        .await
        .unwrap();

    let summary = record.state.sandbox.as_ref().unwrap();
    assert_eq!(summary.outcome, SandboxState::TimedOut);
    assert_eq!(summary.final_state, SandboxState::Cleaned);
    assert_eq!(provider.teardowns(), 1);

    let section = record.report.section(SectionKind::Sandbox).unwrap();
    assert!(section.body.contains("inconclusive (timed_out)"));
}

#[tokio::test]
async fn test_crashed_run_is_failed_and_torn_down() {
    let provider = Arc::new(FaultyProvider::new(0, RunBehavior::Crash));
    let orchestrator = common::orchestrator(
        common::registry(modules()),
        Some(Arc::clone(&provider) as Arc<dyn SandboxProvider>),
    );
    let session = orchestrator.open_session(TARGET, Tier::Premium);

    let record = orchestrator
        .run(&session, common::sandbox_request(Tier::Premium, &["idor"]))
        .await
        .unwrap();

    let summary = record.state.sandbox.as_ref().unwrap();
    assert_eq!(summary.outcome, SandboxState::Failed);
    assert!(summary.error.as_deref().unwrap().contains("137"));
    assert_eq!(provider.teardowns(), 1);
}

#[tokio::test]
async fn test_opt_in_without_provider_reports_not_run() {
    let orchestrator = common::orchestrator(common::registry(modules()), None);
    let session = orchestrator.open_session(TARGET, Tier::Premium);

    let record = orchestrator
        .run(&session, common::sandbox_request(Tier::Premium, &["idor"]))
        .await
        .unwrap();

    assert!(record.state.sandbox.is_none());
    let section = record.report.section(SectionKind::Sandbox).unwrap();
    assert!(section.body.contains("not run"));
}
