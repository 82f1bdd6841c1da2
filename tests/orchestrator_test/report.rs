//! Report determinism, traceability and persistence

use std::collections::BTreeSet;

use bountyhub::report::{ReportBuilder, SectionKind};
use bountyhub::{Category, SessionRecord, Severity, Tier};
use tempfile::TempDir;

use crate::common::{self, ScriptedModule, TARGET, finding, idor_finding};

async fn premium_record() -> std::sync::Arc<SessionRecord> {
    let modules = vec![
        ScriptedModule::returning(
            "idor",
            Category::Idor,
            vec![
                idor_finding("Sequential order IDs", 0.9),
                idor_finding("Stale export", 0.02),
            ],
        ),
        ScriptedModule::returning(
            "crypto-specific",
            Category::CryptoSpecific,
            vec![finding(Category::CryptoSpecific, "Withdrawal without nonce", Severity::Critical, 0.99)],
        ),
        ScriptedModule::returning(
            "business-logic",
            Category::BusinessLogic,
            vec![finding(Category::BusinessLogic, "Negative amount", Severity::High, 0.4)],
        ),
    ];
    let orchestrator = common::orchestrator(common::registry(modules), None);
    let session = orchestrator.open_session(TARGET, Tier::Premium);
    orchestrator
        .run(&session, common::request(Tier::Premium, &["logic", "idor", "crypto"]))
        .await
        .unwrap()
}

#[tokio::test]
async fn test_render_is_idempotent() {
    let record = premium_record().await;
    let builder = ReportBuilder::new();

    let again = builder.render(&record.state);
    assert_eq!(again, record.report);
    assert_eq!(again.to_markdown(), builder.render(&record.state).to_markdown());
}

#[tokio::test]
async fn test_categories_ordered_by_worst_severity() {
    let record = premium_record().await;
    let order: Vec<Category> = record
        .report
        .category_sections()
        .iter()
        .filter_map(|s| s.category.clone())
        .collect();

    assert_eq!(
        order,
        vec![Category::CryptoSpecific, Category::Idor, Category::BusinessLogic]
    );
    assert_eq!(record.report.sections[0].kind, SectionKind::Summary);
    assert_eq!(
        record.report.sections.last().map(|s| s.kind),
        Some(SectionKind::Remediation)
    );
}

#[tokio::test]
async fn test_every_reference_traces_to_a_published_finding() {
    let record = premium_record().await;
    let state = &record.state;
    let published: BTreeSet<&str> = state.findings.iter().map(|f| f.id.as_str()).collect();

    assert_eq!(state.discarded, 1);
    assert!(state.findings.iter().all(|f| f.title != "Stale export"));
    assert!(!state.artifacts.is_empty());
    for artifact in &state.artifacts {
        assert!(published.contains(artifact.finding_id.as_str()), "{}", artifact.id);
    }

    let plan = state.execution_plan.as_ref().unwrap();
    for phase in &plan.testing_phases {
        assert!(published.contains(phase.finding_id.as_str()));
    }

    let markdown = record.report.to_markdown();
    assert!(!markdown.contains("Stale export"));
}

#[tokio::test]
async fn test_record_round_trips_through_disk() {
    let record = premium_record().await;
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("record.json");

    record.save_to(&path).unwrap();
    let raw = std::fs::read_to_string(&path).unwrap();
    let loaded = SessionRecord::from_json(&raw).unwrap();

    assert_eq!(loaded.report, record.report);
    assert_eq!(loaded.state.findings, record.state.findings);
    assert_eq!(ReportBuilder::new().render(&loaded.state), record.report);
}
