//! Request handling, scoring and failure reporting

use std::sync::atomic::Ordering;

use bountyhub::report::SectionKind;
use bountyhub::{
    Category, ModuleFailure, ModuleStatus, ResearchError, ResearchRequest, Severity, Tier,
    UpstreamNetworkError,
};

use crate::common::{self, ScriptedModule, TARGET, idor_finding};

#[tokio::test]
async fn test_free_tier_idor_scenario() {
    let module = ScriptedModule::returning(
        "idor",
        Category::Idor,
        vec![idor_finding("Sequential order IDs", 0.9), idor_finding("Order ID in export", 0.6)],
    );
    let orchestrator = common::orchestrator(common::registry(vec![module]), None);
    let session = orchestrator.open_session(TARGET, Tier::Free);

    let record = orchestrator
        .run(&session, common::request(Tier::Free, &["idor"]))
        .await
        .unwrap();

    let state = &record.state;
    assert_eq!(state.category_scores.len(), 1);
    let score = &state.category_scores[&Category::Idor];
    assert_eq!(score.severity, Severity::High);
    assert!((score.calibrated - 0.896325).abs() < 1e-9);
    assert!(!score.bounty.is_empty());
    assert_eq!(state.overall.severity, Severity::High);

    let sections = record.report.category_sections();
    assert_eq!(sections.len(), 1);
    let body = &sections[0].body;
    let strong = body.find("Sequential order IDs").unwrap();
    let weak = body.find("Order ID in export").unwrap();
    assert!(strong < weak);

    // Free tier: no plan, no sandbox
    assert!(state.execution_plan.is_none());
    assert!(state.sandbox.is_none());
    assert!(record.report.section(SectionKind::Sandbox).is_none());
}

#[tokio::test]
async fn test_finding_ids_are_session_scoped() {
    let module = ScriptedModule::returning(
        "idor",
        Category::Idor,
        vec![idor_finding("a", 0.9), idor_finding("b", 0.6)],
    );
    let orchestrator = common::orchestrator(common::registry(vec![module]), None);
    let session = orchestrator.open_session(TARGET, Tier::Premium);

    let first = orchestrator
        .run(&session, common::request(Tier::Premium, &["idor"]))
        .await
        .unwrap();
    let second = orchestrator
        .run(&session, common::request(Tier::Premium, &["idor"]))
        .await
        .unwrap();

    let prefix = session.short_id();
    let ids: Vec<&str> = first
        .state
        .findings
        .iter()
        .chain(second.state.findings.iter())
        .map(|f| f.id.as_str())
        .collect();
    assert_eq!(
        ids,
        vec![
            format!("{prefix}-IDOR-001"),
            format!("{prefix}-IDOR-002"),
            format!("{prefix}-IDOR-003"),
            format!("{prefix}-IDOR-004"),
        ]
    );
    assert_eq!(first.state.run_number, 1);
    assert_eq!(second.state.run_number, 2);
    assert_eq!(session.records().len(), 2);
    assert!(first.state.findings.iter().all(|f| f.module_id == "idor"));
}

#[tokio::test]
async fn test_missing_authorization_aborts_before_dispatch() {
    let module = ScriptedModule::returning("idor", Category::Idor, vec![idor_finding("a", 0.9)]);
    let calls = module.counter();
    let orchestrator = common::orchestrator(common::registry(vec![module]), None);
    let session = orchestrator.open_session(TARGET, Tier::Free);

    let request = ResearchRequest::builder(TARGET)
        .categories(["idor"])
        .build()
        .unwrap();
    let err = orchestrator.run(&session, request).await.unwrap_err();

    assert!(matches!(err, ResearchError::AuthorizationMissing(ref t) if t == TARGET));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(session.usage().get(), 0);
    assert!(session.latest_report().is_none());
}

#[tokio::test]
async fn test_request_for_other_target_is_rejected() {
    let orchestrator = common::orchestrator(common::registry(Vec::new()), None);
    let session = orchestrator.open_session("other-platform", Tier::Free);

    let err = orchestrator
        .run(&session, common::request(Tier::Free, &["idor"]))
        .await
        .unwrap_err();
    assert!(matches!(err, ResearchError::SessionMismatch(_)));
}

#[tokio::test]
async fn test_module_failure_is_listed_not_fatal() {
    let healthy = ScriptedModule::returning("idor", Category::Idor, vec![idor_finding("a", 0.8)]);
    let broken = ScriptedModule::failing(
        "crypto-specific",
        Category::CryptoSpecific,
        ModuleFailure::Upstream {
            attempts: 3,
            source: UpstreamNetworkError::Status {
                host: "intel.example".to_string(),
                status: 503,
            },
        },
    );
    let orchestrator = common::orchestrator(common::registry(vec![healthy, broken]), None);
    let session = orchestrator.open_session(TARGET, Tier::Enterprise);

    let record = orchestrator
        .run(
            &session,
            common::request(Tier::Enterprise, &["idor", "crypto", "graphql"]),
        )
        .await
        .unwrap();

    let outcomes = &record.state.module_outcomes;
    assert_eq!(outcomes.len(), 3);
    assert!(outcomes[0].succeeded());
    assert!(matches!(outcomes[1].status, ModuleStatus::Failed { ref reason } if reason.contains("503")));
    assert_eq!(outcomes[2].status, ModuleStatus::Unavailable);

    let incomplete = record
        .report
        .section(SectionKind::IncompleteModules)
        .unwrap();
    assert!(incomplete.body.contains("crypto_specific"));
    assert!(incomplete.body.contains("graphql"));
    assert!(!incomplete.body.contains("`idor`"));
    assert_eq!(record.state.findings.len(), 1);
}

#[tokio::test]
async fn test_low_confidence_findings_are_discarded() {
    let module = ScriptedModule::returning(
        "idor",
        Category::Idor,
        vec![idor_finding("real", 0.7), idor_finding("noise", 0.05), idor_finding("bogus", 1.5)],
    );
    let orchestrator = common::orchestrator(common::registry(vec![module]), None);
    let session = orchestrator.open_session(TARGET, Tier::Premium);

    let record = orchestrator
        .run(&session, common::request(Tier::Premium, &["idor"]))
        .await
        .unwrap();

    assert_eq!(record.state.findings.len(), 1);
    assert_eq!(record.state.discarded, 2);
    assert_eq!(record.state.findings[0].title, "real");
}

#[tokio::test]
async fn test_builtin_modules_mine_observed_traffic() {
    use bountyhub::config::OrchestratorConfig;
    use bountyhub::domain::{EnumerationStrategy, ObservedEndpoint, ToolFormat};
    use bountyhub::modules::ModuleRegistry;
    use bountyhub::Orchestrator;

    let orchestrator = Orchestrator::new(
        OrchestratorConfig::default(),
        ModuleRegistry::with_defaults(),
        None,
        Vec::new(),
    )
    .unwrap();
    let session = orchestrator.open_session(TARGET, Tier::Enterprise);

    let request = ResearchRequest::builder(TARGET)
        .categories(["idor"])
        .tier(Tier::Enterprise)
        .authorized(true)
        .observe(
            ObservedEndpoint::new("GET", "/api/v2/orders/1041")
                .with_status(200)
                .with_owner("alice"),
        )
        .observe(
            ObservedEndpoint::new("GET", "/api/v2/orders/1042")
                .with_status(200)
                .with_owner("bob"),
        )
        .build()
        .unwrap();

    let record = orchestrator.run(&session, request).await.unwrap();
    let sequential = record
        .state
        .findings
        .iter()
        .find(|f| f.strategy == Some(EnumerationStrategy::Sequential))
        .unwrap();
    assert_eq!(sequential.severity, Severity::Critical);
    assert_eq!(sequential.endpoint(), Some("/api/v2/orders/{order_id}"));

    let intruder = record
        .state
        .artifacts
        .iter()
        .find(|a| a.finding_id == sequential.id && a.format == ToolFormat::Intruder)
        .unwrap();
    assert_eq!(intruder.insertion_points.len(), 1);
    assert_eq!(intruder.insertion_points[0].parameter, "order_id");
    assert!(record.state.attack_vectors.contains_key(&Category::Idor));
}

#[test]
fn test_invalid_config_is_rejected() {
    use bountyhub::config::OrchestratorConfig;
    use bountyhub::modules::ModuleRegistry;
    use bountyhub::{ConfigError, Orchestrator};

    let mut config = OrchestratorConfig::default();
    config.dispatch.max_fan_out = 0;

    let err = Orchestrator::new(config, ModuleRegistry::with_defaults(), None, Vec::new())
        .err()
        .unwrap();
    assert!(matches!(
        err,
        ResearchError::Config(ConfigError::Zero { field: "dispatch.max_fan_out" })
    ));
}
