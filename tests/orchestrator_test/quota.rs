//! Free-tier caps and concurrent consumption

use std::sync::Arc;
use std::sync::atomic::Ordering;

use bountyhub::{AuditKind, Category, ResearchError, Tier};

use crate::common::{self, ScriptedModule, TARGET, finding, idor_finding};

fn three_modules() -> (Vec<ScriptedModule>, Vec<Arc<std::sync::atomic::AtomicU32>>) {
    let modules = vec![
        ScriptedModule::returning("idor", Category::Idor, vec![idor_finding("a", 0.8)]),
        ScriptedModule::returning(
            "auth-bypass",
            Category::AuthBypass,
            vec![finding(Category::AuthBypass, "b", bountyhub::Severity::High, 0.6)],
        ),
        ScriptedModule::returning("crypto-specific", Category::CryptoSpecific, Vec::new()),
    ];
    let counters = modules.iter().map(|m| m.counter()).collect();
    (modules, counters)
}

#[tokio::test]
async fn test_request_after_cap_fails_before_any_work() {
    let (modules, counters) = three_modules();
    let orchestrator = common::orchestrator(common::registry(modules), None);
    let session = orchestrator.open_session(TARGET, Tier::Free);

    orchestrator
        .run(&session, common::request(Tier::Free, &["idor", "auth", "crypto"]))
        .await
        .unwrap();
    assert_eq!(session.usage().get(), 3);

    let err = orchestrator
        .run(&session, common::request(Tier::Free, &["idor"]))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ResearchError::QuotaExceeded { tier: Tier::Free, used: 3, cap: 3 }
    ));
    let calls: Vec<u32> = counters.iter().map(|c| c.load(Ordering::SeqCst)).collect();
    assert_eq!(calls, vec![1, 1, 1]);
    assert_eq!(session.records().len(), 1);
    assert!(
        session
            .audit_log()
            .iter()
            .any(|e| e.kind == AuditKind::Quota && e.summary.contains("rejected"))
    );
}

#[tokio::test]
async fn test_oversized_request_is_rejected_up_front() {
    let (modules, counters) = three_modules();
    let orchestrator = common::orchestrator(common::registry(modules), None);
    let session = orchestrator.open_session(TARGET, Tier::Free);

    orchestrator
        .run(&session, common::request(Tier::Free, &["idor"]))
        .await
        .unwrap();

    let err = orchestrator
        .run(&session, common::request(Tier::Free, &["idor", "auth", "crypto"]))
        .await
        .unwrap_err();
    assert!(matches!(err, ResearchError::QuotaExceeded { used: 1, .. }));
    assert_eq!(counters[1].load(Ordering::SeqCst), 0);
    assert_eq!(session.usage().get(), 1);
}

#[tokio::test]
async fn test_concurrent_requests_never_exceed_cap() {
    let (modules, _) = three_modules();
    let orchestrator = Arc::new(common::orchestrator(common::registry(modules), None));
    let session = orchestrator.open_session(TARGET, Tier::Free);

    let mut handles = Vec::new();
    for _ in 0..6 {
        let orchestrator = Arc::clone(&orchestrator);
        let session = Arc::clone(&session);
        handles.push(tokio::spawn(async move {
            orchestrator
                .run(&session, common::request(Tier::Free, &["idor"]))
                .await
        }));
    }

    let mut ok = 0;
    let mut rejected = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => ok += 1,
            Err(ResearchError::QuotaExceeded { .. }) => rejected += 1,
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    assert_eq!(ok, 3);
    assert_eq!(rejected, 3);
    assert_eq!(session.usage().get(), 3);
}

#[tokio::test]
async fn test_paid_tiers_are_uncapped() {
    let (modules, _) = three_modules();
    let orchestrator = common::orchestrator(common::registry(modules), None);
    let session = orchestrator.open_session(TARGET, Tier::Premium);

    for _ in 0..3 {
        orchestrator
            .run(&session, common::request(Tier::Premium, &["idor", "auth"]))
            .await
            .unwrap();
    }
    assert_eq!(session.usage().get(), 6);
}
