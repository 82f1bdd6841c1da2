//! Concurrent module fan-out with a single synchronization barrier
//!
//! Each requested category runs as its own task, bounded by a semaphore of
//! `max_fan_out` permits. Every task consumes quota before it starts work.
//! Nothing is published until every task has reached a terminal outcome; a
//! quota refusal part way through aborts the remaining tasks and discards
//! what the finished ones produced.

use std::any::Any;
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::domain::{AuditEvent, Category, ModuleOutcome, ModuleStatus, Session, VulnerabilityFinding};
use crate::error::{ModuleFailure, ResearchError};
use crate::modules::{ModuleRegistry, ReconContext};
use crate::quota::QuotaGate;

/// Everything the barrier releases for one run
#[derive(Debug, Default)]
pub struct DispatchResult {
    /// Findings in request-category order, then module emission order.
    /// IDs are not assigned yet.
    pub findings: Vec<VulnerabilityFinding>,
    /// One outcome per requested category, in request order
    pub outcomes: Vec<ModuleOutcome>,
    pub attack_vectors: BTreeMap<Category, Vec<String>>,
}

struct TaskOutput {
    index: usize,
    category: Category,
    module_id: String,
    result: Result<Vec<VulnerabilityFinding>, ModuleFailure>,
    elapsed: Duration,
}

pub struct Dispatcher {
    registry: ModuleRegistry,
    max_fan_out: usize,
    module_timeout: Duration,
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

impl Dispatcher {
    pub fn new(registry: ModuleRegistry, max_fan_out: usize, module_timeout: Duration) -> Self {
        Self {
            registry,
            max_fan_out: max_fan_out.max(1),
            module_timeout,
        }
    }

    pub fn registry(&self) -> &ModuleRegistry {
        &self.registry
    }

    /// Number of module invocations a request for `categories` would consume
    pub fn invocations_for(&self, categories: &[Category]) -> u32 {
        categories
            .iter()
            .filter(|c| self.registry.contains(c))
            .count() as u32
    }

    pub async fn dispatch(
        &self,
        session: &Arc<Session>,
        quota: &Arc<QuotaGate>,
        recon: Arc<ReconContext>,
        categories: &[Category],
    ) -> Result<DispatchResult, ResearchError> {
        let semaphore = Arc::new(Semaphore::new(self.max_fan_out));
        let mut tasks = JoinSet::new();
        let mut outcomes: Vec<Option<ModuleOutcome>> = vec![None; categories.len()];
        let mut attack_vectors = BTreeMap::new();

        for (index, category) in categories.iter().enumerate() {
            let Some(module) = self.registry.get(category) else {
                warn!(session_id = session.id(), category = %category, "No module registered");
                session.append_audit(AuditEvent::system(format!(
                    "no module registered for {category}"
                )));
                outcomes[index] = Some(ModuleOutcome {
                    category: category.clone(),
                    module_id: None,
                    status: ModuleStatus::Unavailable,
                    duration_ms: 0,
                });
                continue;
            };

            let vectors = module.attack_vectors();
            if !vectors.is_empty() {
                attack_vectors.insert(category.clone(), vectors);
            }

            let semaphore = Arc::clone(&semaphore);
            let session = Arc::clone(session);
            let quota = Arc::clone(quota);
            let recon = Arc::clone(&recon);
            let category = category.clone();
            let timeout = self.module_timeout;

            tasks.spawn(async move {
                // The semaphore is never closed
                let _permit = semaphore.acquire_owned().await.ok();

                let module_id = module.id().to_string();
                quota.consume(&session, &module_id).await?;

                debug!(session_id = session.id(), module = %module_id, "Module started");
                session.append_audit(AuditEvent::module(&module_id, "dispatched"));

                let started = Instant::now();
                let analysis = AssertUnwindSafe(module.analyze(recon.target(), &recon)).catch_unwind();
                let result = match tokio::time::timeout(timeout, analysis).await {
                    Ok(Ok(result)) => result,
                    Ok(Err(payload)) => Err(ModuleFailure::Panicked(panic_message(payload))),
                    Err(_) => Err(ModuleFailure::Timeout(timeout)),
                };

                Ok::<_, ResearchError>(TaskOutput {
                    index,
                    category,
                    module_id,
                    result,
                    elapsed: started.elapsed(),
                })
            });
        }

        let mut collected: Vec<TaskOutput> = Vec::with_capacity(tasks.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(output)) => collected.push(output),
                Ok(Err(e)) => {
                    warn!(
                        session_id = session.id(),
                        in_flight = tasks.len(),
                        discarded = collected.len(),
                        "Dispatch aborted, discarding partial results"
                    );
                    tasks.abort_all();
                    session.append_audit(AuditEvent::module(
                        "dispatcher",
                        format!("aborted: {e}"),
                    ));
                    return Err(e);
                }
                Err(e) => {
                    // Panics outside the analysis future land here
                    warn!(session_id = session.id(), error = %e, "Module task did not finish");
                }
            }
        }

        collected.sort_by_key(|o| o.index);
        let mut findings = Vec::new();
        for output in collected {
            let duration_ms = output.elapsed.as_millis() as u64;
            let status = match output.result {
                Ok(batch) => {
                    info!(
                        session_id = session.id(),
                        module = %output.module_id,
                        findings = batch.len(),
                        duration_ms,
                        "Module finished"
                    );
                    session.append_audit(AuditEvent::module(
                        &output.module_id,
                        format!("completed with {} findings", batch.len()),
                    ));
                    let count = batch.len();
                    findings.extend(
                        batch
                            .into_iter()
                            .map(|f| f.with_module(output.module_id.clone())),
                    );
                    ModuleStatus::Completed { findings: count }
                }
                Err(failure) => {
                    warn!(
                        session_id = session.id(),
                        module = %output.module_id,
                        error = %failure,
                        "Module failed"
                    );
                    session.append_audit(AuditEvent::module(
                        &output.module_id,
                        format!("failed: {failure}"),
                    ));
                    ModuleStatus::Failed {
                        reason: failure.to_string(),
                    }
                }
            };

            outcomes[output.index] = Some(ModuleOutcome {
                category: output.category,
                module_id: Some(output.module_id),
                status,
                duration_ms,
            });
        }

        Ok(DispatchResult {
            findings,
            outcomes: outcomes
                .into_iter()
                .zip(categories)
                .map(|(outcome, category)| {
                    outcome.unwrap_or_else(|| ModuleOutcome {
                        category: category.clone(),
                        module_id: None,
                        status: ModuleStatus::Failed {
                            reason: "module task did not finish".to_string(),
                        },
                        duration_ms: 0,
                    })
                })
                .collect(),
            attack_vectors,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QuotaSettings;
    use crate::domain::{Severity, Tier};
    use crate::modules::AnalysisModule;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Scripted {
        id: &'static str,
        category: Category,
        delay: Duration,
        panic: bool,
        running: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
    }

    impl Scripted {
        fn new(id: &'static str, category: Category) -> Self {
            Self {
                id,
                category,
                delay: Duration::from_millis(0),
                panic: false,
                running: Arc::new(AtomicUsize::new(0)),
                peak: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    #[async_trait]
    impl AnalysisModule for Scripted {
        fn id(&self) -> &str {
            self.id
        }

        fn category(&self) -> Category {
            self.category.clone()
        }

        async fn analyze(
            &self,
            _target: &str,
            _recon: &ReconContext,
        ) -> Result<Vec<VulnerabilityFinding>, ModuleFailure> {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.running.fetch_sub(1, Ordering::SeqCst);
            if self.panic {
                panic!("scripted panic");
            }
            Ok(vec![VulnerabilityFinding::new(
                self.category.clone(),
                format!("{} finding", self.id),
                Severity::Medium,
                0.5,
            )])
        }
    }

    fn recon() -> Arc<ReconContext> {
        Arc::new(ReconContext::new("example-platform", Vec::new(), Vec::new()))
    }

    fn gate() -> Arc<QuotaGate> {
        Arc::new(QuotaGate::new(&QuotaSettings::default()))
    }

    #[tokio::test]
    async fn test_panic_is_recorded_as_failure() {
        let mut registry = ModuleRegistry::new();
        let mut bad = Scripted::new("idor", Category::Idor);
        bad.panic = true;
        registry.register(Arc::new(bad));
        registry.register(Arc::new(Scripted::new("crypto-specific", Category::CryptoSpecific)));

        let dispatcher = Dispatcher::new(registry, 4, Duration::from_secs(5));
        let session = Arc::new(Session::new("example-platform", Tier::Enterprise));
        let result = dispatcher
            .dispatch(&session, &gate(), recon(), &[Category::Idor, Category::CryptoSpecific])
            .await
            .unwrap();

        assert_eq!(result.outcomes.len(), 2);
        assert!(matches!(
            &result.outcomes[0].status,
            ModuleStatus::Failed { reason } if reason.contains("scripted panic")
        ));
        assert_eq!(result.findings.len(), 1);
        assert_eq!(result.findings[0].module_id, "crypto-specific");
    }

    #[tokio::test]
    async fn test_timeout_and_unavailable() {
        let mut registry = ModuleRegistry::new();
        let mut slow = Scripted::new("idor", Category::Idor);
        slow.delay = Duration::from_millis(500);
        registry.register(Arc::new(slow));

        let dispatcher = Dispatcher::new(registry, 2, Duration::from_millis(20));
        let session = Arc::new(Session::new("example-platform", Tier::Premium));
        let ssrf = Category::Custom("ssrf".to_string());
        let result = dispatcher
            .dispatch(&session, &gate(), recon(), &[ssrf.clone(), Category::Idor])
            .await
            .unwrap();

        assert_eq!(result.outcomes[0].category, ssrf);
        assert_eq!(result.outcomes[0].status, ModuleStatus::Unavailable);
        assert!(matches!(result.outcomes[1].status, ModuleStatus::Failed { .. }));
        assert!(result.findings.is_empty());
        assert_eq!(dispatcher.invocations_for(&[ssrf, Category::Idor]), 1);
    }

    #[tokio::test]
    async fn test_fan_out_is_bounded() {
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let mut registry = ModuleRegistry::new();
        let categories: Vec<Category> = ["a", "b", "c", "d", "e"]
            .iter()
            .map(|n| Category::Custom(n.to_string()))
            .collect();
        for (category, id) in categories.iter().zip(["a", "b", "c", "d", "e"]) {
            let mut module = Scripted::new(id, category.clone());
            module.delay = Duration::from_millis(30);
            module.running = Arc::clone(&running);
            module.peak = Arc::clone(&peak);
            registry.register(Arc::new(module));
        }

        let dispatcher = Dispatcher::new(registry, 2, Duration::from_secs(5));
        let session = Arc::new(Session::new("example-platform", Tier::Enterprise));
        let result = dispatcher
            .dispatch(&session, &gate(), recon(), &categories)
            .await
            .unwrap();

        assert_eq!(result.findings.len(), 5);
        assert!(peak.load(Ordering::SeqCst) <= 2);
        let order: Vec<&str> = result.findings.iter().map(|f| f.module_id.as_str()).collect();
        assert_eq!(order, vec!["a", "b", "c", "d", "e"]);
    }

    #[tokio::test]
    async fn test_quota_refusal_discards_everything() {
        let mut registry = ModuleRegistry::new();
        let categories: Vec<Category> = ["a", "b", "c", "d"]
            .iter()
            .map(|n| Category::Custom(n.to_string()))
            .collect();
        for (category, id) in categories.iter().zip(["a", "b", "c", "d"]) {
            registry.register(Arc::new(Scripted::new(id, category.clone())));
        }

        let dispatcher = Dispatcher::new(registry, 1, Duration::from_secs(5));
        let session = Arc::new(Session::new("example-platform", Tier::Free));
        let err = dispatcher
            .dispatch(&session, &gate(), recon(), &categories)
            .await
            .unwrap_err();

        assert!(matches!(err, ResearchError::QuotaExceeded { used: 3, cap: 3, .. }));
        assert_eq!(session.usage().get(), 3);
    }
}
