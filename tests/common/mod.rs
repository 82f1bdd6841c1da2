//! Shared fakes for orchestrator integration tests

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use bountyhub::config::OrchestratorConfig;
use bountyhub::modules::{AnalysisModule, ModuleRegistry, ReconContext};
use bountyhub::sandbox::{
    ConfirmationScript, ExecutionOutcome, ResourceLimits, SandboxHandle, SandboxProvider,
};
use bountyhub::{
    Category, ModuleFailure, Orchestrator, ResearchRequest, SandboxError, Severity, Tier,
    VulnerabilityFinding, evidence_keys,
};

pub const TARGET: &str = "example-platform";

/// Module that returns a fixed result and counts invocations
pub struct ScriptedModule {
    id: String,
    category: Category,
    result: Result<Vec<VulnerabilityFinding>, ModuleFailure>,
    pub calls: Arc<AtomicU32>,
}

impl ScriptedModule {
    pub fn returning(id: &str, category: Category, findings: Vec<VulnerabilityFinding>) -> Self {
        Self {
            id: id.to_string(),
            category,
            result: Ok(findings),
            calls: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn failing(id: &str, category: Category, failure: ModuleFailure) -> Self {
        Self {
            id: id.to_string(),
            category,
            result: Err(failure),
            calls: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn counter(&self) -> Arc<AtomicU32> {
        Arc::clone(&self.calls)
    }
}

#[async_trait]
impl AnalysisModule for ScriptedModule {
    fn id(&self) -> &str {
        &self.id
    }

    fn category(&self) -> Category {
        self.category.clone()
    }

    fn attack_vectors(&self) -> Vec<String> {
        vec![format!("{} scripted vector", self.id)]
    }

    async fn analyze(
        &self,
        _target: &str,
        _recon: &ReconContext,
    ) -> Result<Vec<VulnerabilityFinding>, ModuleFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.result.clone()
    }
}

/// IDOR finding with the evidence the payload generator needs
pub fn idor_finding(title: &str, confidence: f64) -> VulnerabilityFinding {
    VulnerabilityFinding::new(Category::Idor, title, Severity::High, confidence)
        .with_evidence(evidence_keys::ENDPOINT, "/api/v2/orders/{order_id}")
        .with_evidence(evidence_keys::METHOD, "GET")
        .with_evidence(evidence_keys::PARAMETERS, "order_id")
        .with_evidence(evidence_keys::SAMPLE_VALUE, "1042")
        .with_evidence(evidence_keys::OWNER_FIELD, "owner_id")
        .with_poc("GET /api/v2/orders/{order_id} as a second account")
}

pub fn finding(category: Category, title: &str, severity: Severity, confidence: f64) -> VulnerabilityFinding {
    VulnerabilityFinding::new(category, title, severity, confidence)
        .with_evidence(evidence_keys::ENDPOINT, "/api/account")
        .with_evidence(evidence_keys::METHOD, "POST")
        .with_evidence(evidence_keys::PARAMETERS, "amount")
}

pub fn request(tier: Tier, categories: &[&str]) -> ResearchRequest {
    ResearchRequest::builder(TARGET)
        .categories(categories.iter().copied())
        .tier(tier)
        .authorized(true)
        .build()
        .expect("valid request")
}

pub fn sandbox_request(tier: Tier, categories: &[&str]) -> ResearchRequest {
    ResearchRequest::builder(TARGET)
        .categories(categories.iter().copied())
        .tier(tier)
        .sandbox(true)
        .authorized(true)
        .build()
        .expect("valid request")
}

pub fn orchestrator(registry: ModuleRegistry, provider: Option<Arc<dyn SandboxProvider>>) -> Orchestrator {
    Orchestrator::new(OrchestratorConfig::default(), registry, provider, Vec::new())
        .expect("default config is valid")
}

pub fn registry(modules: Vec<ScriptedModule>) -> ModuleRegistry {
    let mut registry = ModuleRegistry::new();
    for module in modules {
        registry.register(Arc::new(module));
    }
    registry
}

/// How the fake provider's confirmation run ends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunBehavior {
    /// Exit 0, confirming only the first candidate
    ConfirmFirst,
    /// Report a provider-side timeout
    TimeOut,
    /// Exit non-zero
    Crash,
}

/// Sandbox provider with injectable faults and call counters
pub struct FaultyProvider {
    provision_failures: u32,
    behavior: RunBehavior,
    pub provisions: AtomicU32,
    pub executions: AtomicU32,
    pub teardowns: AtomicU32,
}

impl FaultyProvider {
    pub fn new(provision_failures: u32, behavior: RunBehavior) -> Self {
        Self {
            provision_failures,
            behavior,
            provisions: AtomicU32::new(0),
            executions: AtomicU32::new(0),
            teardowns: AtomicU32::new(0),
        }
    }

    pub fn provisions(&self) -> u32 {
        self.provisions.load(Ordering::SeqCst)
    }

    pub fn executions(&self) -> u32 {
        self.executions.load(Ordering::SeqCst)
    }

    pub fn teardowns(&self) -> u32 {
        self.teardowns.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SandboxProvider for FaultyProvider {
    async fn provision(&self, _limits: &ResourceLimits) -> Result<SandboxHandle, SandboxError> {
        let n = self.provisions.fetch_add(1, Ordering::SeqCst);
        if n < self.provision_failures {
            return Err(SandboxError::Provision("injected fault".to_string()));
        }
        Ok(SandboxHandle::new(format!("env-{n}")))
    }

    async fn execute(
        &self,
        _handle: &SandboxHandle,
        script: &ConfirmationScript,
        timeout: Duration,
    ) -> Result<ExecutionOutcome, SandboxError> {
        self.executions.fetch_add(1, Ordering::SeqCst);
        match self.behavior {
            RunBehavior::ConfirmFirst => Ok(ExecutionOutcome {
                exit_code: 0,
                confirmed: script.candidates.iter().take(1).cloned().collect(),
                output: String::new(),
            }),
            RunBehavior::TimeOut => Err(SandboxError::Timeout(timeout)),
            RunBehavior::Crash => Ok(ExecutionOutcome {
                exit_code: 137,
                confirmed: Vec::new(),
                output: "killed".to_string(),
            }),
        }
    }

    async fn teardown(&self, _handle: &SandboxHandle) -> Result<(), SandboxError> {
        self.teardowns.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
