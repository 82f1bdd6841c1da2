//! Adapter that turns a hosted language model into an analysis module
//!
//! The orchestrator never talks to the model directly: a [`ModelBackedModule`]
//! is registered like any other module, so the reasoning backend can be
//! swapped without touching dispatch.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use super::runner::{AnalysisModule, validate_target};
use super::ReconContext;
use crate::domain::{Category, Severity, VulnerabilityFinding};
use crate::error::{ModuleFailure, UpstreamNetworkError};
use crate::retry::{RetryPolicy, retry_with_backoff};

/// Completion endpoint of a hosted model
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, UpstreamNetworkError>;
}

/// Shape the model is asked to answer in
#[derive(Debug, Deserialize)]
struct ModelFinding {
    title: String,
    severity: String,
    confidence: f64,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    poc: Option<String>,
    #[serde(default)]
    evidence: BTreeMap<String, String>,
}

pub struct ModelBackedModule {
    id: String,
    category: Category,
    client: Arc<dyn ModelClient>,
    retry: RetryPolicy,
    attack_vectors: Vec<String>,
}

impl ModelBackedModule {
    pub fn new(id: impl Into<String>, category: Category, client: Arc<dyn ModelClient>) -> Self {
        Self {
            id: id.into(),
            category,
            client,
            retry: RetryPolicy::default(),
            attack_vectors: Vec::new(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_attack_vector(mut self, vector: impl Into<String>) -> Self {
        self.attack_vectors.push(vector.into());
        self
    }

    fn prompt(&self, target: &str, recon: &ReconContext) -> String {
        let mut prompt = format!(
            "Target: {target}\nCategory: {}\nAnswer with a JSON array of objects with keys \
             title, severity (LOW|MEDIUM|HIGH|CRITICAL), confidence (0..1), description, poc, evidence.\n",
            self.category.label()
        );
        if !recon.observations().is_empty() {
            prompt.push_str("Observed endpoints:\n");
            for obs in recon.observations() {
                let status = obs.status.map(|s| s.to_string()).unwrap_or_else(|| "-".to_string());
                prompt.push_str(&format!("- {} {} -> {status}\n", obs.method, obs.path));
            }
        }
        for intel in recon.intel() {
            if let Some(summary) = &intel.summary {
                prompt.push_str(&format!("Intel ({}): {summary}\n", intel.source));
            }
        }
        prompt
    }

    fn parse(&self, raw: &str) -> Result<Vec<VulnerabilityFinding>, ModuleFailure> {
        // Models tend to wrap the array in prose or code fences
        let json = match (raw.find('['), raw.rfind(']')) {
            (Some(start), Some(end)) if start < end => &raw[start..=end],
            _ => {
                return Err(ModuleFailure::Internal(
                    "model response contained no JSON array".to_string(),
                ));
            }
        };

        let parsed: Vec<ModelFinding> = serde_json::from_str(json)
            .map_err(|e| ModuleFailure::Internal(format!("unparseable model response: {e}")))?;

        Ok(parsed
            .into_iter()
            .map(|m| {
                let severity = Severity::from_str(&m.severity).unwrap_or(Severity::Low);
                let mut finding =
                    VulnerabilityFinding::new(self.category.clone(), m.title, severity, m.confidence)
                        .with_module(self.id.clone())
                        .with_source(self.id.clone());
                finding.description = m.description;
                finding.poc_template = m.poc;
                finding.evidence = m.evidence;
                finding
            })
            .collect())
    }
}

#[async_trait]
impl AnalysisModule for ModelBackedModule {
    fn id(&self) -> &str {
        &self.id
    }

    fn category(&self) -> Category {
        self.category.clone()
    }

    fn attack_vectors(&self) -> Vec<String> {
        self.attack_vectors.clone()
    }

    async fn analyze(
        &self,
        target: &str,
        recon: &ReconContext,
    ) -> Result<Vec<VulnerabilityFinding>, ModuleFailure> {
        validate_target(target)?;

        let prompt = self.prompt(target, recon);
        let raw = retry_with_backoff(&self.retry, &self.id, || self.client.complete(&prompt)).await?;

        let findings = self.parse(&raw)?;
        debug!(module = %self.id, findings = findings.len(), "Model analysis parsed");
        Ok(findings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    struct ScriptedClient {
        replies: Mutex<Vec<Result<String, UpstreamNetworkError>>>,
    }

    #[async_trait]
    impl ModelClient for ScriptedClient {
        async fn complete(&self, _prompt: &str) -> Result<String, UpstreamNetworkError> {
            self.replies.lock().unwrap().remove(0)
        }
    }

    fn module(replies: Vec<Result<String, UpstreamNetworkError>>) -> ModelBackedModule {
        ModelBackedModule::new(
            "model-graphql",
            Category::Custom("graphql".into()),
            Arc::new(ScriptedClient {
                replies: Mutex::new(replies),
            }),
        )
        .with_retry(
            RetryPolicy::default()
                .with_initial_backoff(Duration::from_millis(1))
                .without_jitter(),
        )
    }

    fn recon() -> ReconContext {
        ReconContext::new("example-platform", Vec::new(), Vec::new())
    }

    #[tokio::test]
    async fn test_parses_fenced_reply_after_transient_error() {
        let reply = "Here you go:\n```json\n[{\"title\": \"Introspection enabled\", \"severity\": \"medium\", \"confidence\": 0.8, \"poc\": \"query { __schema { types { name } } }\"}]\n```";
        let m = module(vec![
            Err(UpstreamNetworkError::Timeout {
                host: "model.example".into(),
            }),
            Ok(reply.to_string()),
        ]);

        let findings = m.analyze("example-platform", &recon()).await.unwrap();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].severity, Severity::Medium);
        assert_eq!(findings[0].module_id, "model-graphql");
        assert!(findings[0].poc_template.is_some());
    }

    #[tokio::test]
    async fn test_prose_only_reply_is_module_failure() {
        let m = module(vec![Ok("I could not find anything.".to_string())]);
        let err = m.analyze("example-platform", &recon()).await.unwrap_err();
        assert!(matches!(err, ModuleFailure::Internal(_)));
    }
}
