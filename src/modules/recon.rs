//! Recon context shared by every module in a run
//!
//! Two inputs feed it: endpoints the caller already observed (carried on the
//! request) and intel from pluggable [`ReconSource`]s. Sources are queried
//! concurrently; a source that fails after retries is logged and skipped.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::domain::{Category, ObservedEndpoint};
use crate::error::UpstreamNetworkError;
use crate::quota::SourceLimiter;
use crate::retry::{RetryPolicy, retry_with_backoff};

/// Repositories below this star count are not recommended
pub const MIN_TOOL_STARS: u32 = 50;
/// Repositories above this star count are marked high relevance
pub const HIGH_RELEVANCE_STARS: u32 = 200;

/// A public repository surfaced by a tool-discovery source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryHit {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub stars: u32,
}

/// What one recon source returned for a target
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReconIntel {
    pub source: String,
    pub summary: Option<String>,
    #[serde(default)]
    pub references: Vec<String>,
    #[serde(default)]
    pub repositories: Vec<RepositoryHit>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Relevance {
    Medium,
    High,
}

impl Relevance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Relevance::High => "high",
            Relevance::Medium => "medium",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolRecommendation {
    pub name: String,
    pub description: String,
    pub stars: u32,
    pub relevance: Relevance,
}

/// A threat-intel, tool-discovery or public-intel provider
#[async_trait]
pub trait ReconSource: Send + Sync {
    fn id(&self) -> &str;

    async fn gather(
        &self,
        target: &str,
        categories: &[Category],
    ) -> Result<ReconIntel, UpstreamNetworkError>;
}

/// Read-only input handed to [`super::AnalysisModule::analyze`]
#[derive(Debug, Clone, Default)]
pub struct ReconContext {
    target: String,
    categories: Vec<Category>,
    observations: Vec<ObservedEndpoint>,
    intel: Vec<ReconIntel>,
}

impl ReconContext {
    pub fn new(
        target: impl Into<String>,
        categories: Vec<Category>,
        observations: Vec<ObservedEndpoint>,
    ) -> Self {
        Self {
            target: target.into(),
            categories,
            observations,
            intel: Vec::new(),
        }
    }

    pub fn with_intel(mut self, intel: ReconIntel) -> Self {
        self.intel.push(intel);
        self
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    pub fn observations(&self) -> &[ObservedEndpoint] {
        &self.observations
    }

    pub fn intel(&self) -> &[ReconIntel] {
        &self.intel
    }

    /// IDs of the sources that contributed intel
    pub fn sources(&self) -> Vec<&str> {
        self.intel.iter().map(|i| i.source.as_str()).collect()
    }

    /// Observations grouped by route (path without query), sorted by route
    pub fn by_route(&self) -> BTreeMap<&str, Vec<&ObservedEndpoint>> {
        let mut routes: BTreeMap<&str, Vec<&ObservedEndpoint>> = BTreeMap::new();
        for obs in &self.observations {
            routes.entry(obs.route()).or_default().push(obs);
        }
        routes
    }

    /// Repositories worth recommending, most starred first.
    /// Duplicates reported by several sources are listed once.
    pub fn tool_recommendations(&self) -> Vec<ToolRecommendation> {
        let mut by_name: BTreeMap<&str, &RepositoryHit> = BTreeMap::new();
        for repo in self.intel.iter().flat_map(|i| i.repositories.iter()) {
            if repo.stars <= MIN_TOOL_STARS {
                continue;
            }
            let entry = by_name.entry(repo.name.as_str()).or_insert(repo);
            if repo.stars > entry.stars {
                *entry = repo;
            }
        }

        let mut tools: Vec<ToolRecommendation> = by_name
            .into_values()
            .map(|repo| ToolRecommendation {
                name: repo.name.clone(),
                description: repo.description.clone(),
                stars: repo.stars,
                relevance: if repo.stars > HIGH_RELEVANCE_STARS {
                    Relevance::High
                } else {
                    Relevance::Medium
                },
            })
            .collect();
        tools.sort_by(|a, b| b.stars.cmp(&a.stars).then_with(|| a.name.cmp(&b.name)));
        tools
    }
}

/// Queries every configured source once per run
pub struct ReconGatherer {
    sources: Vec<Arc<dyn ReconSource>>,
    limiter: SourceLimiter,
    retry: RetryPolicy,
}

impl ReconGatherer {
    pub fn new(sources: Vec<Arc<dyn ReconSource>>, limiter: SourceLimiter, retry: RetryPolicy) -> Self {
        Self {
            sources,
            limiter,
            retry,
        }
    }

    pub async fn gather(
        &self,
        session_id: &str,
        target: &str,
        categories: &[Category],
        observations: Vec<ObservedEndpoint>,
    ) -> ReconContext {
        let lookups = self.sources.iter().map(|source| async move {
            self.limiter.wait(source.id()).await;
            let result = retry_with_backoff(&self.retry, source.id(), || {
                source.gather(target, categories)
            })
            .await;
            (source.id().to_string(), result)
        });

        let mut context = ReconContext::new(target, categories.to_vec(), observations);
        for (source_id, result) in join_all(lookups).await {
            match result {
                Ok(mut intel) => {
                    debug!(
                        session_id,
                        source = %source_id,
                        repositories = intel.repositories.len(),
                        "Recon source answered"
                    );
                    if intel.source.is_empty() {
                        intel.source = source_id;
                    }
                    context = context.with_intel(intel);
                }
                Err(e) => {
                    warn!(session_id, source = %source_id, error = %e, "Recon source skipped");
                }
            }
        }
        context
    }
}
