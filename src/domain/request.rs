//! Inbound research request and the recon observations it may carry

use serde::{Deserialize, Serialize};

use super::{Category, Tier};
use crate::error::RequestError;

/// An endpoint the caller already observed while exploring the target
/// (e.g. exported from a proxy history). Modules mine these for patterns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservedEndpoint {
    pub method: String,
    /// Path including any query string, e.g. `/api/v2/orders/1042?expand=items`
    pub path: String,
    /// Body/form parameters in observed order; duplicates are kept
    #[serde(default)]
    pub params: Vec<(String, String)>,
    /// Response status code, when known
    pub status: Option<u16>,
    /// Principal that owned the returned object, when known
    pub owner: Option<String>,
}

impl ObservedEndpoint {
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into().to_uppercase(),
            path: path.into(),
            params: Vec::new(),
            status: None,
            owner: None,
        }
    }

    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((name.into(), value.into()));
        self
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    /// Path without the query string
    pub fn route(&self) -> &str {
        self.path.split('?').next().unwrap_or(&self.path)
    }

    /// Decoded query-string pairs followed by body parameters, duplicates
    /// preserved
    pub fn all_params(&self) -> Vec<(String, String)> {
        let mut out: Vec<(String, String)> = match self.path.split_once('?') {
            Some((_, query)) => url::form_urlencoded::parse(query.as_bytes())
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect(),
            None => Vec::new(),
        };
        out.extend(self.params.iter().cloned());
        out
    }

    pub fn is_success(&self) -> bool {
        matches!(self.status, Some(200..=299))
    }
}

/// A validated request to research one target.
///
/// Construct through [`ResearchRequest::builder`]; invalid combinations are
/// rejected by [`ResearchRequestBuilder::build`]. Deserialization goes
/// through the same builder.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "RequestFields")]
pub struct ResearchRequest {
    target: String,
    categories: Vec<Category>,
    tier: Tier,
    sandbox_opt_in: bool,
    authorized: bool,
    observations: Vec<ObservedEndpoint>,
}

/// Wire shape of [`ResearchRequest`] before validation
#[derive(Deserialize)]
struct RequestFields {
    target: String,
    categories: Vec<Category>,
    tier: Tier,
    #[serde(default)]
    sandbox_opt_in: bool,
    #[serde(default)]
    authorized: bool,
    #[serde(default)]
    observations: Vec<ObservedEndpoint>,
}

impl TryFrom<RequestFields> for ResearchRequest {
    type Error = RequestError;

    fn try_from(fields: RequestFields) -> Result<Self, Self::Error> {
        let mut builder = ResearchRequest::builder(fields.target)
            .tier(fields.tier)
            .sandbox(fields.sandbox_opt_in)
            .authorized(fields.authorized);
        for category in fields.categories {
            builder = builder.category(category);
        }
        for endpoint in fields.observations {
            builder = builder.observe(endpoint);
        }
        builder.build()
    }
}

impl ResearchRequest {
    pub fn builder(target: impl Into<String>) -> ResearchRequestBuilder {
        ResearchRequestBuilder {
            target: target.into(),
            categories: Vec::new(),
            tier: Tier::Free,
            sandbox_opt_in: false,
            authorized: false,
            observations: Vec::new(),
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// Requested categories in request order, without duplicates
    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    pub fn tier(&self) -> Tier {
        self.tier
    }

    pub fn sandbox_opt_in(&self) -> bool {
        self.sandbox_opt_in
    }

    /// Scope authorization confirmed by the caller
    pub fn is_authorized(&self) -> bool {
        self.authorized
    }

    pub fn observations(&self) -> &[ObservedEndpoint] {
        &self.observations
    }
}

pub struct ResearchRequestBuilder {
    target: String,
    categories: Vec<Category>,
    tier: Tier,
    sandbox_opt_in: bool,
    authorized: bool,
    observations: Vec<ObservedEndpoint>,
}

impl ResearchRequestBuilder {
    pub fn category(mut self, category: Category) -> Self {
        if !self.categories.contains(&category) {
            self.categories.push(category);
        }
        self
    }

    /// Add categories by name; blank names are ignored
    pub fn categories<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for name in names {
            if let Some(category) = Category::parse(name.as_ref()) {
                self = self.category(category);
            }
        }
        self
    }

    pub fn tier(mut self, tier: Tier) -> Self {
        self.tier = tier;
        self
    }

    pub fn sandbox(mut self, opt_in: bool) -> Self {
        self.sandbox_opt_in = opt_in;
        self
    }

    pub fn authorized(mut self, authorized: bool) -> Self {
        self.authorized = authorized;
        self
    }

    pub fn observe(mut self, endpoint: ObservedEndpoint) -> Self {
        self.observations.push(endpoint);
        self
    }

    pub fn build(self) -> Result<ResearchRequest, RequestError> {
        let target = self.target.trim().to_string();
        if target.is_empty() {
            return Err(RequestError::EmptyTarget);
        }
        if self.categories.is_empty() {
            return Err(RequestError::NoCategories);
        }
        if self.sandbox_opt_in && !self.tier.allows_sandbox() {
            return Err(RequestError::SandboxOnFreeTier);
        }

        Ok(ResearchRequest {
            target,
            categories: self.categories,
            tier: self.tier,
            sandbox_opt_in: self.sandbox_opt_in,
            authorized: self.authorized,
            observations: self.observations,
        })
    }
}
