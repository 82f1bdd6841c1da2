//! Error taxonomy
//!
//! Only [`ResearchError::QuotaExceeded`] and [`ResearchError::AuthorizationMissing`]
//! abort a request once it is accepted. Module and sandbox errors are recovered
//! by omission and surface in the report instead.

use std::time::Duration;

use thiserror::Error;

use crate::domain::Tier;

/// Request-level failures returned by the orchestrator
#[derive(Debug, Error)]
pub enum ResearchError {
    #[error("Quota exceeded for {tier} session: {used} of {cap} module invocations used")]
    QuotaExceeded { tier: Tier, used: u32, cap: u32 },

    #[error("Scope authorization missing for target '{0}'")]
    AuthorizationMissing(String),

    #[error("Request does not match session: {0}")]
    SessionMismatch(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Rejections raised while constructing a [`crate::ResearchRequest`]
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RequestError {
    #[error("target must not be empty")]
    EmptyTarget,

    #[error("at least one vulnerability category is required")]
    NoCategories,

    #[error("sandbox confirmation is not available on the free tier")]
    SandboxOnFreeTier,
}

/// Configuration validation failures
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("{field} must be within {min}..={max}, got {value}")]
    OutOfRange {
        field: &'static str,
        min: f64,
        max: f64,
        value: f64,
    },

    #[error("no payload formats configured")]
    NoPayloadFormats,

    #[error("unknown severity '{0}'")]
    UnknownSeverity(String),
}

/// Transient network failures inside a module; retried before surfacing
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UpstreamNetworkError {
    #[error("connection to {host} failed: {reason}")]
    Connect { host: String, reason: String },

    #[error("upstream {host} returned status {status}")]
    Status { host: String, status: u16 },

    #[error("upstream {host} rate limited the request")]
    RateLimited { host: String },

    #[error("request to {host} timed out")]
    Timeout { host: String },
}

impl UpstreamNetworkError {
    /// 4xx responses other than 429 are not worth retrying
    pub fn is_retryable(&self) -> bool {
        match self {
            UpstreamNetworkError::Status { status, .. } => *status >= 500,
            _ => true,
        }
    }
}

/// A single module invocation failed; the session continues without it
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ModuleFailure {
    #[error("module timed out after {0:?}")]
    Timeout(Duration),

    #[error("upstream dependency failed after {attempts} attempts: {source}")]
    Upstream {
        attempts: u32,
        #[source]
        source: UpstreamNetworkError,
    },

    #[error("malformed target: {0}")]
    MalformedTarget(String),

    #[error("module panicked: {0}")]
    Panicked(String),

    #[error("{0}")]
    Internal(String),
}

/// Failures reported by the isolated-execution provider
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SandboxError {
    #[error("environment provisioning failed: {0}")]
    Provision(String),

    #[error("confirmation run failed: {0}")]
    Execution(String),

    #[error("confirmation run exceeded {0:?}")]
    Timeout(Duration),

    #[error("environment teardown failed: {0}")]
    Teardown(String),

    #[error("invalid sandbox transition {from} -> {to}")]
    InvalidTransition { from: String, to: String },
}
