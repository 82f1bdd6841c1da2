//! bountyhub - vulnerability research orchestration
//!
//! Given a target and a set of vulnerability categories, bountyhub fans work
//! out to analysis modules, scores what they find, optionally confirms the
//! strongest findings in an isolated sandbox, generates tool-ready payload
//! templates and renders a deterministic report.
//!
//! ## Flow
//!
//! 1. [`Orchestrator::open_session`] creates a [`Session`], the quota and
//!    audit scope for one target.
//! 2. [`Orchestrator::run`] validates a [`ResearchRequest`], checks quota,
//!    gathers recon and dispatches modules concurrently.
//! 3. After every module has finished, findings are scored, confirmed,
//!    turned into payloads and rendered into a [`report::Report`].
//!
//! Entitlement tiers are resolved by the caller; the command-line entry point,
//! model hosting and billing live outside this crate.

pub mod config;
pub mod domain;
pub mod error;
pub mod modules;
pub mod orchestrator;
pub mod payload;
pub mod quota;
pub mod report;
pub mod retry;
pub mod sandbox;
pub mod scoring;
pub mod telemetry;

pub use domain::*;
pub use error::{
    ConfigError, ModuleFailure, RequestError, ResearchError, SandboxError, UpstreamNetworkError,
};
pub use orchestrator::Orchestrator;
