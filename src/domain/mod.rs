//! Core domain types for bountyhub

mod artifact;
mod audit;
mod category;
mod finding;
mod request;
mod score;
mod session;
mod tier;

pub use artifact::{InsertionPoint, PayloadArtifact, ToolFormat};
pub use audit::{AuditEvent, AuditKind};
pub use category::Category;
pub use finding::{EnumerationStrategy, FindingId, Severity, VulnerabilityFinding, evidence_keys};
pub use request::{ObservedEndpoint, ResearchRequest, ResearchRequestBuilder};
pub use score::{BountyRange, ConfidenceScore, Currency};
pub use session::{
    ModuleOutcome, ModuleStatus, ResearchState, Session, SessionId, SessionRecord, UsageCounter,
};
pub use tier::{Tier, TierCell};
