//! Isolated confirmation of candidate findings (premium and enterprise)

mod job;
mod provider;
mod runner;
mod script;

pub use job::{ConfirmationStatus, ResourceLimits, SandboxJob, SandboxState, SandboxSummary};
pub use provider::{ExecutionOutcome, SandboxHandle, SandboxProvider};
pub use runner::{PROVISION_ATTEMPTS, SandboxJobHandle, SandboxRunner};
pub use script::ConfirmationScript;
