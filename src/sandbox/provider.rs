//! Contract with the isolated-execution provider

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{ConfirmationScript, ResourceLimits};
use crate::domain::FindingId;
use crate::error::SandboxError;

/// Opaque reference to a provisioned environment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SandboxHandle {
    pub id: String,
}

impl SandboxHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

/// Result of running a confirmation script
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    pub exit_code: i32,
    /// Candidate IDs the script reproduced
    pub confirmed: Vec<FindingId>,
    #[serde(default)]
    pub output: String,
}

#[async_trait]
pub trait SandboxProvider: Send + Sync {
    async fn provision(&self, limits: &ResourceLimits) -> Result<SandboxHandle, SandboxError>;

    async fn execute(
        &self,
        handle: &SandboxHandle,
        script: &ConfirmationScript,
        timeout: Duration,
    ) -> Result<ExecutionOutcome, SandboxError>;

    /// Must release the environment. Errors are logged by the runner and
    /// never block the session.
    async fn teardown(&self, handle: &SandboxHandle) -> Result<(), SandboxError>;
}
