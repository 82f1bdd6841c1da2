//! Analysis module contract

use async_trait::async_trait;

use super::ReconContext;
use crate::domain::{Category, VulnerabilityFinding};
use crate::error::ModuleFailure;

/// One category of vulnerability analysis.
///
/// Implementations must be cheap to share: the registry hands out
/// `Arc<dyn AnalysisModule>` and the dispatcher may run several modules
/// against the same recon context at once.
#[async_trait]
pub trait AnalysisModule: Send + Sync {
    /// Stable module ID, recorded on every finding it emits
    fn id(&self) -> &str;

    /// Category this module is registered under
    fn category(&self) -> Category;

    /// Attack vectors this module covers, listed in the report
    fn attack_vectors(&self) -> Vec<String> {
        Vec::new()
    }

    /// Analyse `target` using the gathered recon context.
    ///
    /// Returning an error is not fatal to the session: the dispatcher records
    /// the failure and drops this module's output.
    async fn analyze(
        &self,
        target: &str,
        recon: &ReconContext,
    ) -> Result<Vec<VulnerabilityFinding>, ModuleFailure>;
}

/// Reject target identifiers no module can reasonably scope
pub fn validate_target(target: &str) -> Result<(), ModuleFailure> {
    let trimmed = target.trim();
    if trimmed.is_empty() {
        return Err(ModuleFailure::MalformedTarget("empty target".to_string()));
    }
    if trimmed.chars().any(|c| c.is_control() || c.is_whitespace()) {
        return Err(ModuleFailure::MalformedTarget(format!(
            "target '{}' contains whitespace or control characters",
            trimmed.escape_default()
        )));
    }
    Ok(())
}

/// Lower-cased words of a path or parameter name, split on separators and
/// camelCase boundaries
pub(crate) fn name_tokens(name: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut prev_lower = false;

    for c in name.chars() {
        if !c.is_alphanumeric() {
            if !current.is_empty() {
                tokens.push(std::mem::take(&mut current));
            }
            prev_lower = false;
            continue;
        }
        if c.is_uppercase() && prev_lower && !current.is_empty() {
            tokens.push(std::mem::take(&mut current));
        }
        prev_lower = c.is_lowercase() || c.is_ascii_digit();
        current.extend(c.to_lowercase());
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}
