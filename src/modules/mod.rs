//! Analysis modules and the recon context they consume

mod auth_bypass;
mod business_logic;
mod crypto;
mod idor;
mod model;
mod recon;
mod registry;
mod runner;

pub use auth_bypass::AuthBypassModule;
pub use business_logic::BusinessLogicModule;
pub use crypto::CryptoSpecificModule;
pub use idor::IdorModule;
pub use model::{ModelBackedModule, ModelClient};
pub use recon::{
    HIGH_RELEVANCE_STARS, MIN_TOOL_STARS, ReconContext, ReconGatherer, ReconIntel, ReconSource,
    Relevance, RepositoryHit, ToolRecommendation,
};
pub use registry::ModuleRegistry;
pub use runner::{AnalysisModule, validate_target};
