//! Module registry keyed by vulnerability category.
//!
//! The registry is assembled once, before the orchestrator is built, and is
//! read-only afterwards: [`crate::Orchestrator::new`] takes it by value and
//! only ever hands out shared references to the registered modules.
//!
//! # Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use bountyhub::modules::ModuleRegistry;
//!
//! // Built-in IDOR, auth bypass, business logic and crypto modules
//! let mut registry = ModuleRegistry::with_defaults();
//!
//! // Operators may add modules for their own categories
//! registry.register(Arc::new(MyGraphqlModule::new()));
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use super::auth_bypass::AuthBypassModule;
use super::business_logic::BusinessLogicModule;
use super::crypto::CryptoSpecificModule;
use super::idor::IdorModule;
use super::runner::AnalysisModule;
use crate::domain::Category;

/// Lookup of analysis modules by the category they cover.
///
/// # Thread Safety
///
/// The registry is `Clone` and stores modules as `Arc<dyn AnalysisModule>`,
/// so a module can be shared between concurrent dispatches.
#[derive(Clone, Default)]
pub struct ModuleRegistry {
    /// Modules indexed by category (e.g. `Category::Idor` → `IdorModule`)
    modules: BTreeMap<Category, Arc<dyn AnalysisModule>>,
}

impl ModuleRegistry {
    /// Creates an empty registry.
    ///
    /// Use [`with_defaults()`](Self::with_defaults) for a registry
    /// pre-populated with the built-in modules.
    pub fn new() -> Self {
        Self {
            modules: BTreeMap::new(),
        }
    }

    /// Creates a registry with all built-in modules.
    ///
    /// # Registered Modules
    ///
    /// - `idor` → [`IdorModule`]
    /// - `auth_bypass` → [`AuthBypassModule`]
    /// - `business_logic` → [`BusinessLogicModule`]
    /// - `crypto_specific` → [`CryptoSpecificModule`]
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(IdorModule::new()));
        registry.register(Arc::new(AuthBypassModule::new()));
        registry.register(Arc::new(BusinessLogicModule::new()));
        registry.register(Arc::new(CryptoSpecificModule::new()));
        registry
    }

    /// Registers a module under [`AnalysisModule::category()`].
    ///
    /// A module already registered for the same category is replaced.
    pub fn register(&mut self, module: Arc<dyn AnalysisModule>) {
        self.modules.insert(module.category(), module);
    }

    /// Retrieves the module for a category.
    ///
    /// # Returns
    ///
    /// * `Some(Arc<dyn AnalysisModule>)` - The module if registered
    /// * `None` - If nothing covers that category
    pub fn get(&self, category: &Category) -> Option<Arc<dyn AnalysisModule>> {
        self.modules.get(category).cloned()
    }

    pub fn contains(&self, category: &Category) -> bool {
        self.modules.contains_key(category)
    }

    /// Registered categories in sorted order
    pub fn categories(&self) -> Vec<Category> {
        self.modules.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

impl std::fmt::Debug for ModuleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(self.modules.iter().map(|(c, m)| (c.as_str(), m.id())))
            .finish()
    }
}
