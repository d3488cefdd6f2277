//! Module registry keyed by a closed capability set.
//!
//! Each capability has exactly one handle variant, so lookups return the concrete type and a
//! mismatched registration cannot compile. Free-form extensions go through
//! [`ModuleRegistry::register_custom_module`] and are filtered by [`CustomModule::kind`].

use crate::error::SallieResult;
use crate::memory::MemoryManager;
use crate::nlp::{LanguageAnalysis, LanguageAnalyzer};
use crate::response::ResponseRequest;
use async_trait::async_trait;
use sallie_evolution::{PersonalityEvolutionSystem, ValueSystem};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    LanguageAnalysis,
    Memory,
    Personality,
    Research,
    ResponseGeneration,
    Values,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::LanguageAnalysis => "language_analysis",
            Capability::Memory => "memory",
            Capability::Personality => "personality",
            Capability::Research => "research",
            Capability::ResponseGeneration => "response_generation",
            Capability::Values => "values",
        }
    }
}

/// Supplies supporting facts for a query.
#[async_trait]
pub trait ResearchProvider: Send + Sync {
    async fn research(&self, query: &str, analysis: &LanguageAnalysis) -> SallieResult<Vec<String>>;
}

/// Produces the reply text for one interaction.
#[async_trait]
pub trait ResponseGenerator: Send + Sync {
    async fn generate(&self, request: &ResponseRequest<'_>) -> SallieResult<String>;
}

/// Extension registered under a free-form id.
pub trait CustomModule: Send + Sync {
    /// Grouping used by [`ModuleRegistry::custom_modules_of_kind`].
    fn kind(&self) -> &str;

    fn description(&self) -> String {
        self.kind().to_string()
    }
}

#[derive(Clone)]
pub enum ModuleHandle {
    LanguageAnalysis(Arc<dyn LanguageAnalyzer>),
    Memory(Arc<MemoryManager>),
    Personality(Arc<PersonalityEvolutionSystem>),
    Research(Arc<dyn ResearchProvider>),
    ResponseGeneration(Arc<dyn ResponseGenerator>),
    Values(Arc<ValueSystem>),
}

impl ModuleHandle {
    pub fn capability(&self) -> Capability {
        match self {
            ModuleHandle::LanguageAnalysis(_) => Capability::LanguageAnalysis,
            ModuleHandle::Memory(_) => Capability::Memory,
            ModuleHandle::Personality(_) => Capability::Personality,
            ModuleHandle::Research(_) => Capability::Research,
            ModuleHandle::ResponseGeneration(_) => Capability::ResponseGeneration,
            ModuleHandle::Values(_) => Capability::Values,
        }
    }
}

impl std::fmt::Debug for ModuleHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ModuleHandle({})", self.capability().as_str())
    }
}

#[derive(Default)]
pub struct ModuleRegistry {
    modules: HashMap<Capability, ModuleHandle>,
    custom: HashMap<String, Arc<dyn CustomModule>>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a module, replacing any previous module for the same capability.
    pub fn register_module(&mut self, handle: ModuleHandle) {
        let capability = handle.capability();
        if self.modules.insert(capability, handle).is_some() {
            info!(target: "sallie::modules", capability = capability.as_str(), "module replaced");
        } else {
            debug!(target: "sallie::modules", capability = capability.as_str(), "module registered");
        }
    }

    /// Builder form of [`Self::register_module`].
    pub fn with(mut self, handle: ModuleHandle) -> Self {
        self.register_module(handle);
        self
    }

    pub fn register_custom_module(&mut self, id: impl Into<String>, module: Arc<dyn CustomModule>) {
        let id = id.into();
        if self.custom.insert(id.clone(), module).is_some() {
            info!(target: "sallie::modules", id = %id, "custom module replaced");
        }
    }

    pub fn get(&self, capability: Capability) -> Option<&ModuleHandle> {
        self.modules.get(&capability)
    }

    pub fn has(&self, capability: Capability) -> bool {
        self.modules.contains_key(&capability)
    }

    /// Registered capabilities, sorted.
    pub fn capabilities(&self) -> Vec<Capability> {
        let mut out: Vec<Capability> = self.modules.keys().copied().collect();
        out.sort();
        out
    }

    pub fn language_analyzer(&self) -> Option<Arc<dyn LanguageAnalyzer>> {
        match self.modules.get(&Capability::LanguageAnalysis) {
            Some(ModuleHandle::LanguageAnalysis(m)) => Some(Arc::clone(m)),
            _ => None,
        }
    }

    pub fn memory(&self) -> Option<Arc<MemoryManager>> {
        match self.modules.get(&Capability::Memory) {
            Some(ModuleHandle::Memory(m)) => Some(Arc::clone(m)),
            _ => None,
        }
    }

    pub fn personality(&self) -> Option<Arc<PersonalityEvolutionSystem>> {
        match self.modules.get(&Capability::Personality) {
            Some(ModuleHandle::Personality(m)) => Some(Arc::clone(m)),
            _ => None,
        }
    }

    pub fn research(&self) -> Option<Arc<dyn ResearchProvider>> {
        match self.modules.get(&Capability::Research) {
            Some(ModuleHandle::Research(m)) => Some(Arc::clone(m)),
            _ => None,
        }
    }

    pub fn response_generator(&self) -> Option<Arc<dyn ResponseGenerator>> {
        match self.modules.get(&Capability::ResponseGeneration) {
            Some(ModuleHandle::ResponseGeneration(m)) => Some(Arc::clone(m)),
            _ => None,
        }
    }

    pub fn values(&self) -> Option<Arc<ValueSystem>> {
        match self.modules.get(&Capability::Values) {
            Some(ModuleHandle::Values(m)) => Some(Arc::clone(m)),
            _ => None,
        }
    }

    pub fn custom(&self, id: &str) -> Option<Arc<dyn CustomModule>> {
        self.custom.get(id).cloned()
    }

    /// Custom module ids, sorted.
    pub fn custom_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.custom.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// `(id, module)` pairs whose kind equals `kind`, sorted by id.
    pub fn custom_modules_of_kind(&self, kind: &str) -> Vec<(String, Arc<dyn CustomModule>)> {
        let mut out: Vec<(String, Arc<dyn CustomModule>)> = self
            .custom
            .iter()
            .filter(|(_, m)| m.kind() == kind)
            .map(|(id, m)| (id.clone(), Arc::clone(m)))
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nlp::KeywordAnalyzer;

    struct Skill(&'static str);

    impl CustomModule for Skill {
        fn kind(&self) -> &str {
            self.0
        }
    }

    #[test]
    fn test_typed_lookup() {
        let mut registry = ModuleRegistry::new();
        assert!(registry.language_analyzer().is_none());
        registry.register_module(ModuleHandle::LanguageAnalysis(Arc::new(KeywordAnalyzer::new())));
        registry.register_module(ModuleHandle::Values(Arc::new(ValueSystem::sallie_default())));

        assert!(registry.language_analyzer().is_some());
        assert!(registry.values().is_some());
        assert!(registry.memory().is_none());
        assert_eq!(
            registry.capabilities(),
            vec![Capability::LanguageAnalysis, Capability::Values]
        );
    }

    #[test]
    fn test_registration_overwrites() {
        let mut registry = ModuleRegistry::new();
        let first = Arc::new(PersonalityEvolutionSystem::with_defaults());
        let second = Arc::new(PersonalityEvolutionSystem::with_defaults());
        registry.register_module(ModuleHandle::Personality(first.clone()));
        registry.register_module(ModuleHandle::Personality(second.clone()));
        let current = registry.personality().unwrap();
        assert!(Arc::ptr_eq(&current, &second));
        assert!(!Arc::ptr_eq(&current, &first));
    }

    #[test]
    fn test_custom_modules_by_kind() {
        let mut registry = ModuleRegistry::new();
        registry.register_custom_module("weather", Arc::new(Skill("skill")));
        registry.register_custom_module("jokes", Arc::new(Skill("skill")));
        registry.register_custom_module("panel", Arc::new(Skill("widget")));
        registry.register_custom_module("panel", Arc::new(Skill("skill")));

        let skills: Vec<String> = registry
            .custom_modules_of_kind("skill")
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        assert_eq!(skills, vec!["jokes", "panel", "weather"]);
        assert!(registry.custom_modules_of_kind("widget").is_empty());
        assert_eq!(registry.custom("jokes").unwrap().description(), "skill");
        assert_eq!(registry.custom_ids().len(), 3);
    }
}
