//! sallie-core: the companion's runtime core.
//!
//! ## Components
//!
//! - **Tasks** ([`TaskManager`]): priority queue with FIFO tie-break and a bounded finished ring.
//! - **Modules** ([`ModuleRegistry`]): one typed handle per [`Capability`] plus free-form
//!   custom modules.
//! - **Context** ([`ContextManager`]): versioned conversation/user/environment/system state.
//! - **Resources** ([`ResourceManager`]): metrics → state → task admission ceiling.
//! - **Memory** ([`MemoryManager`]): sled + DashMap store for interactions and hierarchical
//!   memories; the outcome source for personality evolution.
//! - **Orchestration** ([`OrchestrationSystem`]): input → task → pipeline → reply.
//!
//! Personality state lives in `sallie-evolution` and is plugged in as the
//! [`Capability::Personality`] module.

pub mod config;
pub mod context;
mod error;
pub mod memory;
pub mod modules;
pub mod nlp;
pub mod orchestrator;
pub mod research;
pub mod resources;
pub mod response;
pub mod tasks;

pub use config::{CoreConfig, OrchestrationConfig, ResourceSettings, ResourceThresholds, UserSettings};
pub use context::{
    ContextManager, ContextState, ConversationContext, EnvironmentPatch, EnvironmentalContext,
    Interaction, SystemContext, UserContext, UserContextPatch,
};
pub use error::{SallieError, SallieResult};
pub use memory::{InteractionRecord, MemoryItem, MemoryLevel, MemoryManager};
pub use modules::{
    Capability, CustomModule, ModuleHandle, ModuleRegistry, ResearchProvider, ResponseGenerator,
};
pub use nlp::{Intent, KeywordAnalyzer, LanguageAnalysis, LanguageAnalyzer};
pub use orchestrator::{
    assign_priority, build_pipeline, OrchestrationResponse, OrchestrationStatus,
    OrchestrationSystem, PipelineStage, UserInput,
};
pub use research::SemanticMemoryResearch;
pub use resources::{
    classify, FixedProbe, MetricsProbe, ResourceManager, ResourceMetrics, ResourceState, SystemProbe,
};
pub use response::{ResponseRequest, TemplateResponder};
pub use tasks::{Task, TaskManager, TaskPriority, TaskStatistics, TaskStatus, TaskType};

pub use sallie_evolution;
