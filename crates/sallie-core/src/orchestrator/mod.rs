//! Orchestration: turns user input into a prioritised task and runs its pipeline.
//!
//! Flow for one input:
//! 1. capture conversation context and analyse the text,
//! 2. assign priority (urgent → critical, question or emotional → high, else normal),
//! 3. create the task and check admission against the resource state,
//! 4. claim the task and run the user-input pipeline,
//! 5. complete the task, count the interaction and evolve the personality when due.
//!
//! A stage error fails the task, flips the status to [`OrchestrationStatus::Error`] and is
//! returned unchanged. There is no retry and no partial result.

mod pipeline;

pub use pipeline::{build_pipeline, infer_context_type, PipelineStage};

use crate::config::OrchestrationConfig;
use crate::context::{ContextManager, ConversationContext, SystemContext};
use crate::error::{SallieError, SallieResult};
use crate::modules::{Capability, ModuleRegistry};
use crate::nlp::LanguageAnalysis;
use crate::resources::{ResourceManager, ResourceState};
use crate::tasks::{Task, TaskManager, TaskPriority, TaskType};
use chrono::Utc;
use pipeline::{run_stage, PipelineState};
use sallie_evolution::EvolutionReport;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrchestrationStatus {
    Created,
    Ready,
    Error,
    Stopped,
}

impl OrchestrationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrchestrationStatus::Created => "created",
            OrchestrationStatus::Ready => "ready",
            OrchestrationStatus::Error => "error",
            OrchestrationStatus::Stopped => "stopped",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserInput {
    pub text: String,
    /// Forces the personality context type (e.g. "professional") instead of inferring it.
    #[serde(default)]
    pub context_type: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl UserInput {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            context_type: None,
            metadata: HashMap::new(),
        }
    }

    pub fn with_context_type(mut self, context_type: impl Into<String>) -> Self {
        self.context_type = Some(context_type.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestrationResponse {
    pub task_id: Uuid,
    pub response: String,
    pub priority: TaskPriority,
    pub analysis: LanguageAnalysis,
    pub conversation: ConversationContext,
    pub context_type: String,
    pub stages: Vec<PipelineStage>,
    /// Memory id of the stored interaction; use it to attach feedback.
    pub interaction_id: Option<String>,
    pub memories: Vec<String>,
    /// Set when this interaction triggered natural evolution.
    pub evolution: Option<EvolutionReport>,
}

/// Priority for an analysed input.
pub fn assign_priority(analysis: &LanguageAnalysis) -> TaskPriority {
    if analysis.is_urgent {
        TaskPriority::Critical
    } else if analysis.is_question || analysis.emotional_content {
        TaskPriority::High
    } else {
        TaskPriority::Normal
    }
}

pub struct OrchestrationSystem {
    config: OrchestrationConfig,
    registry: ModuleRegistry,
    tasks: Arc<TaskManager>,
    context: Arc<ContextManager>,
    resources: Arc<ResourceManager>,
    status: RwLock<OrchestrationStatus>,
}

impl OrchestrationSystem {
    pub fn new(
        config: OrchestrationConfig,
        registry: ModuleRegistry,
        context: Arc<ContextManager>,
        resources: Arc<ResourceManager>,
    ) -> Self {
        Self {
            config,
            registry,
            tasks: Arc::new(TaskManager::new()),
            context,
            resources,
            status: RwLock::new(OrchestrationStatus::Created),
        }
    }

    pub fn config(&self) -> &OrchestrationConfig {
        &self.config
    }

    pub fn registry(&self) -> &ModuleRegistry {
        &self.registry
    }

    pub fn tasks(&self) -> &Arc<TaskManager> {
        &self.tasks
    }

    pub fn context(&self) -> &Arc<ContextManager> {
        &self.context
    }

    pub fn resources(&self) -> &Arc<ResourceManager> {
        &self.resources
    }

    pub fn status(&self) -> OrchestrationStatus {
        *self.status.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_status(&self, status: OrchestrationStatus) {
        *self.status.write().unwrap_or_else(PoisonError::into_inner) = status;
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Checks that every module the enabled stages need is registered, takes a first
    /// resource sample and moves to `Ready`.
    pub fn initialize(&self) -> SallieResult<()> {
        let mut required = vec![Capability::LanguageAnalysis, Capability::ResponseGeneration];
        if self.config.use_memory {
            required.push(Capability::Memory);
        }
        if self.config.use_personality {
            required.push(Capability::Personality);
        }
        if self.config.use_research {
            required.push(Capability::Research);
        }
        if let Some(missing) = required.into_iter().find(|c| !self.registry.has(*c)) {
            self.set_status(OrchestrationStatus::Error);
            error!(target: "sallie::orchestrator", capability = missing.as_str(), "required module missing");
            return Err(SallieError::MissingModule(missing.as_str().to_string()));
        }

        if let Err(e) = self.resources.refresh() {
            warn!(target: "sallie::orchestrator", error = %e, "initial resource sample failed");
        }
        self.set_status(OrchestrationStatus::Ready);
        self.publish_system_context();
        info!(
            target: "sallie::orchestrator",
            capabilities = ?self.registry.capabilities(),
            resource_state = self.resources.state().as_str(),
            "orchestrator ready"
        );
        Ok(())
    }

    /// Stops accepting work and persists personality and memory.
    pub async fn shutdown(&self) -> SallieResult<()> {
        self.set_status(OrchestrationStatus::Stopped);
        if let Some(personality) = self.registry.personality() {
            personality.save()?;
        }
        if let Some(memory) = self.registry.memory() {
            memory.flush().await?;
        }
        self.publish_system_context();
        info!(target: "sallie::orchestrator", "orchestrator stopped");
        Ok(())
    }

    fn ensure_running(&self) -> SallieResult<()> {
        match self.status() {
            OrchestrationStatus::Ready | OrchestrationStatus::Error => Ok(()),
            other => Err(SallieError::NotReady(other.as_str().to_string())),
        }
    }

    // -----------------------------------------------------------------------
    // Processing
    // -----------------------------------------------------------------------

    pub async fn process_input(&self, input: UserInput) -> SallieResult<OrchestrationResponse> {
        self.ensure_running()?;
        let analyzer = self
            .registry
            .language_analyzer()
            .ok_or_else(|| SallieError::MissingModule(Capability::LanguageAnalysis.as_str().to_string()))?;

        let conversation = self.context.capture_context(&input.text);
        let analysis = analyzer.analyze(&input.text);
        let priority = assign_priority(&analysis);

        let mut data = HashMap::new();
        data.insert("input".to_string(), serde_json::json!(input.text));
        data.insert("topic".to_string(), serde_json::json!(conversation.current_topic));
        data.insert("emotion".to_string(), serde_json::json!(conversation.emotional_tone));
        data.extend(input.metadata.clone());

        let task = self.admit(TaskType::UserInput, priority, data)?;
        let mut state = PipelineState {
            input: input.text,
            user_name: self.context.snapshot().user.name,
            context_type_override: input.context_type,
            conversation,
            analysis: Some(analysis),
            ..Default::default()
        };
        let stages = build_pipeline(TaskType::UserInput, &self.config);
        self.execute(&task, &stages, &mut state).await?;

        let response = state.response.clone().unwrap_or_default();
        self.tasks.complete_task(
            task.id,
            serde_json::json!({
                "response": response,
                "interaction_id": state.interaction_id,
            }),
        );

        let evolution = self.after_interaction();
        self.set_status(OrchestrationStatus::Ready);
        self.publish_system_context();

        Ok(OrchestrationResponse {
            task_id: task.id,
            response,
            priority,
            analysis: state.analysis.unwrap_or_else(|| analyzer.analyze(&state.input)),
            conversation: state.conversation,
            context_type: state.context_type.unwrap_or_else(|| "casual".to_string()),
            stages: state.completed,
            interaction_id: state.interaction_id,
            memories: state.memories,
            evolution,
        })
    }

    /// Enqueues and runs a background task (natural evolution check).
    pub async fn run_background_cycle(&self) -> SallieResult<Option<EvolutionReport>> {
        self.ensure_running()?;
        let task = self.admit(TaskType::BackgroundProcessing, TaskPriority::Background, HashMap::new())?;
        let mut state = PipelineState::default();
        let stages = build_pipeline(TaskType::BackgroundProcessing, &self.config);
        self.execute(&task, &stages, &mut state).await?;
        self.tasks.complete_task(
            task.id,
            serde_json::json!({ "evolved": state.evolution.is_some() }),
        );
        Ok(state.evolution)
    }

    /// Enqueues and runs a maintenance task (resource refresh). Runs at critical priority so
    /// it is admitted in every resource state.
    pub async fn run_maintenance_cycle(&self) -> SallieResult<ResourceState> {
        self.ensure_running()?;
        let task = self.admit(TaskType::SystemMaintenance, TaskPriority::Critical, HashMap::new())?;
        let mut state = PipelineState::default();
        let stages = build_pipeline(TaskType::SystemMaintenance, &self.config);
        self.execute(&task, &stages, &mut state).await?;
        let resource_state = state.resource_state.unwrap_or_else(|| self.resources.state());
        self.tasks.complete_task(
            task.id,
            serde_json::json!({ "resource_state": resource_state.as_str() }),
        );
        self.publish_system_context();
        Ok(resource_state)
    }

    /// Attaches trait feedback to a stored interaction. `Ok(false)` for unknown ids.
    pub fn record_feedback(&self, interaction_id: &str, trait_name: &str, positive: bool) -> SallieResult<bool> {
        let memory = self
            .registry
            .memory()
            .ok_or_else(|| SallieError::MissingModule(Capability::Memory.as_str().to_string()))?;
        memory.record_feedback(interaction_id, trait_name, positive)
    }

    /// Creates the task and checks it against the resource state. A refused task is failed.
    fn admit(
        &self,
        task_type: TaskType,
        priority: TaskPriority,
        data: HashMap<String, serde_json::Value>,
    ) -> SallieResult<Task> {
        let task = self.tasks.create_task(task_type, priority, data);
        if !self.resources.can_execute_task(priority) {
            let state = self.resources.state();
            let err = SallieError::ResourceConstrained {
                state: state.as_str().to_string(),
                priority: priority.as_str().to_string(),
            };
            self.tasks.fail_task(task.id, err.to_string());
            warn!(
                target: "sallie::orchestrator",
                task_id = %task.id,
                state = state.as_str(),
                priority = priority.as_str(),
                "task refused by resource gate"
            );
            return Err(err);
        }
        self.tasks
            .claim_task(task.id)
            .ok_or(SallieError::TaskNotQueued(task.id))
    }

    async fn execute(
        &self,
        task: &Task,
        stages: &[PipelineStage],
        state: &mut PipelineState,
    ) -> SallieResult<()> {
        for stage in stages {
            if let Err(e) = run_stage(*stage, &self.registry, &self.resources, state).await {
                self.set_status(OrchestrationStatus::Error);
                self.tasks.fail_task(task.id, e.to_string());
                error!(
                    target: "sallie::orchestrator",
                    task_id = %task.id,
                    stage = stage.as_str(),
                    error = %e,
                    "pipeline stage failed"
                );
                return Err(e);
            }
        }
        debug!(
            target: "sallie::orchestrator",
            task_id = %task.id,
            task_type = task.task_type.as_str(),
            stages = stages.len(),
            "pipeline complete"
        );
        Ok(())
    }

    /// Counts the interaction and runs natural evolution when due. Failures here are logged
    /// and do not affect the reply.
    fn after_interaction(&self) -> Option<EvolutionReport> {
        if !self.config.use_personality {
            return None;
        }
        let personality = self.registry.personality()?;
        if let Err(e) = personality.record_interaction() {
            warn!(target: "sallie::orchestrator", error = %e, "failed to count interaction");
            return None;
        }
        if !self.config.auto_evolve {
            return None;
        }
        let memory = self.registry.memory()?;
        match personality.maybe_evolve(memory.as_ref(), Utc::now()) {
            Ok(report) => report,
            Err(e) => {
                warn!(target: "sallie::orchestrator", error = %e, "natural evolution failed");
                None
            }
        }
    }

    fn publish_system_context(&self) {
        let stats = self.tasks.get_task_statistics();
        self.context.update_system_context(SystemContext {
            resource_state: self.resources.state().as_str().to_string(),
            active_tasks: stats.active,
            queued_tasks: stats.queued,
            orchestrator_status: self.status().as_str().to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nlp::{KeywordAnalyzer, LanguageAnalyzer};

    #[test]
    fn test_priority_assignment() {
        let analyzer = KeywordAnalyzer::new();
        assert_eq!(assign_priority(&analyzer.analyze("emergency, call 911")), TaskPriority::Critical);
        assert_eq!(assign_priority(&analyzer.analyze("what's the weather?")), TaskPriority::High);
        assert_eq!(assign_priority(&analyzer.analyze("I feel lonely")), TaskPriority::High);
        assert_eq!(assign_priority(&analyzer.analyze("I went for a walk")), TaskPriority::Normal);
    }
}
