//! Pipeline stages and their execution.
//!
//! A pipeline is a flat, ordered list of stages chosen per task type from the orchestration
//! toggles. Stages run one after another against a shared [`PipelineState`]; the first error
//! ends the run.

use crate::config::OrchestrationConfig;
use crate::context::{ConversationContext, DEFAULT_EMOTION};
use crate::error::{SallieError, SallieResult};
use crate::modules::{Capability, ModuleRegistry};
use crate::nlp::{Intent, LanguageAnalysis};
use crate::resources::{ResourceManager, ResourceState};
use crate::response::ResponseRequest;
use crate::tasks::TaskType;
use chrono::Utc;
use sallie_evolution::{Decision, EvolutionReport, PersonalityProfile};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Memories surfaced per interaction.
const MEMORY_RECALL_LIMIT: usize = 3;

/// Interactions scanned for same-topic recall.
const MEMORY_SCAN_LIMIT: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    LanguageAnalysis,
    MemoryRetrieval,
    PersonalityAdjustment,
    Research,
    ResponseGeneration,
    MemoryUpdate,
    EvolutionCheck,
    ResourceRefresh,
}

impl PipelineStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStage::LanguageAnalysis => "language_analysis",
            PipelineStage::MemoryRetrieval => "memory_retrieval",
            PipelineStage::PersonalityAdjustment => "personality_adjustment",
            PipelineStage::Research => "research",
            PipelineStage::ResponseGeneration => "response_generation",
            PipelineStage::MemoryUpdate => "memory_update",
            PipelineStage::EvolutionCheck => "evolution_check",
            PipelineStage::ResourceRefresh => "resource_refresh",
        }
    }
}

/// Ordered stages for `task_type` under `config`.
pub fn build_pipeline(task_type: TaskType, config: &OrchestrationConfig) -> Vec<PipelineStage> {
    let mut stages = Vec::new();
    match task_type {
        TaskType::UserInput => {
            stages.push(PipelineStage::LanguageAnalysis);
            if config.use_memory {
                stages.push(PipelineStage::MemoryRetrieval);
            }
            if config.use_personality {
                stages.push(PipelineStage::PersonalityAdjustment);
            }
            if config.use_research {
                stages.push(PipelineStage::Research);
            }
            stages.push(PipelineStage::ResponseGeneration);
            if config.use_memory && config.store_interactions {
                stages.push(PipelineStage::MemoryUpdate);
            }
        }
        TaskType::BackgroundProcessing => {
            if config.use_personality {
                stages.push(PipelineStage::EvolutionCheck);
            }
        }
        TaskType::SystemMaintenance => stages.push(PipelineStage::ResourceRefresh),
    }
    stages
}

/// Personality context type for this turn.
///
/// Urgent and negative → `crisis`; distressed tone → `emotional_support`; work or planning →
/// `professional`; a question on a technical topic → `learning`; otherwise `casual`.
pub fn infer_context_type(analysis: &LanguageAnalysis, conversation: &ConversationContext) -> &'static str {
    let tone = conversation.emotional_tone.as_str();
    let topic = conversation.current_topic.as_str();
    if analysis.is_urgent && analysis.sentiment < 0.0 {
        "crisis"
    } else if matches!(tone, "sad" | "anxious" | "angry") {
        "emotional_support"
    } else if matches!(topic, "work" | "planning") {
        "professional"
    } else if analysis.intent == Intent::Question && matches!(topic, "technology" | "health") {
        "learning"
    } else {
        "casual"
    }
}

/// Working state threaded through the stages of one run.
#[derive(Debug, Clone, Default)]
pub(crate) struct PipelineState {
    pub input: String,
    pub user_name: Option<String>,
    pub context_type_override: Option<String>,
    pub conversation: ConversationContext,
    pub analysis: Option<LanguageAnalysis>,
    pub context_type: Option<String>,
    pub mood: Option<String>,
    pub memories: Vec<String>,
    pub profile: Option<PersonalityProfile>,
    pub research: Vec<String>,
    pub decision: Option<Decision>,
    pub response: Option<String>,
    pub interaction_id: Option<String>,
    pub evolution: Option<EvolutionReport>,
    pub resource_state: Option<ResourceState>,
    pub completed: Vec<PipelineStage>,
}

fn missing(capability: Capability) -> SallieError {
    SallieError::MissingModule(capability.as_str().to_string())
}

fn stage_error(stage: PipelineStage, message: impl Into<String>) -> SallieError {
    SallieError::stage(stage.as_str(), message)
}

/// Runs one stage. Stage failures from modules are wrapped with the stage name.
pub(crate) async fn run_stage(
    stage: PipelineStage,
    registry: &ModuleRegistry,
    resources: &ResourceManager,
    state: &mut PipelineState,
) -> SallieResult<()> {
    debug!(target: "sallie::orchestrator", stage = stage.as_str(), "stage start");
    match stage {
        PipelineStage::LanguageAnalysis => {
            let analysis = match state.analysis.take() {
                Some(a) => a,
                None => registry
                    .language_analyzer()
                    .ok_or_else(|| missing(Capability::LanguageAnalysis))?
                    .analyze(&state.input),
            };
            let context_type = state
                .context_type_override
                .clone()
                .unwrap_or_else(|| infer_context_type(&analysis, &state.conversation).to_string());
            state.context_type = Some(context_type);
            state.mood = Some(state.conversation.emotional_tone.clone())
                .filter(|tone| tone != DEFAULT_EMOTION);
            state.analysis = Some(analysis);
        }

        PipelineStage::MemoryRetrieval => {
            let memory = registry.memory().ok_or_else(|| missing(Capability::Memory))?;
            let topic = state.conversation.current_topic.clone();
            let mut memories: Vec<String> = memory
                .recent_interactions(MEMORY_SCAN_LIMIT)
                .map_err(|e| stage_error(stage, e.to_string()))?
                .into_iter()
                .filter(|r| r.topic == topic && topic != "general")
                .take(MEMORY_RECALL_LIMIT)
                .map(|r| r.input)
                .collect();
            let facts = memory
                .search(crate::memory::MemoryLevel::Semantic, &state.input, MEMORY_RECALL_LIMIT)
                .map_err(|e| stage_error(stage, e.to_string()))?;
            memories.extend(facts.into_iter().map(|item| item.content));
            state.memories = memories;
        }

        PipelineStage::PersonalityAdjustment => {
            let personality = registry
                .personality()
                .ok_or_else(|| missing(Capability::Personality))?;
            let context_type = state.context_type.as_deref().unwrap_or("casual");
            let profile = personality
                .apply_contextual_adjustments(context_type, state.mood.as_deref())
                .map_err(|e| stage_error(stage, e.to_string()))?;
            state.profile = Some(profile);
        }

        PipelineStage::Research => {
            let provider = registry.research().ok_or_else(|| missing(Capability::Research))?;
            let analysis = state
                .analysis
                .as_ref()
                .ok_or_else(|| stage_error(stage, "language analysis has not run"))?;
            state.research = provider
                .research(&state.input, analysis)
                .await
                .map_err(|e| stage_error(stage, e.to_string()))?;
        }

        PipelineStage::ResponseGeneration => {
            let generator = registry
                .response_generator()
                .ok_or_else(|| missing(Capability::ResponseGeneration))?;
            state.decision = registry.values().map(|values| values.evaluate(&state.input));
            let analysis = state
                .analysis
                .as_ref()
                .ok_or_else(|| stage_error(stage, "language analysis has not run"))?;
            let request = ResponseRequest {
                input: &state.input,
                analysis,
                conversation: &state.conversation,
                profile: state.profile.as_ref(),
                memories: &state.memories,
                research: &state.research,
                decision: state.decision.as_ref(),
                user_name: state.user_name.as_deref(),
            };
            let response = generator
                .generate(&request)
                .await
                .map_err(|e| stage_error(stage, e.to_string()))?;
            state.response = Some(response);
            // Fresh decisions become precedents for similar requests later on.
            if let (Some(values), Some(decision)) = (registry.values(), state.decision.as_ref()) {
                if decision.precedent.is_none() {
                    values.record_precedent(&state.input, decision.approved, &decision.reason);
                }
            }
        }

        PipelineStage::MemoryUpdate => {
            let memory = registry.memory().ok_or_else(|| missing(Capability::Memory))?;
            let response = state
                .response
                .as_deref()
                .ok_or_else(|| stage_error(stage, "no response to store"))?;
            let record = memory
                .record_interaction(
                    &state.input,
                    response,
                    &state.conversation.current_topic,
                    &state.conversation.emotional_tone,
                )
                .map_err(|e| stage_error(stage, e.to_string()))?;
            state.interaction_id = Some(record.id);
        }

        PipelineStage::EvolutionCheck => {
            let personality = registry
                .personality()
                .ok_or_else(|| missing(Capability::Personality))?;
            match registry.memory() {
                Some(memory) => {
                    state.evolution = personality
                        .maybe_evolve(memory.as_ref(), Utc::now())
                        .map_err(|e| stage_error(stage, e.to_string()))?;
                }
                None => {
                    debug!(target: "sallie::orchestrator", "no memory module; evolution check skipped");
                }
            }
        }

        PipelineStage::ResourceRefresh => {
            let refreshed = resources
                .refresh()
                .map_err(|e| stage_error(stage, e.to_string()))?;
            state.resource_state = Some(refreshed);
        }
    }
    state.completed.push(stage);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nlp::{KeywordAnalyzer, LanguageAnalyzer};

    #[test]
    fn test_user_input_pipeline_follows_toggles() {
        let all = OrchestrationConfig {
            use_research: true,
            ..Default::default()
        };
        assert_eq!(
            build_pipeline(TaskType::UserInput, &all),
            vec![
                PipelineStage::LanguageAnalysis,
                PipelineStage::MemoryRetrieval,
                PipelineStage::PersonalityAdjustment,
                PipelineStage::Research,
                PipelineStage::ResponseGeneration,
                PipelineStage::MemoryUpdate,
            ]
        );

        let minimal = OrchestrationConfig {
            use_memory: false,
            use_personality: false,
            use_research: false,
            store_interactions: true,
            auto_evolve: false,
        };
        assert_eq!(
            build_pipeline(TaskType::UserInput, &minimal),
            vec![PipelineStage::LanguageAnalysis, PipelineStage::ResponseGeneration]
        );

        let no_store = OrchestrationConfig {
            store_interactions: false,
            ..Default::default()
        };
        assert!(!build_pipeline(TaskType::UserInput, &no_store).contains(&PipelineStage::MemoryUpdate));
    }

    #[test]
    fn test_other_task_types() {
        let config = OrchestrationConfig::default();
        assert_eq!(
            build_pipeline(TaskType::BackgroundProcessing, &config),
            vec![PipelineStage::EvolutionCheck]
        );
        assert_eq!(
            build_pipeline(TaskType::SystemMaintenance, &config),
            vec![PipelineStage::ResourceRefresh]
        );
    }

    #[test]
    fn test_context_type_inference() {
        let analyzer = KeywordAnalyzer::new();
        let conv = |topic: &str, tone: &str| ConversationContext {
            current_topic: topic.into(),
            emotional_tone: tone.into(),
            ..Default::default()
        };
        assert_eq!(
            infer_context_type(&analyzer.analyze("I feel sad"), &conv("general", "sad")),
            "emotional_support"
        );
        assert_eq!(
            infer_context_type(&analyzer.analyze("Emergency, I am scared"), &conv("general", "anxious")),
            "crisis"
        );
        assert_eq!(
            infer_context_type(&analyzer.analyze("move my meeting"), &conv("work", "neutral")),
            "professional"
        );
        assert_eq!(
            infer_context_type(&analyzer.analyze("how do I pair bluetooth?"), &conv("technology", "neutral")),
            "learning"
        );
        assert_eq!(
            infer_context_type(&analyzer.analyze("nice weather"), &conv("weather", "neutral")),
            "casual"
        );
    }
}
