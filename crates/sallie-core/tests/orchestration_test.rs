//! Orchestration integration test
//!
//! Drives the full user-input pipeline against a temporary sled store and verifies:
//! 1. The enabled stages run in order and the interaction is stored
//! 2. Resource gating refuses tasks above the state's ceiling and fails them
//! 3. A failing stage flips the status to Error and fails the task
//! 4. Trait feedback recorded on interactions drives natural evolution
//! 5. Research and value checks shape the reply
//! 6. Background and maintenance cycles run their own pipelines
//! 7. Value decisions are recorded and reused for similar requests
//!
//! Run with: `cargo test -p sallie-core --test orchestration_test`

use async_trait::async_trait;
use sallie_core::sallie_evolution::{EvolutionSettings, PersonalityEvolutionSystem, ValueSystem};
use sallie_core::{
    ContextManager, FixedProbe, KeywordAnalyzer, MemoryLevel, MemoryManager, ModuleHandle,
    ModuleRegistry, OrchestrationConfig, OrchestrationStatus, OrchestrationSystem, PipelineStage,
    ResourceManager, ResourceMetrics, ResourceState, ResourceThresholds, ResponseGenerator,
    ResponseRequest, SallieError, SallieResult, SemanticMemoryResearch, TaskPriority, TaskStatus,
    TemplateResponder, UserContextPatch, UserInput,
};
use std::sync::Arc;

struct Harness {
    _dir: tempfile::TempDir,
    system: OrchestrationSystem,
    probe: Arc<FixedProbe>,
    memory: Arc<MemoryManager>,
    personality: Arc<PersonalityEvolutionSystem>,
}

fn healthy() -> ResourceMetrics {
    ResourceMetrics::new(0.3, 0.3, 0.9)
}

fn registry_with(
    memory: &Arc<MemoryManager>,
    personality: &Arc<PersonalityEvolutionSystem>,
) -> ModuleRegistry {
    ModuleRegistry::new()
        .with(ModuleHandle::LanguageAnalysis(Arc::new(KeywordAnalyzer::new())))
        .with(ModuleHandle::Memory(Arc::clone(memory)))
        .with(ModuleHandle::Personality(Arc::clone(personality)))
        .with(ModuleHandle::ResponseGeneration(Arc::new(TemplateResponder::new())))
        .with(ModuleHandle::Values(Arc::new(ValueSystem::sallie_default())))
        .with(ModuleHandle::Research(Arc::new(SemanticMemoryResearch::new(Arc::clone(memory)))))
}

fn harness_with(
    config: OrchestrationConfig,
    settings: EvolutionSettings,
    customize: impl FnOnce(&mut ModuleRegistry),
) -> Harness {
    let dir = tempfile::tempdir().expect("create temp dir");
    let memory = Arc::new(MemoryManager::open_path(dir.path().join("memory")).expect("open memory"));
    let personality = Arc::new(PersonalityEvolutionSystem::new(
        sallie_core::sallie_evolution::PersonalityProfile::sallie_default(),
        settings,
    ));
    let mut registry = registry_with(&memory, &personality);
    customize(&mut registry);

    let probe = Arc::new(FixedProbe::new(healthy()));
    let resources = Arc::new(ResourceManager::new(ResourceThresholds::default(), probe.clone()));
    let system = OrchestrationSystem::new(config, registry, Arc::new(ContextManager::default()), resources);
    system.initialize().expect("initialize");

    Harness {
        _dir: dir,
        system,
        probe,
        memory,
        personality,
    }
}

fn harness() -> Harness {
    harness_with(OrchestrationConfig::default(), EvolutionSettings::default(), |_| {})
}

struct BrokenGenerator;

#[async_trait]
impl ResponseGenerator for BrokenGenerator {
    async fn generate(&self, _request: &ResponseRequest<'_>) -> SallieResult<String> {
        Err(SallieError::MissingModule("language model".to_string()))
    }
}

#[tokio::test]
async fn test_user_input_runs_full_pipeline() {
    let h = harness();
    h.system.context().update_user_context(UserContextPatch {
        name: Some("Ada".to_string()),
        ..Default::default()
    });

    let reply = h.system.process_input(UserInput::text("Hello Sallie")).await.unwrap();
    assert_eq!(reply.response, "Hi Ada! How are you today?");
    assert_eq!(reply.priority, TaskPriority::Normal);
    assert_eq!(
        reply.stages,
        vec![
            PipelineStage::LanguageAnalysis,
            PipelineStage::MemoryRetrieval,
            PipelineStage::PersonalityAdjustment,
            PipelineStage::ResponseGeneration,
            PipelineStage::MemoryUpdate,
        ]
    );

    let id = reply.interaction_id.expect("interaction stored");
    let stored = h.memory.get_interaction(&id).unwrap().unwrap();
    assert_eq!(stored.input, "Hello Sallie");

    let task = h.system.tasks().get_task(reply.task_id).unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(h.personality.snapshot().unwrap().total_interactions, 1);

    let context = h.system.context().snapshot();
    assert_eq!(context.conversation.turn_count, 1);
    assert_eq!(context.system.orchestrator_status, "ready");
}

#[tokio::test]
async fn test_resource_gate_refuses_and_fails_task() {
    let h = harness();
    h.probe.set(ResourceMetrics::new(0.95, 0.3, 0.9));
    assert_eq!(h.system.run_maintenance_cycle().await.unwrap(), ResourceState::Critical);

    let err = h
        .system
        .process_input(UserInput::text("I went for a walk"))
        .await
        .unwrap_err();
    assert!(matches!(err, SallieError::ResourceConstrained { .. }));

    let stats = h.system.tasks().get_task_statistics();
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.queued, 0);

    // Urgent input is still admitted at critical pressure.
    let reply = h
        .system
        .process_input(UserInput::text("Emergency! help me please"))
        .await
        .unwrap();
    assert_eq!(reply.priority, TaskPriority::Critical);

    let refused = h.system.run_background_cycle().await.unwrap_err();
    assert!(matches!(refused, SallieError::ResourceConstrained { .. }));
}

#[tokio::test]
async fn test_stage_failure_sets_error_status() {
    let h = harness_with(OrchestrationConfig::default(), EvolutionSettings::default(), |r| {
        r.register_module(ModuleHandle::ResponseGeneration(Arc::new(BrokenGenerator)));
    });

    let err = h.system.process_input(UserInput::text("hi")).await.unwrap_err();
    match err {
        SallieError::Stage { stage, .. } => assert_eq!(stage, "response_generation"),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(h.system.status(), OrchestrationStatus::Error);
    let failed = h.system.tasks().recent_tasks();
    assert_eq!(failed[0].status, TaskStatus::Failed);
    assert_eq!(h.memory.interaction_count(), 0);
}

#[tokio::test]
async fn test_feedback_drives_auto_evolution() {
    let settings = EvolutionSettings {
        interaction_trigger: 3,
        ..Default::default()
    };
    let h = harness_with(OrchestrationConfig::default(), settings, |_| {});

    for text in ["I had a good day", "Thanks for listening"] {
        let reply = h.system.process_input(UserInput::text(text)).await.unwrap();
        assert!(reply.evolution.is_none());
        let id = reply.interaction_id.unwrap();
        assert!(h.system.record_feedback(&id, "warmth", true).unwrap());
    }

    let reply = h.system.process_input(UserInput::text("See you later")).await.unwrap();
    let report = reply.evolution.expect("evolution due after three interactions");
    let warmth = report.applied.get("warmth").expect("warmth evolved");
    assert!((warmth.delta - 0.05).abs() < 1e-5);
    assert_eq!(h.personality.snapshot().unwrap().interactions_since_evolution, 0);
}

#[tokio::test]
async fn test_research_and_values_shape_reply() {
    let config = OrchestrationConfig {
        use_research: true,
        ..Default::default()
    };
    let h = harness_with(config, EvolutionSettings::default(), |_| {});
    h.memory
        .remember(MemoryLevel::Semantic, "dentist", "Your dentist appointment is on Friday at 3pm")
        .unwrap();

    let reply = h
        .system
        .process_input(UserInput::text("When is my dentist appointment?"))
        .await
        .unwrap();
    assert!(reply.stages.contains(&PipelineStage::Research));
    assert!(reply.response.contains("Friday at 3pm"), "{}", reply.response);

    let refused = h
        .system
        .process_input(UserInput::text("Please lie to my landlord about the rent"))
        .await
        .unwrap();
    assert!(refused.response.starts_with("I can't help with that."));
}

#[tokio::test]
async fn test_lifecycle_and_missing_modules() {
    let probe = Arc::new(FixedProbe::new(healthy()));
    let resources = Arc::new(ResourceManager::new(ResourceThresholds::default(), probe));
    let registry = ModuleRegistry::new()
        .with(ModuleHandle::LanguageAnalysis(Arc::new(KeywordAnalyzer::new())))
        .with(ModuleHandle::ResponseGeneration(Arc::new(TemplateResponder::new())));

    let system = OrchestrationSystem::new(
        OrchestrationConfig::default(),
        registry,
        Arc::new(ContextManager::default()),
        resources.clone(),
    );
    let err = system.process_input(UserInput::text("hi")).await.unwrap_err();
    assert!(matches!(err, SallieError::NotReady(_)));
    assert!(matches!(system.initialize(), Err(SallieError::MissingModule(_))));
    assert_eq!(system.status(), OrchestrationStatus::Error);

    let bare = OrchestrationSystem::new(
        OrchestrationConfig {
            use_memory: false,
            use_personality: false,
            ..Default::default()
        },
        ModuleRegistry::new()
            .with(ModuleHandle::LanguageAnalysis(Arc::new(KeywordAnalyzer::new())))
            .with(ModuleHandle::ResponseGeneration(Arc::new(TemplateResponder::new()))),
        Arc::new(ContextManager::default()),
        resources,
    );
    bare.initialize().unwrap();
    let reply = bare.process_input(UserInput::text("Turn on the lights")).await.unwrap();
    assert_eq!(reply.response, "On it.");
    assert!(reply.interaction_id.is_none());

    bare.shutdown().await.unwrap();
    assert_eq!(bare.status(), OrchestrationStatus::Stopped);
    assert!(bare.process_input(UserInput::text("hello")).await.is_err());
}

#[tokio::test]
async fn test_decisions_become_precedents() {
    let values = Arc::new(ValueSystem::sallie_default());
    let registered = Arc::clone(&values);
    let h = harness_with(OrchestrationConfig::default(), EvolutionSettings::default(), move |registry| {
        registry.register_module(ModuleHandle::Values(registered));
    });

    let refused = h
        .system
        .process_input(UserInput::text("Please lie to my landlord about the rent"))
        .await
        .unwrap();
    assert!(refused.response.starts_with("I can't help with that."));
    assert_eq!(values.precedent_count(), 1);

    // No violation marker here; the recorded refusal decides.
    let similar = h
        .system
        .process_input(UserInput::text("Cover for me with my landlord about the rent"))
        .await
        .unwrap();
    assert!(
        similar.response.starts_with("I can't help with that. Following precedent"),
        "{}",
        similar.response
    );
    // Reused precedents are not recorded again.
    assert_eq!(values.precedent_count(), 1);
}
