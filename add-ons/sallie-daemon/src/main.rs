//! Sallie companion daemon
//!
//! Wires memory, personality, values, resources and the orchestrator together, then reads
//! user input from stdin until EOF or CTRL-C. Lines starting with `:` are commands:
//!
//! - `:stats` task counters and resource state
//! - `:profile` blended personality
//! - `:evolve` run natural evolution now
//! - `:feedback <trait> +|-` rate the last reply
//! - `:wifi on|off`, `:dnd on|off` phone settings through the control layer

use chrono::Utc;
use sallie_control::{ConsentLedger, ControlCenter, SimulatedPlatform};
use sallie_core::{
    ContextManager, CoreConfig, KeywordAnalyzer, MemoryManager, ModuleHandle, ModuleRegistry,
    OrchestrationSystem, ResourceManager, SemanticMemoryResearch, SystemProbe, TemplateResponder,
    UserContextPatch, UserInput, UserSettings,
};
use sallie_evolution::{PersonalityEvolutionSystem, ProfileStore, ValueSystem};
use std::{path::Path, sync::Arc};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

type DaemonResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

struct Daemon {
    system: OrchestrationSystem,
    memory: Arc<MemoryManager>,
    personality: Arc<PersonalityEvolutionSystem>,
    control: ControlCenter,
    last_interaction: Option<String>,
}

#[tokio::main]
async fn main() {
    // Load .env file if present (before any env::var calls)
    if let Err(e) = dotenvy::dotenv() {
        eprintln!("[sallie-daemon] .env not loaded: {} (using system environment)", e);
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = CoreConfig::load().expect("load CoreConfig");
    let settings_path = Path::new(&config.storage_path).join(UserSettings::default_path());
    let mut user = UserSettings::load_from_path(&settings_path).expect("load user settings");

    let memory = Arc::new(MemoryManager::open_path(config.memory_path()).expect("open memory store"));
    let values = Arc::new(ValueSystem::sallie_default());
    let personality = Arc::new(
        PersonalityEvolutionSystem::restore(ProfileStore::new(config.profile_dir()), config.evolution.clone())
            .expect("restore personality")
            .with_value_system(&values),
    );

    let mut registry = ModuleRegistry::new()
        .with(ModuleHandle::LanguageAnalysis(Arc::new(KeywordAnalyzer::new())))
        .with(ModuleHandle::Memory(Arc::clone(&memory)))
        .with(ModuleHandle::Personality(Arc::clone(&personality)))
        .with(ModuleHandle::ResponseGeneration(Arc::new(TemplateResponder::new())))
        .with(ModuleHandle::Values(values));
    if config.orchestration.use_research {
        registry.register_module(ModuleHandle::Research(Arc::new(SemanticMemoryResearch::new(
            Arc::clone(&memory),
        ))));
    }

    let probe = Arc::new(SystemProbe::new(config.resources.assumed_battery_level));
    let resources = Arc::new(ResourceManager::new(config.resources.thresholds, probe));
    let context = Arc::new(ContextManager::new(config.history_limit));
    if let Some(name) = user.user_name.clone() {
        context.update_user_context(UserContextPatch {
            name: Some(name),
            ..Default::default()
        });
    }

    let system = OrchestrationSystem::new(
        config.orchestration.clone(),
        registry,
        context,
        Arc::clone(&resources),
    );
    system.initialize().expect("initialize orchestrator");

    let consent = Arc::new(ConsentLedger::from_flags(
        user.calendar_consent,
        user.system_consent,
        user.device_consent,
    ));
    let (control, mut control_events) = ControlCenter::new(Arc::new(SimulatedPlatform::permissive(Vec::new())), consent);
    tokio::spawn(async move {
        while let Some(event) = control_events.recv().await {
            tracing::info!(change = ?event.change, "phone state changed");
        }
    });

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let monitor = resources.spawn_monitor(config.resources.monitor_interval(), shutdown_rx);

    if user.first_run {
        println!("Hi, I'm Sallie. Tell me about your day, or type :help.");
        if let Err(e) = user.complete_first_run(&settings_path) {
            tracing::warn!(error = %e, "could not save user settings");
        }
    }

    tracing::info!(
        app = %config.app_name,
        storage_path = %config.storage_path,
        "Sallie daemon started"
    );

    let mut daemon = Daemon {
        system,
        memory,
        personality,
        control,
        last_interaction: None,
    };

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line {
                    Ok(Some(line)) => {
                        let line = line.trim();
                        if line.is_empty() {
                            continue;
                        }
                        match daemon.handle_line(line).await {
                            Ok(reply) => println!("{}", reply),
                            Err(e) => {
                                tracing::warn!(error = %e, "input failed");
                                println!("Sorry, something went wrong: {}", e);
                            }
                        }
                    }
                    Ok(None) => {
                        tracing::info!("stdin closed; shutting down daemon");
                        break;
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "stdin read failed; shutting down daemon");
                        break;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("CTRL-C received; shutting down daemon");
                break;
            }
        }
    }

    let _ = shutdown_tx.send(true);
    if let Err(e) = monitor.await {
        tracing::warn!(error = %e, "resource monitor did not stop cleanly");
    }
    if let Err(e) = daemon.system.shutdown().await {
        tracing::warn!(error = %e, "shutdown did not persist state");
    }
    let dropped = daemon.control.events.dropped();
    if dropped > 0 {
        tracing::info!(dropped, "control events dropped during session");
    }
}

impl Daemon {
    async fn handle_line(&mut self, line: &str) -> DaemonResult<String> {
        let Some(command) = line.strip_prefix(':') else {
            let reply = self.system.process_input(UserInput::text(line)).await?;
            if reply.interaction_id.is_some() {
                self.last_interaction = reply.interaction_id.clone();
            }
            if let Some(report) = &reply.evolution {
                tracing::info!(applied = report.applied.len(), "personality evolved");
            }
            return Ok(reply.response);
        };

        let mut parts = command.split_whitespace();
        match (parts.next(), parts.next(), parts.next()) {
            (Some("help"), _, _) => Ok(
                ":stats  :profile  :evolve  :feedback <trait> +|-  :wifi on|off  :dnd on|off".to_string(),
            ),
            (Some("stats"), _, _) => {
                let stats = self.system.tasks().get_task_statistics();
                Ok(format!(
                    "tasks created={} completed={} failed={} queued={} | resources={} | interactions={}",
                    stats.created,
                    stats.completed,
                    stats.failed,
                    stats.queued,
                    self.system.resources().state().as_str(),
                    self.memory.interaction_count(),
                ))
            }
            (Some("profile"), _, _) => {
                let profile = self.personality.blended_profile()?;
                Ok(serde_json::to_string_pretty(&profile.traits)?)
            }
            (Some("evolve"), _, _) => {
                let report = self.personality.evolve_naturally(self.memory.as_ref(), Utc::now())?;
                Ok(format!(
                    "sampled {} interactions; applied {:?}; rejected {:?}",
                    report.sampled,
                    report.applied.keys().collect::<Vec<_>>(),
                    report.rejected,
                ))
            }
            (Some("feedback"), Some(trait_name), Some(sign @ ("+" | "-"))) => {
                let Some(id) = self.last_interaction.as_deref() else {
                    return Ok("Nothing to rate yet.".to_string());
                };
                let recorded = self.system.record_feedback(id, trait_name, sign == "+")?;
                Ok(if recorded {
                    format!("Noted {} for {}.", sign, trait_name)
                } else {
                    "That interaction is gone.".to_string()
                })
            }
            (Some("wifi"), Some(state @ ("on" | "off")), _) => {
                self.control.system.toggle_wifi(state == "on").await?;
                Ok(format!("Wi-Fi {}.", state))
            }
            (Some("dnd"), Some(state @ ("on" | "off")), _) => {
                self.control.system.set_do_not_disturb(state == "on").await?;
                Ok(format!("Do not disturb {}.", state))
            }
            _ => Ok(format!("Unknown command :{}. Try :help.", command)),
        }
    }
}
