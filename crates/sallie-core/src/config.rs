//! Configuration: layered core config, orchestration toggles and per-user settings.
//!
//! | Source | Precedence |
//! |--------|------------|
//! | `SALLIE_*` env (nested with `__`, e.g. `SALLIE_RESOURCES__MONITOR_INTERVAL_SECS`) | highest |
//! | TOML file at `SALLIE_CONFIG` (default `config/sallie.toml`) | |
//! | built-in defaults | lowest |
//!
//! Orchestration toggles additionally honour the flat `SALLIE_USE_*` switches, see
//! [`OrchestrationConfig::from_env`].

use crate::error::SallieResult;
use sallie_evolution::EvolutionSettings;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

fn default_true() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Orchestration toggles
// ---------------------------------------------------------------------------

/// Which optional pipeline stages run for user input.
///
/// | Env | Default |
/// |-----|---------|
/// | SALLIE_USE_MEMORY | true |
/// | SALLIE_USE_PERSONALITY | true |
/// | SALLIE_USE_RESEARCH | false |
/// | SALLIE_STORE_INTERACTIONS | true |
/// | SALLIE_AUTO_EVOLVE | true |
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrchestrationConfig {
    /// Retrieve related memories before responding.
    #[serde(default = "default_true")]
    pub use_memory: bool,
    /// Apply contextual personality adjustments and count interactions for evolution.
    #[serde(default = "default_true")]
    pub use_personality: bool,
    /// Ask the research provider for supporting facts.
    #[serde(default)]
    pub use_research: bool,
    /// Persist each interaction (requires `use_memory`).
    #[serde(default = "default_true")]
    pub store_interactions: bool,
    /// Run natural evolution after an interaction once it is due.
    #[serde(default = "default_true")]
    pub auto_evolve: bool,
}

impl Default for OrchestrationConfig {
    fn default() -> Self {
        Self {
            use_memory: true,
            use_personality: true,
            use_research: false,
            store_interactions: true,
            auto_evolve: true,
        }
    }
}

impl OrchestrationConfig {
    /// Defaults overlaid with the `SALLIE_USE_*` toggles.
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Overlays env toggles on top of `self`; unset variables keep the current value.
    pub fn with_env_overrides(self) -> Self {
        Self {
            use_memory: env_bool("SALLIE_USE_MEMORY", self.use_memory),
            use_personality: env_bool("SALLIE_USE_PERSONALITY", self.use_personality),
            use_research: env_bool("SALLIE_USE_RESEARCH", self.use_research),
            store_interactions: env_bool("SALLIE_STORE_INTERACTIONS", self.store_interactions),
            auto_evolve: env_bool("SALLIE_AUTO_EVOLVE", self.auto_evolve),
        }
    }
}

fn env_bool(name: &str, default: bool) -> bool {
    match std::env::var(name) {
        Ok(v) => {
            let v = v.trim();
            if v.is_empty() {
                default
            } else {
                v.eq_ignore_ascii_case("true") || v == "1"
            }
        }
        Err(_) => default,
    }
}

// ---------------------------------------------------------------------------
// Resource thresholds
// ---------------------------------------------------------------------------

/// Ratios in `[0, 1]` used by resource classification.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceThresholds {
    pub memory_high: f32,
    pub memory_critical: f32,
    pub cpu_high: f32,
    pub cpu_critical: f32,
    /// Battery below this level puts the device in `LowBattery`.
    pub battery_low: f32,
}

impl Default for ResourceThresholds {
    fn default() -> Self {
        Self {
            memory_high: 0.80,
            memory_critical: 0.90,
            cpu_high: 0.75,
            cpu_critical: 0.90,
            battery_low: 0.15,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceSettings {
    pub thresholds: ResourceThresholds,
    /// Poll cadence of the resource monitor.
    pub monitor_interval_secs: u64,
    /// Battery level reported by the system probe (no battery API on the host).
    pub assumed_battery_level: f32,
}

impl Default for ResourceSettings {
    fn default() -> Self {
        Self {
            thresholds: ResourceThresholds::default(),
            monitor_interval_secs: 5,
            assumed_battery_level: 0.8,
        }
    }
}

impl ResourceSettings {
    pub fn monitor_interval(&self) -> Duration {
        Duration::from_secs(self.monitor_interval_secs.max(1))
    }
}

// ---------------------------------------------------------------------------
// Core config
// ---------------------------------------------------------------------------

/// Process-wide configuration. Load with [`CoreConfig::load`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    pub app_name: String,
    /// Base directory for the memory database and personality snapshots.
    pub storage_path: String,
    /// Interactions kept in the conversation context ring.
    pub history_limit: usize,
    #[serde(default)]
    pub orchestration: OrchestrationConfig,
    #[serde(default)]
    pub resources: ResourceSettings,
    #[serde(default)]
    pub evolution: EvolutionSettings,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            app_name: "Sallie".to_string(),
            storage_path: "./data".to_string(),
            history_limit: 10,
            orchestration: OrchestrationConfig::default(),
            resources: ResourceSettings::default(),
            evolution: EvolutionSettings::default(),
        }
    }
}

impl CoreConfig {
    /// Load config from defaults, the TOML file and environment, then apply the flat
    /// orchestration toggles.
    pub fn load() -> SallieResult<Self> {
        let config_path =
            std::env::var("SALLIE_CONFIG").unwrap_or_else(|_| "config/sallie".to_string());
        let built = config::Config::builder()
            .set_default("app_name", "Sallie")?
            .set_default("storage_path", "./data")?
            .set_default("history_limit", 10_i64)?
            .add_source(config::File::with_name(&config_path).required(false))
            .add_source(
                config::Environment::with_prefix("SALLIE")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut config: CoreConfig = built.try_deserialize()?;
        config.orchestration = config.orchestration.with_env_overrides();
        Ok(config)
    }

    pub fn memory_path(&self) -> PathBuf {
        Path::new(&self.storage_path).join("memory")
    }

    pub fn profile_dir(&self) -> PathBuf {
        Path::new(&self.storage_path).join("personality")
    }
}

// ---------------------------------------------------------------------------
// User settings (user_settings.toml)
// ---------------------------------------------------------------------------

/// Per-user settings kept next to the binary. Created with defaults on first run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSettings {
    #[serde(default)]
    pub user_name: Option<String>,
    /// Set to false once the user has finished onboarding.
    #[serde(default = "default_true")]
    pub first_run: bool,
    /// Consent for calendar reads and writes.
    #[serde(default)]
    pub calendar_consent: bool,
    /// Consent for changing system settings (wifi, volume, ...).
    #[serde(default)]
    pub system_consent: bool,
    /// Consent for controlling smart-home devices.
    #[serde(default)]
    pub device_consent: bool,
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            user_name: None,
            first_run: true,
            calendar_consent: false,
            system_consent: false,
            device_consent: false,
        }
    }
}

impl UserSettings {
    pub fn default_path() -> PathBuf {
        PathBuf::from("user_settings.toml")
    }

    /// Load settings from `path`, writing defaults there when the file does not exist.
    pub fn load_from_path(path: &Path) -> SallieResult<Self> {
        if path.exists() {
            let content = fs::read_to_string(path)?;
            Ok(toml::from_str(&content)?)
        } else {
            let settings = UserSettings::default();
            settings.save_to_path(path)?;
            Ok(settings)
        }
    }

    pub fn save_to_path(&self, path: &Path) -> SallieResult<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, content)?;
        Ok(())
    }

    pub fn complete_first_run(&mut self, path: &Path) -> SallieResult<()> {
        self.first_run = false;
        self.save_to_path(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_settings_created_on_first_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("user_settings.toml");
        let settings = UserSettings::load_from_path(&path).unwrap();
        assert!(settings.first_run);
        assert!(path.exists());

        let mut settings = settings;
        settings.user_name = Some("Ada".to_string());
        settings.calendar_consent = true;
        settings.complete_first_run(&path).unwrap();

        let reloaded = UserSettings::load_from_path(&path).unwrap();
        assert_eq!(reloaded.user_name.as_deref(), Some("Ada"));
        assert!(!reloaded.first_run);
        assert!(reloaded.calendar_consent);
        assert!(!reloaded.device_consent);
    }

    #[test]
    fn test_partial_settings_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("user_settings.toml");
        std::fs::write(&path, "user_name = \"Sam\"\n").unwrap();
        let settings = UserSettings::load_from_path(&path).unwrap();
        assert_eq!(settings.user_name.as_deref(), Some("Sam"));
        assert!(settings.first_run);
    }

    #[test]
    fn test_core_config_paths() {
        let config = CoreConfig {
            storage_path: "/tmp/sallie".to_string(),
            ..Default::default()
        };
        assert_eq!(config.memory_path(), PathBuf::from("/tmp/sallie/memory"));
        assert_eq!(config.profile_dir(), PathBuf::from("/tmp/sallie/personality"));
        assert_eq!(config.resources.monitor_interval(), Duration::from_secs(5));
    }
}
