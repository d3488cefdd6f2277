use sallie_evolution::EvolutionError;
use thiserror::Error;
use uuid::Uuid;

/// Errors surfaced by the companion core.
#[derive(Debug, Error)]
pub enum SallieError {
    #[error("storage error: {0}")]
    Storage(#[from] sled::Error),

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("settings parse error: {0}")]
    SettingsParse(#[from] toml::de::Error),

    #[error("settings write error: {0}")]
    SettingsWrite(#[from] toml::ser::Error),

    #[error(transparent)]
    Evolution(#[from] EvolutionError),

    #[error("orchestrator is not running (status: {0})")]
    NotReady(String),

    #[error("resource state {state} does not admit {priority} tasks")]
    ResourceConstrained { state: String, priority: String },

    #[error("no module registered for {0}")]
    MissingModule(String),

    #[error("stage {stage} failed: {message}")]
    Stage { stage: String, message: String },

    #[error("task {0} is not queued")]
    TaskNotQueued(Uuid),

    #[error("lock poisoned: {0}")]
    Lock(String),
}

impl SallieError {
    pub fn stage(stage: impl Into<String>, message: impl Into<String>) -> Self {
        SallieError::Stage {
            stage: stage.into(),
            message: message.into(),
        }
    }
}

/// Result type for core operations.
pub type SallieResult<T> = Result<T, SallieError>;
