//! Error type for personality evolution.

use thiserror::Error;

/// Result alias for evolution operations.
pub type EvolutionResult<T> = Result<T, EvolutionError>;

#[derive(Error, Debug)]
pub enum EvolutionError {
    #[error("personality state lock poisoned: {0}")]
    Lock(String),

    #[error("outcome source unavailable: {0}")]
    Source(String),

    #[error("snapshot error: {0}")]
    Snapshot(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
