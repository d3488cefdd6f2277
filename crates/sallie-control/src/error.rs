//! Error types for device and phone control.

use crate::consent::ConsentScope;
use crate::platform::Permission;
use thiserror::Error;

/// Result type alias for control operations.
pub type ControlResult<T> = Result<T, ControlError>;

/// Failures of a control call. The first two mean "ask the user", the rest do not.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ControlError {
    #[error("permission not granted: {0}")]
    PermissionDenied(Permission),

    #[error("user consent required for {0}")]
    ConsentRequired(ConsentScope),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("device offline: {0}")]
    DeviceOffline(String),

    #[error("platform error: {0}")]
    Platform(String),
}

impl ControlError {
    /// True when the user can resolve the failure by granting something.
    pub fn needs_user(&self) -> bool {
        matches!(
            self,
            ControlError::PermissionDenied(_) | ControlError::ConsentRequired(_)
        )
    }

    pub(crate) fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        ControlError::NotFound {
            kind,
            id: id.into(),
        }
    }
}

/// Error raised by a [`crate::PlatformBridge`] call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct PlatformError(pub String);

impl From<PlatformError> for ControlError {
    fn from(e: PlatformError) -> Self {
        ControlError::Platform(e.0)
    }
}

pub type PlatformResult<T> = Result<T, PlatformError>;
