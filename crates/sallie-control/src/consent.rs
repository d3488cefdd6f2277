//! User consent ledger and the shared permission → consent guard.

use crate::error::{ControlError, ControlResult};
use crate::platform::{Permission, PlatformBridge};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info};

/// Areas the user opts into separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsentScope {
    Calendar,
    SystemSettings,
    DeviceControl,
}

impl ConsentScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConsentScope::Calendar => "calendar",
            ConsentScope::SystemSettings => "system_settings",
            ConsentScope::DeviceControl => "device_control",
        }
    }
}

impl fmt::Display for ConsentScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsentRecord {
    pub granted: bool,
    pub updated_at: DateTime<Utc>,
}

/// Current consent per scope. A scope never recorded counts as not granted.
#[derive(Debug, Default)]
pub struct ConsentLedger {
    records: DashMap<ConsentScope, ConsentRecord>,
}

impl ConsentLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the ledger from persisted user settings flags.
    pub fn from_flags(calendar: bool, system: bool, devices: bool) -> Self {
        let ledger = Self::new();
        ledger.set(ConsentScope::Calendar, calendar);
        ledger.set(ConsentScope::SystemSettings, system);
        ledger.set(ConsentScope::DeviceControl, devices);
        ledger
    }

    pub fn grant(&self, scope: ConsentScope) {
        self.set(scope, true);
    }

    pub fn revoke(&self, scope: ConsentScope) {
        self.set(scope, false);
    }

    fn set(&self, scope: ConsentScope, granted: bool) {
        info!(target: "sallie::control", scope = scope.as_str(), granted, "consent updated");
        self.records.insert(
            scope,
            ConsentRecord {
                granted,
                updated_at: Utc::now(),
            },
        );
    }

    pub fn is_granted(&self, scope: ConsentScope) -> bool {
        self.records.get(&scope).map(|r| r.granted).unwrap_or(false)
    }

    pub fn record(&self, scope: ConsentScope) -> Option<ConsentRecord> {
        self.records.get(&scope).map(|r| *r)
    }
}

/// Permission first, then consent. Both failures are returned before any platform call.
pub(crate) async fn authorize(
    platform: &dyn PlatformBridge,
    consent: &ConsentLedger,
    permission: Permission,
    scope: ConsentScope,
) -> ControlResult<()> {
    if !platform.has_permission(permission).await {
        debug!(target: "sallie::control", permission = permission.as_str(), "permission missing");
        return Err(ControlError::PermissionDenied(permission));
    }
    if !consent.is_granted(scope) {
        debug!(target: "sallie::control", scope = scope.as_str(), "consent missing");
        return Err(ControlError::ConsentRequired(scope));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::SimulatedPlatform;

    #[test]
    fn test_unrecorded_scope_is_not_granted() {
        let ledger = ConsentLedger::from_flags(true, false, false);
        assert!(ledger.is_granted(ConsentScope::Calendar));
        assert!(!ledger.is_granted(ConsentScope::SystemSettings));
        assert!(ConsentLedger::new().record(ConsentScope::DeviceControl).is_none());

        ledger.grant(ConsentScope::DeviceControl);
        assert!(ledger.is_granted(ConsentScope::DeviceControl));
        ledger.revoke(ConsentScope::Calendar);
        assert!(!ledger.is_granted(ConsentScope::Calendar));
    }

    #[tokio::test]
    async fn test_permission_checked_before_consent() {
        let platform = SimulatedPlatform::new();
        let ledger = ConsentLedger::new();
        let err = authorize(&platform, &ledger, Permission::WriteCalendar, ConsentScope::Calendar)
            .await
            .unwrap_err();
        assert_eq!(err, ControlError::PermissionDenied(Permission::WriteCalendar));

        platform.grant(Permission::WriteCalendar).await;
        let err = authorize(&platform, &ledger, Permission::WriteCalendar, ConsentScope::Calendar)
            .await
            .unwrap_err();
        assert_eq!(err, ControlError::ConsentRequired(ConsentScope::Calendar));
        assert!(err.needs_user());
    }
}
