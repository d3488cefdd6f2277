//! Platform bridge: the seam between the managers and the phone OS.
//!
//! The managers never talk to the OS directly. A [`PlatformBridge`] answers permission queries
//! and performs the calendar, settings and device calls; [`SimulatedPlatform`] keeps everything
//! in memory for desktops and tests.

use crate::automation::{Device, DeviceCommand};
use crate::calendar::CalendarEvent;
use crate::error::{PlatformError, PlatformResult};
use crate::system::{SystemSettings, VolumeStream};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use tokio::sync::Mutex;

/// OS-level permissions the managers check before acting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    ReadCalendar,
    WriteCalendar,
    ReadSettings,
    WriteSettings,
    ChangeWifiState,
    Bluetooth,
    NotificationPolicy,
    NearbyDevices,
}

impl Permission {
    pub const ALL: [Permission; 8] = [
        Permission::ReadCalendar,
        Permission::WriteCalendar,
        Permission::ReadSettings,
        Permission::WriteSettings,
        Permission::ChangeWifiState,
        Permission::Bluetooth,
        Permission::NotificationPolicy,
        Permission::NearbyDevices,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::ReadCalendar => "read_calendar",
            Permission::WriteCalendar => "write_calendar",
            Permission::ReadSettings => "read_settings",
            Permission::WriteSettings => "write_settings",
            Permission::ChangeWifiState => "change_wifi_state",
            Permission::Bluetooth => "bluetooth",
            Permission::NotificationPolicy => "notification_policy",
            Permission::NearbyDevices => "nearby_devices",
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Calls into the host OS. Implementations report failures as [`PlatformError`]; the managers
/// surface them unchanged and never retry.
#[async_trait]
pub trait PlatformBridge: Send + Sync {
    async fn has_permission(&self, permission: Permission) -> bool;

    async fn insert_event(&self, event: &CalendarEvent) -> PlatformResult<()>;
    /// Replaces a stored event. `Ok(false)` when no event has that id.
    async fn update_event(&self, event: &CalendarEvent) -> PlatformResult<bool>;
    /// `Ok(false)` when no event has that id.
    async fn delete_event(&self, event_id: &str) -> PlatformResult<bool>;
    /// Events overlapping `[start, end)`.
    async fn query_events(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> PlatformResult<Vec<CalendarEvent>>;

    async fn read_settings(&self) -> PlatformResult<SystemSettings>;
    async fn set_wifi_enabled(&self, enabled: bool) -> PlatformResult<()>;
    async fn set_bluetooth_enabled(&self, enabled: bool) -> PlatformResult<()>;
    async fn set_brightness(&self, level: u8) -> PlatformResult<()>;
    async fn set_volume(&self, stream: VolumeStream, level: u8) -> PlatformResult<()>;
    async fn set_do_not_disturb(&self, enabled: bool) -> PlatformResult<()>;

    async fn discover_devices(&self) -> PlatformResult<Vec<Device>>;
    async fn send_device_command(&self, device: &Device, command: &DeviceCommand) -> PlatformResult<()>;
}

// ---------------------------------------------------------------------------
// Simulated platform
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct SimulatedState {
    granted: HashSet<Permission>,
    events: BTreeMap<String, CalendarEvent>,
    settings: SystemSettings,
    devices: Vec<Device>,
    fail_next: Option<String>,
    commands: Vec<(String, DeviceCommand)>,
}

impl SimulatedState {
    fn check_failure(&mut self) -> PlatformResult<()> {
        match self.fail_next.take() {
            Some(message) => Err(PlatformError(message)),
            None => Ok(()),
        }
    }
}

/// In-memory platform. Starts with no permissions granted; `fail_next` injects one failure.
#[derive(Debug, Default)]
pub struct SimulatedPlatform {
    state: Mutex<SimulatedState>,
}

impl SimulatedPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    /// A platform with every [`Permission`] granted and the given devices on the network.
    pub fn permissive(devices: Vec<Device>) -> Self {
        let state = SimulatedState {
            granted: Permission::ALL.into_iter().collect(),
            devices,
            ..Default::default()
        };
        Self {
            state: Mutex::new(state),
        }
    }

    pub async fn grant(&self, permission: Permission) {
        self.state.lock().await.granted.insert(permission);
    }

    pub async fn revoke(&self, permission: Permission) {
        self.state.lock().await.granted.remove(&permission);
    }

    /// The next platform call fails with `message`.
    pub async fn fail_next(&self, message: impl Into<String>) {
        self.state.lock().await.fail_next = Some(message.into());
    }

    pub async fn add_device(&self, device: Device) {
        self.state.lock().await.devices.push(device);
    }

    /// Commands sent so far, as `(device_id, command)`.
    pub async fn sent_commands(&self) -> Vec<(String, DeviceCommand)> {
        self.state.lock().await.commands.clone()
    }
}

#[async_trait]
impl PlatformBridge for SimulatedPlatform {
    async fn has_permission(&self, permission: Permission) -> bool {
        self.state.lock().await.granted.contains(&permission)
    }

    async fn insert_event(&self, event: &CalendarEvent) -> PlatformResult<()> {
        let mut state = self.state.lock().await;
        state.check_failure()?;
        state.events.insert(event.id.clone(), event.clone());
        Ok(())
    }

    async fn update_event(&self, event: &CalendarEvent) -> PlatformResult<bool> {
        let mut state = self.state.lock().await;
        state.check_failure()?;
        match state.events.get_mut(&event.id) {
            Some(stored) => {
                *stored = event.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_event(&self, event_id: &str) -> PlatformResult<bool> {
        let mut state = self.state.lock().await;
        state.check_failure()?;
        Ok(state.events.remove(event_id).is_some())
    }

    async fn query_events(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> PlatformResult<Vec<CalendarEvent>> {
        let mut state = self.state.lock().await;
        state.check_failure()?;
        let mut events: Vec<CalendarEvent> = state
            .events
            .values()
            .filter(|e| e.start < end && e.end > start)
            .cloned()
            .collect();
        events.sort_by_key(|e| e.start);
        Ok(events)
    }

    async fn read_settings(&self) -> PlatformResult<SystemSettings> {
        let mut state = self.state.lock().await;
        state.check_failure()?;
        Ok(state.settings.clone())
    }

    async fn set_wifi_enabled(&self, enabled: bool) -> PlatformResult<()> {
        let mut state = self.state.lock().await;
        state.check_failure()?;
        state.settings.wifi_enabled = enabled;
        Ok(())
    }

    async fn set_bluetooth_enabled(&self, enabled: bool) -> PlatformResult<()> {
        let mut state = self.state.lock().await;
        state.check_failure()?;
        state.settings.bluetooth_enabled = enabled;
        Ok(())
    }

    async fn set_brightness(&self, level: u8) -> PlatformResult<()> {
        let mut state = self.state.lock().await;
        state.check_failure()?;
        state.settings.brightness = level;
        Ok(())
    }

    async fn set_volume(&self, stream: VolumeStream, level: u8) -> PlatformResult<()> {
        let mut state = self.state.lock().await;
        state.check_failure()?;
        state.settings.volumes.insert(stream, level);
        Ok(())
    }

    async fn set_do_not_disturb(&self, enabled: bool) -> PlatformResult<()> {
        let mut state = self.state.lock().await;
        state.check_failure()?;
        state.settings.do_not_disturb = enabled;
        Ok(())
    }

    async fn discover_devices(&self) -> PlatformResult<Vec<Device>> {
        let mut state = self.state.lock().await;
        state.check_failure()?;
        Ok(state.devices.clone())
    }

    async fn send_device_command(&self, device: &Device, command: &DeviceCommand) -> PlatformResult<()> {
        let mut state = self.state.lock().await;
        state.check_failure()?;
        state.commands.push((device.id.clone(), command.clone()));
        Ok(())
    }
}
