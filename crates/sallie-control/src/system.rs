//! System settings: radios, screen, audio and do-not-disturb.

use crate::consent::{authorize, ConsentLedger, ConsentScope};
use crate::error::{ControlError, ControlResult};
use crate::events::{ControlEventStream, StateChange};
use crate::platform::{Permission, PlatformBridge};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

/// Highest volume level accepted by [`SystemControlManager::set_volume`].
pub const MAX_VOLUME: u8 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VolumeStream {
    Media,
    Ring,
    Alarm,
    Notification,
    Call,
}

impl VolumeStream {
    pub fn as_str(&self) -> &'static str {
        match self {
            VolumeStream::Media => "media",
            VolumeStream::Ring => "ring",
            VolumeStream::Alarm => "alarm",
            VolumeStream::Notification => "notification",
            VolumeStream::Call => "call",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemSettings {
    pub wifi_enabled: bool,
    pub bluetooth_enabled: bool,
    pub brightness: u8,
    pub volumes: BTreeMap<VolumeStream, u8>,
    pub do_not_disturb: bool,
}

impl Default for SystemSettings {
    fn default() -> Self {
        Self {
            wifi_enabled: true,
            bluetooth_enabled: false,
            brightness: 128,
            volumes: BTreeMap::new(),
            do_not_disturb: false,
        }
    }
}

pub struct SystemControlManager {
    platform: Arc<dyn PlatformBridge>,
    consent: Arc<ConsentLedger>,
    events: Option<Arc<ControlEventStream>>,
}

impl SystemControlManager {
    pub fn new(platform: Arc<dyn PlatformBridge>, consent: Arc<ConsentLedger>) -> Self {
        Self {
            platform,
            consent,
            events: None,
        }
    }

    pub fn with_events(mut self, events: Arc<ControlEventStream>) -> Self {
        self.events = Some(events);
        self
    }

    async fn authorize(&self, permission: Permission) -> ControlResult<()> {
        authorize(
            self.platform.as_ref(),
            &self.consent,
            permission,
            ConsentScope::SystemSettings,
        )
        .await
    }

    fn changed(&self, setting: &str, value: serde_json::Value) {
        info!(target: "sallie::control", setting, %value, "system setting changed");
        if let Some(events) = &self.events {
            events.publish(StateChange::Setting {
                setting: setting.to_string(),
                value,
            });
        }
    }

    pub async fn toggle_wifi(&self, enabled: bool) -> ControlResult<()> {
        self.authorize(Permission::ChangeWifiState).await?;
        self.platform.set_wifi_enabled(enabled).await?;
        self.changed("wifi", json!(enabled));
        Ok(())
    }

    pub async fn toggle_bluetooth(&self, enabled: bool) -> ControlResult<()> {
        self.authorize(Permission::Bluetooth).await?;
        self.platform.set_bluetooth_enabled(enabled).await?;
        self.changed("bluetooth", json!(enabled));
        Ok(())
    }

    /// Screen brightness on the platform's 0–255 scale.
    pub async fn set_screen_brightness(&self, level: u8) -> ControlResult<()> {
        self.authorize(Permission::WriteSettings).await?;
        self.platform.set_brightness(level).await?;
        self.changed("brightness", json!(level));
        Ok(())
    }

    /// Volume for one stream, 0 to [`MAX_VOLUME`].
    pub async fn set_volume(&self, stream: VolumeStream, level: u8) -> ControlResult<()> {
        self.authorize(Permission::WriteSettings).await?;
        if level > MAX_VOLUME {
            return Err(ControlError::InvalidArgument(format!(
                "volume {level} above {MAX_VOLUME}"
            )));
        }
        self.platform.set_volume(stream, level).await?;
        self.changed(&format!("volume.{}", stream.as_str()), json!(level));
        Ok(())
    }

    pub async fn set_do_not_disturb(&self, enabled: bool) -> ControlResult<()> {
        self.authorize(Permission::NotificationPolicy).await?;
        self.platform.set_do_not_disturb(enabled).await?;
        self.changed("do_not_disturb", json!(enabled));
        Ok(())
    }

    pub async fn settings_snapshot(&self) -> ControlResult<SystemSettings> {
        self.authorize(Permission::ReadSettings).await?;
        Ok(self.platform.read_settings().await?)
    }
}
