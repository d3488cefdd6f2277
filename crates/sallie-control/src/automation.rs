//! Smart-home devices, automation rules and scenes.
//!
//! Devices are known after [`DeviceAutomationManager::discover_devices`]. Commands go to the
//! platform first and, on success, update the device's `properties` in place. Rules are
//! evaluated only against events handed to [`DeviceAutomationManager::handle_event`]; the
//! property changes a rule causes do not trigger further rules.

use crate::consent::{authorize, ConsentLedger, ConsentScope};
use crate::error::{ControlError, ControlResult};
use crate::events::{ControlEventStream, StateChange};
use crate::platform::{Permission, PlatformBridge};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    Light,
    Plug,
    Thermostat,
    Lock,
    Speaker,
    Sensor,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Protocol {
    Wifi,
    Bluetooth,
    Zigbee,
    ZWave,
    Matter,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceCapability {
    OnOff,
    Brightness,
    Color,
    Temperature,
    Lock,
    Volume,
}

impl DeviceCapability {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceCapability::OnOff => "on_off",
            DeviceCapability::Brightness => "brightness",
            DeviceCapability::Color => "color",
            DeviceCapability::Temperature => "temperature",
            DeviceCapability::Lock => "lock",
            DeviceCapability::Volume => "volume",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub id: String,
    pub name: String,
    pub kind: DeviceKind,
    pub protocol: Protocol,
    pub capabilities: BTreeSet<DeviceCapability>,
    #[serde(default)]
    pub properties: BTreeMap<String, Value>,
    pub online: bool,
}

impl Device {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        kind: DeviceKind,
        protocol: Protocol,
        capabilities: &[DeviceCapability],
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind,
            protocol,
            capabilities: capabilities.iter().copied().collect(),
            properties: BTreeMap::new(),
            online: true,
        }
    }

    pub fn supports(&self, capability: DeviceCapability) -> bool {
        self.capabilities.contains(&capability)
    }

    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", content = "value", rename_all = "snake_case")]
pub enum DeviceCommand {
    TurnOn,
    TurnOff,
    /// Percent, 0–100.
    SetBrightness(u8),
    SetColor(String),
    /// Degrees Celsius.
    SetTemperature(f32),
    Lock,
    Unlock,
    /// Percent, 0–100.
    SetVolume(u8),
}

impl DeviceCommand {
    pub fn required_capability(&self) -> DeviceCapability {
        match self {
            DeviceCommand::TurnOn | DeviceCommand::TurnOff => DeviceCapability::OnOff,
            DeviceCommand::SetBrightness(_) => DeviceCapability::Brightness,
            DeviceCommand::SetColor(_) => DeviceCapability::Color,
            DeviceCommand::SetTemperature(_) => DeviceCapability::Temperature,
            DeviceCommand::Lock | DeviceCommand::Unlock => DeviceCapability::Lock,
            DeviceCommand::SetVolume(_) => DeviceCapability::Volume,
        }
    }

    fn validate(&self) -> ControlResult<()> {
        match self {
            DeviceCommand::SetBrightness(p) | DeviceCommand::SetVolume(p) if *p > 100 => Err(
                ControlError::InvalidArgument(format!("percentage {p} above 100")),
            ),
            DeviceCommand::SetTemperature(t) if !t.is_finite() => {
                Err(ControlError::InvalidArgument("temperature is not a number".into()))
            }
            DeviceCommand::SetColor(c) if c.trim().is_empty() => {
                Err(ControlError::InvalidArgument("color is empty".into()))
            }
            _ => Ok(()),
        }
    }

    /// The property this command sets and its new value.
    pub fn property_change(&self) -> (&'static str, Value) {
        match self {
            DeviceCommand::TurnOn => ("on", json!(true)),
            DeviceCommand::TurnOff => ("on", json!(false)),
            DeviceCommand::SetBrightness(p) => ("brightness", json!(p)),
            DeviceCommand::SetColor(c) => ("color", json!(c)),
            DeviceCommand::SetTemperature(t) => ("temperature", json!(t)),
            DeviceCommand::Lock => ("locked", json!(true)),
            DeviceCommand::Unlock => ("locked", json!(false)),
            DeviceCommand::SetVolume(p) => ("volume", json!(p)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceAction {
    pub device_id: String,
    pub command: DeviceCommand,
}

impl DeviceAction {
    pub fn new(device_id: impl Into<String>, command: DeviceCommand) -> Self {
        Self {
            device_id: device_id.into(),
            command,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Trigger {
    /// A device property reached `equals`.
    DeviceState {
        device_id: String,
        property: String,
        equals: Value,
    },
    /// Local wall-clock time.
    Time { hour: u8, minute: u8 },
    /// A named event such as `arrived_home`.
    Named { name: String },
}

/// Something that happened, checked against rule triggers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AutomationEvent {
    DeviceChanged {
        device_id: String,
        property: String,
        value: Value,
    },
    Clock { hour: u8, minute: u8 },
    Named { name: String },
}

impl Trigger {
    pub fn matches(&self, event: &AutomationEvent) -> bool {
        match (self, event) {
            (
                Trigger::DeviceState {
                    device_id,
                    property,
                    equals,
                },
                AutomationEvent::DeviceChanged {
                    device_id: changed,
                    property: changed_property,
                    value,
                },
            ) => device_id == changed && property == changed_property && equals == value,
            (Trigger::Time { hour, minute }, AutomationEvent::Clock { hour: h, minute: m }) => {
                hour == h && minute == m
            }
            (Trigger::Named { name }, AutomationEvent::Named { name: fired }) => name == fired,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutomationRule {
    pub id: String,
    pub name: String,
    pub trigger: Trigger,
    pub actions: Vec<DeviceAction>,
    pub enabled: bool,
}

impl AutomationRule {
    pub fn new(name: impl Into<String>, trigger: Trigger, actions: Vec<DeviceAction>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            trigger,
            actions,
            enabled: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    pub id: String,
    pub name: String,
    pub actions: Vec<DeviceAction>,
}

// ---------------------------------------------------------------------------
// Manager
// ---------------------------------------------------------------------------

pub struct DeviceAutomationManager {
    platform: Arc<dyn PlatformBridge>,
    consent: Arc<ConsentLedger>,
    events: Option<Arc<ControlEventStream>>,
    devices: Mutex<HashMap<String, Device>>,
    rules: Mutex<HashMap<String, AutomationRule>>,
    scenes: Mutex<HashMap<String, Scene>>,
}

impl DeviceAutomationManager {
    pub fn new(platform: Arc<dyn PlatformBridge>, consent: Arc<ConsentLedger>) -> Self {
        Self {
            platform,
            consent,
            events: None,
            devices: Mutex::new(HashMap::new()),
            rules: Mutex::new(HashMap::new()),
            scenes: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_events(mut self, events: Arc<ControlEventStream>) -> Self {
        self.events = Some(events);
        self
    }

    async fn authorize(&self) -> ControlResult<()> {
        authorize(
            self.platform.as_ref(),
            &self.consent,
            Permission::NearbyDevices,
            ConsentScope::DeviceControl,
        )
        .await
    }

    fn publish(&self, change: StateChange) {
        if let Some(events) = &self.events {
            events.publish(change);
        }
    }

    /// Asks the platform for reachable devices and merges them into the known set.
    ///
    /// Properties already tracked for a rediscovered device are kept.
    pub async fn discover_devices(&self) -> ControlResult<Vec<Device>> {
        self.authorize().await?;
        let found = self.platform.discover_devices().await?;
        let mut devices = self.devices.lock().await;
        for mut device in found {
            match devices.get(&device.id) {
                Some(known) => {
                    for (key, value) in &known.properties {
                        device.properties.entry(key.clone()).or_insert_with(|| value.clone());
                    }
                }
                None => {
                    info!(target: "sallie::control", device_id = %device.id, name = %device.name, "device discovered");
                    self.publish(StateChange::DeviceDiscovered {
                        device_id: device.id.clone(),
                    });
                }
            }
            devices.insert(device.id.clone(), device);
        }
        let mut all: Vec<Device> = devices.values().cloned().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(all)
    }

    pub async fn devices(&self) -> Vec<Device> {
        let mut all: Vec<Device> = self.devices.lock().await.values().cloned().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    pub async fn device(&self, device_id: &str) -> Option<Device> {
        self.devices.lock().await.get(device_id).cloned()
    }

    /// Marks a known device reachable or not.
    pub async fn set_online(&self, device_id: &str, online: bool) -> ControlResult<()> {
        let mut devices = self.devices.lock().await;
        let device = devices
            .get_mut(device_id)
            .ok_or_else(|| ControlError::not_found("device", device_id))?;
        device.online = online;
        Ok(())
    }

    /// Sends `command` and applies its property change. Returns the updated device.
    pub async fn execute_command(&self, device_id: &str, command: DeviceCommand) -> ControlResult<Device> {
        self.authorize().await?;
        self.dispatch(device_id, &command).await
    }

    async fn dispatch(&self, device_id: &str, command: &DeviceCommand) -> ControlResult<Device> {
        command.validate()?;
        let device = self
            .device(device_id)
            .await
            .ok_or_else(|| ControlError::not_found("device", device_id))?;
        if !device.online {
            return Err(ControlError::DeviceOffline(device_id.to_string()));
        }
        let capability = command.required_capability();
        if !device.supports(capability) {
            return Err(ControlError::InvalidArgument(format!(
                "device {} does not support {}",
                device_id,
                capability.as_str()
            )));
        }

        // The map lock is not held across the platform call.
        self.platform.send_device_command(&device, command).await?;

        let (property, value) = command.property_change();
        let updated = {
            let mut devices = self.devices.lock().await;
            let device = devices
                .get_mut(device_id)
                .ok_or_else(|| ControlError::not_found("device", device_id))?;
            device.properties.insert(property.to_string(), value.clone());
            device.clone()
        };
        debug!(target: "sallie::control", device_id, property, %value, "device property updated");
        self.publish(StateChange::DeviceProperty {
            device_id: device_id.to_string(),
            property: property.to_string(),
            value,
        });
        Ok(updated)
    }

    pub async fn add_rule(&self, rule: AutomationRule) -> ControlResult<String> {
        if rule.actions.is_empty() {
            return Err(ControlError::InvalidArgument(format!("rule '{}' has no actions", rule.name)));
        }
        let id = rule.id.clone();
        info!(target: "sallie::control", rule_id = %id, name = %rule.name, "automation rule added");
        self.rules.lock().await.insert(id.clone(), rule);
        Ok(id)
    }

    pub async fn remove_rule(&self, rule_id: &str) -> bool {
        self.rules.lock().await.remove(rule_id).is_some()
    }

    pub async fn set_rule_enabled(&self, rule_id: &str, enabled: bool) -> ControlResult<()> {
        let mut rules = self.rules.lock().await;
        let rule = rules
            .get_mut(rule_id)
            .ok_or_else(|| ControlError::not_found("rule", rule_id))?;
        rule.enabled = enabled;
        Ok(())
    }

    pub async fn rules(&self) -> Vec<AutomationRule> {
        let mut all: Vec<AutomationRule> = self.rules.lock().await.values().cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }

    /// Runs every enabled rule whose trigger matches `event`, in name order.
    ///
    /// Stops at the first failing action and returns its error. Returns the ids of the rules
    /// that ran.
    pub async fn handle_event(&self, event: &AutomationEvent) -> ControlResult<Vec<String>> {
        let mut matching: Vec<AutomationRule> = self
            .rules
            .lock()
            .await
            .values()
            .filter(|rule| rule.enabled && rule.trigger.matches(event))
            .cloned()
            .collect();
        if matching.is_empty() {
            return Ok(Vec::new());
        }
        self.authorize().await?;
        matching.sort_by(|a, b| a.name.cmp(&b.name));

        let mut fired = Vec::with_capacity(matching.len());
        for rule in matching {
            for action in &rule.actions {
                if let Err(e) = self.dispatch(&action.device_id, &action.command).await {
                    warn!(target: "sallie::control", rule_id = %rule.id, device_id = %action.device_id, error = %e, "rule action failed");
                    return Err(e);
                }
            }
            info!(target: "sallie::control", rule_id = %rule.id, name = %rule.name, "automation rule fired");
            self.publish(StateChange::RuleFired {
                rule_id: rule.id.clone(),
            });
            fired.push(rule.id);
        }
        Ok(fired)
    }

    pub async fn create_scene(&self, name: impl Into<String>, actions: Vec<DeviceAction>) -> ControlResult<Scene> {
        let name = name.into();
        if actions.is_empty() {
            return Err(ControlError::InvalidArgument(format!("scene '{name}' has no actions")));
        }
        let scene = Scene {
            id: Uuid::new_v4().to_string(),
            name,
            actions,
        };
        self.scenes.lock().await.insert(scene.id.clone(), scene.clone());
        Ok(scene)
    }

    pub async fn remove_scene(&self, scene_id: &str) -> bool {
        self.scenes.lock().await.remove(scene_id).is_some()
    }

    pub async fn scenes(&self) -> Vec<Scene> {
        let mut all: Vec<Scene> = self.scenes.lock().await.values().cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }

    /// Runs a scene's actions in order. Stops at the first failure.
    pub async fn activate_scene(&self, scene_id: &str) -> ControlResult<Vec<Device>> {
        self.authorize().await?;
        let scene = self
            .scenes
            .lock()
            .await
            .get(scene_id)
            .cloned()
            .ok_or_else(|| ControlError::not_found("scene", scene_id))?;
        let mut touched = Vec::with_capacity(scene.actions.len());
        for action in &scene.actions {
            touched.push(self.dispatch(&action.device_id, &action.command).await?);
        }
        info!(target: "sallie::control", scene_id, name = %scene.name, "scene activated");
        self.publish(StateChange::SceneActivated {
            scene_id: scene_id.to_string(),
        });
        Ok(touched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_trigger_matching() {
        let trigger = Trigger::DeviceState {
            device_id: "door".into(),
            property: "locked".into(),
            equals: json!(false),
        };
        assert!(trigger.matches(&AutomationEvent::DeviceChanged {
            device_id: "door".into(),
            property: "locked".into(),
            value: json!(false),
        }));
        assert!(!trigger.matches(&AutomationEvent::DeviceChanged {
            device_id: "door".into(),
            property: "locked".into(),
            value: json!(true),
        }));
        assert!(!trigger.matches(&AutomationEvent::Named { name: "door".into() }));
        assert!(Trigger::Time { hour: 7, minute: 30 }.matches(&AutomationEvent::Clock { hour: 7, minute: 30 }));
    }

    #[test]
    fn test_command_validation_and_property_change() {
        assert!(DeviceCommand::SetBrightness(101).validate().is_err());
        assert!(DeviceCommand::SetTemperature(f32::NAN).validate().is_err());
        assert!(DeviceCommand::SetVolume(40).validate().is_ok());
        assert_eq!(DeviceCommand::Unlock.property_change(), ("locked", json!(false)));
        assert_eq!(DeviceCommand::TurnOn.required_capability(), DeviceCapability::OnOff);
    }
}
