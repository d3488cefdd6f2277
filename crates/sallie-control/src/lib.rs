//! sallie-control: phone and smart-home control for the companion.
//!
//! Every manager call follows the same contract: platform permission, then user consent, then
//! one platform call. Failures come back as a [`ControlError`] whose variant tells a missing
//! grant ([`ControlError::needs_user`]) apart from a broken platform call. Nothing is retried.
//!
//! Managers publish [`StateEvent`]s into a shared bounded [`ControlEventStream`].

pub mod automation;
pub mod calendar;
pub mod consent;
mod error;
pub mod events;
pub mod platform;
pub mod system;

pub use automation::{
    AutomationEvent, AutomationRule, Device, DeviceAction, DeviceAutomationManager, DeviceCapability,
    DeviceCommand, DeviceKind, Protocol, Scene, Trigger,
};
pub use calendar::{CalendarEvent, CalendarManager, EventDraft};
pub use consent::{ConsentLedger, ConsentRecord, ConsentScope};
pub use error::{ControlError, ControlResult, PlatformError, PlatformResult};
pub use events::{ChangeKind, ControlEventStream, StateChange, StateEvent, DEFAULT_EVENT_BUFFER};
pub use platform::{Permission, PlatformBridge, SimulatedPlatform};
pub use system::{SystemControlManager, SystemSettings, VolumeStream, MAX_VOLUME};

use std::sync::Arc;
use tokio::sync::mpsc;

/// The three managers wired to one platform, one consent ledger and one event stream.
pub struct ControlCenter {
    pub calendar: CalendarManager,
    pub system: SystemControlManager,
    pub devices: DeviceAutomationManager,
    pub consent: Arc<ConsentLedger>,
    pub events: Arc<ControlEventStream>,
}

impl ControlCenter {
    pub fn new(
        platform: Arc<dyn PlatformBridge>,
        consent: Arc<ConsentLedger>,
    ) -> (Self, mpsc::Receiver<StateEvent>) {
        let (events, rx) = ControlEventStream::channel(DEFAULT_EVENT_BUFFER);
        let center = Self {
            calendar: CalendarManager::new(Arc::clone(&platform), Arc::clone(&consent))
                .with_events(Arc::clone(&events)),
            system: SystemControlManager::new(Arc::clone(&platform), Arc::clone(&consent))
                .with_events(Arc::clone(&events)),
            devices: DeviceAutomationManager::new(platform, Arc::clone(&consent))
                .with_events(Arc::clone(&events)),
            consent,
            events,
        };
        (center, rx)
    }
}
