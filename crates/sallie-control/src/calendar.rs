//! Calendar management.

use crate::consent::{authorize, ConsentLedger, ConsentScope};
use crate::error::{ControlError, ControlResult};
use crate::events::{ChangeKind, ControlEventStream, StateChange};
use crate::platform::{Permission, PlatformBridge};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub id: String,
    pub title: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub all_day: bool,
    /// Minutes before `start`.
    #[serde(default)]
    pub reminders: Vec<u32>,
}

/// Fields for a new event; the manager assigns the id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventDraft {
    pub title: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub location: Option<String>,
    pub description: Option<String>,
    pub all_day: bool,
    pub reminders: Vec<u32>,
}

impl EventDraft {
    pub fn new(title: impl Into<String>, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            title: title.into(),
            start,
            end,
            ..Default::default()
        }
    }
}

fn validate(title: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> ControlResult<()> {
    if title.trim().is_empty() {
        return Err(ControlError::InvalidArgument("event title is empty".into()));
    }
    if end < start {
        return Err(ControlError::InvalidArgument(format!(
            "event ends ({end}) before it starts ({start})"
        )));
    }
    Ok(())
}

pub struct CalendarManager {
    platform: Arc<dyn PlatformBridge>,
    consent: Arc<ConsentLedger>,
    events: Option<Arc<ControlEventStream>>,
}

impl CalendarManager {
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
        authorize(self.platform.as_ref(), &self.consent, permission, ConsentScope::Calendar).await
    }

    fn publish(&self, event_id: &str, change: ChangeKind) {
        if let Some(events) = &self.events {
            events.publish(StateChange::Calendar {
                event_id: event_id.to_string(),
                change,
            });
        }
    }

    pub async fn create_event(&self, draft: EventDraft) -> ControlResult<CalendarEvent> {
        self.authorize(Permission::WriteCalendar).await?;
        validate(&draft.title, draft.start, draft.end)?;
        let event = CalendarEvent {
            id: Uuid::new_v4().to_string(),
            title: draft.title,
            start: draft.start,
            end: draft.end,
            location: draft.location,
            description: draft.description,
            all_day: draft.all_day,
            reminders: draft.reminders,
        };
        self.platform.insert_event(&event).await?;
        info!(target: "sallie::control", event_id = %event.id, title = %event.title, "calendar event created");
        self.publish(&event.id, ChangeKind::Created);
        Ok(event)
    }

    pub async fn update_event(&self, event: &CalendarEvent) -> ControlResult<()> {
        self.authorize(Permission::WriteCalendar).await?;
        validate(&event.title, event.start, event.end)?;
        if !self.platform.update_event(event).await? {
            return Err(ControlError::not_found("calendar event", &event.id));
        }
        info!(target: "sallie::control", event_id = %event.id, "calendar event updated");
        self.publish(&event.id, ChangeKind::Updated);
        Ok(())
    }

    pub async fn delete_event(&self, event_id: &str) -> ControlResult<()> {
        self.authorize(Permission::WriteCalendar).await?;
        if !self.platform.delete_event(event_id).await? {
            return Err(ControlError::not_found("calendar event", event_id));
        }
        info!(target: "sallie::control", event_id, "calendar event deleted");
        self.publish(event_id, ChangeKind::Deleted);
        Ok(())
    }

    /// Events overlapping `[start, end)`, earliest first.
    pub async fn events_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> ControlResult<Vec<CalendarEvent>> {
        self.authorize(Permission::ReadCalendar).await?;
        if end < start {
            return Err(ControlError::InvalidArgument("query window ends before it starts".into()));
        }
        Ok(self.platform.query_events(start, end).await?)
    }
}
