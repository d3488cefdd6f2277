//! State-change events published by the managers.
//!
//! The stream is a bounded channel. Publishing never waits: when the buffer is full the event
//! is dropped and counted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::debug;

pub const DEFAULT_EVENT_BUFFER: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Created,
    Updated,
    Deleted,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StateChange {
    Calendar { event_id: String, change: ChangeKind },
    Setting { setting: String, value: serde_json::Value },
    DeviceDiscovered { device_id: String },
    DeviceProperty { device_id: String, property: String, value: serde_json::Value },
    RuleFired { rule_id: String },
    SceneActivated { scene_id: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateEvent {
    pub at: DateTime<Utc>,
    pub change: StateChange,
}

impl StateEvent {
    pub fn now(change: StateChange) -> Self {
        Self { at: Utc::now(), change }
    }
}

#[derive(Debug)]
pub struct ControlEventStream {
    tx: mpsc::Sender<StateEvent>,
    dropped: AtomicU64,
}

impl ControlEventStream {
    /// Creates a stream with room for `capacity` undelivered events.
    pub fn channel(capacity: usize) -> (Arc<Self>, mpsc::Receiver<StateEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Arc::new(Self {
                tx,
                dropped: AtomicU64::new(0),
            }),
            rx,
        )
    }

    pub fn publish(&self, change: StateChange) {
        match self.tx.try_send(StateEvent::now(change)) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                debug!(target: "sallie::control", dropped, change = ?event.change, "event buffer full; dropping");
            }
            Err(TrySendError::Closed(_)) => {
                debug!(target: "sallie::control", "event receiver closed");
            }
        }
    }

    /// Events dropped because the buffer was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_overflow_is_dropped_and_counted() {
        let (stream, mut rx) = ControlEventStream::channel(DEFAULT_EVENT_BUFFER);
        for i in 0..12 {
            stream.publish(StateChange::RuleFired {
                rule_id: format!("r{i}"),
            });
        }
        assert_eq!(stream.dropped(), 2);

        let first = rx.recv().await.unwrap();
        assert_eq!(first.change, StateChange::RuleFired { rule_id: "r0".into() });
        // Space freed by the receive is usable again.
        stream.publish(StateChange::SceneActivated { scene_id: "s".into() });
        assert_eq!(stream.dropped(), 2);
    }
}
