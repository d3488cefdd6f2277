//! Conversation, user, environment and system context in one versioned record.
//!
//! Every write goes through the single `RwLock` and bumps [`ContextState::version`]; patches
//! merge field-wise where a `Some` value replaces the stored one. Concurrent writers are
//! serialised and the last writer wins per field.

use crate::nlp::words;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::sync::{PoisonError, RwLock, RwLockWriteGuard};
use tracing::debug;

/// Default size of the recent-interaction ring.
pub const DEFAULT_HISTORY_LIMIT: usize = 10;

pub const DEFAULT_TOPIC: &str = "general";
pub const DEFAULT_EMOTION: &str = "neutral";

/// Ordered topic categories; the first category with a matching word wins.
const TOPICS: &[(&str, &[&str])] = &[
    ("planning", &["schedule", "calendar", "remind", "reminder", "appointment", "plan", "plans", "tomorrow", "event"]),
    ("work", &["work", "job", "meeting", "project", "deadline", "boss", "office", "colleague"]),
    ("health", &["health", "doctor", "sick", "exercise", "sleep", "medication", "headache", "workout"]),
    ("relationships", &["friend", "friends", "family", "partner", "mom", "dad", "sister", "brother", "relationship", "date"]),
    ("technology", &["phone", "computer", "app", "wifi", "bluetooth", "device", "battery", "lights", "brightness", "volume"]),
    ("entertainment", &["movie", "music", "song", "game", "show", "book", "netflix"]),
    ("weather", &["weather", "rain", "sunny", "forecast", "cold", "hot"]),
];

/// Ordered emotion categories; names match the mood keys used for personality adjustment.
const EMOTIONS: &[(&str, &[&str])] = &[
    ("sad", &["sad", "unhappy", "depressed", "lonely", "down", "cry", "crying", "miss"]),
    ("anxious", &["anxious", "worried", "stressed", "nervous", "scared", "afraid", "panic"]),
    ("angry", &["angry", "mad", "furious", "annoyed", "frustrated", "hate"]),
    ("happy", &["happy", "glad", "excited", "great", "awesome", "love", "wonderful"]),
    ("tired", &["tired", "exhausted", "sleepy", "drained"]),
];

fn first_category(tokens: &[String], categories: &[(&'static str, &[&str])], default: &'static str) -> &'static str {
    categories
        .iter()
        .find(|(_, keywords)| tokens.iter().any(|t| keywords.contains(&t.as_str())))
        .map(|(name, _)| *name)
        .unwrap_or(default)
}

pub fn detect_topic(text: &str) -> &'static str {
    first_category(&words(text), TOPICS, DEFAULT_TOPIC)
}

pub fn detect_emotion(text: &str) -> &'static str {
    first_category(&words(text), EMOTIONS, DEFAULT_EMOTION)
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interaction {
    pub input: String,
    pub topic: String,
    pub emotion: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationContext {
    pub current_topic: String,
    pub emotional_tone: String,
    /// Oldest first.
    pub recent: VecDeque<Interaction>,
    pub turn_count: u64,
    pub last_interaction: Option<DateTime<Utc>>,
}

impl Default for ConversationContext {
    fn default() -> Self {
        Self {
            current_topic: DEFAULT_TOPIC.to_string(),
            emotional_tone: DEFAULT_EMOTION.to_string(),
            recent: VecDeque::new(),
            turn_count: 0,
            last_interaction: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserContext {
    pub name: Option<String>,
    pub mood: Option<String>,
    pub activity: Option<String>,
    #[serde(default)]
    pub preferences: BTreeMap<String, String>,
}

/// Field-wise update for [`UserContext`]. Preferences are merged key by key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserContextPatch {
    pub name: Option<String>,
    pub mood: Option<String>,
    pub activity: Option<String>,
    pub preferences: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentalContext {
    pub location: Option<String>,
    pub time_of_day: Option<String>,
    pub network: Option<String>,
    pub charging: Option<bool>,
    pub battery_level: Option<f32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentPatch {
    pub location: Option<String>,
    pub time_of_day: Option<String>,
    pub network: Option<String>,
    pub charging: Option<bool>,
    pub battery_level: Option<f32>,
}

/// Replaced wholesale on update.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemContext {
    pub resource_state: String,
    pub active_tasks: usize,
    pub queued_tasks: usize,
    pub orchestrator_status: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextState {
    /// Incremented on every write.
    pub version: u64,
    pub conversation: ConversationContext,
    pub user: UserContext,
    pub environment: EnvironmentalContext,
    pub system: SystemContext,
    pub updated_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Manager
// ---------------------------------------------------------------------------

pub struct ContextManager {
    state: RwLock<ContextState>,
    history_limit: usize,
}

impl Default for ContextManager {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_LIMIT)
    }
}

impl ContextManager {
    pub fn new(history_limit: usize) -> Self {
        Self {
            state: RwLock::new(ContextState::default()),
            history_limit: history_limit.max(1),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, ContextState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn commit(state: &mut ContextState) {
        state.version += 1;
        state.updated_at = Some(Utc::now());
    }

    /// Records `input` in the conversation ring and re-derives topic and tone.
    pub fn capture_context(&self, input: &str) -> ConversationContext {
        let topic = detect_topic(input);
        let emotion = detect_emotion(input);
        let now = Utc::now();

        let mut state = self.write();
        let conversation = &mut state.conversation;
        conversation.recent.push_back(Interaction {
            input: input.to_string(),
            topic: topic.to_string(),
            emotion: emotion.to_string(),
            timestamp: now,
        });
        while conversation.recent.len() > self.history_limit {
            conversation.recent.pop_front();
        }
        conversation.current_topic = topic.to_string();
        conversation.emotional_tone = emotion.to_string();
        conversation.turn_count += 1;
        conversation.last_interaction = Some(now);
        let snapshot = conversation.clone();
        Self::commit(&mut state);

        debug!(target: "sallie::context", topic, emotion, version = state.version, "context captured");
        snapshot
    }

    pub fn update_user_context(&self, patch: UserContextPatch) -> u64 {
        let mut state = self.write();
        let user = &mut state.user;
        if let Some(name) = patch.name {
            user.name = Some(name);
        }
        if let Some(mood) = patch.mood {
            user.mood = Some(mood);
        }
        if let Some(activity) = patch.activity {
            user.activity = Some(activity);
        }
        if let Some(preferences) = patch.preferences {
            user.preferences.extend(preferences);
        }
        Self::commit(&mut state);
        state.version
    }

    pub fn update_environmental_context(&self, patch: EnvironmentPatch) -> u64 {
        let mut state = self.write();
        let env = &mut state.environment;
        if let Some(location) = patch.location {
            env.location = Some(location);
        }
        if let Some(time_of_day) = patch.time_of_day {
            env.time_of_day = Some(time_of_day);
        }
        if let Some(network) = patch.network {
            env.network = Some(network);
        }
        if let Some(charging) = patch.charging {
            env.charging = Some(charging);
        }
        if let Some(level) = patch.battery_level {
            env.battery_level = Some(level.clamp(0.0, 1.0));
        }
        Self::commit(&mut state);
        state.version
    }

    pub fn update_system_context(&self, system: SystemContext) -> u64 {
        let mut state = self.write();
        state.system = system;
        Self::commit(&mut state);
        state.version
    }

    pub fn snapshot(&self) -> ContextState {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn version(&self) -> u64 {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .version
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detection_defaults_and_order() {
        assert_eq!(detect_topic("nothing in particular"), DEFAULT_TOPIC);
        assert_eq!(detect_emotion("nothing in particular"), DEFAULT_EMOTION);
        // planning is checked before work
        assert_eq!(detect_topic("schedule a meeting with my boss"), "planning");
        assert_eq!(detect_topic("my boss moved the meeting"), "work");
        // whole words only: "happy" is not "app"
        assert_eq!(detect_topic("I am happy"), DEFAULT_TOPIC);
        assert_eq!(detect_emotion("I am sad but also happy"), "sad");
    }

    #[test]
    fn test_ring_is_bounded() {
        let manager = ContextManager::new(3);
        for i in 0..5 {
            manager.capture_context(&format!("message {}", i));
        }
        let state = manager.snapshot();
        assert_eq!(state.conversation.recent.len(), 3);
        assert_eq!(state.conversation.recent[0].input, "message 2");
        assert_eq!(state.conversation.turn_count, 5);
        assert_eq!(state.version, 5);
    }

    #[test]
    fn test_patches_merge_some_values() {
        let manager = ContextManager::default();
        manager.update_user_context(UserContextPatch {
            name: Some("Ada".into()),
            mood: Some("calm".into()),
            ..Default::default()
        });
        let version = manager.update_user_context(UserContextPatch {
            mood: Some("tired".into()),
            ..Default::default()
        });
        let state = manager.snapshot();
        assert_eq!(version, 2);
        assert_eq!(state.user.name.as_deref(), Some("Ada"));
        assert_eq!(state.user.mood.as_deref(), Some("tired"));

        manager.update_environmental_context(EnvironmentPatch {
            battery_level: Some(1.5),
            ..Default::default()
        });
        assert_eq!(manager.snapshot().environment.battery_level, Some(1.0));
        assert_eq!(manager.version(), 3);
    }
}
