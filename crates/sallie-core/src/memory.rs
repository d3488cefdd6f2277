//! Long-term memory: sled trees behind a DashMap hot cache.
//!
//! Trees:
//! - `interactions`: one [`InteractionRecord`] per exchange, keyed by a zero-padded timestamp so
//!   reverse iteration yields newest first. Supplies outcomes to natural evolution.
//! - `memory/episodic`, `memory/semantic`, `memory/procedural`: keyed [`MemoryItem`]s for the
//!   hierarchical store (`remember` / `recall` / `search`).

use crate::error::{SallieError, SallieResult};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use sallie_evolution::{EvolutionError, EvolutionResult, Feedback, InteractionOutcome, OutcomeSource};
use serde::{Deserialize, Serialize};
use sled::{Db, Tree};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tracing::debug;

const INTERACTIONS_TREE: &str = "interactions";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryLevel {
    /// Things that happened.
    Episodic,
    /// Facts about the user and the world.
    Semantic,
    /// How to do things.
    Procedural,
}

impl MemoryLevel {
    pub const ALL: [MemoryLevel; 3] = [
        MemoryLevel::Episodic,
        MemoryLevel::Semantic,
        MemoryLevel::Procedural,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryLevel::Episodic => "episodic",
            MemoryLevel::Semantic => "semantic",
            MemoryLevel::Procedural => "procedural",
        }
    }

    fn tree_name(&self) -> String {
        format!("memory/{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionRecord {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub input: String,
    pub response: String,
    pub topic: String,
    pub emotion: String,
    #[serde(default)]
    pub trait_feedback: BTreeMap<String, Feedback>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryItem {
    pub key: String,
    pub level: MemoryLevel,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub struct MemoryManager {
    db: Db,
    interactions: Tree,
    levels: BTreeMap<&'static str, Tree>,
    /// Hot cache keyed `interaction:{id}` or `{level}:{key}`. Checked before sled.
    cache: Arc<DashMap<String, Vec<u8>>>,
    sequence: AtomicU32,
}

impl MemoryManager {
    /// Opens or creates the memory database at `path`.
    pub fn open_path<P: AsRef<Path>>(path: P) -> SallieResult<Self> {
        let db = sled::open(path)?;
        let interactions = db.open_tree(INTERACTIONS_TREE)?;
        let mut levels = BTreeMap::new();
        for level in MemoryLevel::ALL {
            levels.insert(level.as_str(), db.open_tree(level.tree_name())?);
        }
        Ok(Self {
            db,
            interactions,
            levels,
            cache: Arc::new(DashMap::new()),
            sequence: AtomicU32::new(0),
        })
    }

    fn level_tree(&self, level: MemoryLevel) -> SallieResult<&Tree> {
        self.levels
            .get(level.as_str())
            .ok_or_else(|| SallieError::MissingModule(level.tree_name()))
    }

    // -----------------------------------------------------------------------
    // Interactions
    // -----------------------------------------------------------------------

    pub fn record_interaction(
        &self,
        input: &str,
        response: &str,
        topic: &str,
        emotion: &str,
    ) -> SallieResult<InteractionRecord> {
        let timestamp = Utc::now();
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed) % 10_000;
        let id = format!(
            "{:020}-{:04}",
            timestamp.timestamp_micros().max(0),
            seq
        );
        let record = InteractionRecord {
            id: id.clone(),
            timestamp,
            input: input.to_string(),
            response: response.to_string(),
            topic: topic.to_string(),
            emotion: emotion.to_string(),
            trait_feedback: BTreeMap::new(),
        };
        self.put_interaction(&record)?;
        debug!(target: "sallie::memory", id = %id, topic, "interaction recorded");
        Ok(record)
    }

    fn put_interaction(&self, record: &InteractionRecord) -> SallieResult<()> {
        let bytes = serde_json::to_vec(record)?;
        self.interactions.insert(record.id.as_bytes(), bytes.clone())?;
        self.cache.insert(format!("interaction:{}", record.id), bytes);
        Ok(())
    }

    pub fn get_interaction(&self, id: &str) -> SallieResult<Option<InteractionRecord>> {
        let ck = format!("interaction:{}", id);
        if let Some(bytes) = self.cache.get(&ck) {
            return Ok(Some(serde_json::from_slice(bytes.value())?));
        }
        match self.interactions.get(id.as_bytes())? {
            Some(ivec) => {
                self.cache.insert(ck, ivec.to_vec());
                Ok(Some(serde_json::from_slice(&ivec)?))
            }
            None => Ok(None),
        }
    }

    /// Attaches feedback for one trait to an interaction. `Ok(false)` for unknown ids.
    pub fn record_feedback(&self, id: &str, trait_name: &str, positive: bool) -> SallieResult<bool> {
        let Some(mut record) = self.get_interaction(id)? else {
            return Ok(false);
        };
        record
            .trait_feedback
            .insert(trait_name.to_string(), Feedback::from_positive(positive));
        self.put_interaction(&record)?;
        debug!(target: "sallie::memory", id, trait_name, positive, "feedback recorded");
        Ok(true)
    }

    /// Newest first.
    pub fn recent_interactions(&self, limit: usize) -> SallieResult<Vec<InteractionRecord>> {
        let mut out = Vec::with_capacity(limit.min(64));
        for entry in self.interactions.iter().rev().take(limit) {
            let (_, value) = entry?;
            out.push(serde_json::from_slice(&value)?);
        }
        Ok(out)
    }

    /// Most recent interaction, if any.
    pub fn last_interaction(&self) -> SallieResult<Option<InteractionRecord>> {
        Ok(self.recent_interactions(1)?.into_iter().next())
    }

    pub fn interaction_count(&self) -> usize {
        self.interactions.len()
    }

    // -----------------------------------------------------------------------
    // Hierarchical memory
    // -----------------------------------------------------------------------

    /// Stores `content` under `key`, keeping the original creation time on overwrite.
    pub fn remember(&self, level: MemoryLevel, key: &str, content: &str) -> SallieResult<MemoryItem> {
        let now = Utc::now();
        let created_at = self
            .recall(level, key)?
            .map(|existing| existing.created_at)
            .unwrap_or(now);
        let item = MemoryItem {
            key: key.to_string(),
            level,
            content: content.to_string(),
            created_at,
            updated_at: now,
        };
        let bytes = serde_json::to_vec(&item)?;
        self.level_tree(level)?.insert(key.as_bytes(), bytes.clone())?;
        self.cache.insert(format!("{}:{}", level.as_str(), key), bytes);
        Ok(item)
    }

    pub fn recall(&self, level: MemoryLevel, key: &str) -> SallieResult<Option<MemoryItem>> {
        let ck = format!("{}:{}", level.as_str(), key);
        if let Some(bytes) = self.cache.get(&ck) {
            return Ok(Some(serde_json::from_slice(bytes.value())?));
        }
        match self.level_tree(level)?.get(key.as_bytes())? {
            Some(ivec) => {
                self.cache.insert(ck, ivec.to_vec());
                Ok(Some(serde_json::from_slice(&ivec)?))
            }
            None => Ok(None),
        }
    }

    pub fn forget(&self, level: MemoryLevel, key: &str) -> SallieResult<bool> {
        self.cache.remove(&format!("{}:{}", level.as_str(), key));
        Ok(self.level_tree(level)?.remove(key.as_bytes())?.is_some())
    }

    /// Items whose key or content shares words with `query`, best match first
    /// (ties broken by most recently updated).
    pub fn search(&self, level: MemoryLevel, query: &str, limit: usize) -> SallieResult<Vec<MemoryItem>> {
        let terms: Vec<String> = crate::nlp::words(query)
            .into_iter()
            .filter(|w| w.len() > 2)
            .collect();
        if terms.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let mut scored: Vec<(usize, MemoryItem)> = Vec::new();
        for entry in self.level_tree(level)?.iter() {
            let (_, value) = entry?;
            let item: MemoryItem = serde_json::from_slice(&value)?;
            let haystack = format!("{} {}", item.key, item.content).to_lowercase();
            let score = terms.iter().filter(|t| haystack.contains(t.as_str())).count();
            if score > 0 {
                scored.push((score, item));
            }
        }
        scored.sort_by(|a, b| b.0.cmp(&a.0).then(b.1.updated_at.cmp(&a.1.updated_at)));
        Ok(scored.into_iter().take(limit).map(|(_, item)| item).collect())
    }

    pub async fn flush(&self) -> SallieResult<()> {
        self.db.flush_async().await?;
        Ok(())
    }
}

impl OutcomeSource for MemoryManager {
    fn recent_outcomes(&self, limit: usize) -> EvolutionResult<Vec<InteractionOutcome>> {
        let records = self
            .recent_interactions(limit)
            .map_err(|e| EvolutionError::Source(e.to_string()))?;
        Ok(records
            .into_iter()
            .map(|r| InteractionOutcome {
                timestamp: r.timestamp,
                trait_feedback: r.trait_feedback,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open() -> (tempfile::TempDir, MemoryManager) {
        let dir = tempfile::tempdir().unwrap();
        let memory = MemoryManager::open_path(dir.path().join("memory")).unwrap();
        (dir, memory)
    }

    #[test]
    fn test_recent_interactions_newest_first() {
        let (_dir, memory) = open();
        for i in 0..5 {
            memory
                .record_interaction(&format!("input {}", i), "ok", "general", "neutral")
                .unwrap();
        }
        let recent = memory.recent_interactions(3).unwrap();
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].input, "input 4");
        assert_eq!(recent[2].input, "input 2");
        assert_eq!(memory.interaction_count(), 5);
    }

    #[test]
    fn test_feedback_feeds_outcomes() {
        let (_dir, memory) = open();
        let record = memory.record_interaction("hi", "hello!", "general", "neutral").unwrap();
        assert!(memory.record_feedback(&record.id, "warmth", true).unwrap());
        assert!(!memory.record_feedback("missing", "warmth", true).unwrap());

        let outcomes = memory.recent_outcomes(10).unwrap();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].trait_feedback.get("warmth"), Some(&Feedback::Positive));
    }

    #[test]
    fn test_hierarchical_levels_are_separate() {
        let (_dir, memory) = open();
        memory
            .remember(MemoryLevel::Semantic, "favorite_color", "The user's favorite color is green")
            .unwrap();
        memory
            .remember(MemoryLevel::Procedural, "morning_routine", "Coffee, then a short walk")
            .unwrap();

        assert!(memory.recall(MemoryLevel::Episodic, "favorite_color").unwrap().is_none());
        let hit = memory.search(MemoryLevel::Semantic, "what color do I like", 5).unwrap();
        assert_eq!(hit.len(), 1);
        assert_eq!(hit[0].key, "favorite_color");

        assert!(memory.forget(MemoryLevel::Procedural, "morning_routine").unwrap());
        assert!(memory.recall(MemoryLevel::Procedural, "morning_routine").unwrap().is_none());
    }

    #[test]
    fn test_remember_keeps_created_at() {
        let (_dir, memory) = open();
        let first = memory.remember(MemoryLevel::Episodic, "trip", "Went to Lisbon").unwrap();
        let second = memory
            .remember(MemoryLevel::Episodic, "trip", "Went to Lisbon and Porto")
            .unwrap();
        assert_eq!(first.created_at, second.created_at);
        assert!(second.updated_at >= first.updated_at);
    }
}
