//! JSON persistence for personality snapshots and evolution history.
//!
//! Each write goes to its own temporary file in the target directory and is then persisted
//! over the target, so concurrent writers never share a temp path. Unknown keys are ignored
//! on load so older and newer snapshots stay readable.

use crate::error::{EvolutionError, EvolutionResult};
use crate::evolution::EvolutionEvent;
use crate::profile::PersonalityProfile;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

const SNAPSHOT_FILE: &str = "personality_snapshot.json";
const HISTORY_FILE: &str = "evolution_history.json";

/// Current snapshot layout version.
pub const SNAPSHOT_VERSION: u32 = 1;

/// What survives a restart: the two source profiles and the evolution counters.
/// The blended profile is recomputed on load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedPersonality {
    #[serde(default = "default_version")]
    pub version: u32,
    pub core: PersonalityProfile,
    pub adaptive: PersonalityProfile,
    #[serde(default)]
    pub interactions_since_evolution: u32,
    #[serde(default)]
    pub total_interactions: u64,
    pub last_evolution: DateTime<Utc>,
    pub saved_at: DateTime<Utc>,
}

fn default_version() -> u32 {
    SNAPSHOT_VERSION
}

#[derive(Debug, Clone)]
pub struct ProfileStore {
    dir: PathBuf,
}

impl ProfileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.dir.join(SNAPSHOT_FILE)
    }

    pub fn history_path(&self) -> PathBuf {
        self.dir.join(HISTORY_FILE)
    }

    pub fn save_snapshot(&self, snapshot: &PersistedPersonality) -> EvolutionResult<()> {
        write_json(&self.snapshot_path(), snapshot)
    }

    /// `Ok(None)` when no snapshot has been written yet.
    pub fn load_snapshot(&self) -> EvolutionResult<Option<PersistedPersonality>> {
        read_json(&self.snapshot_path())
    }

    pub fn save_history(&self, history: &[EvolutionEvent]) -> EvolutionResult<()> {
        write_json(&self.history_path(), history)
    }

    pub fn load_history(&self) -> EvolutionResult<Vec<EvolutionEvent>> {
        Ok(read_json(&self.history_path())?.unwrap_or_default())
    }
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> EvolutionResult<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;
    let body = serde_json::to_vec_pretty(value)?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(&body)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| EvolutionError::Io(e.error))?;
    debug!(target: "sallie::evolution::store", path = %path.display(), "wrote snapshot file");
    Ok(())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> EvolutionResult<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let body = std::fs::read(path)?;
    serde_json::from_slice(&body)
        .map(Some)
        .map_err(|e| EvolutionError::Snapshot(format!("{}: {}", path.display(), e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_files_load_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProfileStore::new(dir.path().join("nested"));
        assert!(store.load_snapshot().unwrap().is_none());
        assert!(store.load_history().unwrap().is_empty());
    }

    #[test]
    fn test_unknown_keys_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProfileStore::new(dir.path());
        let body = r#"{
            "core": {"traits": {"warmth": 0.8}, "future_field": 1},
            "adaptive": {"traits": {"warmth": 0.7}},
            "last_evolution": "2026-01-01T00:00:00Z",
            "saved_at": "2026-01-02T00:00:00Z",
            "schema_hint": "ignored"
        }"#;
        std::fs::write(store.snapshot_path(), body).unwrap();

        let snapshot = store.load_snapshot().unwrap().unwrap();
        assert_eq!(snapshot.version, SNAPSHOT_VERSION);
        assert_eq!(snapshot.core.trait_value("warmth"), Some(0.8));
        assert_eq!(snapshot.interactions_since_evolution, 0);
    }

    #[test]
    fn test_corrupt_snapshot_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProfileStore::new(dir.path());
        std::fs::write(store.snapshot_path(), b"{ not json").unwrap();
        match store.load_snapshot() {
            Err(EvolutionError::Snapshot(message)) => {
                assert!(message.contains("personality_snapshot.json"), "{message}")
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_concurrent_writes_leave_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = std::sync::Arc::new(ProfileStore::new(dir.path()));
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = std::sync::Arc::clone(&store);
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        store.save_history(&[]).unwrap();
                        write_json(&store.dir().join("marker.json"), &i).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .filter(|name| !name.ends_with(".json"))
            .collect();
        assert!(leftovers.is_empty(), "{leftovers:?}");
        assert!(store.load_history().unwrap().is_empty());
    }
}
