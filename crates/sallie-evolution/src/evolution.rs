//! Personality Evolution System
//!
//! Holds the core, adaptive and blended profiles behind one `RwLock` and applies the two
//! mutation paths:
//!
//! 1. **Contextual** – ephemeral deltas for the current turn, computed on a copy of the blended
//!    profile ([`PersonalityEvolutionSystem::apply_contextual_adjustments`]).
//! 2. **Natural evolution** – periodic drift of the adaptive profile from recent outcomes
//!    ([`PersonalityEvolutionSystem::evolve_naturally`]), persisted through [`ProfileStore`].
//!
//! Every mutation re-blends and appends an [`EvolutionEvent`] to a bounded history.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::contextual::contextual_deltas;
use crate::error::{EvolutionError, EvolutionResult};
use crate::outcome::OutcomeSource;
use crate::profile::{clamp_unit, PersonalityProfile, ProfileDimension, CORE_WEIGHT};
use crate::store::{PersistedPersonality, ProfileStore, SNAPSHOT_VERSION};
use crate::values::ValueSystem;

/// Traits that core updates never change, regardless of the value system.
const ALWAYS_PROTECTED: [&str; 2] = ["loyalty", "honesty"];

/// Float slack for the deviation cap comparison.
const DEVIATION_EPSILON: f32 = 1e-6;

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Per-trait bounds on a single evolution step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AdaptiveThreshold {
    pub min_delta: f32,
    pub max_delta: f32,
}

impl AdaptiveThreshold {
    pub fn symmetric(bound: f32) -> Self {
        let bound = bound.abs();
        Self {
            min_delta: -bound,
            max_delta: bound,
        }
    }

    /// Clamps `delta` into the band. Never panics, even on an inverted band.
    pub fn clamp(&self, delta: f32) -> f32 {
        delta.max(self.min_delta).min(self.max_delta)
    }
}

impl Default for AdaptiveThreshold {
    fn default() -> Self {
        Self::symmetric(0.05)
    }
}

/// Tunables for natural evolution. Loaded as the `evolution` table of the core config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvolutionSettings {
    /// Interactions since the last evolution that make evolution due.
    pub interaction_trigger: u32,
    /// Days since the last evolution that make evolution due.
    pub time_trigger_days: i64,
    /// Maximum number of recent outcomes scanned per evolution.
    pub sample_size: usize,
    /// Scale applied to `(positive_ratio - 0.5)`.
    pub learning_rate: f32,
    /// Largest allowed distance between an adaptive trait and its core value.
    pub max_core_deviation: f32,
    /// Band used for traits without an explicit threshold.
    pub default_threshold: AdaptiveThreshold,
    pub core_weight: f32,
    /// Evolution events kept in memory and on disk.
    pub history_limit: usize,
}

impl Default for EvolutionSettings {
    fn default() -> Self {
        Self {
            interaction_trigger: 50,
            time_trigger_days: 7,
            sample_size: 50,
            learning_rate: 0.1,
            max_core_deviation: 0.3,
            default_threshold: AdaptiveThreshold::default(),
            core_weight: CORE_WEIGHT,
            history_limit: 100,
        }
    }
}

// ---------------------------------------------------------------------------
// Events and reports
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvolutionEventType {
    CoreUpdate,
    CoreUpdateRejected,
    AdaptiveUpdate,
    NaturalEvolution,
    Reset,
}

/// Append-only log entry. `before`/`after` hold the trait map of the profile that changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvolutionEvent {
    pub timestamp: DateTime<Utc>,
    pub event_type: EvolutionEventType,
    #[serde(default)]
    pub before: BTreeMap<String, f32>,
    #[serde(default)]
    pub after: BTreeMap<String, f32>,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TraitChange {
    pub before: f32,
    pub after: f32,
    pub delta: f32,
}

/// Result of one natural evolution pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvolutionReport {
    pub evolved_at: DateTime<Utc>,
    /// Number of outcomes scanned.
    pub sampled: usize,
    pub applied: BTreeMap<String, TraitChange>,
    /// Trait name → why its update was refused.
    pub rejected: BTreeMap<String, String>,
}

/// Read-only view of the three profiles, suitable for a personality panel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileSnapshot {
    pub core: PersonalityProfile,
    pub adaptive: PersonalityProfile,
    pub blended: PersonalityProfile,
    pub interactions_since_evolution: u32,
    pub total_interactions: u64,
    pub last_evolution: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// System
// ---------------------------------------------------------------------------

struct EvolutionState {
    core: PersonalityProfile,
    adaptive: PersonalityProfile,
    blended: PersonalityProfile,
    interactions_since_evolution: u32,
    total_interactions: u64,
    last_evolution: DateTime<Utc>,
    history: VecDeque<EvolutionEvent>,
}

impl EvolutionState {
    fn fresh(core: PersonalityProfile, now: DateTime<Utc>) -> Self {
        let adaptive = core.clone();
        let blended = core.clone();
        Self {
            core,
            adaptive,
            blended,
            interactions_since_evolution: 0,
            total_interactions: 0,
            last_evolution: now,
            history: VecDeque::new(),
        }
    }

    fn reblend(&mut self, core_weight: f32) {
        self.blended = PersonalityProfile::blend(&self.core, &self.adaptive, core_weight);
    }

    fn push_event(&mut self, event: EvolutionEvent, limit: usize) {
        self.history.push_back(event);
        while self.history.len() > limit.max(1) {
            self.history.pop_front();
        }
    }
}

/// Owns Sallie's personality. Construct once at startup and share behind an `Arc`.
pub struct PersonalityEvolutionSystem {
    settings: EvolutionSettings,
    thresholds: HashMap<String, AdaptiveThreshold>,
    protected: BTreeSet<String>,
    state: RwLock<EvolutionState>,
    store: Option<ProfileStore>,
    /// Serializes saves so the file on disk never lags a state that was already written.
    save_lock: Mutex<()>,
}

impl PersonalityEvolutionSystem {
    pub fn new(core: PersonalityProfile, settings: EvolutionSettings) -> Self {
        let mut core = core;
        core.clamp();
        let mut state = EvolutionState::fresh(core, Utc::now());
        state.reblend(settings.core_weight);

        let mut thresholds = HashMap::new();
        thresholds.insert("assertiveness".to_string(), AdaptiveThreshold::symmetric(0.03));

        Self {
            settings,
            thresholds,
            protected: ALWAYS_PROTECTED.iter().map(|s| s.to_string()).collect(),
            state: RwLock::new(state),
            store: None,
            save_lock: Mutex::new(()),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(PersonalityProfile::sallie_default(), EvolutionSettings::default())
    }

    /// Loads the last snapshot and history from `store`, or starts from Sallie's default
    /// profile when none exists. Later mutations are persisted to the same store.
    pub fn restore(store: ProfileStore, settings: EvolutionSettings) -> EvolutionResult<Self> {
        let snapshot = store.load_snapshot()?;
        let system = match snapshot {
            Some(saved) => {
                let mut history: VecDeque<EvolutionEvent> = store.load_history()?.into();
                while history.len() > settings.history_limit.max(1) {
                    history.pop_front();
                }
                let system = Self::new(saved.core.clone(), settings);
                {
                    let mut state = system.write()?;
                    let mut adaptive = saved.adaptive;
                    adaptive.clamp();
                    state.adaptive = adaptive;
                    state.interactions_since_evolution = saved.interactions_since_evolution;
                    state.total_interactions = saved.total_interactions;
                    state.last_evolution = saved.last_evolution;
                    state.history = history;
                    state.reblend(system.settings.core_weight);
                }
                info!(
                    target: "sallie::evolution",
                    path = %store.snapshot_path().display(),
                    saved_at = %saved.saved_at,
                    "restored personality snapshot"
                );
                system
            }
            None => Self::new(PersonalityProfile::sallie_default(), settings),
        };
        Ok(system.with_store(store))
    }

    pub fn with_store(mut self, store: ProfileStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Marks every protected value of `values` as a protected trait.
    pub fn with_value_system(mut self, values: &ValueSystem) -> Self {
        self.protected.extend(values.protected_traits());
        self
    }

    pub fn with_threshold(mut self, trait_name: &str, threshold: AdaptiveThreshold) -> Self {
        self.thresholds.insert(trait_name.to_string(), threshold);
        self
    }

    pub fn settings(&self) -> &EvolutionSettings {
        &self.settings
    }

    pub fn is_protected(&self, trait_name: &str) -> bool {
        self.protected.contains(trait_name)
    }

    pub fn threshold_for(&self, trait_name: &str) -> AdaptiveThreshold {
        self.thresholds
            .get(trait_name)
            .copied()
            .unwrap_or(self.settings.default_threshold)
    }

    fn read(&self) -> EvolutionResult<RwLockReadGuard<'_, EvolutionState>> {
        self.state
            .read()
            .map_err(|e| EvolutionError::Lock(e.to_string()))
    }

    fn write(&self) -> EvolutionResult<RwLockWriteGuard<'_, EvolutionState>> {
        self.state
            .write()
            .map_err(|e| EvolutionError::Lock(e.to_string()))
    }

    // -----------------------------------------------------------------------
    // Views
    // -----------------------------------------------------------------------

    pub fn core_profile(&self) -> EvolutionResult<PersonalityProfile> {
        Ok(self.read()?.core.clone())
    }

    pub fn adaptive_profile(&self) -> EvolutionResult<PersonalityProfile> {
        Ok(self.read()?.adaptive.clone())
    }

    pub fn blended_profile(&self) -> EvolutionResult<PersonalityProfile> {
        Ok(self.read()?.blended.clone())
    }

    pub fn snapshot(&self) -> EvolutionResult<ProfileSnapshot> {
        let state = self.read()?;
        Ok(ProfileSnapshot {
            core: state.core.clone(),
            adaptive: state.adaptive.clone(),
            blended: state.blended.clone(),
            interactions_since_evolution: state.interactions_since_evolution,
            total_interactions: state.total_interactions,
            last_evolution: state.last_evolution,
        })
    }

    pub fn history(&self) -> EvolutionResult<Vec<EvolutionEvent>> {
        Ok(self.read()?.history.iter().cloned().collect())
    }

    // -----------------------------------------------------------------------
    // Contextual path
    // -----------------------------------------------------------------------

    /// Blended profile with the context/mood deltas applied. The stored state is untouched.
    pub fn apply_contextual_adjustments(
        &self,
        context_type: &str,
        user_mood: Option<&str>,
    ) -> EvolutionResult<PersonalityProfile> {
        let mut profile = self.blended_profile()?;
        for d in contextual_deltas(context_type, user_mood) {
            profile.adjust(d.dimension, d.key, d.delta);
        }
        Ok(profile)
    }

    // -----------------------------------------------------------------------
    // Core updates
    // -----------------------------------------------------------------------

    /// Sets a core trait. Returns `false` (and leaves core unchanged) for protected traits,
    /// non-finite values, or when the state lock is unavailable.
    pub fn update_core_trait(&self, trait_name: &str, value: f32, reason: &str) -> bool {
        if self.is_protected(trait_name) {
            warn!(
                target: "sallie::evolution",
                trait_name,
                reason,
                "core update rejected: protected trait"
            );
            if let Ok(mut state) = self.write() {
                let traits = state.core.traits.clone();
                state.push_event(
                    EvolutionEvent {
                        timestamp: Utc::now(),
                        event_type: EvolutionEventType::CoreUpdateRejected,
                        before: traits.clone(),
                        after: traits,
                        reason: format!("protected trait '{}': {}", trait_name, reason),
                    },
                    self.settings.history_limit,
                );
            }
            return false;
        }
        if !value.is_finite() {
            return false;
        }

        let mut state = match self.write() {
            Ok(s) => s,
            Err(e) => {
                warn!(target: "sallie::evolution", error = %e, "core update skipped");
                return false;
            }
        };
        let before = state.core.traits.clone();
        state.core.set(ProfileDimension::Traits, trait_name, value);
        state.reblend(self.settings.core_weight);
        let after = state.core.traits.clone();
        state.push_event(
            EvolutionEvent {
                timestamp: Utc::now(),
                event_type: EvolutionEventType::CoreUpdate,
                before,
                after,
                reason: reason.to_string(),
            },
            self.settings.history_limit,
        );
        drop(state);

        if let Err(e) = self.save() {
            warn!(target: "sallie::evolution", error = %e, "failed to persist core update");
        }
        true
    }

    // -----------------------------------------------------------------------
    // Adaptive updates
    // -----------------------------------------------------------------------

    /// Moves one adaptive trait by `delta`, clamped to its threshold band.
    /// Returns `Ok(false)` when the trait is protected or the result would exceed the
    /// deviation cap.
    pub fn update_adaptive_trait(
        &self,
        trait_name: &str,
        delta: f32,
        reason: &str,
    ) -> EvolutionResult<bool> {
        if self.is_protected(trait_name) || !delta.is_finite() {
            return Ok(false);
        }
        let mut state = self.write()?;
        let before = state.adaptive.traits.clone();
        let current = current_adaptive(&state, trait_name);
        let proposed = clamp_unit(current + self.threshold_for(trait_name).clamp(delta));
        if let Some(reason) = self.deviation_violation(&state, trait_name, current, proposed) {
            debug!(target: "sallie::evolution", trait_name, %reason, "adaptive update rejected");
            return Ok(false);
        }
        state.adaptive.set(ProfileDimension::Traits, trait_name, proposed);
        state.reblend(self.settings.core_weight);
        let after = state.adaptive.traits.clone();
        state.push_event(
            EvolutionEvent {
                timestamp: Utc::now(),
                event_type: EvolutionEventType::AdaptiveUpdate,
                before,
                after,
                reason: reason.to_string(),
            },
            self.settings.history_limit,
        );
        drop(state);
        self.save()?;
        Ok(true)
    }

    /// Copies core over adaptive.
    pub fn reset_adaptive(&self, reason: &str) -> EvolutionResult<()> {
        let mut state = self.write()?;
        let before = state.adaptive.traits.clone();
        state.adaptive = state.core.clone();
        state.reblend(self.settings.core_weight);
        let after = state.adaptive.traits.clone();
        state.push_event(
            EvolutionEvent {
                timestamp: Utc::now(),
                event_type: EvolutionEventType::Reset,
                before,
                after,
                reason: reason.to_string(),
            },
            self.settings.history_limit,
        );
        drop(state);
        self.save()
    }

    fn deviation_violation(
        &self,
        state: &EvolutionState,
        trait_name: &str,
        current: f32,
        proposed: f32,
    ) -> Option<String> {
        let core_value = state.core.trait_value(trait_name).unwrap_or(current);
        let deviation = (proposed - core_value).abs();
        if deviation > self.settings.max_core_deviation + DEVIATION_EPSILON {
            Some(format!(
                "deviation {:.3} from core exceeds {:.2}",
                deviation, self.settings.max_core_deviation
            ))
        } else {
            None
        }
    }

    // -----------------------------------------------------------------------
    // Natural evolution
    // -----------------------------------------------------------------------

    /// Counts one finished interaction. Returns interactions since the last evolution.
    pub fn record_interaction(&self) -> EvolutionResult<u32> {
        let mut state = self.write()?;
        state.interactions_since_evolution = state.interactions_since_evolution.saturating_add(1);
        state.total_interactions = state.total_interactions.saturating_add(1);
        Ok(state.interactions_since_evolution)
    }

    pub fn should_evolve(&self, now: DateTime<Utc>) -> EvolutionResult<bool> {
        let state = self.read()?;
        let by_count = state.interactions_since_evolution >= self.settings.interaction_trigger;
        let by_time =
            now - state.last_evolution >= Duration::days(self.settings.time_trigger_days);
        Ok(by_count || by_time)
    }

    /// Runs [`Self::evolve_naturally`] only when evolution is due.
    pub fn maybe_evolve(
        &self,
        source: &dyn OutcomeSource,
        now: DateTime<Utc>,
    ) -> EvolutionResult<Option<EvolutionReport>> {
        if self.should_evolve(now)? {
            self.evolve_naturally(source, now).map(Some)
        } else {
            Ok(None)
        }
    }

    /// Recomputes adaptive traits from recent outcomes.
    ///
    /// For each trait with feedback: `delta = (positive / total - 0.5) * learning_rate`,
    /// clamped to the trait's band. The update is dropped when the new value would be further
    /// than `max_core_deviation` from core. Counters reset even when nothing changed.
    pub fn evolve_naturally(
        &self,
        source: &dyn OutcomeSource,
        now: DateTime<Utc>,
    ) -> EvolutionResult<EvolutionReport> {
        let outcomes = source.recent_outcomes(self.settings.sample_size)?;
        let sampled = outcomes.len().min(self.settings.sample_size);

        let mut tallies: BTreeMap<String, (u32, u32)> = BTreeMap::new();
        for outcome in outcomes.iter().take(self.settings.sample_size) {
            for (trait_name, feedback) in &outcome.trait_feedback {
                let tally = tallies.entry(trait_name.clone()).or_insert((0, 0));
                if feedback.is_positive() {
                    tally.0 += 1;
                } else {
                    tally.1 += 1;
                }
            }
        }

        let mut applied = BTreeMap::new();
        let mut rejected = BTreeMap::new();
        let mut state = self.write()?;
        let before = state.adaptive.traits.clone();

        for (trait_name, (positive, negative)) in tallies {
            let total = positive + negative;
            if total == 0 {
                continue;
            }
            if self.is_protected(&trait_name) {
                rejected.insert(trait_name, "protected trait".to_string());
                continue;
            }
            let ratio = positive as f32 / total as f32;
            let delta = self
                .threshold_for(&trait_name)
                .clamp((ratio - 0.5) * self.settings.learning_rate);
            let current = current_adaptive(&state, &trait_name);
            let proposed = clamp_unit(current + delta);

            if let Some(reason) = self.deviation_violation(&state, &trait_name, current, proposed) {
                rejected.insert(trait_name, reason);
                continue;
            }
            state
                .adaptive
                .set(ProfileDimension::Traits, &trait_name, proposed);
            applied.insert(
                trait_name,
                TraitChange {
                    before: current,
                    after: proposed,
                    delta: proposed - current,
                },
            );
        }

        state.interactions_since_evolution = 0;
        state.last_evolution = now;
        state.reblend(self.settings.core_weight);
        let after = state.adaptive.traits.clone();
        state.push_event(
            EvolutionEvent {
                timestamp: now,
                event_type: EvolutionEventType::NaturalEvolution,
                before,
                after,
                reason: format!(
                    "natural evolution over {} outcomes: {} applied, {} rejected",
                    sampled,
                    applied.len(),
                    rejected.len()
                ),
            },
            self.settings.history_limit,
        );
        drop(state);

        info!(
            target: "sallie::evolution",
            sampled,
            applied = applied.len(),
            rejected = rejected.len(),
            "natural evolution complete"
        );
        self.save()?;

        Ok(EvolutionReport {
            evolved_at: now,
            sampled,
            applied,
            rejected,
        })
    }

    // -----------------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------------

    /// Writes the snapshot and history when a store is attached; no-op otherwise.
    pub fn save(&self) -> EvolutionResult<()> {
        let Some(store) = &self.store else {
            return Ok(());
        };
        let _guard = self
            .save_lock
            .lock()
            .map_err(|e| EvolutionError::Lock(e.to_string()))?;
        let (snapshot, history) = {
            let state = self.read()?;
            (
                PersistedPersonality {
                    version: SNAPSHOT_VERSION,
                    core: state.core.clone(),
                    adaptive: state.adaptive.clone(),
                    interactions_since_evolution: state.interactions_since_evolution,
                    total_interactions: state.total_interactions,
                    last_evolution: state.last_evolution,
                    saved_at: Utc::now(),
                },
                state.history.iter().cloned().collect::<Vec<_>>(),
            )
        };
        store.save_snapshot(&snapshot)?;
        store.save_history(&history)
    }
}

fn current_adaptive(state: &EvolutionState, trait_name: &str) -> f32 {
    state
        .adaptive
        .trait_value(trait_name)
        .or_else(|| state.core.trait_value(trait_name))
        .unwrap_or(0.5)
}
