//! sallie-evolution: personality state for the Sallie companion.
//!
//! Three profiles live side by side:
//! - **core**: the stable identity, only changed through [`PersonalityEvolutionSystem::update_core_trait`].
//! - **adaptive**: drifts slowly from interaction feedback during natural evolution.
//! - **blended**: `0.7 * core + 0.3 * adaptive`, recomputed after every mutation and used at runtime.
//!
//! ## Natural evolution
//!
//! Evolution is due after 50 recorded interactions or 7 days. Up to 50 recent outcomes are
//! tallied per trait; each trait moves by `(positive_ratio - 0.5) * 0.1`, clamped to its
//! [`AdaptiveThreshold`] band. A trait whose new value would sit more than 0.3 away from its
//! core value keeps its old value.
//!
//! ## Value system
//!
//! [`ValueSystem`] holds the companion's values and a precedent log. Protected values
//! (`loyalty`, `honesty`) double as protected traits: core updates to them are refused.

mod contextual;
mod error;
pub mod evolution;
mod outcome;
pub mod profile;
pub mod store;
pub mod values;

pub use contextual::{contextual_deltas, ContextualDelta};
pub use error::{EvolutionError, EvolutionResult};
pub use evolution::{
    AdaptiveThreshold, EvolutionEvent, EvolutionEventType, EvolutionReport, EvolutionSettings,
    PersonalityEvolutionSystem, ProfileSnapshot, TraitChange,
};
pub use outcome::{Feedback, InteractionOutcome, OutcomeSource};
pub use profile::{PersonalityProfile, ProfileDimension, ADAPTIVE_WEIGHT, CORE_WEIGHT};
pub use store::{PersistedPersonality, ProfileStore};
pub use values::{CoreValue, Decision, Precedent, ValueSystem};
