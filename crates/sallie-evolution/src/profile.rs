//! Personality profile: four named trait maps with values in `[0, 1]`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Weight of the core profile in the blended profile.
pub const CORE_WEIGHT: f32 = 0.7;

/// Weight of the adaptive profile in the blended profile.
pub const ADAPTIVE_WEIGHT: f32 = 0.3;

/// Baseline used when a key is adjusted but absent from the profile.
const NEUTRAL_VALUE: f32 = 0.5;

/// The four maps a profile is made of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileDimension {
    Traits,
    InteractionStyles,
    CommunicationPatterns,
    EmotionalResponses,
}

impl ProfileDimension {
    pub const ALL: [ProfileDimension; 4] = [
        ProfileDimension::Traits,
        ProfileDimension::InteractionStyles,
        ProfileDimension::CommunicationPatterns,
        ProfileDimension::EmotionalResponses,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProfileDimension::Traits => "traits",
            ProfileDimension::InteractionStyles => "interaction_styles",
            ProfileDimension::CommunicationPatterns => "communication_patterns",
            ProfileDimension::EmotionalResponses => "emotional_responses",
        }
    }
}

/// A personality profile. Every value is kept in `[0, 1]` by the mutators.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersonalityProfile {
    #[serde(default)]
    pub traits: BTreeMap<String, f32>,
    #[serde(default)]
    pub interaction_styles: BTreeMap<String, f32>,
    #[serde(default)]
    pub communication_patterns: BTreeMap<String, f32>,
    #[serde(default)]
    pub emotional_responses: BTreeMap<String, f32>,
}

impl PersonalityProfile {
    /// Sallie's starting identity.
    pub fn sallie_default() -> Self {
        fn map(entries: &[(&str, f32)]) -> BTreeMap<String, f32> {
            entries.iter().map(|(k, v)| (k.to_string(), *v)).collect()
        }

        Self {
            traits: map(&[
                ("warmth", 0.8),
                ("empathy", 0.85),
                ("humor", 0.6),
                ("assertiveness", 0.5),
                ("curiosity", 0.7),
                ("patience", 0.75),
                ("openness", 0.7),
                ("playfulness", 0.55),
                ("loyalty", 1.0),
                ("honesty", 0.95),
            ]),
            interaction_styles: map(&[
                ("supportive", 0.8),
                ("collaborative", 0.75),
                ("directive", 0.45),
                ("challenging", 0.4),
            ]),
            communication_patterns: map(&[
                ("formality", 0.4),
                ("verbosity", 0.5),
                ("directness", 0.6),
                ("humor_frequency", 0.5),
            ]),
            emotional_responses: map(&[
                ("compassion", 0.85),
                ("calmness", 0.7),
                ("enthusiasm", 0.65),
                ("concern", 0.6),
            ]),
        }
    }

    pub fn dimension(&self, dimension: ProfileDimension) -> &BTreeMap<String, f32> {
        match dimension {
            ProfileDimension::Traits => &self.traits,
            ProfileDimension::InteractionStyles => &self.interaction_styles,
            ProfileDimension::CommunicationPatterns => &self.communication_patterns,
            ProfileDimension::EmotionalResponses => &self.emotional_responses,
        }
    }

    pub fn dimension_mut(&mut self, dimension: ProfileDimension) -> &mut BTreeMap<String, f32> {
        match dimension {
            ProfileDimension::Traits => &mut self.traits,
            ProfileDimension::InteractionStyles => &mut self.interaction_styles,
            ProfileDimension::CommunicationPatterns => &mut self.communication_patterns,
            ProfileDimension::EmotionalResponses => &mut self.emotional_responses,
        }
    }

    pub fn get(&self, dimension: ProfileDimension, key: &str) -> Option<f32> {
        self.dimension(dimension).get(key).copied()
    }

    /// Shorthand for `get(ProfileDimension::Traits, key)`.
    pub fn trait_value(&self, key: &str) -> Option<f32> {
        self.traits.get(key).copied()
    }

    /// Sets a value, clamped to `[0, 1]`.
    pub fn set(&mut self, dimension: ProfileDimension, key: &str, value: f32) {
        self.dimension_mut(dimension)
            .insert(key.to_string(), clamp_unit(value));
    }

    /// Adds `delta` to a value (missing keys start at 0.5) and returns the clamped result.
    pub fn adjust(&mut self, dimension: ProfileDimension, key: &str, delta: f32) -> f32 {
        let entry = self
            .dimension_mut(dimension)
            .entry(key.to_string())
            .or_insert(NEUTRAL_VALUE);
        *entry = clamp_unit(*entry + delta);
        *entry
    }

    /// Clamps every value into `[0, 1]`; NaN becomes the neutral value.
    pub fn clamp(&mut self) {
        for dimension in ProfileDimension::ALL {
            for value in self.dimension_mut(dimension).values_mut() {
                *value = clamp_unit(*value);
            }
        }
    }

    /// Weighted combination of two profiles.
    ///
    /// Keys present in both maps get `core * core_weight + adaptive * (1 - core_weight)`.
    /// Keys only in `adaptive` take the adaptive value; keys only in `core` keep the core value.
    pub fn blend(core: &PersonalityProfile, adaptive: &PersonalityProfile, core_weight: f32) -> Self {
        let core_weight = core_weight.clamp(0.0, 1.0);
        let mut out = PersonalityProfile::default();
        for dimension in ProfileDimension::ALL {
            *out.dimension_mut(dimension) = blend_maps(
                core.dimension(dimension),
                adaptive.dimension(dimension),
                core_weight,
            );
        }
        out
    }
}

fn blend_maps(
    core: &BTreeMap<String, f32>,
    adaptive: &BTreeMap<String, f32>,
    core_weight: f32,
) -> BTreeMap<String, f32> {
    let adaptive_weight = 1.0 - core_weight;
    let total_weight = core_weight + adaptive_weight;
    let mut out = BTreeMap::new();

    for (key, core_value) in core {
        let value = match adaptive.get(key) {
            Some(adaptive_value) => {
                (core_value * core_weight + adaptive_value * adaptive_weight) / total_weight
            }
            None => *core_value,
        };
        out.insert(key.clone(), clamp_unit(value));
    }
    for (key, adaptive_value) in adaptive {
        if !core.contains_key(key) {
            out.insert(key.clone(), clamp_unit(*adaptive_value));
        }
    }
    out
}

pub(crate) fn clamp_unit(value: f32) -> f32 {
    if value.is_nan() {
        NEUTRAL_VALUE
    } else {
        value.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blend_shared_keys() {
        let mut core = PersonalityProfile::default();
        core.set(ProfileDimension::Traits, "warmth", 0.8);
        let mut adaptive = PersonalityProfile::default();
        adaptive.set(ProfileDimension::Traits, "warmth", 0.4);

        let blended = PersonalityProfile::blend(&core, &adaptive, CORE_WEIGHT);
        let expected = 0.8 * 0.7 + 0.4 * 0.3;
        assert!((blended.trait_value("warmth").unwrap() - expected).abs() < 1e-6);
    }

    #[test]
    fn test_blend_adaptive_only_key_falls_back() {
        let core = PersonalityProfile::default();
        let mut adaptive = PersonalityProfile::default();
        adaptive.set(ProfileDimension::EmotionalResponses, "wonder", 0.9);

        let blended = PersonalityProfile::blend(&core, &adaptive, CORE_WEIGHT);
        assert_eq!(blended.get(ProfileDimension::EmotionalResponses, "wonder"), Some(0.9));
    }

    #[test]
    fn test_adjust_clamps_and_defaults() {
        let mut profile = PersonalityProfile::default();
        assert!((profile.adjust(ProfileDimension::Traits, "humor", 0.2) - 0.7).abs() < 1e-6);
        assert_eq!(profile.adjust(ProfileDimension::Traits, "humor", 1.0), 1.0);
        assert_eq!(profile.adjust(ProfileDimension::Traits, "humor", -5.0), 0.0);
    }

    #[test]
    fn test_clamp_replaces_nan() {
        let mut profile = PersonalityProfile::default();
        profile.traits.insert("odd".to_string(), f32::NAN);
        profile.traits.insert("high".to_string(), 3.0);
        profile.clamp();
        assert_eq!(profile.trait_value("odd"), Some(0.5));
        assert_eq!(profile.trait_value("high"), Some(1.0));
    }

    #[test]
    fn test_default_profile_in_range() {
        let profile = PersonalityProfile::sallie_default();
        for dimension in ProfileDimension::ALL {
            assert!(!profile.dimension(dimension).is_empty(), "{} empty", dimension.as_str());
            assert!(profile
                .dimension(dimension)
                .values()
                .all(|v| (0.0..=1.0).contains(v)));
        }
    }
}
