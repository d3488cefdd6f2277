//! Per-interaction contextual adjustments.
//!
//! These deltas are applied on top of the blended profile for a single turn and never persisted.

use crate::profile::ProfileDimension;
use ProfileDimension::{CommunicationPatterns, EmotionalResponses, InteractionStyles, Traits};

/// One additive adjustment to a profile key.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContextualDelta {
    pub dimension: ProfileDimension,
    pub key: &'static str,
    pub delta: f32,
}

const fn delta(dimension: ProfileDimension, key: &'static str, delta: f32) -> ContextualDelta {
    ContextualDelta { dimension, key, delta }
}

/// Deltas for a conversation context type (e.g. "professional", "emotional_support")
/// followed by deltas for the user's mood. Unknown strings contribute nothing.
pub fn contextual_deltas(context_type: &str, user_mood: Option<&str>) -> Vec<ContextualDelta> {
    let mut out: Vec<ContextualDelta> = match context_type.trim().to_lowercase().as_str() {
        "professional" | "work" => vec![
            delta(CommunicationPatterns, "formality", 0.2),
            delta(CommunicationPatterns, "directness", 0.1),
            delta(Traits, "humor", -0.1),
        ],
        "casual" | "social" => vec![
            delta(CommunicationPatterns, "formality", -0.2),
            delta(Traits, "humor", 0.1),
            delta(Traits, "playfulness", 0.1),
        ],
        "emotional_support" | "support" | "therapeutic" => vec![
            delta(Traits, "empathy", 0.15),
            delta(Traits, "warmth", 0.1),
            delta(Traits, "assertiveness", -0.1),
            delta(InteractionStyles, "supportive", 0.1),
        ],
        "creative" => vec![
            delta(Traits, "curiosity", 0.1),
            delta(Traits, "openness", 0.1),
            delta(Traits, "playfulness", 0.15),
        ],
        "learning" | "educational" | "technical" => vec![
            delta(Traits, "patience", 0.1),
            delta(CommunicationPatterns, "verbosity", 0.1),
            delta(InteractionStyles, "collaborative", 0.1),
        ],
        "crisis" => vec![
            delta(EmotionalResponses, "calmness", 0.2),
            delta(CommunicationPatterns, "directness", 0.15),
            delta(Traits, "humor", -0.3),
        ],
        _ => Vec::new(),
    };

    if let Some(mood) = user_mood {
        out.extend(match mood.trim().to_lowercase().as_str() {
            "sad" | "down" | "lonely" => vec![
                delta(Traits, "warmth", 0.15),
                delta(EmotionalResponses, "compassion", 0.1),
                delta(Traits, "humor", -0.15),
            ],
            "anxious" | "stressed" | "worried" => vec![
                delta(EmotionalResponses, "calmness", 0.15),
                delta(Traits, "patience", 0.1),
                delta(Traits, "assertiveness", -0.1),
            ],
            "angry" | "frustrated" => vec![
                delta(Traits, "patience", 0.15),
                delta(Traits, "humor", -0.2),
                delta(EmotionalResponses, "calmness", 0.1),
            ],
            "happy" | "excited" => vec![
                delta(EmotionalResponses, "enthusiasm", 0.15),
                delta(Traits, "humor", 0.1),
                delta(Traits, "playfulness", 0.1),
            ],
            "tired" => vec![delta(CommunicationPatterns, "verbosity", -0.15)],
            _ => Vec::new(),
        });
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_context_is_empty() {
        assert!(contextual_deltas("gardening", None).is_empty());
        assert!(contextual_deltas("", Some("meh")).is_empty());
    }

    #[test]
    fn test_context_and_mood_combine() {
        let deltas = contextual_deltas("Professional", Some("sad"));
        assert!(deltas.iter().any(|d| d.key == "formality" && d.delta > 0.0));
        assert!(deltas.iter().any(|d| d.key == "warmth" && d.delta > 0.0));
        let humor: f32 = deltas.iter().filter(|d| d.key == "humor").map(|d| d.delta).sum();
        assert!(humor < -0.2);
    }

    #[test]
    fn test_context_aliases() {
        assert_eq!(contextual_deltas("therapeutic", None), contextual_deltas("emotional_support", None));
        assert_eq!(contextual_deltas("Technical", None), contextual_deltas("learning", None));
        assert!(!contextual_deltas("technical", None).is_empty());
    }
}
