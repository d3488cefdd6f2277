//! Interaction outcomes consumed by natural evolution.

use crate::error::EvolutionResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// How the user received a trait's expression in one interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Feedback {
    Positive,
    Negative,
}

impl Feedback {
    pub fn from_positive(positive: bool) -> Self {
        if positive {
            Feedback::Positive
        } else {
            Feedback::Negative
        }
    }

    pub fn is_positive(&self) -> bool {
        matches!(self, Feedback::Positive)
    }
}

/// Trait-level feedback gathered for a single interaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionOutcome {
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub trait_feedback: BTreeMap<String, Feedback>,
}

impl InteractionOutcome {
    pub fn now() -> Self {
        Self {
            timestamp: Utc::now(),
            trait_feedback: BTreeMap::new(),
        }
    }

    pub fn with_feedback(mut self, trait_name: impl Into<String>, feedback: Feedback) -> Self {
        self.trait_feedback.insert(trait_name.into(), feedback);
        self
    }
}

/// Anything that can hand natural evolution its most recent outcomes, newest first.
pub trait OutcomeSource {
    fn recent_outcomes(&self, limit: usize) -> EvolutionResult<Vec<InteractionOutcome>>;
}

/// In-memory outcomes, oldest first (append order).
impl OutcomeSource for Vec<InteractionOutcome> {
    fn recent_outcomes(&self, limit: usize) -> EvolutionResult<Vec<InteractionOutcome>> {
        Ok(self.iter().rev().take(limit).cloned().collect())
    }
}
