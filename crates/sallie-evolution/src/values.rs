//! Value system: core values, violation checks and precedent reuse.
//!
//! A request is checked against every value's violation markers first. If none match, the most
//! similar recorded precedent (Jaccard similarity over keywords) decides; otherwise the request is
//! approved. Protected values name traits that core updates may never touch.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::RwLock;
use tracing::{debug, warn};

/// Minimum keyword similarity for a precedent to be reused.
const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.5;

/// Precedents kept before the oldest is dropped.
const MAX_PRECEDENTS: usize = 500;

const STOP_WORDS: &[&str] = &[
    "the", "and", "for", "you", "your", "with", "that", "this", "are", "was", "can", "could",
    "would", "should", "please", "about", "from", "have", "has", "will", "what", "how", "me",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoreValue {
    pub name: String,
    pub description: String,
    /// Protected values double as protected personality traits.
    #[serde(default)]
    pub protected: bool,
    /// Lowercase phrases that mark a request as conflicting with this value.
    #[serde(default)]
    pub violation_markers: Vec<String>,
}

impl CoreValue {
    pub fn new(name: &str, description: &str, protected: bool, markers: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            protected,
            violation_markers: markers.iter().map(|m| m.to_string()).collect(),
        }
    }
}

/// A past decision available for reuse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Precedent {
    pub situation: String,
    pub keywords: BTreeSet<String>,
    pub approved: bool,
    pub reason: String,
    pub recorded_at: DateTime<Utc>,
}

/// Outcome of a value check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub approved: bool,
    pub reason: String,
    #[serde(default)]
    pub precedent: Option<Precedent>,
    #[serde(default)]
    pub similarity: Option<f32>,
}

impl Decision {
    pub fn approve(reason: impl Into<String>) -> Self {
        Self {
            approved: true,
            reason: reason.into(),
            precedent: None,
            similarity: None,
        }
    }

    pub fn reject(reason: impl Into<String>) -> Self {
        Self {
            approved: false,
            reason: reason.into(),
            precedent: None,
            similarity: None,
        }
    }
}

pub struct ValueSystem {
    values: Vec<CoreValue>,
    precedents: RwLock<Vec<Precedent>>,
    similarity_threshold: f32,
}

impl ValueSystem {
    pub fn new(values: Vec<CoreValue>) -> Self {
        Self {
            values,
            precedents: RwLock::new(Vec::new()),
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
        }
    }

    /// Sallie's values. `loyalty` and `honesty` are protected.
    pub fn sallie_default() -> Self {
        Self::new(vec![
            CoreValue::new(
                "loyalty",
                "Sallie stays on the user's side",
                true,
                &["betray", "spy on me", "turn against"],
            ),
            CoreValue::new(
                "honesty",
                "Sallie does not deceive the user or on the user's behalf",
                true,
                &["lie to", "deceive", "fabricate", "make up a fake"],
            ),
            CoreValue::new(
                "privacy",
                "Personal data stays with the user",
                false,
                &["share my password", "leak", "post my address"],
            ),
            CoreValue::new(
                "kindness",
                "Sallie does not demean people",
                false,
                &["humiliate", "insult them"],
            ),
        ])
    }

    pub fn with_similarity_threshold(mut self, threshold: f32) -> Self {
        self.similarity_threshold = threshold.clamp(0.0, 1.0);
        self
    }

    pub fn values(&self) -> &[CoreValue] {
        &self.values
    }

    /// Names of protected values; these are the traits core updates refuse.
    pub fn protected_traits(&self) -> BTreeSet<String> {
        self.values
            .iter()
            .filter(|v| v.protected)
            .map(|v| v.name.clone())
            .collect()
    }

    pub fn evaluate(&self, situation: &str) -> Decision {
        let lower = situation.to_lowercase();
        for value in &self.values {
            if let Some(marker) = value
                .violation_markers
                .iter()
                .find(|m| lower.contains(m.as_str()))
            {
                debug!(
                    target: "sallie::values",
                    value = %value.name,
                    marker = %marker,
                    "request conflicts with core value"
                );
                return Decision::reject(format!(
                    "conflicts with core value '{}': {}",
                    value.name, value.description
                ));
            }
        }

        if let Some((precedent, similarity)) = self.find_precedent(situation) {
            return Decision {
                approved: precedent.approved,
                reason: format!("following precedent: {}", precedent.reason),
                precedent: Some(precedent),
                similarity: Some(similarity),
            };
        }

        Decision::approve("no value conflict")
    }

    /// Most similar precedent at or above the similarity threshold.
    pub fn find_precedent(&self, situation: &str) -> Option<(Precedent, f32)> {
        let keywords = keywords(situation);
        if keywords.is_empty() {
            return None;
        }
        let precedents = match self.precedents.read() {
            Ok(p) => p,
            Err(e) => {
                warn!(target: "sallie::values", error = %e, "precedent lock poisoned");
                return None;
            }
        };
        precedents
            .iter()
            .map(|p| (p, jaccard(&keywords, &p.keywords)))
            .filter(|(_, similarity)| *similarity >= self.similarity_threshold)
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(p, similarity)| (p.clone(), similarity))
    }

    pub fn record_precedent(&self, situation: &str, approved: bool, reason: &str) {
        let precedent = Precedent {
            situation: situation.to_string(),
            keywords: keywords(situation),
            approved,
            reason: reason.to_string(),
            recorded_at: Utc::now(),
        };
        match self.precedents.write() {
            Ok(mut precedents) => {
                precedents.push(precedent);
                if precedents.len() > MAX_PRECEDENTS {
                    let overflow = precedents.len() - MAX_PRECEDENTS;
                    precedents.drain(..overflow);
                }
            }
            Err(e) => warn!(target: "sallie::values", error = %e, "precedent lock poisoned"),
        }
    }

    pub fn precedent_count(&self) -> usize {
        self.precedents.read().map(|p| p.len()).unwrap_or(0)
    }
}

impl Default for ValueSystem {
    fn default() -> Self {
        Self::sallie_default()
    }
}

fn keywords(text: &str) -> BTreeSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() > 2 && !STOP_WORDS.contains(w))
        .map(str::to_string)
        .collect()
}

fn jaccard(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f32 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f32 / union as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_violation_rejects() {
        let values = ValueSystem::sallie_default();
        let decision = values.evaluate("Please lie to my boss about the report");
        assert!(!decision.approved);
        assert!(decision.reason.contains("honesty"));
    }

    #[test]
    fn test_precedent_reuse() {
        let values = ValueSystem::sallie_default();
        values.record_precedent("remind mother birthday dinner", false, "user declined reminders about family");
        let decision = values.evaluate("remind mother birthday");
        assert!(!decision.approved);
        assert!(decision.precedent.is_some());
        assert!(decision.similarity.unwrap() >= 0.5);
    }

    #[test]
    fn test_unrelated_request_approved() {
        let values = ValueSystem::sallie_default();
        values.record_precedent("book dentist appointment", true, "routine scheduling");
        let decision = values.evaluate("tell me a joke about penguins");
        assert!(decision.approved);
        assert!(decision.precedent.is_none());
    }

    #[test]
    fn test_protected_traits() {
        let protected = ValueSystem::sallie_default().protected_traits();
        assert!(protected.contains("loyalty"));
        assert!(protected.contains("honesty"));
        assert!(!protected.contains("privacy"));
    }
}
