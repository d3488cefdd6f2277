//! Keyword-based language analysis used by the first pipeline stage.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Greeting,
    Question,
    Command,
    Statement,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LanguageAnalysis {
    pub intent: Intent,
    pub is_question: bool,
    pub is_urgent: bool,
    pub emotional_content: bool,
    /// `-1.0` (negative) ..= `1.0` (positive).
    pub sentiment: f32,
    /// Lowercase content words, stop words removed, in input order without duplicates.
    pub keywords: Vec<String>,
}

pub trait LanguageAnalyzer: Send + Sync {
    fn analyze(&self, text: &str) -> LanguageAnalysis;
}

const GREETINGS: &[&str] = &["hi", "hello", "hey", "morning", "evening", "howdy", "yo"];
const QUESTION_WORDS: &[&str] = &[
    "what", "why", "how", "when", "where", "who", "which", "can", "could", "would", "should",
    "is", "are", "do", "does", "did", "will",
];
const COMMAND_VERBS: &[&str] = &[
    "set", "turn", "remind", "call", "open", "play", "stop", "schedule", "create", "add",
    "delete", "send", "toggle", "enable", "disable", "start",
];
const URGENT_MARKERS: &[&str] = &[
    "urgent", "emergency", "asap", "immediately", "right now", "help me", "hurry", "911",
];
const POSITIVE_WORDS: &[&str] = &[
    "good", "great", "happy", "love", "awesome", "thanks", "thank", "glad", "excited", "nice",
    "wonderful", "amazing", "fun",
];
const NEGATIVE_WORDS: &[&str] = &[
    "bad", "sad", "angry", "hate", "terrible", "awful", "worried", "anxious", "stressed",
    "lonely", "tired", "upset", "scared", "frustrated", "depressed", "hurt",
];
const EMOTION_WORDS: &[&str] = &["feel", "feeling", "felt", "emotional", "cry", "crying"];
const STOP_WORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "but", "to", "of", "in", "on", "for", "with", "is", "are",
    "was", "it", "i", "me", "my", "you", "your", "we", "be", "am", "at", "this", "that", "so",
    "do", "can", "please",
];

/// Deterministic analyzer over fixed word lists.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordAnalyzer;

impl KeywordAnalyzer {
    pub fn new() -> Self {
        Self
    }
}

pub(crate) fn words(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !(c.is_alphanumeric() || c == '\''))
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

impl LanguageAnalyzer for KeywordAnalyzer {
    fn analyze(&self, text: &str) -> LanguageAnalysis {
        let lower = text.to_lowercase();
        let tokens = words(text);
        let first = tokens.first().map(String::as_str).unwrap_or("");

        let is_question =
            lower.trim_end().ends_with('?') || QUESTION_WORDS.contains(&first);
        let is_urgent = (lower.contains('!') && lower.contains("help"))
            || URGENT_MARKERS.iter().any(|m| lower.contains(m));

        let positive = tokens
            .iter()
            .filter(|t| POSITIVE_WORDS.contains(&t.as_str()))
            .count() as f32;
        let negative = tokens
            .iter()
            .filter(|t| NEGATIVE_WORDS.contains(&t.as_str()))
            .count() as f32;
        let sentiment = if positive + negative == 0.0 {
            0.0
        } else {
            ((positive - negative) / (positive + negative)).clamp(-1.0, 1.0)
        };
        let emotional_content = positive + negative > 0.0
            || tokens.iter().any(|t| EMOTION_WORDS.contains(&t.as_str()));

        let intent = if GREETINGS.contains(&first) && tokens.len() <= 4 {
            Intent::Greeting
        } else if is_question {
            Intent::Question
        } else if COMMAND_VERBS.contains(&first) {
            Intent::Command
        } else {
            Intent::Statement
        };

        let mut keywords: Vec<String> = Vec::new();
        for token in tokens {
            if token.len() > 2 && !STOP_WORDS.contains(&token.as_str()) && !keywords.contains(&token)
            {
                keywords.push(token);
            }
        }

        LanguageAnalysis {
            intent,
            is_question,
            is_urgent,
            emotional_content,
            sentiment,
            keywords,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intents() {
        let analyzer = KeywordAnalyzer::new();
        assert_eq!(analyzer.analyze("Hey Sallie").intent, Intent::Greeting);
        assert_eq!(analyzer.analyze("What time is it?").intent, Intent::Question);
        assert_eq!(analyzer.analyze("Turn on the wifi").intent, Intent::Command);
        assert_eq!(analyzer.analyze("I went running today").intent, Intent::Statement);
    }

    #[test]
    fn test_urgency_and_emotion() {
        let analyzer = KeywordAnalyzer::new();
        let urgent = analyzer.analyze("This is an emergency, call my sister");
        assert!(urgent.is_urgent);

        let sad = analyzer.analyze("I feel so lonely and sad tonight");
        assert!(sad.emotional_content);
        assert!(sad.sentiment < 0.0);
        assert!(!sad.is_urgent);

        let flat = analyzer.analyze("The meeting moved to Tuesday");
        assert!(!flat.emotional_content);
        assert_eq!(flat.sentiment, 0.0);
        assert!(flat.keywords.contains(&"meeting".to_string()));
        assert!(!flat.keywords.contains(&"the".to_string()));
    }
}
