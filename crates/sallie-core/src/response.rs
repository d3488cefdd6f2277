//! Reply composition.
//!
//! [`TemplateResponder`] is the built-in generator: it picks sentences from the detected intent
//! and emotional tone and shades them with the current (contextually adjusted) personality.

use crate::context::ConversationContext;
use crate::error::SallieResult;
use crate::modules::ResponseGenerator;
use crate::nlp::{Intent, LanguageAnalysis};
use async_trait::async_trait;
use sallie_evolution::{Decision, PersonalityProfile};

/// Everything a generator may use for one reply.
#[derive(Debug, Clone, Copy)]
pub struct ResponseRequest<'a> {
    pub input: &'a str,
    pub analysis: &'a LanguageAnalysis,
    pub conversation: &'a ConversationContext,
    pub profile: Option<&'a PersonalityProfile>,
    pub memories: &'a [String],
    pub research: &'a [String],
    /// Value check of the request, when a value system is registered.
    pub decision: Option<&'a Decision>,
    pub user_name: Option<&'a str>,
}

impl ResponseRequest<'_> {
    fn trait_value(&self, name: &str) -> f32 {
        self.profile
            .and_then(|p| p.trait_value(name))
            .unwrap_or(0.5)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateResponder;

impl TemplateResponder {
    pub fn new() -> Self {
        Self
    }

    pub fn compose(&self, request: &ResponseRequest<'_>) -> String {
        if let Some(decision) = request.decision.filter(|d| !d.approved) {
            return format!("I can't help with that. {}", capitalize(&decision.reason));
        }

        let warmth = request.trait_value("warmth");
        let humor = request.trait_value("humor");
        let mut parts: Vec<String> = Vec::new();

        match request.conversation.emotional_tone.as_str() {
            "sad" => parts.push("I'm sorry you're feeling down.".to_string()),
            "anxious" => parts.push("That sounds stressful. Let's take it one step at a time.".to_string()),
            "angry" => parts.push("That sounds really frustrating.".to_string()),
            "tired" => parts.push("You sound worn out.".to_string()),
            "happy" if humor > 0.6 => parts.push("I love that energy!".to_string()),
            "happy" => parts.push("That's great to hear.".to_string()),
            _ => {}
        }
        if warmth >= 0.75 && request.analysis.emotional_content && request.analysis.sentiment < 0.0 {
            parts.push("I'm here for you.".to_string());
        }

        match request.analysis.intent {
            Intent::Greeting => parts.push(match request.user_name {
                Some(name) => format!("Hi {}! How are you today?", name),
                None => "Hi! How are you today?".to_string(),
            }),
            Intent::Question => {
                if let Some(fact) = request.research.first() {
                    parts.push(format!("Here's what I found: {}", fact));
                } else if let Some(memory) = request.memories.first() {
                    parts.push(format!("You mentioned before: \"{}\".", memory));
                } else {
                    parts.push("Good question. Let me think about that with you.".to_string());
                }
            }
            Intent::Command => parts.push("On it.".to_string()),
            Intent::Statement => {
                if request.analysis.is_urgent {
                    parts.push("I'm on this right away.".to_string());
                } else if request.conversation.current_topic != "general" {
                    parts.push(format!(
                        "Tell me more about the {} side of things.",
                        request.conversation.current_topic
                    ));
                } else {
                    parts.push("Tell me more.".to_string());
                }
            }
        }

        parts.join(" ")
    }
}

#[async_trait]
impl ResponseGenerator for TemplateResponder {
    async fn generate(&self, request: &ResponseRequest<'_>) -> SallieResult<String> {
        Ok(self.compose(request))
    }
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
