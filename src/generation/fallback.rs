use async_trait::async_trait;

use super::{Generator, SamplingConfig};
use crate::error::Result;

const QUESTION_WORDS: &[&str] = &["what", "why", "how", "when", "where", "who", "which"];
const GREETING_WORDS: &[&str] = &["hi", "hello", "hey"];

pub const INTERROGATIVE_RESPONSE: &str = "That's an interesting question. Let me think about that.";
pub const UNSURE_RESPONSE: &str = "I'm not entirely sure about that. What do you think?";
pub const GENERIC_RESPONSE: &str = "Tell me more about that.";
pub const GREETING_RESPONSE: &str = "Hello! How can I help you today?";

fn first_word(input: &str) -> Option<String> {
    input
        .split_whitespace()
        .next()
        .map(|w| w.trim_end_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
}

/// Canned reply used when generation fails or yields nothing
pub fn fallback_response(user_input: &str) -> &'static str {
    match first_word(user_input) {
        Some(word) if QUESTION_WORDS.contains(&word.as_str()) => INTERROGATIVE_RESPONSE,
        _ if user_input.contains('?') => UNSURE_RESPONSE,
        _ => GENERIC_RESPONSE,
    }
}

/// Deterministic backend for offline use and tests: greets greetings, otherwise
/// answers with the fallback rule for the last `User:` line of the prompt.
pub struct RuleBasedGenerator;

impl RuleBasedGenerator {
    fn last_user_line(prompt: &str) -> &str {
        prompt
            .lines()
            .rev()
            .find_map(|line| line.strip_prefix("User:"))
            .map(str::trim)
            .unwrap_or(prompt)
    }
}

#[async_trait]
impl Generator for RuleBasedGenerator {
    async fn generate(&self, prompt: &str, _sampling: &SamplingConfig) -> Result<String> {
        let user_input = Self::last_user_line(prompt);
        let is_greeting = first_word(user_input)
            .map(|w| GREETING_WORDS.contains(&w.as_str()))
            .unwrap_or(false);

        let reply = if is_greeting {
            GREETING_RESPONSE
        } else {
            fallback_response(user_input)
        };
        Ok(reply.to_string())
    }

    fn name(&self) -> String {
        "rules".to_string()
    }
}
