//! Entity extraction: text -> ordered (surface form, category) mentions.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::{Config, EntityProvider};
use crate::error::{MemchatError, Result};

/// One entity mention, in the order it appears in the text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityMention {
    pub text: String,
    pub label: String,
}

impl EntityMention {
    pub fn new(text: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            label: label.into(),
        }
    }
}

/// Named-entity recognizer seam
#[async_trait]
pub trait EntityExtractor: Send + Sync {
    async fn extract(&self, text: &str) -> Result<Vec<EntityMention>>;
}

/// Build the configured extractor
pub fn build_extractor(config: &Config) -> Result<Arc<dyn EntityExtractor>> {
    match config.entities.provider {
        EntityProvider::Regex => Ok(Arc::new(RegexEntityExtractor::new())),
        EntityProvider::Http => Ok(Arc::new(HttpEntityExtractor::new(
            config.entities.endpoint.clone(),
        )?)),
    }
}

pub const LABEL_PROPER_NOUN: &str = "PROPN";
pub const LABEL_CARDINAL: &str = "CARDINAL";

/// Capitalised words that start sentences or address the reader rather than name things
const NON_ENTITY_WORDS: &[&str] = &[
    "a", "also", "an", "and", "are", "at", "but", "can", "could", "did", "do", "does", "for",
    "good", "great", "he", "hello", "hey", "hi", "how", "i", "i'd", "i'll", "i'm", "i've", "if",
    "in", "is", "it", "it's", "let", "maybe", "my", "no", "not", "oh", "ok", "okay", "on", "or",
    "our", "please", "she", "should", "so", "sure", "tell", "thank", "thanks", "that", "that's",
    "the", "these", "they", "this", "those", "was", "we", "well", "what", "when", "where",
    "which", "who", "whose", "why", "will", "with", "would", "yes", "you", "you're", "your",
];

/// Heuristic extractor: runs of capitalised words are proper nouns, numbers are cardinals.
///
/// Lower-case connectors ("of", "the", "de", ...) may join capitalised words, so
/// "Bank of England" is one mention. Leading sentence words such as "The" or "What"
/// are dropped from a run; a run made only of such words is not a mention.
pub struct RegexEntityExtractor {
    pattern: Regex,
}

impl Default for RegexEntityExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl RegexEntityExtractor {
    pub fn new() -> Self {
        let cap = r"\b\p{Lu}[\p{L}\p{N}'’\-]*";
        let pattern = format!(
            r"(?P<num>\b\d+(?:[.,]\d+)*\b)|(?P<name>{cap}(?:\s+(?:(?:of|the|de|du|la|van|von|der)\s+)*{cap})*)",
            cap = cap
        );
        Self {
            pattern: Regex::new(&pattern).expect("Invalid entity regex pattern"),
        }
    }

    /// Synchronous core of [`EntityExtractor::extract`]
    pub fn extract_mentions(&self, text: &str) -> Vec<EntityMention> {
        let mut mentions = Vec::new();

        for cap in self.pattern.captures_iter(text) {
            if let Some(num) = cap.name("num") {
                mentions.push(EntityMention::new(num.as_str(), LABEL_CARDINAL));
            } else if let Some(name) = cap.name("name") {
                if let Some(entity) = trim_leading_non_entities(name.as_str()) {
                    mentions.push(EntityMention::new(entity, LABEL_PROPER_NOUN));
                }
            }
        }

        mentions
    }
}

fn is_non_entity_word(word: &str) -> bool {
    let normalized = word.to_lowercase().replace('’', "'");
    NON_ENTITY_WORDS.contains(&normalized.as_str())
}

fn trim_leading_non_entities(run: &str) -> Option<String> {
    let words: Vec<&str> = run.split_whitespace().collect();
    let start = words.iter().position(|w| !is_non_entity_word(w))?;
    Some(words[start..].join(" "))
}

#[async_trait]
impl EntityExtractor for RegexEntityExtractor {
    async fn extract(&self, text: &str) -> Result<Vec<EntityMention>> {
        Ok(self.extract_mentions(text))
    }
}

#[derive(Serialize)]
struct ExtractRequest<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ExtractResponse {
    Wrapped { entities: Vec<EntityMention> },
    Bare(Vec<EntityMention>),
}

/// Remote NER service: `POST {endpoint}` with `{"text": ...}`.
///
/// Accepts `{"entities": [{"text", "label"}, ...]}` or a bare array of the same items.
pub struct HttpEntityExtractor {
    client: Client,
    endpoint: String,
}

impl HttpEntityExtractor {
    pub fn new(endpoint: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| MemchatError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client, endpoint })
    }
}

#[async_trait]
impl EntityExtractor for HttpEntityExtractor {
    async fn extract(&self, text: &str) -> Result<Vec<EntityMention>> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&ExtractRequest { text })
            .send()
            .await
            .map_err(|e| MemchatError::EntityExtraction(format!("Request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MemchatError::EntityExtraction(format!(
                "NER service error {}: {}",
                status, body
            )));
        }

        let parsed: ExtractResponse = response
            .json()
            .await
            .map_err(|e| MemchatError::EntityExtraction(format!("Invalid response: {}", e)))?;

        Ok(match parsed {
            ExtractResponse::Wrapped { entities } => entities,
            ExtractResponse::Bare(entities) => entities,
        })
    }
}
