//! Text generation: one [`Generator`] trait, one backend per model host.
//!
//! The orchestrator builds the prompt, hands it to whichever backend the config
//! selects, and cleans the raw continuation with [`extract_response`].

mod fallback;
mod ollama;
mod openai;
mod prompt;

pub use fallback::{
    fallback_response, RuleBasedGenerator, GENERIC_RESPONSE, GREETING_RESPONSE,
    INTERROGATIVE_RESPONSE, UNSURE_RESPONSE,
};
pub use ollama::OllamaGenerator;
pub use openai::OpenAIGenerator;
pub use prompt::{build_prompt, extract_response};

use async_trait::async_trait;
use std::time::Duration;

use crate::config::{Config, GenerationBackend};
use crate::error::{MemchatError, Result};

/// Decoding parameters passed with every request
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplingConfig {
    pub max_new_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub repetition_penalty: f32,
    /// When false the backend decodes greedily
    pub sampling: bool,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            max_new_tokens: 100,
            temperature: 0.8,
            top_p: 0.9,
            repetition_penalty: 1.2,
            sampling: true,
        }
    }
}

impl SamplingConfig {
    /// Temperature actually sent: zero when sampling is off
    pub fn effective_temperature(&self) -> f32 {
        if self.sampling {
            self.temperature
        } else {
            0.0
        }
    }
}

/// A text-generation backend
#[async_trait]
pub trait Generator: Send + Sync {
    /// Continue `prompt`. Returns the raw continuation; cleanup is the caller's job.
    async fn generate(&self, prompt: &str, sampling: &SamplingConfig) -> Result<String>;

    /// Short description for logs, e.g. `ollama:llama3`
    fn name(&self) -> String;
}

/// Build the configured backend and verify it is usable.
///
/// This is the one startup step allowed to be fatal: without a working generator
/// there is nothing to fall back to but canned replies.
pub async fn build_generator(config: &Config) -> Result<Box<dyn Generator>> {
    let settings = &config.generation;
    let timeout = Duration::from_secs(settings.timeout_secs);

    let generator: Box<dyn Generator> = match settings.backend {
        GenerationBackend::Rules => Box::new(RuleBasedGenerator),
        GenerationBackend::Ollama => {
            let generator = OllamaGenerator::new(&settings.base_url, &settings.model, timeout)?;
            if !generator.health_check().await {
                return Err(MemchatError::Config(format!(
                    "Ollama is not reachable at {}. Start it with `ollama serve` or choose another generation backend.",
                    settings.base_url
                )));
            }
            Box::new(generator)
        }
        GenerationBackend::OpenAI => {
            let api_key = std::env::var(&settings.api_key_env).map_err(|_| {
                MemchatError::Config(format!(
                    "Environment variable {} not set. Set it in your .env file or as an environment variable.",
                    settings.api_key_env
                ))
            })?;
            Box::new(OpenAIGenerator::new(
                &settings.base_url,
                &settings.model,
                api_key,
                timeout,
            )?)
        }
    };

    log::info!("Generation backend ready: {}", generator.name());
    Ok(generator)
}
