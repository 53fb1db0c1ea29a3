//! Local model served by Ollama.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{Generator, SamplingConfig};
use crate::error::{MemchatError, Result};

#[derive(Debug, Clone)]
pub struct OllamaGenerator {
    http: Client,
    base_url: String,
    model: String,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    num_predict: u32,
    temperature: f32,
    top_p: f32,
    repeat_penalty: f32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

impl OllamaGenerator {
    pub fn new(base_url: &str, model: &str, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| MemchatError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        })
    }

    /// True if the Ollama server answers on `/api/tags`
    pub async fn health_check(&self) -> bool {
        self.http
            .get(format!("{}/api/tags", self.base_url))
            .timeout(Duration::from_secs(2))
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }
}

#[async_trait]
impl Generator for OllamaGenerator {
    async fn generate(&self, prompt: &str, sampling: &SamplingConfig) -> Result<String> {
        let request = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            options: GenerateOptions {
                num_predict: sampling.max_new_tokens,
                temperature: sampling.effective_temperature(),
                top_p: sampling.top_p,
                repeat_penalty: sampling.repetition_penalty,
            },
        };

        let start = std::time::Instant::now();
        let response = self
            .http
            .post(format!("{}/api/generate", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| MemchatError::Generation(format!("Ollama request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(MemchatError::Generation(format!(
                "Ollama error {}: {}",
                status, text
            )));
        }

        let result: GenerateResponse = response
            .json()
            .await
            .map_err(|e| MemchatError::Generation(format!("Invalid response: {}", e)))?;

        log::debug!("Ollama generation took {:?}", start.elapsed());
        Ok(result.response)
    }

    fn name(&self) -> String {
        format!("ollama:{}", self.model)
    }
}
