use crate::cache::EmbeddingCache;
use crate::embeddings::Embedder;
use crate::error::{MemchatError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

const OPENAI_EMBEDDINGS_URL: &str = "https://api.openai.com/v1/embeddings";

/// Request body for the OpenAI embeddings API
#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: Vec<&'a str>,
    dimensions: usize,
}

/// Response body from the OpenAI embeddings API
#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

/// OpenAI embeddings client
///
/// Embeds one text per request with exponential-backoff retry on rate limits and
/// server errors. Optionally keeps recent embeddings in an LRU cache.
pub struct OpenAIEmbedder {
    client: Client,
    api_key: String,
    model: String,
    dimensions: usize,
    max_retries: usize,
    cache: Option<Arc<EmbeddingCache>>,
}

impl OpenAIEmbedder {
    /// Create a new OpenAI embedder
    ///
    /// # Arguments
    ///
    /// * `api_key` - OpenAI API key
    /// * `model` - Model name (e.g., "text-embedding-3-small")
    /// * `dimensions` - Requested output dimensionality; responses of any other length are rejected
    /// * `max_retries` - Retry attempts for 429/5xx responses
    /// * `cache` - Optional embedding cache
    pub fn new(
        api_key: String,
        model: String,
        dimensions: usize,
        max_retries: usize,
        cache: Option<Arc<EmbeddingCache>>,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| MemchatError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_key,
            model,
            dimensions,
            max_retries,
            cache,
        })
    }

    /// Make a single API request for one text
    async fn request_embedding(&self, text: &str) -> Result<Vec<f32>> {
        let request = EmbeddingRequest {
            model: &self.model,
            input: vec![text],
            dimensions: self.dimensions,
        };

        let response = self
            .client
            .post(OPENAI_EMBEDDINGS_URL)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| MemchatError::Embedding(format!("Network error: {}", e)))?;

        let status = response.status();

        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());

            return Err(MemchatError::Embedding(format!(
                "OpenAI API error {}: {}",
                status, body
            )));
        }

        let result: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| MemchatError::Embedding(format!("Failed to parse response: {}", e)))?;

        let embedding = result
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| MemchatError::Embedding("Empty response from OpenAI API".to_string()))?;

        if embedding.len() != self.dimensions {
            return Err(MemchatError::Embedding(format!(
                "Unexpected embedding dimension: expected {}, got {}",
                self.dimensions,
                embedding.len()
            )));
        }

        Ok(embedding)
    }

    /// Embed with retry on retryable errors (no caching)
    async fn embed_with_retry(&self, text: &str) -> Result<Vec<f32>> {
        let start = std::time::Instant::now();
        let mut attempt = 0;
        let mut delay = Duration::from_secs(1);

        loop {
            match self.request_embedding(text).await {
                Ok(embedding) => {
                    log::debug!(
                        "Embedding API call took {:?} (attempt {})",
                        start.elapsed(),
                        attempt + 1
                    );
                    return Ok(embedding);
                }
                Err(e) if attempt < self.max_retries && is_retryable(&e) => {
                    log::warn!("Retry {}/{} after error: {}", attempt + 1, self.max_retries, e);
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Rate limits (429) and server errors (5xx) are worth retrying
fn is_retryable(err: &MemchatError) -> bool {
    let message = err.to_string();
    ["429", "500", "502", "503", "504"]
        .iter()
        .any(|code| message.contains(code))
}

#[async_trait]
impl Embedder for OpenAIEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if let Some(cache) = &self.cache {
            if let Some(cached) = cache.get(text) {
                log::debug!("Embedding cache hit ({:?})", cache.stats());
                return Ok(cached);
            }
        }

        let embedding = self.embed_with_retry(text).await?;

        if let Some(cache) = &self.cache {
            cache.put(text.to_string(), embedding.clone());
        }

        Ok(embedding)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}
