//! Embedding service: text -> fixed-length vector.
//!
//! The conversation store only sees the [`Embedder`] trait. Two backends exist:
//! the OpenAI embeddings API and a local feature-hashing embedder that needs no
//! network and is fully deterministic.

pub mod hashing;
pub mod openai;

pub use hashing::HashingEmbedder;
pub use openai::OpenAIEmbedder;

use async_trait::async_trait;
use std::sync::Arc;

use crate::cache::EmbeddingCache;
use crate::config::{Config, EmbeddingProvider};
use crate::error::{MemchatError, Result};

/// Maps text to a vector of fixed dimensionality
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a single text
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Dimensionality of every vector this embedder returns
    fn dimensions(&self) -> usize;
}

/// Build the configured embedder.
///
/// The OpenAI backend reads its key from the environment variable named in
/// `embeddings.api_key_env` and gets an LRU query cache when
/// `embeddings.cache_capacity > 0`.
pub fn build_embedder(config: &Config) -> Result<Arc<dyn Embedder>> {
    let settings = &config.embeddings;
    match settings.provider {
        EmbeddingProvider::Hashing => {
            log::info!("Using local hashing embedder ({} dimensions)", settings.dimensions);
            Ok(Arc::new(HashingEmbedder::new(settings.dimensions)))
        }
        EmbeddingProvider::OpenAI => {
            let api_key = std::env::var(&settings.api_key_env).map_err(|_| {
                MemchatError::Config(format!(
                    "Environment variable {} not set. Set it in your .env file or as an environment variable.",
                    settings.api_key_env
                ))
            })?;

            let cache = if settings.cache_capacity > 0 {
                Some(Arc::new(EmbeddingCache::new(settings.cache_capacity)))
            } else {
                None
            };

            log::info!("Using OpenAI embedder: {} ({} dimensions)", settings.model, settings.dimensions);
            Ok(Arc::new(OpenAIEmbedder::new(
                api_key,
                settings.model.clone(),
                settings.dimensions,
                settings.max_retries,
                cache,
            )?))
        }
    }
}
