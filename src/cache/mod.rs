//! In-process caches shared by the embedding clients.

pub mod embedding_cache;

pub use embedding_cache::{CacheStats, EmbeddingCache};
