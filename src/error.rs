use thiserror::Error;

/// Main error type for memchat
#[derive(Error, Debug)]
pub enum MemchatError {
    /// File system I/O errors (store persistence, graph export)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encode/decode errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Persisted conversation state is unusable
    #[error("Storage corruption: {0}")]
    StorageCorruption(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Embedding service errors
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Generation service errors
    #[error("Generation error: {0}")]
    Generation(String),

    /// Entity extraction service errors
    #[error("Entity extraction error: {0}")]
    EntityExtraction(String),
}

/// Convenient Result type using MemchatError
pub type Result<T> = std::result::Result<T, MemchatError>;
