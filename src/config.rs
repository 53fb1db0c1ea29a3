use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::generation::SamplingConfig;
use crate::graph::EdgeWeightPolicy;

/// Main configuration structure
///
/// Every section is optional; missing keys fall back to the defaults below.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub embeddings: EmbeddingsConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub entities: EntitiesConfig,
    #[serde(default)]
    pub graph: GraphConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Conversation store configuration
#[derive(Debug, Clone, Deserialize)]
pub struct MemoryConfig {
    #[serde(default = "default_storage_file")]
    pub storage_file: PathBuf,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            storage_file: default_storage_file(),
            top_k: default_top_k(),
        }
    }
}

fn default_storage_file() -> PathBuf {
    PathBuf::from("memory.json")
}

fn default_top_k() -> usize {
    3
}

/// Which embedding backend to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    OpenAI,
    Hashing,
}

/// Embeddings configuration
#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingsConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: EmbeddingProvider,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
}

impl Default for EmbeddingsConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: default_embedding_model(),
            api_key_env: default_api_key_env(),
            dimensions: default_dimensions(),
            cache_capacity: default_cache_capacity(),
            max_retries: default_max_retries(),
        }
    }
}

fn default_embedding_provider() -> EmbeddingProvider {
    EmbeddingProvider::Hashing
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_dimensions() -> usize {
    384
}

fn default_cache_capacity() -> usize {
    1000
}

fn default_max_retries() -> usize {
    3
}

/// Which generation backend to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationBackend {
    Ollama,
    OpenAI,
    Rules,
}

/// Generation configuration
#[derive(Debug, Clone, Deserialize)]
pub struct GenerationConfig {
    #[serde(default = "default_generation_backend")]
    pub backend: GenerationBackend,
    #[serde(default = "default_generation_model")]
    pub model: String,
    #[serde(default = "default_generation_base_url")]
    pub base_url: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_new_tokens")]
    pub max_new_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_top_p")]
    pub top_p: f32,
    #[serde(default = "default_repetition_penalty")]
    pub repetition_penalty: f32,
    #[serde(default = "default_sampling")]
    pub sampling: bool,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            backend: default_generation_backend(),
            model: default_generation_model(),
            base_url: default_generation_base_url(),
            api_key_env: default_api_key_env(),
            timeout_secs: default_timeout_secs(),
            max_new_tokens: default_max_new_tokens(),
            temperature: default_temperature(),
            top_p: default_top_p(),
            repetition_penalty: default_repetition_penalty(),
            sampling: default_sampling(),
        }
    }
}

fn default_generation_backend() -> GenerationBackend {
    GenerationBackend::Ollama
}

fn default_generation_model() -> String {
    "llama3".to_string()
}

fn default_generation_base_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_max_new_tokens() -> u32 {
    100
}

fn default_temperature() -> f32 {
    0.8
}

fn default_top_p() -> f32 {
    0.9
}

fn default_repetition_penalty() -> f32 {
    1.2
}

fn default_sampling() -> bool {
    true
}

/// Which entity extractor to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityProvider {
    Regex,
    Http,
}

/// Entity extraction configuration
#[derive(Debug, Clone, Deserialize)]
pub struct EntitiesConfig {
    #[serde(default = "default_entity_provider")]
    pub provider: EntityProvider,
    #[serde(default = "default_entity_endpoint")]
    pub endpoint: String,
}

impl Default for EntitiesConfig {
    fn default() -> Self {
        Self {
            provider: default_entity_provider(),
            endpoint: default_entity_endpoint(),
        }
    }
}

fn default_entity_provider() -> EntityProvider {
    EntityProvider::Regex
}

fn default_entity_endpoint() -> String {
    "http://localhost:8000/ents".to_string()
}

/// How repeated co-occurrences affect edge weight
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgePolicyKind {
    Constant,
    Accumulate,
}

/// Relationship graph configuration
#[derive(Debug, Clone, Deserialize)]
pub struct GraphConfig {
    #[serde(default = "default_edge_policy")]
    pub edge_policy: EdgePolicyKind,
    #[serde(default = "default_edge_weight")]
    pub edge_weight: f32,
    #[serde(default = "default_edge_weight")]
    pub edge_increment: f32,
    #[serde(default = "default_html_path")]
    pub html_path: PathBuf,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            edge_policy: default_edge_policy(),
            edge_weight: default_edge_weight(),
            edge_increment: default_edge_weight(),
            html_path: default_html_path(),
        }
    }
}

fn default_edge_policy() -> EdgePolicyKind {
    EdgePolicyKind::Constant
}

fn default_edge_weight() -> f32 {
    0.1
}

fn default_html_path() -> PathBuf {
    PathBuf::from("graph.html")
}

/// Logging configuration (RUST_LOG takes precedence)
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from file
    ///
    /// Loads environment variables from .env file (if present) before loading config.
    /// Looks for config file in this order:
    /// 1. Path specified in MEMCHAT_CONFIG environment variable
    /// 2. ./config.toml in current directory
    pub fn load() -> Result<Self> {
        // .env is optional
        let _ = dotenv::dotenv();

        let config_path = std::env::var("MEMCHAT_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config.toml"));

        log::info!("Loading configuration from {}", config_path.display());
        Self::from_path(&config_path)
    }

    /// Load and validate configuration from an explicit path
    pub fn from_path(config_path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        Self::parse(&config_str)
            .with_context(|| format!("Invalid config file: {}", config_path.display()))
    }

    /// Parse and validate configuration from TOML text
    pub fn parse(config_str: &str) -> Result<Self> {
        let config: Config = toml::from_str(config_str).context("Failed to parse config TOML")?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    fn validate(&self) -> Result<()> {
        if self.memory.top_k == 0 {
            anyhow::bail!("memory.top_k must be greater than 0");
        }

        if self.embeddings.dimensions == 0 {
            anyhow::bail!("embeddings.dimensions must be greater than 0");
        }

        let generation = &self.generation;
        if generation.max_new_tokens == 0 {
            anyhow::bail!("generation.max_new_tokens must be greater than 0");
        }

        if !generation.temperature.is_finite() || generation.temperature < 0.0 {
            anyhow::bail!("generation.temperature must be a finite, non-negative number");
        }

        if !(generation.top_p > 0.0 && generation.top_p <= 1.0) {
            anyhow::bail!("generation.top_p must be in (0.0, 1.0]");
        }

        if !generation.repetition_penalty.is_finite() || generation.repetition_penalty <= 0.0 {
            anyhow::bail!("generation.repetition_penalty must be a finite number greater than 0");
        }

        url::Url::parse(&generation.base_url)
            .with_context(|| format!("generation.base_url is not a valid URL: {}", generation.base_url))?;

        if self.entities.provider == EntityProvider::Http {
            url::Url::parse(&self.entities.endpoint)
                .with_context(|| format!("entities.endpoint is not a valid URL: {}", self.entities.endpoint))?;
        }

        if !self.graph.edge_weight.is_finite() || self.graph.edge_weight < 0.0 {
            anyhow::bail!("graph.edge_weight must be a finite, non-negative number");
        }

        if self.graph.edge_policy == EdgePolicyKind::Accumulate
            && (!self.graph.edge_increment.is_finite() || self.graph.edge_increment < 0.0)
        {
            anyhow::bail!("graph.edge_increment must be a finite, non-negative number for the accumulate policy");
        }

        Ok(())
    }

    /// `[logging].level` as a filter, or `None` if it is not a known level name
    pub fn log_level(&self) -> Option<log::LevelFilter> {
        self.logging.level.trim().parse().ok()
    }

    /// Get conversation store path
    pub fn storage_file(&self) -> &Path {
        &self.memory.storage_file
    }

    /// Sampling parameters handed to the generation backend
    pub fn sampling(&self) -> SamplingConfig {
        SamplingConfig {
            max_new_tokens: self.generation.max_new_tokens,
            temperature: self.generation.temperature,
            top_p: self.generation.top_p,
            repetition_penalty: self.generation.repetition_penalty,
            sampling: self.generation.sampling,
        }
    }

    /// Edge weight policy for the relationship graph
    pub fn edge_policy(&self) -> EdgeWeightPolicy {
        match self.graph.edge_policy {
            EdgePolicyKind::Constant => EdgeWeightPolicy::Constant {
                weight: self.graph.edge_weight,
            },
            EdgePolicyKind::Accumulate => EdgeWeightPolicy::Accumulate {
                initial: self.graph.edge_weight,
                increment: self.graph.edge_increment,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Serialize config tests that mutate process-wide env so they don't race.
    static CONFIG_TEST_LOCK: Mutex<()> = Mutex::new(());

    const FULL_CONFIG: &str = r#"
[memory]
storage_file = "./chat-memory.json"
top_k = 5

[embeddings]
provider = "openai"
model = "text-embedding-3-small"
api_key_env = "OPENAI_API_KEY"
dimensions = 1536

[generation]
backend = "rules"
max_new_tokens = 64
temperature = 0.7
sampling = false

[graph]
edge_policy = "accumulate"
edge_weight = 0.2
edge_increment = 0.05
"#;

    #[test]
    fn test_config_parse_full() {
        let config = Config::parse(FULL_CONFIG).unwrap();
        assert_eq!(config.memory.top_k, 5);
        assert_eq!(config.storage_file(), Path::new("./chat-memory.json"));
        assert_eq!(config.embeddings.provider, EmbeddingProvider::OpenAI);
        assert_eq!(config.embeddings.dimensions, 1536);
        assert_eq!(config.generation.backend, GenerationBackend::Rules);

        let sampling = config.sampling();
        assert_eq!(sampling.max_new_tokens, 64);
        assert!(!sampling.sampling);
        assert!((sampling.top_p - 0.9).abs() < 1e-6);

        assert_eq!(
            config.edge_policy(),
            EdgeWeightPolicy::Accumulate {
                initial: 0.2,
                increment: 0.05
            }
        );
    }

    #[test]
    fn test_config_empty_uses_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.memory.top_k, 3);
        assert_eq!(config.storage_file(), Path::new("memory.json"));
        assert_eq!(config.embeddings.provider, EmbeddingProvider::Hashing);
        assert_eq!(config.generation.backend, GenerationBackend::Ollama);
        assert_eq!(config.entities.provider, EntityProvider::Regex);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.edge_policy(), EdgeWeightPolicy::Constant { weight: 0.1 });

        let sampling = config.sampling();
        assert_eq!(sampling.max_new_tokens, 100);
        assert!((sampling.temperature - 0.8).abs() < 1e-6);
        assert!((sampling.repetition_penalty - 1.2).abs() < 1e-6);
        assert!(sampling.sampling);
    }

    #[test]
    fn test_config_rejects_zero_top_k() {
        let err = Config::parse("[memory]\ntop_k = 0\n").unwrap_err();
        assert!(err.to_string().contains("top_k"));
    }

    #[test]
    fn test_config_rejects_bad_top_p() {
        let err = Config::parse("[generation]\ntop_p = 1.5\n").unwrap_err();
        assert!(err.to_string().contains("top_p"));
    }

    #[test]
    fn test_config_log_level() {
        let config = Config::parse("[logging]\nlevel = \"debug\"\n").unwrap();
        assert_eq!(config.log_level(), Some(log::LevelFilter::Debug));

        let config = Config::parse("[logging]\nlevel = \"chatty\"\n").unwrap();
        assert_eq!(config.log_level(), None);

        assert_eq!(Config::default().log_level(), Some(log::LevelFilter::Info));
    }

    #[test]
    fn test_config_rejects_non_finite_sampling() {
        let err = Config::parse("[generation]\ntemperature = nan\n").unwrap_err();
        assert!(err.to_string().contains("temperature"));

        let err = Config::parse("[generation]\ntop_p = nan\n").unwrap_err();
        assert!(err.to_string().contains("top_p"));

        let err = Config::parse("[generation]\nrepetition_penalty = inf\n").unwrap_err();
        assert!(err.to_string().contains("repetition_penalty"));
    }

    #[test]
    fn test_config_rejects_bad_edge_weight() {
        let err = Config::parse("[graph]\nedge_weight = -0.5\n").unwrap_err();
        assert!(err.to_string().contains("edge_weight"));

        let err = Config::parse("[graph]\nedge_weight = nan\n").unwrap_err();
        assert!(err.to_string().contains("edge_weight"));

        let err = Config::parse("[graph]\nedge_policy = \"accumulate\"\nedge_increment = nan\n")
            .unwrap_err();
        assert!(err.to_string().contains("edge_increment"));
    }

    #[test]
    fn test_config_rejects_bad_base_url() {
        let err = Config::parse("[generation]\nbase_url = \"not a url\"\n").unwrap_err();
        assert!(err.to_string().contains("base_url"));
    }

    #[test]
    fn test_config_rejects_unknown_backend() {
        assert!(Config::parse("[generation]\nbackend = \"gpt2-xl\"\n").is_err());
    }

    #[test]
    fn test_config_load_from_env_path() {
        let _lock = CONFIG_TEST_LOCK.lock().unwrap();
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("memchat.toml");
        fs::write(&config_path, FULL_CONFIG).unwrap();

        let original = std::env::var("MEMCHAT_CONFIG").ok();
        std::env::set_var("MEMCHAT_CONFIG", config_path.to_str().unwrap());
        let config = Config::load();
        std::env::remove_var("MEMCHAT_CONFIG");
        if let Some(v) = original {
            std::env::set_var("MEMCHAT_CONFIG", v);
        }

        let config = config.unwrap();
        assert_eq!(config.memory.top_k, 5);
    }

    #[test]
    fn test_config_invalid_path() {
        let _lock = CONFIG_TEST_LOCK.lock().unwrap();
        let original = std::env::var("MEMCHAT_CONFIG").ok();
        std::env::set_var("MEMCHAT_CONFIG", "nonexistent.toml");
        let config = Config::load();
        assert!(config.is_err());
        std::env::remove_var("MEMCHAT_CONFIG");
        if let Some(v) = original {
            std::env::set_var("MEMCHAT_CONFIG", v);
        }
    }
}
