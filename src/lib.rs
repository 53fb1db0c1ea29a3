pub mod cache;
pub mod config;
pub mod dialogue;
pub mod embeddings;
pub mod error;
pub mod generation;
pub mod graph;
pub mod memory;
pub mod persist;

pub use config::Config;
pub use dialogue::{Orchestrator, TurnOutcome};
pub use error::{MemchatError, Result};
pub use generation::{build_generator, Generator, SamplingConfig};
pub use graph::{build_extractor, EdgeWeightPolicy, RelationshipGraph};
pub use memory::{ConversationRecord, ConversationStore};
