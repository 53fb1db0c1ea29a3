//! One conversational turn: retrieve, generate, remember, update the graph.

use crate::generation::{
    build_prompt, extract_response, fallback_response, Generator, SamplingConfig,
};
use crate::graph::RelationshipGraph;
use crate::memory::{format_context, ConversationRecord, ConversationStore};

/// Result of a single turn
#[derive(Debug, Clone, PartialEq)]
pub struct TurnOutcome {
    /// Reply shown to the user
    pub response: String,
    /// Past exchanges that were fed to the generator as context
    pub related: Vec<ConversationRecord>,
    /// True when the reply is a canned fallback rather than model output
    pub used_fallback: bool,
}

/// Owns the conversation memory, the entity graph and the generator for a session
pub struct Orchestrator {
    store: ConversationStore,
    graph: RelationshipGraph,
    generator: Box<dyn Generator>,
    sampling: SamplingConfig,
    top_k: usize,
}

impl Orchestrator {
    pub fn new(
        store: ConversationStore,
        graph: RelationshipGraph,
        generator: Box<dyn Generator>,
        sampling: SamplingConfig,
        top_k: usize,
    ) -> Self {
        Self {
            store,
            graph,
            generator,
            sampling,
            top_k,
        }
    }

    /// Run one turn for `user_text`
    ///
    /// Always produces a reply. Downstream failures are logged and degrade the turn:
    ///
    /// - retrieval error: no context
    /// - generation error or empty cleaned reply: canned fallback
    /// - store write error: the turn is kept in memory only
    /// - graph update error: graph unchanged for this turn
    ///
    /// # Example
    ///
    /// ```no_run
    /// use memchat::{build_extractor, build_generator, Config, ConversationStore, Orchestrator};
    /// use memchat::embeddings::build_embedder;
    /// use memchat::graph::RelationshipGraph;
    ///
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let config = Config::load()?;
    /// let store = ConversationStore::open(config.storage_file(), build_embedder(&config)?);
    /// let graph = RelationshipGraph::new(build_extractor(&config)?, config.edge_policy());
    /// let generator = build_generator(&config).await?;
    ///
    /// let mut bot = Orchestrator::new(store, graph, generator, config.sampling(), config.memory.top_k);
    /// let outcome = bot.handle_turn("I visited Paris last year").await;
    /// println!("{}", outcome.response);
    /// # Ok(())
    /// # }
    /// ```
    pub async fn handle_turn(&mut self, user_text: &str) -> TurnOutcome {
        let related = match self.store.retrieve(user_text, self.top_k).await {
            Ok(records) => records,
            Err(e) => {
                log::warn!("Retrieval failed, continuing without context: {}", e);
                Vec::new()
            }
        };

        let prompt = build_prompt(user_text, &format_context(&related));
        let start = std::time::Instant::now();
        let cleaned = match self.generator.generate(&prompt, &self.sampling).await {
            Ok(raw) => extract_response(&raw, &prompt),
            Err(e) => {
                log::warn!("Generation with {} failed: {}", self.generator.name(), e);
                String::new()
            }
        };
        log::debug!("Generation took {:?}", start.elapsed());

        let used_fallback = cleaned.is_empty();
        let response = if used_fallback {
            fallback_response(user_text).to_string()
        } else {
            cleaned
        };

        if let Err(e) = self.store.append(user_text, &response).await {
            log::warn!("Failed to persist turn to {}: {}", self.store.path().display(), e);
        }

        let combined = format!("{} {}", user_text, response);
        if let Err(e) = self.graph.update(&combined).await {
            log::warn!("Failed to update relationship graph: {}", e);
        }

        TurnOutcome {
            response,
            related,
            used_fallback,
        }
    }

    pub fn store(&self) -> &ConversationStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut ConversationStore {
        &mut self.store
    }

    pub fn graph(&self) -> &RelationshipGraph {
        &self.graph
    }
}
