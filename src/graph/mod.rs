//! Relationship graph: entities mentioned in conversation and which ones appear
//! next to each other.
//!
//! Nodes count how often an entity is mentioned; edges link entities that are
//! adjacent in one text's extraction order. The graph only grows and lives for
//! the process lifetime.

mod extraction;
mod render;

pub use extraction::{
    build_extractor, EntityExtractor, EntityMention, HttpEntityExtractor, RegexEntityExtractor,
    LABEL_CARDINAL, LABEL_PROPER_NOUN,
};
pub use render::{RenderEdge, RenderNode, RenderableGraph, NODE_BASE_SIZE};

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::Result;

pub const DEFAULT_EDGE_WEIGHT: f32 = 0.1;

/// An entity and how often it has been mentioned
#[derive(Debug, Clone, PartialEq)]
pub struct EntityNode {
    /// Surface form; unique key
    pub name: String,
    /// Most recent label seen for this name
    pub category: String,
    pub occurrence_count: u64,
}

/// Undirected link between two entities mentioned side by side
#[derive(Debug, Clone, PartialEq)]
pub struct CooccurrenceEdge {
    /// Endpoint seen first
    pub source: String,
    pub target: String,
    pub weight: f32,
}

/// What happens to an edge's weight when the same pair co-occurs again
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EdgeWeightPolicy {
    /// Every sighting sets the same weight
    Constant { weight: f32 },
    /// First sighting sets `initial`, every later one adds `increment`
    Accumulate { initial: f32, increment: f32 },
}

impl Default for EdgeWeightPolicy {
    fn default() -> Self {
        EdgeWeightPolicy::Constant {
            weight: DEFAULT_EDGE_WEIGHT,
        }
    }
}

impl EdgeWeightPolicy {
    fn initial(&self) -> f32 {
        match *self {
            EdgeWeightPolicy::Constant { weight } => weight,
            EdgeWeightPolicy::Accumulate { initial, .. } => initial,
        }
    }

    fn reinforce(&self, current: f32) -> f32 {
        match *self {
            EdgeWeightPolicy::Constant { weight } => weight,
            EdgeWeightPolicy::Accumulate { increment, .. } => current + increment,
        }
    }
}

/// Order-insensitive key for an entity pair
fn edge_key(a: &str, b: &str) -> (String, String) {
    if a <= b {
        (a.to_string(), b.to_string())
    } else {
        (b.to_string(), a.to_string())
    }
}

pub struct RelationshipGraph {
    extractor: Arc<dyn EntityExtractor>,
    policy: EdgeWeightPolicy,
    nodes: Vec<EntityNode>,
    node_index: HashMap<String, usize>,
    edges: Vec<CooccurrenceEdge>,
    edge_index: HashMap<(String, String), usize>,
}

impl RelationshipGraph {
    pub fn new(extractor: Arc<dyn EntityExtractor>, policy: EdgeWeightPolicy) -> Self {
        Self {
            extractor,
            policy,
            nodes: Vec::new(),
            node_index: HashMap::new(),
            edges: Vec::new(),
            edge_index: HashMap::new(),
        }
    }

    /// Extract entities from `text` and fold them into the graph.
    ///
    /// Every mention bumps its node's count; every adjacent pair of mentions gets
    /// an edge. If extraction fails the graph is left untouched.
    pub async fn update(&mut self, text: &str) -> Result<()> {
        let mentions: Vec<EntityMention> = self
            .extractor
            .extract(text)
            .await?
            .into_iter()
            .filter(|m| !m.text.trim().is_empty())
            .collect();

        for mention in &mentions {
            self.record_mention(mention);
        }

        for pair in mentions.windows(2) {
            self.link(&pair[0].text, &pair[1].text);
        }

        log::debug!(
            "Graph update: {} mentions; now {} nodes, {} edges",
            mentions.len(),
            self.nodes.len(),
            self.edges.len()
        );
        Ok(())
    }

    fn record_mention(&mut self, mention: &EntityMention) {
        let existing = self.node_index.get(&mention.text).copied();
        let index = match existing {
            Some(index) => index,
            None => {
                self.nodes.push(EntityNode {
                    name: mention.text.clone(),
                    category: mention.label.clone(),
                    occurrence_count: 0,
                });
                self.node_index.insert(mention.text.clone(), self.nodes.len() - 1);
                self.nodes.len() - 1
            }
        };

        let node = &mut self.nodes[index];
        node.category = mention.label.clone();
        node.occurrence_count += 1;
    }

    fn link(&mut self, a: &str, b: &str) {
        let key = edge_key(a, b);
        let existing = self.edge_index.get(&key).copied();
        match existing {
            Some(index) => {
                let edge = &mut self.edges[index];
                edge.weight = self.policy.reinforce(edge.weight);
            }
            None => {
                self.edges.push(CooccurrenceEdge {
                    source: a.to_string(),
                    target: b.to_string(),
                    weight: self.policy.initial(),
                });
                self.edge_index.insert(key, self.edges.len() - 1);
            }
        }
    }

    /// Visualization-ready view of the current graph
    pub fn render(&self) -> RenderableGraph {
        RenderableGraph::from_parts(&self.nodes, &self.edges)
    }

    pub fn node(&self, name: &str) -> Option<&EntityNode> {
        self.node_index.get(name).map(|&i| &self.nodes[i])
    }

    /// Edge between `a` and `b` in either direction
    pub fn edge(&self, a: &str, b: &str) -> Option<&CooccurrenceEdge> {
        self.edge_index.get(&edge_key(a, b)).map(|&i| &self.edges[i])
    }

    /// Nodes in first-mention order
    pub fn nodes(&self) -> &[EntityNode] {
        &self.nodes
    }

    /// Edges in first-sighting order
    pub fn edges(&self) -> &[CooccurrenceEdge] {
        &self.edges
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn policy(&self) -> EdgeWeightPolicy {
        self.policy
    }
}
