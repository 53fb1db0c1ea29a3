//! Visualization-ready graph view.
//!
//! The JSON shape (`nodes` with id/label/title/size, `edges` with from/to) is what
//! vis-network expects, so the HTML export just embeds it next to the library.

use std::path::Path;

use serde::Serialize;

use super::{CooccurrenceEdge, EntityNode};
use crate::error::Result;
use crate::persist::write_atomic;

/// Size of a node mentioned once; each further mention adds one
pub const NODE_BASE_SIZE: f32 = 10.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderNode {
    pub id: String,
    /// Entity category, shown on the node
    pub label: String,
    /// Entity name, shown on hover
    pub title: String,
    pub size: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderEdge {
    pub from: String,
    pub to: String,
    pub weight: f32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RenderableGraph {
    pub nodes: Vec<RenderNode>,
    pub edges: Vec<RenderEdge>,
}

const HTML_TEMPLATE: &str = r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>memchat relationship graph</title>
<script src="https://unpkg.com/vis-network/standalone/umd/vis-network.min.js"></script>
<style>#graph { width: 100%; height: 500px; border: 1px solid lightgray; }</style>
</head>
<body>
<div id="graph"></div>
<script>
const data = __GRAPH_JSON__;
new vis.Network(
  document.getElementById("graph"),
  { nodes: new vis.DataSet(data.nodes), edges: new vis.DataSet(data.edges) },
  { nodes: { shape: "dot" }, physics: { stabilization: true } }
);
</script>
</body>
</html>
"#;

impl RenderableGraph {
    pub(super) fn from_parts(nodes: &[EntityNode], edges: &[CooccurrenceEdge]) -> Self {
        Self {
            nodes: nodes
                .iter()
                .map(|n| RenderNode {
                    id: n.name.clone(),
                    label: n.category.clone(),
                    title: n.name.clone(),
                    size: NODE_BASE_SIZE + n.occurrence_count.saturating_sub(1) as f32,
                })
                .collect(),
            edges: edges
                .iter()
                .map(|e| RenderEdge {
                    from: e.source.clone(),
                    to: e.target.clone(),
                    weight: e.weight,
                })
                .collect(),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Standalone HTML page that draws the graph with vis-network
    pub fn to_html(&self) -> Result<String> {
        // Entity names are user text; no raw `<` may reach the script block
        let json = self.to_json()?.replace('<', "\\u003c");
        Ok(HTML_TEMPLATE.replace("__GRAPH_JSON__", &json))
    }

    /// Write [`to_html`](Self::to_html) to `path`, replacing it atomically
    pub fn write_html(&self, path: &Path) -> Result<()> {
        write_atomic(path, self.to_html()?.as_bytes())
    }
}
