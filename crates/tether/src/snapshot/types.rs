//! Snapshot data model.
//!
//! A snapshot is the structural context for one turn: document metadata plus
//! the current selection as a tree of nodes. Field names follow the
//! executor's camelCase JSON. Fields this crate does not interpret are kept
//! verbatim in `extra` so a pruned snapshot round-trips everything it did not
//! deliberately drop.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Node type names with special handling.
pub mod node_type {
    pub const STICKY: &str = "STICKY";
    pub const TEXT: &str = "TEXT";
    pub const INSTANCE: &str = "INSTANCE";
    pub const FRAME: &str = "FRAME";
}

/// Width and height of a node's bounding box.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Geometry {
    #[serde(default)]
    pub width: f64,
    #[serde(default)]
    pub height: f64,
}

impl Geometry {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    /// Bounding-box area. Negative or NaN dimensions count as zero.
    pub fn area(&self) -> f64 {
        let w = if self.width.is_finite() { self.width.max(0.0) } else { 0.0 };
        let h = if self.height.is_finite() { self.height.max(0.0) } else { 0.0 };
        w * h
    }
}

/// One node of the selection tree.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub geometry: Geometry,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Auto-layout mode (`"HORIZONTAL"`, `"VERTICAL"`, or `"NONE"`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layout_mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_children: Option<Vec<Node>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style_refs: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layout_grids: Option<Value>,
    /// Set when `text` was shortened by the pruner.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub truncated: bool,
    /// Character count of `text` before truncation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_length: Option<usize>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Node {
    pub fn new(id: impl Into<String>, node_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            node_type: node_type.into(),
            ..Default::default()
        }
    }

    pub fn with_geometry(mut self, width: f64, height: f64) -> Self {
        self.geometry = Geometry::new(width, height);
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_children(mut self, children: Vec<Node>) -> Self {
        self.sample_children = Some(children);
        self
    }

    /// Whether this node uses auto layout.
    pub fn has_auto_layout(&self) -> bool {
        self.layout_mode
            .as_deref()
            .is_some_and(|mode| !mode.eq_ignore_ascii_case("NONE"))
    }

    /// Coverage priority: lower sorts first. Unknown types rank last.
    pub fn type_priority(&self) -> u8 {
        match self.node_type.as_str() {
            node_type::STICKY => 0,
            node_type::TEXT => 1,
            node_type::INSTANCE => 2,
            node_type::FRAME => 3,
            _ => 9,
        }
    }

    /// Visit this node and every sampled descendant, depth first.
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a Node)) {
        visit(self);
        if let Some(children) = &self.sample_children {
            for child in children {
                child.walk(visit);
            }
        }
    }

    /// Mutable variant of [`walk`](Self::walk).
    pub fn walk_mut(&mut self, visit: &mut impl FnMut(&mut Node)) {
        visit(self);
        if let Some(children) = &mut self.sample_children {
            for child in children {
                child.walk_mut(visit);
            }
        }
    }
}

/// The selection: top-level nodes in executor order plus opaque hints.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SelectionSummary {
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub hints: Map<String, Value>,
}

/// Structural context for one turn.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    #[serde(default)]
    pub version: u32,
    #[serde(default)]
    pub document: Map<String, Value>,
    #[serde(default)]
    pub selection_signature: String,
    #[serde(default)]
    pub selection_summary: SelectionSummary,
}

impl Snapshot {
    /// Snapshot over the given top-level nodes.
    pub fn from_nodes(nodes: Vec<Node>) -> Self {
        Self {
            version: 1,
            selection_summary: SelectionSummary {
                nodes,
                hints: Map::new(),
            },
            ..Default::default()
        }
    }

    pub fn nodes(&self) -> &[Node] {
        &self.selection_summary.nodes
    }

    /// Apply `visit` to every node in the tree, sampled children included.
    pub fn for_each_node_mut(&mut self, mut visit: impl FnMut(&mut Node)) {
        for node in &mut self.selection_summary.nodes {
            node.walk_mut(&mut visit);
        }
    }
}
