//! Fixed-shape summary of a snapshot.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::types::{Snapshot, node_type};

/// Highlight flags over the whole selection tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Highlights {
    pub has_auto_layout: bool,
    pub sticky_count: usize,
    /// Total characters of node text, counted before any truncation.
    pub text_chars: usize,
}

/// Cheap companion to a (possibly heavily pruned) snapshot.
///
/// Computed once from the original snapshot and never re-derived, so it
/// still describes nodes that pruning dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Synopsis {
    /// Number of top-level selected nodes.
    pub selection_count: usize,
    /// Node counts per type across the whole tree, sampled children included.
    pub counts_by_type: BTreeMap<String, usize>,
    pub highlights: Highlights,
}

impl Synopsis {
    pub fn from_snapshot(snapshot: &Snapshot) -> Self {
        let mut synopsis = Synopsis {
            selection_count: snapshot.nodes().len(),
            ..Default::default()
        };
        for root in snapshot.nodes() {
            root.walk(&mut |node| {
                *synopsis
                    .counts_by_type
                    .entry(node.node_type.clone())
                    .or_default() += 1;
                if node.has_auto_layout() {
                    synopsis.highlights.has_auto_layout = true;
                }
                if node.node_type == node_type::STICKY {
                    synopsis.highlights.sticky_count += 1;
                }
                if let Some(text) = &node.text {
                    synopsis.highlights.text_chars += text.chars().count();
                }
            });
        }
        synopsis
    }
}
