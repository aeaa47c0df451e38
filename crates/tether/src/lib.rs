//! Command correlation and budgeted context packing for agents that drive a
//! remote command executor over a single duplex channel.
//!
//! `tether` sits between a conversational decision loop and an executor it
//! can only reach through one shared socket. It solves two problems:
//!
//! 1. **Correlation.** Many concurrent command invocations share one channel
//!    and their replies arrive out of order. The
//!    [`RequestCorrelator`](bridge::RequestCorrelator) matches each reply to
//!    the task awaiting it, enforces per-call timeouts, and supports bulk
//!    cancellation when the transport goes away.
//!
//! 2. **Budgeting.** Conversation history and structural snapshots grow
//!    without bound, but every request to the decision engine must fit a hard
//!    token budget. The [`ContextPacker`](context::ContextPacker) shrinks the
//!    history window until the packed turns fit, and the
//!    [`SnapshotPruner`](snapshot::SnapshotPruner) compacts a document
//!    snapshot through four escalating reduction stages.
//!
//! # Getting started
//!
//! ```ignore
//! use tether::prelude::*;
//!
//! let config = TetherConfig::default();
//! let mut store = ConversationStore::new(config.max_kept_messages);
//! store.add_user("Make the header blue");
//! store.add_assistant("Done. The header frame is now #1E40AF.");
//!
//! let packer = ContextPacker::new(config.packer_config(), HeuristicEstimator);
//! let packed = packer.build_input(
//!     "You are a design assistant.",
//!     &store,
//!     "Now align it to the grid",
//!     &[],
//!     true,
//!     true,
//! );
//! println!("{} turns, ~{} tokens", packed.turns.len(), packed.estimated_tokens);
//! ```
//!
//! Commands flow through the correlator, which owns the wire round trip:
//!
//! ```ignore
//! let (outbound_tx, outbound_rx) = tokio::sync::mpsc::channel(64);
//! let correlator = RequestCorrelator::new(outbound_tx, config.correlator_config());
//! // hand `outbound_rx` to the transport writer, and feed every inbound
//! // frame into `correlator.handle_text(..)`
//! let result = correlator
//!     .send_command("get_selection", serde_json::json!({}))
//!     .await?;
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`context`] | Token estimation, budget arithmetic, the staged reduction pipeline, conversation store, context packer |
//! | [`snapshot`] | Snapshot data model, synopsis, four-stage snapshot pruner |
//! | [`bridge`] | Wire protocol, request correlator, error friendliness mapping |
//! | [`config`] | [`TetherConfig`](config::TetherConfig), the single configuration surface |
//! | [`error`] | Error taxonomy |

pub mod bridge;
pub mod config;
pub mod context;
pub mod error;
pub mod prelude;
pub mod snapshot;

use serde::{Deserialize, Serialize};

// ── Roles ──────────────────────────────────────────────────────────

/// Role of a turn in the conversation.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

// ── Packed turns ───────────────────────────────────────────────────

/// A single segment of multi-part turn content.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentSegment {
    /// Plain text.
    InputText { text: String },
    /// Reference to an image (URL or data URI). Never copied out of history.
    InputImage { image_url: String },
}

/// Turn content: either a plain string or an ordered list of segments.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(untagged)]
pub enum TurnContent {
    Text(String),
    Segments(Vec<ContentSegment>),
}

impl TurnContent {
    /// Concatenated text of the content, ignoring image segments.
    pub fn text(&self) -> String {
        match self {
            TurnContent::Text(t) => t.clone(),
            TurnContent::Segments(segments) => segments
                .iter()
                .filter_map(|s| match s {
                    ContentSegment::InputText { text } => Some(text.as_str()),
                    ContentSegment::InputImage { .. } => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }

    /// Number of image references carried by this content.
    pub fn image_count(&self) -> usize {
        match self {
            TurnContent::Text(_) => 0,
            TurnContent::Segments(segments) => segments
                .iter()
                .filter(|s| matches!(s, ContentSegment::InputImage { .. }))
                .count(),
        }
    }
}

/// One element of the packed input handed to the decision engine.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Turn {
    pub role: Role,
    pub content: TurnContent,
}

impl Turn {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: TurnContent::Text(text.into()),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: TurnContent::Text(text.into()),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: TurnContent::Text(text.into()),
        }
    }

    /// Build the current user turn.
    ///
    /// Without images the content is plain text. With images it becomes a
    /// text segment (when `text` is non-empty) followed by one image segment
    /// per reference, in the order given.
    pub fn user_with_images(text: &str, image_urls: &[String]) -> Self {
        if image_urls.is_empty() {
            return Self::user(text);
        }

        let mut segments = Vec::with_capacity(image_urls.len() + 1);
        if !text.is_empty() {
            segments.push(ContentSegment::InputText {
                text: text.to_string(),
            });
        }
        segments.extend(image_urls.iter().map(|url| ContentSegment::InputImage {
            image_url: url.clone(),
        }));

        Self {
            role: Role::User,
            content: TurnContent::Segments(segments),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_only_user_turn_is_plain() {
        let turn = Turn::user_with_images("hello", &[]);
        assert_eq!(turn.content, TurnContent::Text("hello".into()));
    }

    #[test]
    fn images_follow_text_segment_in_order() {
        let images = vec!["img://a".to_string(), "img://b".to_string()];
        let turn = Turn::user_with_images("look", &images);
        let TurnContent::Segments(segments) = &turn.content else {
            panic!("expected segments");
        };
        assert_eq!(segments.len(), 3);
        assert_eq!(
            segments[0],
            ContentSegment::InputText {
                text: "look".into()
            }
        );
        assert_eq!(
            segments[2],
            ContentSegment::InputImage {
                image_url: "img://b".into()
            }
        );
        assert_eq!(turn.content.image_count(), 2);
    }

    #[test]
    fn images_without_text_have_no_text_segment() {
        let images = vec!["img://a".to_string()];
        let turn = Turn::user_with_images("", &images);
        let TurnContent::Segments(segments) = &turn.content else {
            panic!("expected segments");
        };
        assert_eq!(segments.len(), 1);
        assert!(turn.content.text().is_empty());
    }

    #[test]
    fn turn_serializes_with_lowercase_role() {
        let json = serde_json::to_value(Turn::assistant("ok")).unwrap();
        assert_eq!(json["role"], "assistant");
        assert_eq!(json["content"], "ok");
    }

    #[test]
    fn segment_serializes_with_type_tag() {
        let json = serde_json::to_value(ContentSegment::InputImage {
            image_url: "img://x".into(),
        })
        .unwrap();
        assert_eq!(json["type"], "input_image");
        assert_eq!(json["image_url"], "img://x");
    }
}
