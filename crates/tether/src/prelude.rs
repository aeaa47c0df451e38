//! Convenience re-exports for common `tether` types.
//!
//! ```ignore
//! use tether::prelude::*;
//! ```
//!
//! Covers configuration, packing, pruning, and the correlator. Stage-level
//! helpers (`visual_trim`, `clip_children`, the reduction pipeline) stay in
//! their modules.

// ── Core types ──────────────────────────────────────────────────────
pub use crate::config::{SnapshotCaps, TetherConfig};
pub use crate::error::{CommandError, ConfigError};
pub use crate::{ContentSegment, Role, Turn, TurnContent};

// ── Context budgeting ───────────────────────────────────────────────
pub use crate::context::{
    BudgetPlan, ContextBudget, ContextPacker, ConversationItem, ConversationStore,
    HeuristicEstimator, PackedInput, PackerConfig, TokenEstimator, UsageSnapshot,
};

// ── Snapshots ───────────────────────────────────────────────────────
pub use crate::snapshot::{
    Node, PruneReport, Pruned, PrunerConfig, Snapshot, SnapshotPruner, Synopsis,
};

// ── Executor bridge ─────────────────────────────────────────────────
pub use crate::bridge::{
    CorrelatorConfig, OutboundMessage, ReplyDisposition, RequestCorrelator, friendly_message,
};
