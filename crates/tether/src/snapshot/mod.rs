//! Structural snapshots and their budgeted compaction.
//!
//! - [`types`]: the snapshot and node data model.
//! - [`synopsis`]: [`Synopsis`], the fixed-shape summary computed once per
//!   pruning pass.
//! - [`pruner`]: [`SnapshotPruner`], four escalating reduction stages ending
//!   in a binary search over node coverage.

pub mod pruner;
pub mod synopsis;
pub mod types;

pub use pruner::{PruneReport, Pruned, PrunerConfig, SnapshotPruner, binary_search_coverage};
pub use synopsis::{Highlights, Synopsis};
pub use types::{Geometry, Node, SelectionSummary, Snapshot};
