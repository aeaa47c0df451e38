//! Context budgeting: token estimates, budget arithmetic, conversation
//! history, and packing.
//!
//! Every request to the decision engine must fit a hard token budget. This
//! module provides the pieces that get it there:
//!
//! 1. **[`tokens`]** — [`TokenEstimator`] with a character heuristic and a
//!    fallback decorator for precise backends.
//!
//! 2. **[`budget`]** — [`ContextBudget`] splits the input window into the
//!    allowance for packed input and the headroom reserved for output.
//!
//! 3. **[`reduction`]** — the staged degradation pipeline shared by the
//!    packer and the snapshot pruner: apply steps in order, re-measure, stop at
//!    the first fit, always return something.
//!
//! 4. **[`conversation`]** — [`ConversationStore`], the bounded history with
//!    pinned summary and facts.
//!
//! 5. **[`packer`]** — [`ContextPacker`], which shrinks the history window
//!    until the packed turns fit.

pub mod budget;
pub mod conversation;
pub mod packer;
pub mod reduction;
pub mod tokens;

// Re-export commonly used items at the module level.
pub use budget::{BudgetPlan, ContextBudget};
pub use conversation::{ConversationItem, ConversationStore, UsageSnapshot};
pub use packer::{ContextPacker, PackedInput, PackerConfig};
pub use reduction::{Outcome, Reduced, ReductionPipeline, StageReport};
pub use tokens::{FallbackEstimator, HeuristicEstimator, TokenCounter, TokenEstimator};
