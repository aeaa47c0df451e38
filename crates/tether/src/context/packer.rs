//! Context packing: curated history plus the current turn, fitted to budget.
//!
//! [`ContextPacker::build_input`] assembles the turns sent to the decision
//! engine:
//!
//! 1. **Seed** — up to two synthetic system turns carrying the pinned thread
//!    summary and key facts. Never trimmed.
//! 2. **History window** — the last `k` user/assistant items, starting at
//!    `last_k` and shrinking by 2 (one exchange) per attempt down to `k = 0`.
//! 3. **Current turn** — always last, never dropped. Only the current turn
//!    carries image references.
//!
//! The first window whose estimate fits `allowed_for_input` wins. When even
//! `k = 0` is over budget, the packer returns the current turn alone without
//! re-validating it. Internal faults, including a panicking estimator, take
//! the same minimal path, so `build_input` always returns something usable.

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};

use serde::Serialize;
use tracing::{debug, warn};

use crate::Turn;
use crate::context::budget::{BudgetPlan, ContextBudget};
use crate::context::conversation::ConversationStore;
use crate::context::reduction::{ReductionPipeline, StageReport};
use crate::context::tokens::{HeuristicEstimator, TokenEstimator};
use crate::error::PackError;

/// Default initial history window.
pub const DEFAULT_LAST_K: usize = 8;

/// History items dropped per shrinking attempt.
const WINDOW_STEP: usize = 2;

/// Configuration for [`ContextPacker`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PackerConfig {
    /// Initial number of history items to try.
    pub last_k: usize,
    /// Input window and output headroom.
    pub budget: ContextBudget,
}

impl Default for PackerConfig {
    fn default() -> Self {
        Self {
            last_k: DEFAULT_LAST_K,
            budget: ContextBudget::default(),
        }
    }
}

impl PackerConfig {
    pub fn with_last_k(mut self, last_k: usize) -> Self {
        self.last_k = last_k;
        self
    }

    pub fn with_budget(mut self, budget: ContextBudget) -> Self {
        self.budget = budget;
        self
    }
}

/// Turns ready for the decision engine.
#[derive(Debug, Clone, Serialize)]
pub struct PackedInput {
    /// Ordered turns. The current user turn is always last.
    pub turns: Vec<Turn>,
    /// Accepted history window, or `None` when the minimal fallback was used.
    pub window: Option<usize>,
    /// Estimated tokens of instructions plus turns.
    pub estimated_tokens: usize,
    pub plan: BudgetPlan,
    pub fell_back: bool,
    /// Measurements taken while shrinking the window.
    #[serde(skip)]
    pub trace: Vec<StageReport>,
}

impl PackedInput {
    /// The current user turn.
    pub fn current_turn(&self) -> Option<&Turn> {
        self.turns.last()
    }
}

#[derive(Clone)]
struct Candidate {
    window: Option<usize>,
    turns: Vec<Turn>,
}

/// Packs conversation history into a budgeted list of turns.
#[derive(Debug, Clone)]
pub struct ContextPacker<E> {
    config: PackerConfig,
    estimator: E,
}

impl<E: TokenEstimator> ContextPacker<E> {
    pub fn new(config: PackerConfig, estimator: E) -> Self {
        Self { config, estimator }
    }

    pub fn config(&self) -> &PackerConfig {
        &self.config
    }

    /// Build the packed input for one user turn.
    ///
    /// `instructions` are sent alongside the turns and count toward the
    /// estimate but are not part of the returned list.
    pub fn build_input(
        &self,
        instructions: &str,
        store: &ConversationStore,
        user_text: &str,
        user_images: &[String],
        include_summary: bool,
        include_state_facts: bool,
    ) -> PackedInput {
        let current = Turn::user_with_images(user_text, user_images);
        let built = guarded(|| {
            self.try_build(
                instructions,
                store,
                &current,
                include_summary,
                include_state_facts,
            )
        });
        match built {
            Ok(packed) => packed,
            Err(e) => {
                warn!("Packing failed ({e}); sending the current turn alone");
                self.minimal(instructions, current)
            }
        }
    }

    fn try_build(
        &self,
        instructions: &str,
        store: &ConversationStore,
        current: &Turn,
        include_summary: bool,
        include_state_facts: bool,
    ) -> Result<PackedInput, PackError> {
        let seed = seed_turns(store, include_summary, include_state_facts);
        let instruction_tokens = self.estimator.estimate(instructions);
        let budget = self.config.budget;

        let assemble = |window: usize| -> Candidate {
            let mut turns = Vec::with_capacity(seed.len() + window + 1);
            turns.extend(seed.iter().cloned());
            turns.extend(store.recent_items(window).into_iter().map(|item| Turn {
                role: item.role,
                content: crate::TurnContent::Text(item.content.clone()),
            }));
            turns.push(current.clone());
            Candidate {
                window: Some(window),
                turns,
            }
        };
        let assemble = &assemble;

        let measure = |candidate: &Candidate| -> Result<usize, PackError> {
            Ok(instruction_tokens + self.estimate_turns(&candidate.turns)?)
        };

        let last_k = self.config.last_k;
        let mut pipeline = ReductionPipeline::new(budget.allowed_for_input(), measure);
        let mut window = last_k;
        while window >= WINDOW_STEP {
            window -= WINDOW_STEP;
            let target = window;
            pipeline = pipeline.step(format!("k={target}"), move |_| assemble(target));
        }

        let reduced = pipeline.run(&format!("k={last_k}"), assemble(last_k), |_| Candidate {
            window: None,
            turns: vec![current.clone()],
        })?;

        let plan = budget.plan(reduced.tokens);
        if reduced.fell_back() {
            warn!(
                "History does not fit even with k=0; sending the current turn alone ({})",
                plan.to_log_string()
            );
        } else {
            debug!(
                "Packed {} turns with k={:?} ({})",
                reduced.value.turns.len(),
                reduced.value.window,
                plan.to_log_string()
            );
        }

        Ok(PackedInput {
            fell_back: reduced.fell_back(),
            window: reduced.value.window,
            turns: reduced.value.turns,
            estimated_tokens: reduced.tokens,
            plan,
            trace: reduced.trace,
        })
    }

    /// Estimated tokens of a list of turns, measured over its JSON form.
    pub fn estimate_turns(&self, turns: &[Turn]) -> Result<usize, PackError> {
        let value = serde_json::to_value(turns)?;
        Ok(self.estimator.estimate_json(&value))
    }

    /// The current turn alone. Measured like every other candidate; if the
    /// estimator faults again, the character heuristic over the plain text
    /// stands in.
    fn minimal(&self, instructions: &str, current: Turn) -> PackedInput {
        let estimated_tokens = guarded(|| {
            Ok(self.estimator.estimate(instructions)
                + self.estimate_turns(std::slice::from_ref(&current))?)
        })
        .unwrap_or_else(|e| {
            warn!("Estimator failed on the minimal input ({e}); using the heuristic");
            HeuristicEstimator.estimate(instructions)
                + HeuristicEstimator.estimate(&current.content.text())
        });
        PackedInput {
            turns: vec![current],
            window: None,
            estimated_tokens,
            plan: self.config.budget.plan(estimated_tokens),
            fell_back: true,
            trace: Vec::new(),
        }
    }
}

/// Run `f`, turning a panic into [`PackError::Fault`].
fn guarded<T>(f: impl FnOnce() -> Result<T, PackError>) -> Result<T, PackError> {
    catch_unwind(AssertUnwindSafe(f))
        .unwrap_or_else(|payload| Err(PackError::Fault(panic_message(&*payload))))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic".to_string()
    }
}

/// Synthetic system turns for the pinned fields. Blank values are skipped.
fn seed_turns(
    store: &ConversationStore,
    include_summary: bool,
    include_state_facts: bool,
) -> Vec<Turn> {
    let mut seed = Vec::with_capacity(2);
    if include_summary
        && let Some(summary) = store.thread_summary()
        && !summary.trim().is_empty()
    {
        seed.push(Turn::system(format!("Thread summary: {summary}")));
    }
    if include_state_facts
        && let Some(facts) = store.state_facts()
        && !facts.trim().is_empty()
    {
        seed.push(Turn::system(format!("Key facts: {facts}")));
    }
    seed
}
