//! Input budget arithmetic.
//!
//! The decision engine accepts at most `max_input_tokens`. A fraction of that
//! window (`output_headroom_ratio`) is reserved for the response; the rest is
//! what packed input may use:
//!
//! ```text
//! reserved_for_output = trunc(max_input_tokens * output_headroom_ratio)
//! allowed_for_input   = max_input_tokens - reserved_for_output
//! ```
//!
//! The split always sums back to `max_input_tokens`.

use serde::{Deserialize, Serialize};

/// Default input window in tokens.
pub const DEFAULT_MAX_INPUT_TOKENS: usize = 8192;

/// Default share of the window reserved for output.
pub const DEFAULT_OUTPUT_HEADROOM_RATIO: f64 = 0.3;

/// Budget split for one packing attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetPlan {
    /// Estimated tokens of the candidate payload.
    pub estimated_input_tokens: usize,
    /// Tokens the payload may use.
    pub allowed_for_input: usize,
    /// Tokens held back for the response.
    pub reserved_for_output: usize,
}

impl BudgetPlan {
    /// Whether the estimate is within the allowance.
    pub fn fits(&self) -> bool {
        self.estimated_input_tokens <= self.allowed_for_input
    }

    /// Tokens left before the allowance is exhausted (zero when over).
    pub fn headroom(&self) -> usize {
        self.allowed_for_input
            .saturating_sub(self.estimated_input_tokens)
    }

    /// Usage as a fraction of the allowance (0.0 to 1.0+).
    pub fn usage_pct(&self) -> f64 {
        if self.allowed_for_input == 0 {
            return 1.0;
        }
        self.estimated_input_tokens as f64 / self.allowed_for_input as f64
    }

    /// Format as a short log-friendly string.
    pub fn to_log_string(&self) -> String {
        format!(
            "input: ~{} tokens ({:.0}% of {} allowed, {} reserved for output)",
            self.estimated_input_tokens,
            self.usage_pct() * 100.0,
            self.allowed_for_input,
            self.reserved_for_output,
        )
    }
}

/// Computes [`BudgetPlan`]s for a fixed input window.
///
/// # Example
///
/// ```
/// use tether::context::ContextBudget;
///
/// let budget = ContextBudget::new(8192).with_output_headroom_ratio(0.3);
/// assert_eq!(budget.reserved_for_output(), 2457);
/// assert_eq!(budget.allowed_for_input(), 5735);
/// assert!(budget.plan(5000).fits());
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContextBudget {
    max_input_tokens: usize,
    output_headroom_ratio: f64,
}

impl Default for ContextBudget {
    fn default() -> Self {
        Self {
            max_input_tokens: DEFAULT_MAX_INPUT_TOKENS,
            output_headroom_ratio: DEFAULT_OUTPUT_HEADROOM_RATIO,
        }
    }
}

impl ContextBudget {
    /// Create a budget for the given window with the default headroom ratio.
    pub fn new(max_input_tokens: usize) -> Self {
        Self {
            max_input_tokens,
            ..Default::default()
        }
    }

    /// Override the share of the window reserved for output. Clamped to
    /// `[0.0, 1.0]`.
    pub fn with_output_headroom_ratio(mut self, ratio: f64) -> Self {
        self.output_headroom_ratio = ratio.clamp(0.0, 1.0);
        self
    }

    /// Return the full input window in tokens.
    pub fn max_input_tokens(&self) -> usize {
        self.max_input_tokens
    }

    /// Tokens reserved for the response.
    pub fn reserved_for_output(&self) -> usize {
        let reserved = (self.max_input_tokens as f64 * self.output_headroom_ratio) as usize;
        reserved.min(self.max_input_tokens)
    }

    /// Tokens available to packed input.
    pub fn allowed_for_input(&self) -> usize {
        self.max_input_tokens - self.reserved_for_output()
    }

    /// Build the plan for a payload with the given estimate.
    pub fn plan(&self, estimated_input_tokens: usize) -> BudgetPlan {
        BudgetPlan {
            estimated_input_tokens,
            allowed_for_input: self.allowed_for_input(),
            reserved_for_output: self.reserved_for_output(),
        }
    }
}
