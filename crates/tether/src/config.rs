//! Configuration with sensible defaults.
//!
//! [`TetherConfig`] carries every tunable value in one place and derives the
//! per-component configs via [`packer_config`](TetherConfig::packer_config),
//! [`pruner_config`](TetherConfig::pruner_config),
//! [`correlator_config`](TetherConfig::correlator_config) and
//! [`budget`](TetherConfig::budget). It deserializes with every field
//! optional, so a partial JSON document overrides only what it names.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::bridge::correlator::{CorrelatorConfig, DEFAULT_COMMAND_TIMEOUT};
use crate::context::budget::{
    ContextBudget, DEFAULT_MAX_INPUT_TOKENS, DEFAULT_OUTPUT_HEADROOM_RATIO,
};
use crate::context::conversation::DEFAULT_MAX_KEPT_MESSAGES;
use crate::context::packer::{DEFAULT_LAST_K, PackerConfig};
use crate::error::ConfigError;
use crate::snapshot::pruner::{
    DEFAULT_MAX_CHILDREN, DEFAULT_MODEL_TOKEN_LIMIT, DEFAULT_TEXT_CAP,
    DEFAULT_TOKEN_SAFETY_MARGIN, PrunerConfig,
};

/// Smallest usable text cap: room for a head, an ellipsis, and a tail.
pub const MIN_TEXT_CAP: usize = 5;

/// Snapshot pruning caps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SnapshotCaps {
    /// Largest sampled-children list kept per node. Default: `12`.
    pub max_children: usize,
    /// Longest node text kept untruncated, in characters. Default: `2000`.
    pub text_cap: usize,
}

impl Default for SnapshotCaps {
    fn default() -> Self {
        Self {
            max_children: DEFAULT_MAX_CHILDREN,
            text_cap: DEFAULT_TEXT_CAP,
        }
    }
}

/// Every tunable value of the packer, pruner, and correlator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TetherConfig {
    /// History cap of the conversation store. Default: `40`.
    pub max_kept_messages: usize,
    /// Initial packing window. Default: `8`.
    pub last_k: usize,
    /// Input window of the decision engine. Default: `8192`.
    pub max_input_tokens: usize,
    /// Share of the input window reserved for output. Default: `0.3`.
    pub output_headroom_ratio: f64,
    /// Model context limit used by the snapshot pruner. Default: `128000`.
    pub model_token_limit: usize,
    /// Subtracted from `model_token_limit` for the pruner's target. Default: `4000`.
    pub token_safety_margin: usize,
    pub snapshot: SnapshotCaps,
    /// Per-call command timeout in seconds. Default: `30`.
    pub command_timeout_secs: u64,
}

impl Default for TetherConfig {
    fn default() -> Self {
        Self {
            max_kept_messages: DEFAULT_MAX_KEPT_MESSAGES,
            last_k: DEFAULT_LAST_K,
            max_input_tokens: DEFAULT_MAX_INPUT_TOKENS,
            output_headroom_ratio: DEFAULT_OUTPUT_HEADROOM_RATIO,
            model_token_limit: DEFAULT_MODEL_TOKEN_LIMIT,
            token_safety_margin: DEFAULT_TOKEN_SAFETY_MARGIN,
            snapshot: SnapshotCaps::default(),
            command_timeout_secs: DEFAULT_COMMAND_TIMEOUT.as_secs(),
        }
    }
}

impl TetherConfig {
    pub fn with_max_kept_messages(mut self, max: usize) -> Self {
        self.max_kept_messages = max;
        self
    }

    pub fn with_last_k(mut self, last_k: usize) -> Self {
        self.last_k = last_k;
        self
    }

    pub fn with_max_input_tokens(mut self, max: usize) -> Self {
        self.max_input_tokens = max;
        self
    }

    pub fn with_output_headroom_ratio(mut self, ratio: f64) -> Self {
        self.output_headroom_ratio = ratio;
        self
    }

    pub fn with_model_token_limit(mut self, limit: usize) -> Self {
        self.model_token_limit = limit;
        self
    }

    pub fn with_token_safety_margin(mut self, margin: usize) -> Self {
        self.token_safety_margin = margin;
        self
    }

    pub fn with_snapshot_caps(mut self, caps: SnapshotCaps) -> Self {
        self.snapshot = caps;
        self
    }

    pub fn with_command_timeout_secs(mut self, secs: u64) -> Self {
        self.command_timeout_secs = secs;
        self
    }

    /// Check value ranges. Returns the first violation found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..1.0).contains(&self.output_headroom_ratio) {
            return Err(ConfigError::HeadroomRatio(self.output_headroom_ratio));
        }
        if self.max_input_tokens == 0 {
            return Err(ConfigError::Zero {
                field: "max_input_tokens",
            });
        }
        if self.max_kept_messages == 0 {
            return Err(ConfigError::Zero {
                field: "max_kept_messages",
            });
        }
        if self.snapshot.text_cap < MIN_TEXT_CAP {
            return Err(ConfigError::TextCap {
                min: MIN_TEXT_CAP,
                got: self.snapshot.text_cap,
            });
        }
        if self.command_timeout_secs == 0 {
            return Err(ConfigError::Zero {
                field: "command_timeout_secs",
            });
        }
        Ok(())
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    pub fn budget(&self) -> ContextBudget {
        ContextBudget::new(self.max_input_tokens)
            .with_output_headroom_ratio(self.output_headroom_ratio)
    }

    pub fn packer_config(&self) -> PackerConfig {
        PackerConfig::default()
            .with_last_k(self.last_k)
            .with_budget(self.budget())
    }

    pub fn pruner_config(&self) -> PrunerConfig {
        PrunerConfig::default()
            .with_max_children(self.snapshot.max_children)
            .with_text_cap(self.snapshot.text_cap)
            .with_model_token_limit(self.model_token_limit)
            .with_token_safety_margin(self.token_safety_margin)
    }

    pub fn correlator_config(&self) -> CorrelatorConfig {
        CorrelatorConfig::default().with_command_timeout(self.command_timeout())
    }
}
