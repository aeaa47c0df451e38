//! Token estimation.
//!
//! Every budget decision in the crate goes through a [`TokenEstimator`].
//! Estimates are heuristic: `max(1, chars / 4)` for non-empty text and `0`
//! for empty text. When a precise backend is available it is wrapped in a
//! [`FallbackEstimator`], which silently falls back to the heuristic on any
//! backend failure so callers never see an error.

use std::sync::Arc;

use serde_json::Value;
use tracing::trace;

use crate::error::TokenizerError;

/// Characters per token used by the heuristic.
pub const HEURISTIC_CHARS_PER_TOKEN: usize = 4;

/// Deterministic, side-effect-free token estimate.
///
/// Implementations must be monotonic in text length: longer text never
/// estimates fewer tokens.
pub trait TokenEstimator: Send + Sync {
    /// Estimated token count of `text`.
    fn estimate(&self, text: &str) -> usize;

    /// Estimated token count of a whole JSON payload, measured over its
    /// compact serialization.
    fn estimate_json(&self, value: &Value) -> usize {
        self.estimate(&value.to_string())
    }
}

impl<T: TokenEstimator + ?Sized> TokenEstimator for &T {
    fn estimate(&self, text: &str) -> usize {
        (**self).estimate(text)
    }
}

impl<T: TokenEstimator + ?Sized> TokenEstimator for Arc<T> {
    fn estimate(&self, text: &str) -> usize {
        (**self).estimate(text)
    }
}

impl<T: TokenEstimator + ?Sized> TokenEstimator for Box<T> {
    fn estimate(&self, text: &str) -> usize {
        (**self).estimate(text)
    }
}

/// Character-count heuristic.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicEstimator;

impl TokenEstimator for HeuristicEstimator {
    fn estimate(&self, text: &str) -> usize {
        if text.is_empty() {
            return 0;
        }
        (text.chars().count() / HEURISTIC_CHARS_PER_TOKEN).max(1)
    }
}

/// A precise tokenizer backend. Any failure is recoverable by the caller.
pub trait TokenCounter: Send + Sync {
    fn count(&self, text: &str) -> Result<usize, TokenizerError>;
}

/// Wraps a precise [`TokenCounter`] and falls back to the heuristic on
/// failure. A missing backend (`None`) behaves exactly like the heuristic.
pub struct FallbackEstimator<P> {
    precise: Option<P>,
    heuristic: HeuristicEstimator,
}

impl<P: TokenCounter> FallbackEstimator<P> {
    pub fn new(precise: Option<P>) -> Self {
        Self {
            precise,
            heuristic: HeuristicEstimator,
        }
    }

    /// Whether a precise backend is attached.
    pub fn has_precise(&self) -> bool {
        self.precise.is_some()
    }
}

impl<P: TokenCounter> TokenEstimator for FallbackEstimator<P> {
    fn estimate(&self, text: &str) -> usize {
        if text.is_empty() {
            return 0;
        }
        match self.precise.as_ref().map(|p| p.count(text)) {
            Some(Ok(n)) => n,
            Some(Err(e)) => {
                trace!("precise token count failed, using heuristic: {e}");
                self.heuristic.estimate(text)
            }
            None => self.heuristic.estimate(text),
        }
    }
}

impl<P> std::fmt::Debug for FallbackEstimator<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FallbackEstimator")
            .field("precise", &self.precise.is_some())
            .finish()
    }
}

#[cfg(feature = "hf-tokenizer")]
pub use hf::HfTokenCounter;

#[cfg(feature = "hf-tokenizer")]
mod hf {
    use super::TokenCounter;
    use crate::error::TokenizerError;

    /// Precise counts from a Hugging Face `tokenizer.json`.
    pub struct HfTokenCounter {
        tokenizer: tokenizers::Tokenizer,
    }

    impl HfTokenCounter {
        /// Build from the raw bytes of a `tokenizer.json`.
        pub fn from_bytes(bytes: impl AsRef<[u8]>) -> Result<Self, TokenizerError> {
            let tokenizer = tokenizers::Tokenizer::from_bytes(bytes)
                .map_err(|e| TokenizerError::Unavailable(e.to_string()))?;
            Ok(Self { tokenizer })
        }
    }

    impl TokenCounter for HfTokenCounter {
        fn count(&self, text: &str) -> Result<usize, TokenizerError> {
            self.tokenizer
                .encode(text, false)
                .map(|enc| enc.len())
                .map_err(|e| TokenizerError::Encode(e.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Failing;

    impl TokenCounter for Failing {
        fn count(&self, _text: &str) -> Result<usize, TokenizerError> {
            Err(TokenizerError::Unavailable("no encoding".into()))
        }
    }

    struct Words;

    impl TokenCounter for Words {
        fn count(&self, text: &str) -> Result<usize, TokenizerError> {
            Ok(text.split_whitespace().count())
        }
    }

    #[test]
    fn empty_text_is_zero() {
        assert_eq!(HeuristicEstimator.estimate(""), 0);
    }

    #[test]
    fn short_text_is_at_least_one() {
        assert_eq!(HeuristicEstimator.estimate("hi"), 1);
    }

    #[test]
    fn heuristic_divides_by_four() {
        assert_eq!(HeuristicEstimator.estimate(&"a".repeat(400)), 100);
        assert_eq!(HeuristicEstimator.estimate(&"a".repeat(403)), 100);
    }

    #[test]
    fn heuristic_counts_chars_not_bytes() {
        // 8 multi-byte chars -> 2 tokens.
        assert_eq!(HeuristicEstimator.estimate("éééééééé"), 2);
    }

    #[test]
    fn heuristic_is_monotonic() {
        let mut prev = 0;
        for n in 0..200 {
            let est = HeuristicEstimator.estimate(&"x".repeat(n));
            assert!(est >= prev, "estimate dropped at {n}");
            prev = est;
        }
    }

    #[test]
    fn fallback_uses_precise_when_available() {
        let est = FallbackEstimator::new(Some(Words));
        assert!(est.has_precise());
        assert_eq!(est.estimate("one two three"), 3);
    }

    #[test]
    fn fallback_silently_uses_heuristic_on_failure() {
        let est = FallbackEstimator::new(Some(Failing));
        assert_eq!(est.estimate(&"a".repeat(40)), 10);
    }

    #[test]
    fn fallback_without_backend_is_heuristic() {
        let est: FallbackEstimator<Words> = FallbackEstimator::new(None);
        assert_eq!(est.estimate(&"a".repeat(40)), 10);
        assert_eq!(est.estimate(""), 0);
    }

    #[test]
    fn estimate_json_measures_serialization() {
        let value = serde_json::json!({"a": "b"});
        // {"a":"b"} is 9 chars.
        assert_eq!(HeuristicEstimator.estimate_json(&value), 2);
    }
}
