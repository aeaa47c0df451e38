//! Error taxonomy.
//!
//! Only the correlator surfaces errors to its callers. Budgeting components
//! degrade instead of failing, so their error types stay internal to the
//! fallback paths that consume them.

use std::time::Duration;

use serde_json::Value;
use thiserror::Error;

/// Terminal failure of a remote command.
#[derive(Debug, Error)]
pub enum CommandError {
    /// No reply arrived within the configured window.
    #[error("command '{command}' ({id}) timed out after {}s", after.as_secs_f64())]
    Timeout {
        id: String,
        command: String,
        after: Duration,
    },

    /// The executor replied with an error field.
    ///
    /// `message` is the friendliness-mapped text shown to callers; `raw` is
    /// the executor's original error string.
    #[error("command '{command}' failed: {message}")]
    RemoteExecution {
        command: String,
        params: Value,
        message: String,
        raw: String,
    },

    /// The request was cancelled in bulk (transport loss or shutdown).
    #[error("command '{command}' ({id}) was cancelled")]
    Cancelled { id: String, command: String },

    /// The outbound half of the duplex channel is closed.
    #[error("channel closed before command '{command}' could be sent")]
    ChannelClosed { command: String },
}

impl CommandError {
    /// Whether this error came from the executor rather than the transport.
    pub fn is_remote(&self) -> bool {
        matches!(self, CommandError::RemoteExecution { .. })
    }
}

/// Failure inside a precise token counting backend.
#[derive(Debug, Error)]
pub enum TokenizerError {
    #[error("tokenizer unavailable: {0}")]
    Unavailable(String),
    #[error("encode failed: {0}")]
    Encode(String),
}

/// Internal fault while assembling a packed payload.
#[derive(Debug, Error)]
pub enum PackError {
    #[error("payload serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("internal fault: {0}")]
    Fault(String),
}

/// Invalid configuration value.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("output_headroom_ratio must be in [0.0, 1.0), got {0}")]
    HeadroomRatio(f64),
    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },
    #[error("snapshot text_cap must be at least {min}, got {got}")]
    TextCap { min: usize, got: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_message_names_command() {
        let err = CommandError::Timeout {
            id: "abc".into(),
            command: "create_frame".into(),
            after: Duration::from_secs(30),
        };
        let msg = err.to_string();
        assert!(msg.contains("create_frame"));
        assert!(msg.contains("30s"));
        assert!(!err.is_remote());
    }

    #[test]
    fn remote_error_displays_mapped_message() {
        let err = CommandError::RemoteExecution {
            command: "set_fill".into(),
            params: serde_json::json!({"nodeId": "1:2"}),
            message: "The node no longer exists.".into(),
            raw: "node not found: 1:2".into(),
        };
        assert!(err.to_string().contains("no longer exists"));
        assert!(err.is_remote());
    }
}
