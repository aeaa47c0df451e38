//! Wire messages exchanged with the executor.
//!
//! Outbound: `{"type": "tool_call", "id", "command", "params"}`.
//! Inbound: `{"type": "tool_response", "id", "result"}` on success or
//! `{"type": "tool_response", "id", "error"}` on failure.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const TOOL_RESPONSE: &str = "tool_response";

/// A message sent to the executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    ToolCall {
        id: String,
        command: String,
        params: Value,
    },
}

impl OutboundMessage {
    pub fn id(&self) -> &str {
        match self {
            OutboundMessage::ToolCall { id, .. } => id,
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// A parsed `tool_response`.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub id: String,
    /// `Ok(result)` or `Err(error text)`. A reply with neither field
    /// resolves with `null`.
    pub payload: Result<Value, String>,
}

impl Reply {
    /// Extract a reply from an inbound message. `None` when the message has
    /// no string `id`.
    pub fn from_value(message: &Value) -> Option<Reply> {
        let id = message.get("id")?.as_str()?.to_string();
        let payload = match message.get("error") {
            None | Some(Value::Null) => Ok(message.get("result").cloned().unwrap_or(Value::Null)),
            Some(Value::String(error)) => Err(error.clone()),
            Some(other) => Err(other.to_string()),
        };
        Some(Reply { id, payload })
    }
}

/// The `type` field of an inbound message, if any.
pub fn message_type(message: &Value) -> Option<&str> {
    message.get("type").and_then(Value::as_str)
}
