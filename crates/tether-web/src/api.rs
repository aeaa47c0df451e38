//! REST API endpoint handlers.
//!
//! These complement the executor socket: they report connection state, run
//! commands on behalf of HTTP callers, and expose bulk cancellation.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tether::bridge::{OutboundMessage, RequestCorrelator};
use tether::error::CommandError;
use tokio::sync::{Mutex, mpsc};

/// Shared state passed to all handlers via axum's `State` extractor.
#[derive(Clone)]
pub struct BridgeState {
    pub(crate) correlator: RequestCorrelator,
    /// Receiving half of the correlator's outbound channel. Held by the
    /// connected executor's socket task for the lifetime of the connection.
    pub(crate) outbound: Arc<Mutex<mpsc::Receiver<OutboundMessage>>>,
    pub(crate) connected: Arc<AtomicBool>,
}

impl BridgeState {
    pub fn new(correlator: RequestCorrelator, outbound: mpsc::Receiver<OutboundMessage>) -> Self {
        Self {
            correlator,
            outbound: Arc::new(Mutex::new(outbound)),
            connected: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

/// Response body for GET /api/status.
#[derive(Serialize)]
pub struct StatusResponse {
    pub connected: bool,
    pub pending: usize,
    pub pending_ids: Vec<String>,
}

/// GET /api/status — Executor connection and pending commands.
pub async fn get_status(State(state): State<BridgeState>) -> Json<StatusResponse> {
    let pending_ids = state.correlator.pending_ids();
    Json(StatusResponse {
        connected: state.is_connected(),
        pending: pending_ids.len(),
        pending_ids,
    })
}

/// Request body for POST /api/command.
#[derive(Deserialize)]
pub struct CommandRequest {
    pub command: String,
    #[serde(default = "empty_params")]
    pub params: Value,
    /// Overrides the configured per-call timeout.
    pub timeout_secs: Option<u64>,
}

fn empty_params() -> Value {
    Value::Object(Map::new())
}

/// POST /api/command — Run one command and wait for its result.
///
/// Returns 200 with `{"result": ...}`. Failures map to 504 (timeout), 502
/// (executor error, with the friendly message and the raw error), or 503
/// (cancelled or no channel).
pub async fn post_command(
    State(state): State<BridgeState>,
    Json(body): Json<CommandRequest>,
) -> Response {
    let timeout = body
        .timeout_secs
        .map(Duration::from_secs)
        .unwrap_or(state.correlator.config().command_timeout);

    match state
        .correlator
        .send_command_with_timeout(&body.command, body.params, timeout)
        .await
    {
        Ok(result) => Json(json!({ "result": result })).into_response(),
        Err(e) => {
            let status = match &e {
                CommandError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
                CommandError::RemoteExecution { .. } => StatusCode::BAD_GATEWAY,
                CommandError::Cancelled { .. } | CommandError::ChannelClosed { .. } => {
                    StatusCode::SERVICE_UNAVAILABLE
                }
            };
            let body = match &e {
                CommandError::RemoteExecution { message, raw, .. } => {
                    json!({ "error": message, "raw": raw })
                }
                other => json!({ "error": other.to_string() }),
            };
            (status, Json(body)).into_response()
        }
    }
}

/// POST /api/cancel — Cancel every pending command.
pub async fn post_cancel(State(state): State<BridgeState>) -> Json<Value> {
    let cancelled = state.correlator.cancel_all();
    Json(json!({ "cancelled": cancelled }))
}
