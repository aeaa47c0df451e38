//! Executor socket: upgrade handler and the duplex pump.
//!
//! While connected, one task:
//! 1. Writes every outbound `tool_call` from the correlator to the socket,
//!    skipping calls that timed out or were cancelled while queued.
//! 2. Feeds every inbound text frame to the correlator.
//!
//! On disconnect, queued calls are discarded and every pending command is
//! cancelled.

use std::sync::atomic::Ordering;

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use futures::{SinkExt, StreamExt, stream::SplitSink};
use tether::bridge::{OutboundMessage, ReplyDisposition};
use tokio::sync::{OwnedMutexGuard, mpsc};
use tracing::{debug, info, warn};

use crate::api::BridgeState;

type Outbound = OwnedMutexGuard<mpsc::Receiver<OutboundMessage>>;

/// GET /ws — Executor socket upgrade. Refused with 409 while another
/// executor is connected.
pub async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<BridgeState>) -> Response {
    let Ok(outbound) = state.outbound.clone().try_lock_owned() else {
        warn!("Refusing executor connection: another executor is connected");
        return (StatusCode::CONFLICT, "an executor is already connected").into_response();
    };
    ws.on_upgrade(move |socket| handle_socket(socket, state, outbound))
        .into_response()
}

/// Pump messages between the correlator and one executor connection.
async fn handle_socket(socket: WebSocket, state: BridgeState, mut outbound: Outbound) {
    let (mut sink, mut stream) = socket.split();
    state.connected.store(true, Ordering::SeqCst);
    info!("Executor connected");

    loop {
        tokio::select! {
            call = outbound.recv() => match call {
                Some(call) if !state.correlator.is_pending(call.id()) => {
                    debug!("Skipping stale call {}", call.id());
                }
                Some(call) => {
                    if ws_send(&mut sink, &call).await.is_err() {
                        warn!("Failed to write call {} to executor", call.id());
                        break;
                    }
                }
                None => break, // Correlator dropped.
            },
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    if state.correlator.handle_text(&text) == ReplyDisposition::Ignored {
                        debug!("Ignored executor frame");
                    }
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {} // Ignore binary, ping, pong.
            },
        }
    }

    state.connected.store(false, Ordering::SeqCst);
    let mut discarded = 0;
    while outbound.try_recv().is_ok() {
        discarded += 1;
    }
    let cancelled = state.correlator.cancel_all();
    info!("Executor disconnected ({cancelled} cancelled, {discarded} queued calls discarded)");
}

/// Serialize a call and send it over the socket sink.
async fn ws_send(
    sink: &mut SplitSink<WebSocket, Message>,
    call: &OutboundMessage,
) -> Result<(), axum::Error> {
    sink.send(Message::Text(call.to_json().into())).await
}
