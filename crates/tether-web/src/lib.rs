//! WebSocket host that connects a remote command executor to the `tether`
//! correlator.
//!
//! The executor (for example a design-tool plugin) connects to `/ws`. Every
//! command sent through the [`RequestCorrelator`] is written to that socket
//! as a `tool_call`, and every `tool_response` frame the executor sends back
//! is fed into the correlator.
//!
//! # Quick start
//!
//! ```ignore
//! use tether_web::{BridgeConfig, spawn_bridge};
//!
//! let bridge = spawn_bridge(BridgeConfig::default()).await?;
//! println!("Executor socket: ws://{}/ws", bridge.addr);
//!
//! let selection = bridge
//!     .correlator
//!     .send_command("get_selection", serde_json::json!({}))
//!     .await?;
//! ```
//!
//! # Endpoints
//!
//! | Route | Description |
//! |-------|-------------|
//! | `GET /ws` | Executor socket. One executor at a time; a second connection gets `409` |
//! | `GET /api/status` | `connected`, `pending`, `pending_ids` |
//! | `POST /api/command` | Run one command through the correlator and return its result |
//! | `POST /api/cancel` | Cancel every pending command |
//!
//! Losing the executor socket cancels every pending command.

mod api;
mod server;
mod ws;

pub use api::BridgeState;

use std::net::SocketAddr;

use tether::bridge::RequestCorrelator;
use tether::config::TetherConfig;
use tokio::sync::mpsc;

/// Configuration for the bridge server.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Address to bind to. Default: `127.0.0.1:3001`.
    pub bind_addr: SocketAddr,
    /// Correlator and budget settings.
    pub tether: TetherConfig,
    /// Outbound `tool_call` messages buffered while the executor is slow or
    /// not yet connected. Default: `256`.
    pub outbound_capacity: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3001)),
            tether: TetherConfig::default(),
            outbound_capacity: 256,
        }
    }
}

/// A running bridge.
pub struct Bridge {
    /// The bound address (useful when binding to port 0).
    pub addr: SocketAddr,
    /// Correlator writing to the executor socket.
    pub correlator: RequestCorrelator,
}

/// Spawn the bridge server on a Tokio task.
///
/// The server runs until the Tokio runtime shuts down.
pub async fn spawn_bridge(config: BridgeConfig) -> std::io::Result<Bridge> {
    let (outbound_tx, outbound_rx) = mpsc::channel(config.outbound_capacity.max(1));
    let correlator = RequestCorrelator::new(outbound_tx, config.tether.correlator_config());
    let state = BridgeState::new(correlator.clone(), outbound_rx);
    let router = server::build_router(state);
    let addr = server::start_server(router, config.bind_addr).await?;
    Ok(Bridge { addr, correlator })
}
