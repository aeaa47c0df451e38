//! Axum server setup and router construction.

use std::net::SocketAddr;

use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tracing::error;

use crate::api::{self, BridgeState};
use crate::ws;

/// Build the full axum router.
pub fn build_router(state: BridgeState) -> Router {
    // Executors may be served from another origin (plugin sandboxes, dev servers).
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/ws", get(ws::ws_upgrade))
        .route("/api/status", get(api::get_status))
        .route("/api/command", post(api::post_command))
        .route("/api/cancel", post(api::post_cancel))
        .with_state(state)
        .layer(cors)
}

/// Bind and serve `router` on a background task. Returns the bound address.
pub async fn start_server(router: Router, bind_addr: SocketAddr) -> std::io::Result<SocketAddr> {
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    let addr = listener.local_addr()?;

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            error!("Bridge server stopped: {e}");
        }
    });

    Ok(addr)
}
