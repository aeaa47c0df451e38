//! Executor bridge server.
//!
//! Accepts one executor on `/ws` and exposes the correlator over REST.
//!
//! # Usage
//!
//! ```bash
//! cargo run -p tether-web
//! cargo run -p tether-web -- --port 8080 --command-timeout-secs 10
//! cargo run -p tether-web -- --config tether.json
//! RUST_LOG=tether=debug cargo run -p tether-web
//! ```
//!
//! Run a command on the connected executor:
//!
//! ```bash
//! curl -X POST localhost:3001/api/command \
//!   -H 'content-type: application/json' \
//!   -d '{"command": "get_selection", "params": {}}'
//! ```

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use clap::Parser;
use tether::config::TetherConfig;
use tether_web::{BridgeConfig, spawn_bridge};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// Executor bridge server.
#[derive(Parser)]
#[command(about = "WebSocket bridge between a remote command executor and the tether correlator")]
struct Args {
    /// Address to bind.
    #[arg(long, default_value = "127.0.0.1")]
    host: IpAddr,

    /// Port to bind.
    #[arg(long, default_value_t = 3001)]
    port: u16,

    /// JSON file with a full or partial configuration. Flags override it.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Conversation history cap.
    #[arg(long)]
    max_kept_messages: Option<usize>,

    /// Initial packing window.
    #[arg(long)]
    last_k: Option<usize>,

    /// Decision engine input window, in tokens.
    #[arg(long)]
    max_input_tokens: Option<usize>,

    /// Share of the input window reserved for output.
    #[arg(long)]
    output_headroom_ratio: Option<f64>,

    /// Model context limit for snapshot pruning, in tokens.
    #[arg(long)]
    model_token_limit: Option<usize>,

    /// Subtracted from the model limit for the pruning target, in tokens.
    #[arg(long)]
    token_safety_margin: Option<usize>,

    /// Largest sampled-children list kept per snapshot node.
    #[arg(long)]
    max_children: Option<usize>,

    /// Longest snapshot node text kept untruncated, in characters.
    #[arg(long)]
    text_cap: Option<usize>,

    /// Per-call command timeout, in seconds.
    #[arg(long)]
    command_timeout_secs: Option<u64>,
}

impl Args {
    fn tether_config(&self) -> Result<TetherConfig, String> {
        let mut config = match &self.config {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .map_err(|e| format!("Failed to read {}: {e}", path.display()))?;
                serde_json::from_str(&text)
                    .map_err(|e| format!("Invalid config {}: {e}", path.display()))?
            }
            None => TetherConfig::default(),
        };

        if let Some(v) = self.max_kept_messages {
            config.max_kept_messages = v;
        }
        if let Some(v) = self.last_k {
            config.last_k = v;
        }
        if let Some(v) = self.max_input_tokens {
            config.max_input_tokens = v;
        }
        if let Some(v) = self.output_headroom_ratio {
            config.output_headroom_ratio = v;
        }
        if let Some(v) = self.model_token_limit {
            config.model_token_limit = v;
        }
        if let Some(v) = self.token_safety_margin {
            config.token_safety_margin = v;
        }
        if let Some(v) = self.max_children {
            config.snapshot.max_children = v;
        }
        if let Some(v) = self.text_cap {
            config.snapshot.text_cap = v;
        }
        if let Some(v) = self.command_timeout_secs {
            config.command_timeout_secs = v;
        }

        config.validate().map_err(|e| format!("Invalid configuration: {e}"))?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<(), String> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().with_target(true))
        .init();

    let args = Args::parse();
    let tether = args.tether_config()?;

    let bridge = spawn_bridge(BridgeConfig {
        bind_addr: SocketAddr::new(args.host, args.port),
        tether,
        ..Default::default()
    })
    .await
    .map_err(|e| format!("Failed to bind {}:{}: {e}", args.host, args.port))?;

    println!("Executor socket: ws://{}/ws", bridge.addr);
    println!("Status:          http://{}/api/status", bridge.addr);

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| format!("Failed to listen for shutdown signal: {e}"))?;
    let cancelled = bridge.correlator.cancel_all();
    println!("\nShutting down ({cancelled} pending commands cancelled)");
    Ok(())
}
