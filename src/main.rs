//! canary-proxy
//!
//! A reverse proxy front door that buffers request bodies under a hard size
//! ceiling and splits traffic between an active and a canary backend.
//!
//! # Architecture Overview
//!
//! ```text
//!                  ┌───────────────────────────────────────────────────────────┐
//!                  │                       CANARY PROXY                         │
//!                  │                                                            │
//!  Client Request  │  ┌──────────┐   ┌────────────────┐   ┌────────────────┐    │
//!  ────────────────┼─▶│  http    │──▶│ request buffer │──▶│ rollout split  │    │
//!                  │  │ server   │   │ memory │ disk  │   │ cookie → FNV   │    │
//!                  │  └──────────┘   └────────────────┘   └───────┬────────┘    │
//!                  │                                              │             │
//!                  │                               ┌──────────────┴──────┐      │
//!                  │                               ▼                     ▼      │
//!                  │                        active backend        canary backend│
//!                  │                                                            │
//!                  │  Cross-cutting: config · observability · lifecycle         │
//!                  └───────────────────────────────────────────────────────────┘
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use canary_proxy::config::{load_config, ProxyConfig};
use canary_proxy::lifecycle::{wait_for_signal, Shutdown};
use canary_proxy::observability::{logging, metrics};
use canary_proxy::HttpServer;

#[derive(Parser)]
#[command(name = "canary-proxy")]
#[command(about = "Buffering reverse proxy with deterministic canary rollouts", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file (defaults apply when omitted).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the configured log level.
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ProxyConfig::default(),
    };

    let log_level = cli
        .log_level
        .as_deref()
        .unwrap_or(&config.observability.log_level);
    logging::init(log_level);

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "canary-proxy starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        upstream = %config.target.address,
        rollout_enabled = config.rollout.enabled,
        max_request_body_bytes = config.buffering.max_request_body_bytes,
        max_request_memory_bytes = config.buffering.max_request_memory_bytes,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    let server = HttpServer::new(config)?;
    let server_task = tokio::spawn(server.run(listener, shutdown.subscribe()));

    wait_for_signal().await;
    shutdown.trigger();
    server_task.await??;

    tracing::info!("Shutdown complete");
    Ok(())
}
