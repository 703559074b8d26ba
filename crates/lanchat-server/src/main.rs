//! # lanchat-server
//!
//! Chat and file relay for a local network.
//!
//! This binary provides:
//! - **WebSocket relay** on `/ws`: every message from one browser is fanned
//!   out to all connected browsers, tagged with the sender's IP address
//! - **In-memory file store** fed by uploads, either inline in a chat message
//!   or out of band through `POST /upload`
//! - **REST API** (axum) for file download, health checks and the version
//! - **Embedded web client** served from `/`

mod api;
mod assets;
mod blob_store;
mod config;
mod coordinator;
mod error;
mod net;
mod registry;
mod session;
mod transport;

use std::sync::Arc;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use lanchat_shared::constants::APP_NAME;

use crate::api::AppState;
use crate::blob_store::BlobStore;
use crate::config::{Cli, ServerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,lanchat_server=debug")),
        )
        .init();

    info!("Starting {} server v{}", APP_NAME, env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration (flags override environment)
    // -----------------------------------------------------------------------
    let cli = Cli::parse();
    let config = ServerConfig::from_env().with_cli(&cli);
    info!(?config, "Loaded configuration");

    // -----------------------------------------------------------------------
    // 3. Initialize subsystems
    // -----------------------------------------------------------------------
    let blob_store = BlobStore::new();
    let coordinator = coordinator::spawn(blob_store.clone());

    let http_addr = config.http_addr;
    let app_state = AppState {
        blob_store,
        coordinator,
        config: Arc::new(config),
    };

    // -----------------------------------------------------------------------
    // 4. Tell the user where to point their browsers
    // -----------------------------------------------------------------------
    let port = http_addr.port();
    info!("Local:   http://localhost:{}", port);
    match net::lan_ipv4() {
        Some(ip) => info!("Network: http://{}:{}", ip, port),
        None => info!("Network: http://<your-ip>:{}", port),
    }

    // -----------------------------------------------------------------------
    // 5. Run the HTTP server (blocks until shutdown)
    // -----------------------------------------------------------------------
    tokio::select! {
        result = api::serve(app_state, http_addr) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server failed");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
