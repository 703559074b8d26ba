//! Server configuration loaded from environment variables and command-line
//! flags.
//!
//! All settings have sensible defaults so the server can start with zero
//! configuration on a home network. Flags win over environment variables.

use std::net::SocketAddr;

use clap::Parser;

use lanchat_shared::constants::{DEFAULT_HTTP_PORT, MAX_UPLOAD_SIZE};

/// Command-line flags.
#[derive(Debug, Default, Parser)]
#[command(name = "lanchat-server", version, about = "Local-network chat and file relay")]
pub struct Cli {
    /// Port to listen on (all interfaces unless --http-addr is given)
    #[arg(long)]
    pub port: Option<u16>,

    /// Full socket address to bind, e.g. 192.168.1.10:8080
    #[arg(long)]
    pub http_addr: Option<SocketAddr>,

    /// Largest accepted upload in bytes
    #[arg(long)]
    pub max_upload_size: Option<usize>,
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address for the HTTP and WebSocket server.
    /// Env: `HTTP_ADDR`, or just the port via `PORT`
    /// Default: `0.0.0.0:8080`
    pub http_addr: SocketAddr,

    /// Maximum upload size in bytes, for `/upload` and for file content
    /// carried inside a WebSocket message.
    /// Env: `MAX_UPLOAD_SIZE`
    /// Default: 50 MiB
    pub max_upload_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: ([0, 0, 0, 0], DEFAULT_HTTP_PORT).into(),
            max_upload_size: MAX_UPLOAD_SIZE,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    fn from_vars(var: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(addr) = var("HTTP_ADDR") {
            if let Ok(parsed) = addr.parse::<SocketAddr>() {
                config.http_addr = parsed;
            } else {
                tracing::warn!(value = %addr, "Invalid HTTP_ADDR, using default");
            }
        }

        if let Some(port) = var("PORT") {
            match port.parse::<u16>() {
                Ok(port) => config.http_addr.set_port(port),
                Err(_) => tracing::warn!(value = %port, "Invalid PORT, using default"),
            }
        }

        if let Some(val) = var("MAX_UPLOAD_SIZE") {
            match val.parse::<usize>() {
                Ok(n) if n > 0 => config.max_upload_size = n,
                _ => tracing::warn!(value = %val, "Invalid MAX_UPLOAD_SIZE, using default"),
            }
        }

        config
    }

    /// Apply command-line flags on top of the current settings.
    pub fn with_cli(mut self, cli: &Cli) -> Self {
        if let Some(addr) = cli.http_addr {
            self.http_addr = addr;
        }
        if let Some(port) = cli.port {
            self.http_addr.set_port(port);
        }
        if let Some(max) = cli.max_upload_size {
            self.max_upload_size = max;
        }
        self
    }

    /// Largest WebSocket frame accepted: base64 inflates content by 4/3, plus
    /// room for the JSON envelope.
    pub fn ws_max_message_size(&self) -> usize {
        self.max_upload_size / 3 * 4 + 64 * 1024
    }

    /// Request body limit for `/upload`, leaving room for multipart framing.
    pub fn upload_body_limit(&self) -> usize {
        self.max_upload_size + 64 * 1024
    }
}
