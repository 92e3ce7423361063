//! Forwarder binary.
//!
//! ```text
//!  Client ──▶ listener (TCP/TLS) ──▶ routing ──▶ Forwarder ──▶ Backend
//!                                                  │
//!                                      X-Forwarded-*, hop strip,
//!                                      streaming, WebSocket tunnel
//! ```

use std::path::PathBuf;

use clap::Parser;

use forwarder::config::{load_config, ProxyConfig};
use forwarder::lifecycle::startup;
use forwarder::observability::init_logging;

#[derive(Parser, Debug)]
#[command(name = "forwarder", version, about = "HTTP and WebSocket forwarding proxy")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override listener.bind_address
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ProxyConfig::default(),
    };
    if let Some(bind) = cli.bind {
        config.listener.bind_address = bind;
    }

    init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "forwarder starting");

    startup::run(config).await
}
