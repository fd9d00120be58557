//! Cloud router
//!
//! # Architecture Overview
//!
//! ```text
//!                        ┌────────────────────────────────────────────────────┐
//!                        │                   CLOUD ROUTER                     │
//!                        │                                                    │
//!  Client Request        │  ┌─────────┐   ┌──────────┐   ┌────────────┐       │
//!  ──────────────────────┼─▶│  http   │──▶│ routing  │──▶│ authority  │       │
//!                        │  │ server  │   │ patterns │   │ resolver   │       │
//!                        │  └─────────┘   └──────────┘   └─────┬──────┘       │
//!                        │                          local      │     remote   │
//!                        │                        ┌────────────┴───────┐      │
//!                        │                        ▼                    ▼      │
//!                        │                 ┌────────────┐       ┌──────────┐  │
//!                        │                 │   bridge   │       │  proxy   │──┼──▶ Peer router
//!                        │                 │ sync/async │       └──────────┘  │
//!                        │                 └─────┬──────┘                     │
//!                        │                       ▼                            │
//!                        │                 ┌────────────┐                     │
//!                        │                 │    bus     │◀──── replies ───────┼─── Modules
//!                        │                 │ correlate  │───── messages ──────┼──▶
//!                        │                 └────────────┘                     │
//!                        │                                                    │
//!                        │  config · observability · lifecycle · resilience   │
//!                        └────────────────────────────────────────────────────┘
//! ```

use clap::Parser;
use std::path::PathBuf;

use cloud_router::config::{load_config, RouterConfig};
use cloud_router::lifecycle;
use cloud_router::observability::logging::init_logging;

#[derive(Parser, Debug)]
#[command(name = "cloud-router", version, about = "Routes node-addressed HTTP requests to the authoritative router")]
struct Cli {
    /// Path to the TOML configuration file; defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => RouterConfig::default(),
    };

    init_logging(&config.observability.log_level);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "cloud-router starting");
    tracing::info!(
        bind_address = %config.listener.bind_address(),
        request_timeout_secs = config.timeouts.request_timeout().as_secs(),
        rules = config.rules.len(),
        nodes = config.nodes.len(),
        "Configuration loaded"
    );

    lifecycle::run(config, cli.config).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
