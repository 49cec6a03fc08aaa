//! Streaming relay server entry point
//!
//! Loads configuration, sets up logging, and starts the HTTP service.
//!
//! ```bash
//! # Start with the default config path (stream_relay.yaml, falling back to
//! # built-in defaults if absent)
//! cargo run
//!
//! # Start with an explicit config
//! cargo run -- /etc/stream-relay/relay.yaml
//! ```

use anyhow::Context;
use std::env;
use std::path::Path;
use stream_relay::{RelayConfig, RelayServer, StaticCatalog};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_target(false)
        .init();

    let config = load_config()?;
    info!("Configuration:");
    info!("  - Listen address: {}", config.listen_address);
    info!("  - Probe timeout: {}s", config.probe_timeout_secs);
    info!("  - Fetch timeout: {}s", config.fetch_timeout_secs);
    info!(
        "  - Default window: {} KB",
        config.default_window_bytes / 1024
    );
    info!(
        "  - Token verification: {}",
        if config.resolved_jwt_secret().is_some() {
            "enabled"
        } else {
            "disabled (all requests anonymous)"
        }
    );

    let catalog = match &config.catalog_file {
        Some(path) => {
            info!("Loading course catalog from {}", path);
            StaticCatalog::from_file(path).context("Failed to load catalog")?
        }
        None => {
            warn!("No catalog_file configured; lecture routes will return 404");
            StaticCatalog::default()
        }
    };

    let server = RelayServer::new(&config, catalog).context("Failed to assemble server")?;
    server.run().await.context("Server error")?;
    Ok(())
}

fn load_config() -> anyhow::Result<RelayConfig> {
    match env::args().nth(1) {
        Some(path) => {
            info!("Loading configuration from {}", path);
            RelayConfig::from_file(&path).context("Failed to load configuration")
        }
        None => {
            let default_path = "stream_relay.yaml";
            if Path::new(default_path).exists() {
                info!("Loading configuration from {}", default_path);
                RelayConfig::from_file(default_path).context("Failed to load configuration")
            } else {
                info!("No configuration file found, using defaults");
                Ok(RelayConfig::default())
            }
        }
    }
}
