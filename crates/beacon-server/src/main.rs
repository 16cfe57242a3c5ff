//! # Beacon Server
//!
//! Presence and push-notification relay.
//!
//! ## Usage
//!
//! ```bash
//! # Run with default settings
//! beacon
//!
//! # Run with a custom config file
//! BEACON_CONFIG=/path/to/beacon.toml beacon
//!
//! # Run with environment overrides
//! BEACON_PORT=8080 BEACON_CONTROL__PORT=8081 beacon
//! ```

use anyhow::Result;
use beacon_server::{config::Config, handlers, metrics};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "beacon=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::load()?;

    tracing::info!(
        "Starting Beacon server on {}:{} (control {}:{})",
        config.host,
        config.port,
        config.control.host,
        config.control.port
    );

    // Initialize metrics
    metrics::init_metrics();

    // Start the server
    handlers::run_server(config).await?;

    Ok(())
}
