//! POGO Envelope Server
//!
//! Binds the WebSocket transport and serves request envelopes until
//! interrupted.

use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use pogo_envelope::{network::EnvelopeServer, ServerConfig, VERSION};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ServerConfig::from_env().context("invalid configuration")?;

    info!("POGO Envelope Server v{}", VERSION);
    info!("API URL: {}", config.api_url);
    info!("Auth policy: {:?}", config.auth);

    let server = EnvelopeServer::new(config);

    tokio::select! {
        result = server.run() => result.context("server stopped")?,
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, shutting down");
            server.shutdown();
        }
    }

    Ok(())
}
