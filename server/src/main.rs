//! Whiteboard server - real-time multi-client canvas synchronization
//!
//! - Axum with WebSocket for the event stream
//! - One authoritative in-memory document, relayed with sender exclusion
//! - Field-level last-write-wins merge for shape transforms

use std::sync::Arc;

use anyhow::Context;
use tracing::info;
use whiteboard_server::{serve, ServerConfig, SyncServer};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "whiteboard_server=info,tower_http=info".into()),
        )
        .init();

    // Load environment variables
    dotenvy::dotenv().ok();

    let config = ServerConfig::from_env().context("Invalid server configuration")?;
    let addr = config.addr();

    let server = Arc::new(SyncServer::new(config.sync.clone()));

    info!("Whiteboard server v{} starting", env!("CARGO_PKG_VERSION"));
    info!("   WebSocket: ws://{}/ws", addr);
    info!("   Health check: http://{}/health", addr);
    info!("   Allowed origin: {:?}", config.cors_origin);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    serve(listener, server, &config.cors_origin)
        .await
        .context("Server error")?;
    Ok(())
}
