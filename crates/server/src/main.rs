//! offgrid-proxy entry point.
//!
//! Boots the offline proxy, registers this build's cache generation, and
//! serves the runtime hooks as MCP tools on stdio transport.
//! Logging goes to stderr to avoid interfering with the JSON-RPC protocol on stdout.

use std::sync::Arc;

use anyhow::Result;
use offgrid_client::{FetchClient, FetchConfig, OfflineProxy, ProxySettings};
use offgrid_core::{AppConfig, CacheDb, current_version};
use rmcp::service::serve_server;
use rmcp::transport::io::stdio;
use tracing_subscriber::EnvFilter;

mod handler;
mod tools;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load()?;

    tracing::info!(
        version = current_version(),
        origin = %config.origin,
        db_path = %config.db_path.display(),
        "Starting offgrid proxy on stdio transport"
    );

    let db = CacheDb::open(&config.db_path).await?;
    let network = Arc::new(FetchClient::new(FetchConfig::from_app_config(&config)?)?);
    let proxy = Arc::new(OfflineProxy::new(db, network, ProxySettings::from_app_config(&config)?)?);

    match proxy.register().await {
        Ok(generation) => tracing::info!(version = %generation.version, state = ?generation.state, "registered"),
        Err(e) => tracing::error!(error = %e, "registration failed; previous generation keeps serving"),
    }

    let handler = handler::OffgridServer::new(proxy.clone());
    let server = serve_server(handler, stdio()).await?;

    server.waiting().await?;
    proxy.flush().await;

    Ok(())
}
