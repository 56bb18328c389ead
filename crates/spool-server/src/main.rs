//! Service entry point.

use std::net::SocketAddr;
use std::sync::Arc;

use spool_core::RedisEngine;
use spool_server::{build_app, ServerConfig};
use tokio::signal;
use tracing::{info, warn, Level};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(Level::INFO.into())
                .from_env_lossy(),
        )
        .init();

    info!("starting spool server");

    let config = ServerConfig::load()?;

    let engine = Arc::new(RedisEngine::connect(&config.redis.url).await?);
    info!(url = %config.redis.url, "connected to store, pumper running");

    let app = build_app(engine.clone(), config.defaults.ttl);

    let addr: SocketAddr = format!("{}:{}", config.service.host, config.service.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // In-flight requests are done; stop moving timer events before exit.
    engine.shutdown().await;
    info!("shut down cleanly");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(error) = signal::ctrl_c().await {
        warn!(%error, "failed to install ctrl-c handler");
    }
}
