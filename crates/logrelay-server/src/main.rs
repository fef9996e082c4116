//! Log relay server.
//!
//! Producers POST events to `/logger`, viewers subscribe over `/ws` or
//! open `/viewer/{key}` in a browser.

mod config;

use std::sync::Arc;

use anyhow::{Context, Result};
use logrelay_core::RelayCore;
use logrelay_transport::create_router;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::ServerConfig;

#[tokio::main]
async fn main() -> Result<()> {
    let config = ServerConfig::from_env()?;
    init_tracing("info", config.log_json);

    tracing::info!(
        bind_addr = %config.bind_addr,
        buffer_capacity = config.relay.buffer_capacity,
        subscriber_queue = config.relay.subscriber_queue,
        "Configuration loaded"
    );

    let relay = Arc::new(RelayCore::new(config.relay)?);
    let app = create_router(relay);

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    tracing::info!("Log relay listening on http://{}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("Log relay stopped");
    Ok(())
}

fn init_tracing(default_filter: &str, log_json: bool) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());
    if log_json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
