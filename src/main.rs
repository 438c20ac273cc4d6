//! peakwatch - game server peak tracker
//!
//! Polls Minecraft servers for player counts, keeps daily and all-time
//! peaks on disk and serves them over a small read-only HTTP API.

mod config;
mod db;
mod query;
mod scheduler;
mod web;

use config::ServerConfig;
use db::FileStore;
use query::{system_nameserver, SlpClient};
use scheduler::{LocalClock, Poller};
use web::Server;

use std::sync::Arc;
use tokio::sync::broadcast;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env()
            .add_directive("peakwatch=info".parse()?))
        .init();

    // Load configuration
    let cfg = ServerConfig::load();
    tracing::info!("Starting peakwatch on {}:{}...", cfg.listen_addr, cfg.http_port);

    // Initialize record store
    let store = Arc::new(FileStore::new(&cfg.data_dir, &cfg.icons_dir)?);
    tracing::info!(
        "Records in {}, icons in {}",
        store.data_dir().display(),
        store.icons_dir().display()
    );

    // SRV lookups go to the configured resolver, else the system one
    let resolver = cfg.dns_server.or_else(system_nameserver);
    match resolver {
        Some(addr) => tracing::info!("Resolving SRV records via {}", addr),
        None => tracing::warn!("No DNS resolver found, SRV lookups disabled"),
    }

    // Start poller
    let (stop_tx, stop_rx) = broadcast::channel(1);
    let poller = Poller::new(
        cfg.endpoints.clone(),
        cfg.poll_interval,
        Arc::new(SlpClient::new(cfg.query_timeout).with_resolver(resolver)),
        store.clone(),
        Arc::new(LocalClock),
    );
    let poller_handle = poller.start(stop_rx);

    // Start web server
    let server = Server::new(&cfg, store);
    let result = server.start(shutdown_signal()).await;

    let _ = stop_tx.send(());
    if let Err(e) = poller_handle.await {
        tracing::error!("Poller task failed: {}", e);
    }

    result
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
