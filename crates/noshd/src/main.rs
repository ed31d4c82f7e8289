//! Nosh Daemon - clarification state management for AI food analysis.

use anyhow::{Context, Result};
use noshd::analyzer::HttpAnalyzer;
use noshd::handlers::Handlers;
use noshd::rpc;
use noshd::store::{ClarificationStore, FileSink};
use nosh_common::NoshConfig;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UnixListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    info!("Nosh Daemon v{} starting", env!("CARGO_PKG_VERSION"));

    let config = NoshConfig::load()?;

    let store = Arc::new(ClarificationStore::open(Arc::new(FileSink::new(
        &config.storage.state_file,
    ))));
    info!(
        "Clarification store open at {} ({} pending)",
        config.storage.state_file.display(),
        store.len().await
    );

    let analyzer = Arc::new(HttpAnalyzer::new(config.analyzer.clone())?);
    let handlers = Arc::new(Handlers::new(
        store.clone(),
        analyzer,
        config.clarification.clone(),
    ));

    // Eager expiry sweep alongside the lazy per-access eviction.
    let sweep_store = store.clone();
    let sweep_interval = Duration::from_secs(config.clarification.sweep_interval_secs.max(1));
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(sweep_interval);
        interval.tick().await; // first tick fires immediately
        loop {
            interval.tick().await;
            if let Err(e) = sweep_store.sweep_expired().await {
                warn!("Expiry sweep failed: {}", e);
            }
        }
    });

    let socket = &config.daemon.socket;
    if let Some(parent) = socket.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    if socket.exists() {
        std::fs::remove_file(socket)
            .with_context(|| format!("Failed to remove stale socket {}", socket.display()))?;
    }
    let listener = UnixListener::bind(socket)
        .with_context(|| format!("Failed to bind {}", socket.display()))?;
    info!("Listening on {}", socket.display());

    tokio::select! {
        result = rpc::serve(listener, handlers) => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down gracefully");
        }
    }

    Ok(())
}
