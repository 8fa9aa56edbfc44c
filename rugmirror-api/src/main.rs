//! Rugmirror API Server Entry Point
//!
//! Bootstraps configuration, opens the cache, and starts the Axum HTTP server.
//! On Ctrl-C the server stops accepting requests and in-flight background
//! jobs are drained before exit.

use std::net::SocketAddr;
use std::time::Duration;

use rugmirror_api::telemetry::{init_tracing, TelemetryConfig};
use rugmirror_api::{create_api_router, ApiConfig, ApiError, ApiResult, AppState, ChainRegistry};
use rugmirror_storage::{BackgroundJobs, KeyValueStore};

/// Longest wait for background jobs at shutdown.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> ApiResult<()> {
    init_tracing(&TelemetryConfig::default())?;

    let config = ApiConfig::from_env();
    let registry = ChainRegistry::from_env()?;

    let jobs = BackgroundJobs::new();
    let reporter = jobs.start_reporter();

    let state = AppState::from_config(&config, &registry, jobs.clone())?;
    let store = state.store.clone();
    let app = create_api_router(state);

    let addr = resolve_bind_addr(&config)?;
    tracing::info!(%addr, chains = ?registry.chain_ids(), "Starting rugmirror API server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to bind {}: {}", addr, e)))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| ApiError::internal_error(format!("Server error: {}", e)))?;

    if tokio::time::timeout(DRAIN_TIMEOUT, jobs.wait_idle()).await.is_err() {
        tracing::warn!(in_flight = jobs.in_flight(), "background jobs still running at exit");
    }
    if let Some(reporter) = reporter {
        reporter.abort();
    }
    let cache = store.stats().await.ok();
    tracing::info!(
        jobs = ?jobs.metrics(),
        cache_hit_rate = cache.as_ref().map(|stats| stats.hit_rate()),
        cache_entries = cache.as_ref().map(|stats| stats.entry_count),
        "Shutdown complete"
    );
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

fn resolve_bind_addr(config: &ApiConfig) -> ApiResult<SocketAddr> {
    config.bind_addr.parse::<SocketAddr>().map_err(|e| {
        ApiError::invalid_input(format!("Invalid bind address {}: {}", config.bind_addr, e))
    })
}
