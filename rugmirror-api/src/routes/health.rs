//! Health Check Endpoints
//!
//! Liveness check for load balancers, with background job and cache counters.

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use rugmirror_core::ChainId;
use rugmirror_storage::{JobMetricsSnapshot, KeyValueStore, StoreStats};
use serde::{Deserialize, Serialize};

use crate::state::AppState;

// ============================================================================
// TYPES
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PingResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub chains: Vec<ChainId>,
    pub jobs: JobsHealth,
    /// Absent when the store cannot report usage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache: Option<CacheHealth>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobsHealth {
    pub in_flight: usize,
    pub spawned: u64,
    pub succeeded: u64,
    pub failed: u64,
}

impl JobsHealth {
    fn new(in_flight: usize, metrics: JobMetricsSnapshot) -> Self {
        Self {
            in_flight,
            spawned: metrics.spawned,
            succeeded: metrics.succeeded,
            failed: metrics.failed,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheHealth {
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub entry_count: u64,
    pub memory_bytes: u64,
    pub expirations: u64,
}

impl From<StoreStats> for CacheHealth {
    fn from(stats: StoreStats) -> Self {
        Self {
            hit_rate: stats.hit_rate(),
            hits: stats.hits,
            misses: stats.misses,
            entry_count: stats.entry_count,
            memory_bytes: stats.memory_bytes,
            expirations: stats.expirations,
        }
    }
}

// ============================================================================
// HANDLERS
// ============================================================================

/// GET /health/ping - Liveness with background job and cache counters
pub async fn ping(State(state): State<AppState>) -> impl IntoResponse {
    let jobs = state.assembler.jobs();
    let cache = match state.store.stats().await {
        Ok(stats) => Some(CacheHealth::from(stats)),
        Err(error) => {
            tracing::warn!(error = %error, "cache stats unavailable");
            None
        }
    };
    let response = PingResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        chains: state.assembler.chain_ids(),
        jobs: JobsHealth::new(jobs.in_flight(), jobs.metrics()),
        cache,
    };
    (StatusCode::OK, Json(response))
}

// ============================================================================
// ROUTER
// ============================================================================

pub fn create_router(state: AppState) -> Router {
    Router::new().route("/ping", get(ping)).with_state(state)
}
