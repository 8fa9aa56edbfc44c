//! REST API Routes Module
//!
//! - Collection pages and single tokens under `/api/rug-market`
//! - Chain configuration administration under `/api/admin`
//! - Liveness under `/health`

pub mod admin;
pub mod collection;
pub mod health;
pub mod nft;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub use admin::create_router as admin_router;
pub use collection::create_router as collection_router;
pub use health::create_router as health_router;
pub use nft::create_router as nft_router;

/// Assemble every route with tracing and permissive CORS.
pub fn create_api_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .nest(
            "/api/rug-market",
            collection_router(state.clone()).merge(nft_router(state.clone())),
        )
        .nest("/api/admin", admin_router(state.clone()))
        .nest("/health", health_router(state))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
