//! Single Token REST API Routes

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use rugmirror_core::{ChainId, DerivedView, TokenId};
use serde::Deserialize;
use std::sync::Arc;

use crate::assembler::CollectionAssembler;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// `?chainId=` on token routes.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainQuery {
    pub chain_id: Option<ChainId>,
}

/// GET /api/rug-market/nft/:token_id - One token, cache first
pub async fn get_nft(
    State(assembler): State<Arc<CollectionAssembler>>,
    Path(token_id): Path<TokenId>,
    Query(query): Query<ChainQuery>,
) -> ApiResult<Json<DerivedView>> {
    assembler
        .token(query.chain_id, token_id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::token_not_found(token_id))
}

/// POST /api/rug-market/nft/:token_id/refresh - Re-read one token from the chain
pub async fn refresh_nft(
    State(assembler): State<Arc<CollectionAssembler>>,
    Path(token_id): Path<TokenId>,
    Query(query): Query<ChainQuery>,
) -> ApiResult<Json<DerivedView>> {
    tracing::info!(token_id, chain_id = ?query.chain_id, "token refresh requested");
    assembler
        .refresh_token(query.chain_id, token_id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::token_not_found(token_id))
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/nft/:token_id", get(get_nft))
        .route("/nft/:token_id/refresh", post(refresh_nft))
        .with_state(state.assembler)
}
