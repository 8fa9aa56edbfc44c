//! Chain Configuration Admin Routes
//!
//! Used after an on-chain threshold change so the mirror stops serving levels
//! computed from the old configuration.

use axum::{
    extract::{Path, State},
    routing::{delete, post},
    Json, Router,
};
use rugmirror_core::{ChainConfig, ChainId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::assembler::CollectionAssembler;
use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvalidateResponse {
    pub chain_id: ChainId,
    pub invalidated: bool,
}

/// DELETE /api/admin/chain-config/:chain_id - Drop the cached configuration
pub async fn invalidate_config(
    State(assembler): State<Arc<CollectionAssembler>>,
    Path(chain_id): Path<ChainId>,
) -> ApiResult<Json<InvalidateResponse>> {
    assembler.invalidate_config(chain_id).await?;
    Ok(Json(InvalidateResponse {
        chain_id,
        invalidated: true,
    }))
}

/// POST /api/admin/chain-config/:chain_id/refresh - Re-read configuration now
pub async fn refresh_config(
    State(assembler): State<Arc<CollectionAssembler>>,
    Path(chain_id): Path<ChainId>,
) -> ApiResult<Json<ChainConfig>> {
    let config = assembler.refresh_config(chain_id).await?;
    Ok(Json(config))
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/chain-config/:chain_id", delete(invalidate_config))
        .route("/chain-config/:chain_id/refresh", post(refresh_config))
        .with_state(state.assembler)
}
