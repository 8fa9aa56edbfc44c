//! Collection REST API Routes

use alloy_primitives::utils::format_ether;
use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use rugmirror_core::{decimal, ChainId, CollectionSummary, U256};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::assembler::{CollectionAssembler, CollectionPage, CollectionQuery};
use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsQuery {
    pub chain_id: Option<ChainId>,
}

/// Stats response. Prices are ether strings, with exact wei alongside.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionStatsResponse {
    #[serde(rename = "totalNFTs")]
    pub total_nfts: u64,
    pub max_supply: u64,
    pub floor_price: String,
    #[serde(default, with = "decimal::option")]
    pub floor_price_wei: Option<U256>,
    /// Marketplace volume since deployment.
    #[serde(rename = "volume24h")]
    pub volume: String,
    #[serde(with = "decimal")]
    pub volume_wei: U256,
    #[serde(rename = "sales24h")]
    pub sales: u64,
    pub unique_owners: u64,
    /// Unix milliseconds, as a string.
    #[serde(with = "decimal")]
    pub last_updated: u64,
}

impl From<CollectionSummary> for CollectionStatsResponse {
    fn from(stats: CollectionSummary) -> Self {
        let market = stats.market;
        Self {
            total_nfts: stats.total_supply,
            max_supply: stats.max_supply,
            floor_price: ether(market.floor_price.unwrap_or(U256::ZERO)),
            floor_price_wei: market.floor_price,
            volume: ether(market.total_volume),
            volume_wei: market.total_volume,
            sales: market.total_sales,
            unique_owners: stats.unique_owners,
            last_updated: stats.last_updated,
        }
    }
}

/// Wei as a decimal ether amount without trailing zeros, e.g. `0.005`.
fn ether(wei: U256) -> String {
    let text = format_ether(wei);
    if !text.contains('.') {
        return text;
    }
    text.trim_end_matches('0').trim_end_matches('.').to_string()
}

/// GET /api/rug-market/collection - One page of the collection
pub async fn get_collection(
    State(assembler): State<Arc<CollectionAssembler>>,
    Query(query): Query<CollectionQuery>,
) -> ApiResult<Json<CollectionPage>> {
    let page = assembler.collection(query).await?;
    Ok(Json(page))
}

/// GET /api/rug-market/collection/stats - Collection-wide market stats
pub async fn get_collection_stats(
    State(assembler): State<Arc<CollectionAssembler>>,
    Query(query): Query<StatsQuery>,
) -> ApiResult<Json<CollectionStatsResponse>> {
    let stats = assembler.collection_stats(query.chain_id).await?;
    Ok(Json(stats.into()))
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/collection", get(get_collection))
        .route("/collection/stats", get(get_collection_stats))
        .with_state(state.assembler)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rugmirror_core::MarketSummary;

    #[test]
    fn test_ether_formatting() {
        assert_eq!(ether(U256::ZERO), "0");
        assert_eq!(ether(U256::from(1_000_000_000_000_000_000u64)), "1");
        assert_eq!(ether(U256::from(5_000_000_000_000_000u64)), "0.005");
        assert_eq!(ether(U256::from(1_250_000_000_000_000_000u64)), "1.25");
    }

    #[test]
    fn test_response_wire_names() {
        let response = CollectionStatsResponse::from(CollectionSummary {
            total_supply: 812,
            max_supply: 10_000,
            market: MarketSummary {
                total_volume: U256::from(3_000_000_000_000_000_000u64),
                total_sales: 4,
                floor_price: None,
            },
            unique_owners: 90,
            last_updated: 1_750_000_000_000,
        });
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["totalNFTs"], 812);
        assert_eq!(json["floorPrice"], "0");
        assert!(json["floorPriceWei"].is_null());
        assert_eq!(json["volume24h"], "3");
        assert_eq!(json["volumeWei"], "3000000000000000000");
        assert_eq!(json["sales24h"], 4);
        assert_eq!(json["lastUpdated"], "1750000000000");
    }
}
