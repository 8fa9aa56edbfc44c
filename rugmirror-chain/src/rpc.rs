//! JSON-RPC `eth_call` client with endpoint fallback.

use crate::abi::{self, narrow};
use crate::{ContractCalls, RawAgingData, RawListing, RawMarketStats, RawRugData};
use alloy::primitives::U256;
use alloy::sol_types::SolCall;
use async_trait::async_trait;
use reqwest::Client;
use rugmirror_core::{normalize_address, Address, ChainError, ChainId, MirrorResult, TokenId};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

/// JSON-RPC error code geth and most providers use for execution reverts.
const REVERT_CODE: i64 = 3;

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<String>,
    #[serde(default)]
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
    #[serde(default)]
    data: Option<Value>,
}

/// What one endpoint said about one call.
#[derive(Debug, PartialEq, Eq)]
enum CallOutcome {
    Data(String),
    Reverted(String),
    /// The endpoint could not answer; the next one may.
    Retry(String),
}

fn classify(response: RpcResponse) -> CallOutcome {
    if let Some(error) = response.error {
        let lower = error.message.to_ascii_lowercase();
        if error.code == REVERT_CODE || lower.contains("revert") {
            let message = match error.data {
                Some(Value::String(data)) => format!("{} (data: {data})", error.message),
                _ => error.message,
            };
            return CallOutcome::Reverted(message);
        }
        return CallOutcome::Retry(format!("rpc error {}: {}", error.code, error.message));
    }
    match response.result {
        Some(result) => CallOutcome::Data(result),
        None => CallOutcome::Retry("response has neither result nor error".to_string()),
    }
}

// ============================================================================
// CLIENT
// ============================================================================

/// `eth_call` against an ordered list of RPC endpoints for one chain.
#[derive(Clone)]
pub struct RpcClient {
    client: Client,
    chain_id: ChainId,
    endpoints: Vec<String>,
}

impl RpcClient {
    /// Create a client that tries `endpoints` in order.
    ///
    /// # Arguments
    /// * `chain_id` - Chain the endpoints serve
    /// * `endpoints` - RPC URLs, most preferred first
    /// * `timeout` - Per-request timeout applied to every endpoint
    pub fn new(chain_id: ChainId, endpoints: Vec<String>, timeout: Duration) -> MirrorResult<Self> {
        if endpoints.is_empty() {
            return Err(ChainError::NoEndpoints { chain_id }.into());
        }
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ChainError::Transport {
                endpoint: "client".to_string(),
                reason: format!("Failed to build HTTP client: {}", e),
            })?;
        Ok(Self {
            client,
            chain_id,
            endpoints,
        })
    }

    pub fn chain_id(&self) -> ChainId {
        self.chain_id
    }

    /// Run `eth_call` and return the raw return data.
    ///
    /// Transport failures move on to the next endpoint. A revert is the
    /// contract's answer, so it is returned without trying further endpoints.
    pub async fn call(&self, method: &str, to: &str, data: &str) -> MirrorResult<Vec<u8>> {
        let body = json!({
            "jsonrpc": "2.0",
            "method": "eth_call",
            "params": [{ "to": to, "data": data }, "latest"],
            "id": 1,
        });

        let mut last_failure = None;
        for endpoint in &self.endpoints {
            match self.call_endpoint(endpoint, &body).await {
                CallOutcome::Data(hex) => return abi::decode_hex(method, &hex),
                CallOutcome::Reverted(message) => {
                    return Err(ChainError::Reverted {
                        method: method.to_string(),
                        message,
                    }
                    .into())
                }
                CallOutcome::Retry(reason) => {
                    tracing::debug!(
                        chain_id = self.chain_id,
                        endpoint = %endpoint,
                        method,
                        reason = %reason,
                        "rpc endpoint failed, trying next"
                    );
                    last_failure = Some((endpoint.clone(), reason));
                }
            }
        }

        let (endpoint, reason) = last_failure.unwrap_or_else(|| {
            ("none".to_string(), "no endpoint attempted".to_string())
        });
        Err(ChainError::Transport { endpoint, reason }.into())
    }

    async fn call_endpoint(&self, endpoint: &str, body: &Value) -> CallOutcome {
        let response = match self.client.post(endpoint).json(body).send().await {
            Ok(response) => response,
            Err(e) => return CallOutcome::Retry(format!("HTTP request failed: {}", e)),
        };
        let status = response.status();
        if !status.is_success() {
            return CallOutcome::Retry(format!("HTTP status {}", status.as_u16()));
        }
        match response.json::<RpcResponse>().await {
            Ok(parsed) => classify(parsed),
            Err(e) => CallOutcome::Retry(format!("Failed to parse response: {}", e)),
        }
    }
}

impl std::fmt::Debug for RpcClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Provider URLs often embed API keys.
        f.debug_struct("RpcClient")
            .field("chain_id", &self.chain_id)
            .field("endpoints", &self.endpoints.len())
            .finish()
    }
}

// ============================================================================
// CONTRACT
// ============================================================================

/// The rug contract on one chain, read through an [`RpcClient`].
#[derive(Debug, Clone)]
pub struct RpcContract {
    client: RpcClient,
    address: Address,
}

impl RpcContract {
    pub fn new(client: RpcClient, address: &str) -> Self {
        Self {
            client,
            address: normalize_address(address),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    async fn call<C: SolCall + Send + Sync>(&self, call: C) -> MirrorResult<C::Return> {
        let data = abi::encode(&call);
        let bytes = self.client.call(C::SIGNATURE, &self.address, &data).await?;
        abi::decode::<C>(&bytes)
    }
}

fn token_arg(token_id: TokenId) -> U256 {
    U256::from(token_id)
}

fn address_text(address: alloy::primitives::Address) -> Address {
    normalize_address(&address.to_string())
}

fn rug_data(rug: abi::RugData) -> MirrorResult<RawRugData> {
    let method = abi::getRugDataCall::SIGNATURE;
    Ok(RawRugData {
        seed: rug.seed,
        text_rows: rug.textRows,
        palette_name: rug.paletteName,
        minified_palette: rug.minifiedPalette,
        minified_stripe_data: rug.minifiedStripeData,
        warp_thickness: rug.warpThickness,
        mint_time: narrow(method, "mintTime", rug.mintTime)?,
        filtered_character_map: rug.filteredCharacterMap,
        curator: address_text(rug.curator),
        character_count: narrow(method, "characterCount", rug.characterCount)?,
        stripe_count: narrow(method, "stripeCount", rug.stripeCount)?,
    })
}

fn aging_data(aging: abi::AgingData) -> MirrorResult<RawAgingData> {
    let method = abi::getAgingDataCall::SIGNATURE;
    // dirtLevel is the contract's own time-dependent figure.
    Ok(RawAgingData {
        last_cleaned: narrow(method, "lastCleaned", aging.lastCleaned)?,
        aging_level: narrow(method, "agingLevel", aging.agingLevel)?,
        frame_level: narrow(method, "frameLevel", aging.frameLevel)?,
        frame_achieved_time: narrow(method, "frameAchievedTime", aging.frameAchievedTime)?,
        cleaning_count: narrow(method, "cleaningCount", aging.cleaningCount)?,
        restoration_count: narrow(method, "restorationCount", aging.restorationCount)?,
        master_restoration_count: narrow(
            method,
            "masterRestorationCount",
            aging.masterRestorationCount,
        )?,
        laundering_count: narrow(method, "launderingCount", aging.launderingCount)?,
        last_laundered: narrow(method, "lastLaundered", aging.lastLaundered)?,
        last_sale_price: aging.lastSalePrice,
        recent_sale_prices: aging.recentSalePrices,
    })
}

fn listing(listing: abi::getListingReturn) -> MirrorResult<RawListing> {
    Ok(RawListing {
        seller: address_text(listing.seller),
        price: listing.price,
        expires_at: narrow(abi::getListingCall::SIGNATURE, "expiresAt", listing.expiresAt)?,
        is_active: listing.isActive,
    })
}

#[async_trait]
impl ContractCalls for RpcContract {
    async fn total_supply(&self) -> MirrorResult<u64> {
        let supply = self.call(abi::totalSupplyCall {}).await?._0;
        narrow(abi::totalSupplyCall::SIGNATURE, "totalSupply", supply)
    }

    async fn owner_of(&self, token_id: TokenId) -> MirrorResult<Address> {
        let owner = self
            .call(abi::ownerOfCall {
                tokenId: token_arg(token_id),
            })
            .await?
            ._0;
        Ok(address_text(owner))
    }

    async fn rug_data(&self, token_id: TokenId) -> MirrorResult<RawRugData> {
        let rug = self
            .call(abi::getRugDataCall {
                tokenId: token_arg(token_id),
            })
            .await?
            ._0;
        rug_data(rug)
    }

    async fn aging_data(&self, token_id: TokenId) -> MirrorResult<RawAgingData> {
        let aging = self
            .call(abi::getAgingDataCall {
                tokenId: token_arg(token_id),
            })
            .await?
            ._0;
        aging_data(aging)
    }

    async fn maintenance_score(&self, token_id: TokenId) -> MirrorResult<u64> {
        let score = self
            .call(abi::getMaintenanceScoreCall {
                tokenId: token_arg(token_id),
            })
            .await?
            ._0;
        narrow(abi::getMaintenanceScoreCall::SIGNATURE, "score", score)
    }

    async fn listing(&self, token_id: TokenId) -> MirrorResult<RawListing> {
        let raw = self
            .call(abi::getListingCall {
                tokenId: token_arg(token_id),
            })
            .await?;
        listing(raw)
    }

    async fn aging_thresholds(&self) -> MirrorResult<[u64; 5]> {
        let t = self.call(abi::getAgingThresholdsCall {}).await?;
        let method = abi::getAgingThresholdsCall::SIGNATURE;
        Ok([
            narrow(method, "dirtLevel1Days", t.dirtLevel1Days)?,
            narrow(method, "dirtLevel2Days", t.dirtLevel2Days)?,
            narrow(method, "agingAdvanceDays", t.agingAdvanceDays)?,
            narrow(method, "freeCleanDays", t.freeCleanDays)?,
            narrow(method, "freeCleanWindow", t.freeCleanWindow)?,
        ])
    }

    async fn marketplace_stats(&self) -> MirrorResult<RawMarketStats> {
        let stats = self.call(abi::getMarketplaceStatsCall {}).await?;
        Ok(RawMarketStats {
            total_volume: stats.totalVolume,
            total_sales: narrow(
                abi::getMarketplaceStatsCall::SIGNATURE,
                "totalSales",
                stats.totalSales,
            )?,
        })
    }
}
