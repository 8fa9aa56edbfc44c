//! Token records.
//!
//! A token is cached as two independent halves: the [`PermanentRecord`] fixed
//! at mint and the [`DynamicRecord`] that changes with maintenance and trading.
//! Dirt and aging levels are deliberately absent from both; they only exist on
//! the read-time [`DerivedView`].

use crate::decimal;
use crate::{Address, AcquiredVia, FrameTier, TokenId, U256};
use serde::{Deserialize, Serialize};

/// Mint-time attributes of a token. Written once, never updated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermanentRecord {
    #[serde(with = "decimal")]
    pub token_id: TokenId,
    #[serde(with = "decimal")]
    pub seed: U256,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub image: String,
    pub palette_name: String,
    pub minified_palette: String,
    pub minified_stripe_data: String,
    #[serde(default)]
    pub text_rows: Vec<String>,
    #[serde(with = "decimal")]
    pub warp_thickness: u8,
    /// Unix seconds.
    #[serde(with = "decimal")]
    pub mint_time: u64,
    #[serde(default)]
    pub filtered_character_map: String,
    #[serde(with = "decimal")]
    pub character_count: u64,
    #[serde(with = "decimal")]
    pub stripe_count: u64,
    pub curator: Address,
}

/// One link in a token's ownership chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnershipEntry {
    pub owner: Address,
    #[serde(with = "decimal")]
    pub acquired_at: u64,
    pub acquired_via: AcquiredVia,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
}

/// A completed marketplace sale. Prices are in wei.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaleEntry {
    #[serde(with = "decimal")]
    pub price: U256,
    pub buyer: Address,
    pub seller: Address,
    #[serde(with = "decimal")]
    pub timestamp: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
}

/// Maintenance and market state of a token, as last observed on chain.
///
/// Replaced wholesale on every successful re-fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DynamicRecord {
    /// Aging level as stored on chain. Only maintenance transactions move it.
    #[serde(with = "decimal")]
    pub base_aging_level: u8,
    pub frame_level: FrameTier,
    #[serde(with = "decimal")]
    pub maintenance_score: u64,
    /// Unix seconds, or milliseconds when written by some upstreams.
    #[serde(with = "decimal")]
    pub last_cleaned: u64,
    #[serde(default, with = "decimal::option", skip_serializing_if = "Option::is_none")]
    pub cleaning_count: Option<u64>,
    #[serde(default, with = "decimal::option", skip_serializing_if = "Option::is_none")]
    pub restoration_count: Option<u64>,
    #[serde(default, with = "decimal::option", skip_serializing_if = "Option::is_none")]
    pub master_restoration_count: Option<u64>,
    #[serde(default, with = "decimal::option", skip_serializing_if = "Option::is_none")]
    pub laundering_count: Option<u64>,
    #[serde(default, with = "decimal::option", skip_serializing_if = "Option::is_none")]
    pub last_laundered: Option<u64>,
    /// Unix seconds at which the current frame tier was reached.
    #[serde(default, with = "decimal::option", skip_serializing_if = "Option::is_none")]
    pub frame_achieved_time: Option<u64>,
    pub current_owner: Address,
    #[serde(default)]
    pub ownership_history: Vec<OwnershipEntry>,
    #[serde(default)]
    pub sale_history: Vec<SaleEntry>,
    #[serde(default)]
    pub is_listed: bool,
    #[serde(default, with = "decimal::option", skip_serializing_if = "Option::is_none")]
    pub listing_price: Option<U256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub listing_seller: Option<Address>,
    #[serde(default, with = "decimal::option", skip_serializing_if = "Option::is_none")]
    pub listing_expires_at: Option<u64>,
    #[serde(default, with = "decimal::option", skip_serializing_if = "Option::is_none")]
    pub last_sale_price: Option<U256>,
    /// Most recent sale prices in wei, newest last, as kept by the contract.
    #[serde(default, with = "decimal::vec", skip_serializing_if = "Vec::is_empty")]
    pub recent_sale_prices: Vec<U256>,
    /// Unix milliseconds of the chain read that produced this record.
    #[serde(with = "decimal")]
    pub last_updated: u64,
}

impl DynamicRecord {
    /// Listing price when the token is up for sale.
    pub fn active_listing_price(&self) -> Option<U256> {
        if self.is_listed {
            self.listing_price.filter(|price| !price.is_zero())
        } else {
            None
        }
    }
}

/// Both halves of one token, as produced by a chain read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRecord {
    pub permanent: PermanentRecord,
    pub dynamic: DynamicRecord,
}

impl TokenRecord {
    pub fn token_id(&self) -> TokenId {
        self.permanent.token_id
    }
}

/// Marketplace totals as reported by the contract, plus the cheapest active
/// listing among the scanned tokens.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketSummary {
    #[serde(with = "decimal")]
    pub total_volume: U256,
    #[serde(with = "decimal")]
    pub total_sales: u64,
    #[serde(default, with = "decimal::option", skip_serializing_if = "Option::is_none")]
    pub floor_price: Option<U256>,
}

/// Collection-wide figures served by the stats endpoint and cached between reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionSummary {
    #[serde(with = "decimal")]
    pub total_supply: u64,
    #[serde(with = "decimal")]
    pub max_supply: u64,
    #[serde(flatten)]
    pub market: MarketSummary,
    /// Distinct owners among mirrored tokens.
    #[serde(with = "decimal")]
    pub unique_owners: u64,
    /// Unix milliseconds.
    #[serde(with = "decimal")]
    pub last_updated: u64,
}

/// Dynamic state plus the time-dependent traits computed at read time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DerivedDynamic {
    #[serde(flatten)]
    pub record: DynamicRecord,
    pub dirt_level: u8,
    pub aging_level: u8,
}

/// Read-time projection of a token. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DerivedView {
    #[serde(with = "decimal")]
    pub token_id: TokenId,
    pub permanent: PermanentRecord,
    pub dynamic: DerivedDynamic,
}
