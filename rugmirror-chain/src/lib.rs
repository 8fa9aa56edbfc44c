//! Rugmirror Chain - Contract Reads
//!
//! Everything the mirror knows about a token ultimately comes from a handful
//! of view calls on the rug contract. [`ContractCalls`] names those calls;
//! [`RpcContract`] makes them over JSON-RPC, and [`ChainReader`] turns their
//! raw results into [`TokenRecord`](rugmirror_core::TokenRecord)s.

pub mod abi;
pub mod reader;
pub mod rpc;

pub use reader::ChainReader;
pub use rpc::{RpcClient, RpcContract};

use async_trait::async_trait;
use rugmirror_core::{Address, MirrorResult, TokenId, U256};

// ============================================================================
// RAW CONTRACT STRUCTS
// ============================================================================

/// `getRugData` as returned by the contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRugData {
    pub seed: U256,
    pub text_rows: Vec<String>,
    pub palette_name: String,
    pub minified_palette: String,
    pub minified_stripe_data: String,
    pub warp_thickness: u8,
    pub mint_time: u64,
    pub filtered_character_map: String,
    pub curator: Address,
    pub character_count: u64,
    pub stripe_count: u64,
}

/// `getAgingData` as returned by the contract.
///
/// The contract also reports a dirt level; it is time-dependent and the mirror
/// recomputes it on read, so it is not kept here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawAgingData {
    pub last_cleaned: u64,
    /// Stored aging level, moved only by maintenance transactions.
    pub aging_level: u8,
    pub frame_level: u8,
    pub frame_achieved_time: u64,
    pub cleaning_count: u64,
    pub restoration_count: u64,
    pub master_restoration_count: u64,
    pub laundering_count: u64,
    pub last_laundered: u64,
    pub last_sale_price: U256,
    pub recent_sale_prices: Vec<U256>,
}

/// `getListing` as returned by the marketplace facet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawListing {
    pub seller: Address,
    pub price: U256,
    pub expires_at: u64,
    pub is_active: bool,
}

/// Marketplace totals from `getMarketplaceStats`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawMarketStats {
    pub total_volume: U256,
    pub total_sales: u64,
}

// ============================================================================
// CONTRACT INTERFACE
// ============================================================================

/// One method per contract read. Each call fails independently.
#[async_trait]
pub trait ContractCalls: Send + Sync {
    async fn total_supply(&self) -> MirrorResult<u64>;

    async fn owner_of(&self, token_id: TokenId) -> MirrorResult<Address>;

    async fn rug_data(&self, token_id: TokenId) -> MirrorResult<RawRugData>;

    async fn aging_data(&self, token_id: TokenId) -> MirrorResult<RawAgingData>;

    async fn maintenance_score(&self, token_id: TokenId) -> MirrorResult<u64>;

    async fn listing(&self, token_id: TokenId) -> MirrorResult<RawListing>;

    /// Returns `[dirtLevel1Days, dirtLevel2Days, agingAdvanceDays, freeCleanDays, freeCleanWindow]`.
    async fn aging_thresholds(&self) -> MirrorResult<[u64; 5]>;

    async fn marketplace_stats(&self) -> MirrorResult<RawMarketStats>;
}
