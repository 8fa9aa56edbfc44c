//! Authoritative data sources behind the caches.
//!
//! The chain reader implements both traits; tests substitute mocks.

use crate::{AgingThresholds, ChainId, MarketSummary, MirrorResult, TokenId, TokenRecord};
use async_trait::async_trait;

/// Per-token and collection-level reads against the authoritative source.
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// Fetch both halves of a token. `Ok(None)` means the token does not exist.
    async fn fetch_token(&self, token_id: TokenId) -> MirrorResult<Option<TokenRecord>>;

    /// Number of tokens minted so far.
    async fn fetch_total_supply(&self) -> MirrorResult<u64>;

    /// Marketplace totals, with the floor taken over listings of tokens
    /// `1..=scan_count`.
    async fn fetch_market_summary(&self, scan_count: u64) -> MirrorResult<MarketSummary>;
}

/// Source of per-chain aging thresholds.
#[async_trait]
pub trait ConfigSource: Send + Sync {
    async fn fetch_thresholds(&self, chain_id: ChainId) -> MirrorResult<AgingThresholds>;
}
