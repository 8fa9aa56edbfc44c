//! Collection Assembler
//!
//! Serves collection pages cache-first. Each request runs
//! `ResolveSupply -> ComputeWindow -> ReadCache -> FillGaps -> Persist -> Respond`:
//!
//! - Supply comes from the cache when present, with a background refresh;
//!   otherwise from the chain, and a failure there fails the request.
//! - The requested window is read from the [`RecordStore`] in one batch.
//! - Misses are fetched from the chain concurrently. One token failing only
//!   drops that token; every miss failing fails the request.
//! - Fetched tokens are written, then read back through the store so their
//!   derived levels come from the same path as cache hits.
//!
//! Collection stats follow the same fast path as supply: a cached summary is
//! served as-is and recomputed in the background. At most one supply refresh
//! and one stats refresh run per chain at a time.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use rugmirror_core::constants::FLOOR_SCAN_LIMIT;
use rugmirror_core::{
    decimal, ChainConfig, ChainError, ChainId, Clock, CollectionSummary, ConfigError,
    ConfigSource, DerivedView, MarketSummary, MirrorError, MirrorResult, TokenId, TokenSource,
    U256,
};
use rugmirror_storage::{
    BackgroundJobs, CacheNamespace, ChainConfigCache, KeyValueStore, RecordCodec, RecordStore,
};
use serde::{Deserialize, Serialize};

use crate::config::ApiConfig;

// ============================================================================
// REQUEST / RESPONSE TYPES
// ============================================================================

/// Query parameters for a collection page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionQuery {
    pub chain_id: Option<ChainId>,
    pub limit: Option<u32>,
    pub offset: Option<u64>,
    #[serde(default)]
    pub clear_cache: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: u64,
    pub limit: u32,
    pub offset: u64,
    pub total: u64,
    pub total_pages: u64,
    pub has_next: bool,
    pub has_prev: bool,
}

impl Pagination {
    fn new(offset: u64, limit: u32, total: u64) -> Self {
        let per_page = u64::from(limit.max(1));
        let page = offset / per_page + 1;
        let total_pages = total.div_ceil(per_page).max(1);
        Self {
            page,
            limit,
            offset,
            total,
            total_pages,
            has_next: page < total_pages,
            has_prev: page > 1,
        }
    }
}

/// Coarse statistics over the tokens on the returned page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionStats {
    pub total_nfts: u64,
    pub max_supply: u64,
    pub listed_count: u64,
    /// Lowest active listing price in wei.
    #[serde(default, with = "decimal::option")]
    pub floor_price: Option<U256>,
    pub unique_owners: u64,
}

impl CollectionStats {
    fn from_page(nfts: &[DerivedView], total_nfts: u64, max_supply: u64) -> Self {
        let listing_prices: Vec<U256> = nfts
            .iter()
            .filter_map(|nft| nft.dynamic.record.active_listing_price())
            .collect();
        let owners: HashSet<&str> = nfts
            .iter()
            .map(|nft| nft.dynamic.record.current_owner.as_str())
            .collect();
        Self {
            total_nfts,
            max_supply,
            listed_count: listing_prices.len() as u64,
            floor_price: listing_prices.iter().min().copied(),
            unique_owners: owners.len() as u64,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionPage {
    pub nfts: Vec<DerivedView>,
    pub pagination: Pagination,
    pub stats: CollectionStats,
}

// ============================================================================
// PER-CHAIN WIRING
// ============================================================================

/// Set while a background refresh of one kind runs for one chain.
#[derive(Debug, Clone, Default)]
struct RefreshFlag(Arc<AtomicBool>);

impl RefreshFlag {
    /// `None` when a refresh is already running.
    fn try_claim(&self) -> Option<RefreshClaim> {
        self.0
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RefreshClaim(Arc::clone(&self.0)))
    }
}

/// Clears its flag when dropped, including when the job fails.
struct RefreshClaim(Arc<AtomicBool>);

impl Drop for RefreshClaim {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Store, config cache and chain source for one deployment.
pub struct ChainMirror {
    chain_id: ChainId,
    records: RecordStore<dyn KeyValueStore>,
    configs: Arc<ChainConfigCache<dyn KeyValueStore>>,
    tokens: Arc<dyn TokenSource>,
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    supply_refresh: RefreshFlag,
    stats_refresh: RefreshFlag,
}

impl ChainMirror {
    /// Wire a chain's caches over a shared store.
    ///
    /// Legacy record migrations for this chain run on `jobs`.
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        namespace: CacheNamespace,
        tokens: Arc<dyn TokenSource>,
        config_source: Arc<dyn ConfigSource>,
        clock: Arc<dyn Clock>,
        jobs: BackgroundJobs,
        config_ttl: Duration,
    ) -> Self {
        let codec = RecordCodec::new();
        let configs = Arc::new(
            ChainConfigCache::new(Arc::clone(&store), config_source, codec, Arc::clone(&clock))
                .with_ttl(config_ttl),
        );
        let chain_id = namespace.chain_id();
        let records = RecordStore::new(
            Arc::clone(&store),
            namespace,
            codec,
            Arc::clone(&configs),
            Arc::clone(&clock),
        )
        .with_migration(Arc::clone(&tokens), jobs);
        Self {
            chain_id,
            records,
            configs,
            tokens,
            store,
            clock,
            supply_refresh: RefreshFlag::default(),
            stats_refresh: RefreshFlag::default(),
        }
    }

    pub fn chain_id(&self) -> ChainId {
        self.chain_id
    }

    pub fn records(&self) -> &RecordStore<dyn KeyValueStore> {
        &self.records
    }

    /// Backing store, shared with every other chain on this server.
    pub fn store(&self) -> &Arc<dyn KeyValueStore> {
        &self.store
    }
}

impl std::fmt::Debug for ChainMirror {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainMirror")
            .field("namespace", self.records.namespace())
            .finish()
    }
}

/// Result of filling one cache miss.
enum Fill {
    Found(Box<DerivedView>),
    Absent,
    Failed(MirrorError),
}

impl ChainMirror {
    /// Fetch one token from the chain, persist it, and read it back.
    async fn fill(&self, token_id: TokenId) -> Fill {
        let record = match self.tokens.fetch_token(token_id).await {
            Ok(Some(record)) => record,
            Ok(None) => return Fill::Absent,
            Err(error) => return Fill::Failed(error),
        };

        if let Err(error) = self.records.set_composite(&record).await {
            tracing::warn!(
                chain_id = self.chain_id,
                token_id,
                error = %error,
                "failed to cache fetched token"
            );
            return Fill::Found(Box::new(self.records.compose(record).await));
        }
        match self.records.get_composite(token_id).await {
            Some(view) => Fill::Found(Box::new(view)),
            // Written but not readable back (evicted or a racing delete).
            None => Fill::Found(Box::new(self.records.compose(record).await)),
        }
    }
}

// ============================================================================
// ASSEMBLER
// ============================================================================

/// Limits applied to every request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssemblerSettings {
    pub default_chain_id: ChainId,
    pub default_page_size: u32,
    pub max_page_size: u32,
    pub max_supply: u64,
}

impl From<&ApiConfig> for AssemblerSettings {
    fn from(config: &ApiConfig) -> Self {
        Self {
            default_chain_id: config.default_chain_id,
            default_page_size: config.default_page_size,
            max_page_size: config.max_page_size,
            max_supply: config.max_supply,
        }
    }
}

impl Default for AssemblerSettings {
    fn default() -> Self {
        Self::from(&ApiConfig::default())
    }
}

/// Answers collection and token queries for every configured chain.
pub struct CollectionAssembler {
    settings: AssemblerSettings,
    chains: HashMap<ChainId, ChainMirror>,
    jobs: BackgroundJobs,
}

impl CollectionAssembler {
    pub fn new(settings: AssemblerSettings, jobs: BackgroundJobs) -> Self {
        Self {
            settings,
            chains: HashMap::new(),
            jobs,
        }
    }

    pub fn with_chain(mut self, mirror: ChainMirror) -> Self {
        self.chains.insert(mirror.chain_id(), mirror);
        self
    }

    pub fn settings(&self) -> &AssemblerSettings {
        &self.settings
    }

    pub fn jobs(&self) -> &BackgroundJobs {
        &self.jobs
    }

    pub fn chain_ids(&self) -> Vec<ChainId> {
        let mut ids: Vec<ChainId> = self.chains.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    fn mirror(&self, chain_id: Option<ChainId>) -> MirrorResult<&ChainMirror> {
        let chain_id = chain_id.unwrap_or(self.settings.default_chain_id);
        self.chains
            .get(&chain_id)
            .ok_or_else(|| ConfigError::UnknownChain { chain_id }.into())
    }

    /// One page of the collection, in token id order.
    pub async fn collection(&self, query: CollectionQuery) -> MirrorResult<CollectionPage> {
        let mirror = self.mirror(query.chain_id)?;
        let chain_id = mirror.chain_id();
        let limit = self.page_size(query.limit)?;
        let offset = query.offset.unwrap_or(0);

        let supply = self.resolve_supply(mirror).await?;
        let token_ids = window(offset, limit, supply);

        if query.clear_cache && !token_ids.is_empty() {
            match mirror.records.delete_tokens(&token_ids).await {
                Ok(removed) => tracing::info!(chain_id, removed, "cleared cached window"),
                Err(error) => {
                    tracing::warn!(chain_id, error = %error, "failed to clear cached window")
                }
            }
        }

        let cached = mirror.records.get_composite_batch(&token_ids).await;
        let misses: Vec<TokenId> = token_ids
            .iter()
            .zip(&cached)
            .filter(|(_, view)| view.is_none())
            .map(|(id, _)| *id)
            .collect();
        tracing::debug!(
            chain_id,
            requested = token_ids.len(),
            hits = token_ids.len() - misses.len(),
            misses = misses.len(),
            "collection window read from cache"
        );

        let mut filled = self.fill_gaps(mirror, &misses).await?;

        let nfts: Vec<DerivedView> = token_ids
            .iter()
            .zip(cached)
            .filter_map(|(id, view)| view.or_else(|| filled.remove(id)))
            .collect();

        let stats = CollectionStats::from_page(&nfts, supply, self.settings.max_supply);
        Ok(CollectionPage {
            nfts,
            pagination: Pagination::new(offset, limit, supply),
            stats,
        })
    }

    /// A single token, cache first. `Ok(None)` means it does not exist.
    pub async fn token(
        &self,
        chain_id: Option<ChainId>,
        token_id: TokenId,
    ) -> MirrorResult<Option<DerivedView>> {
        let mirror = self.mirror(chain_id)?;
        self.validate_token_id(token_id)?;
        if let Some(view) = mirror.records.get_composite(token_id).await {
            return Ok(Some(view));
        }
        self.fill_single(mirror, token_id).await
    }

    /// Drop the cached token and read it again from the chain.
    pub async fn refresh_token(
        &self,
        chain_id: Option<ChainId>,
        token_id: TokenId,
    ) -> MirrorResult<Option<DerivedView>> {
        let mirror = self.mirror(chain_id)?;
        self.validate_token_id(token_id)?;
        if let Err(error) = mirror.records.delete_tokens(&[token_id]).await {
            tracing::warn!(
                chain_id = mirror.chain_id(),
                token_id,
                error = %error,
                "failed to delete cached token before refresh"
            );
        }
        self.fill_single(mirror, token_id).await
    }

    /// Drop the cached chain configuration; the next read refetches it.
    pub async fn invalidate_config(&self, chain_id: ChainId) -> MirrorResult<()> {
        let mirror = self.mirror(Some(chain_id))?;
        mirror.configs.invalidate(chain_id).await
    }

    /// Re-read the chain configuration now, e.g. after an on-chain change.
    pub async fn refresh_config(&self, chain_id: ChainId) -> MirrorResult<ChainConfig> {
        let mirror = self.mirror(Some(chain_id))?;
        mirror.configs.refresh(chain_id).await
    }

    /// Collection-wide stats. A cached summary is returned immediately and
    /// recomputed in the background; otherwise it is computed now.
    ///
    /// A marketplace read failure on the slow path yields zeroed market
    /// figures rather than an error. Supply failures fail the request.
    pub async fn collection_stats(&self, chain_id: Option<ChainId>) -> MirrorResult<CollectionSummary> {
        let mirror = self.mirror(chain_id)?;
        let chain_id = mirror.chain_id();
        if let Some(stats) = mirror.records.get_collection_stats().await {
            self.spawn_stats_refresh(mirror, stats.clone());
            return Ok(stats);
        }

        let supply = self.resolve_supply(mirror).await?;
        let market = match fetch_market(mirror.tokens.as_ref(), supply).await {
            Ok(market) => market,
            Err(error) => {
                tracing::warn!(chain_id, error = %error, "marketplace stats unavailable, reporting zeros");
                MarketSummary::default()
            }
        };
        let stats = summarize(
            &mirror.records,
            mirror.clock.as_ref(),
            supply,
            self.settings.max_supply,
            market,
        )
        .await;
        if let Err(error) = mirror.records.set_collection_stats(&stats).await {
            tracing::warn!(chain_id, error = %error, "failed to cache collection stats");
        }
        Ok(stats)
    }

    // ========================================================================
    // INTERNALS
    // ========================================================================

    /// Requested page size, capped at the configured maximum. Zero is rejected.
    fn page_size(&self, limit: Option<u32>) -> MirrorResult<u32> {
        let limit = limit.unwrap_or(self.settings.default_page_size);
        if limit == 0 {
            return Err(ConfigError::InvalidValue {
                field: "limit".to_string(),
                value: limit.to_string(),
                reason: "must be at least 1".to_string(),
            }
            .into());
        }
        if limit > self.settings.max_page_size {
            tracing::debug!(
                requested = limit,
                max_page_size = self.settings.max_page_size,
                "page size capped"
            );
        }
        Ok(limit.min(self.settings.max_page_size))
    }

    fn validate_token_id(&self, token_id: TokenId) -> MirrorResult<()> {
        if token_id == 0 || token_id > self.settings.max_supply {
            return Err(ConfigError::InvalidValue {
                field: "tokenId".to_string(),
                value: token_id.to_string(),
                reason: format!("must be between 1 and {}", self.settings.max_supply),
            }
            .into());
        }
        Ok(())
    }

    async fn resolve_supply(&self, mirror: &ChainMirror) -> MirrorResult<u64> {
        let chain_id = mirror.chain_id();
        let supply = match mirror.records.get_total_supply().await {
            Some(supply) => {
                self.spawn_supply_refresh(mirror);
                supply
            }
            None => {
                let supply = mirror
                    .tokens
                    .fetch_total_supply()
                    .await
                    .map_err(|error| supply_unavailable(chain_id, error))?;
                if let Err(error) = mirror.records.set_total_supply(supply).await {
                    tracing::warn!(chain_id, error = %error, "failed to cache total supply");
                }
                supply
            }
        };
        if supply > self.settings.max_supply {
            tracing::warn!(
                chain_id,
                supply,
                max_supply = self.settings.max_supply,
                "reported supply above ceiling, clamping"
            );
        }
        Ok(supply.min(self.settings.max_supply))
    }

    fn spawn_supply_refresh(&self, mirror: &ChainMirror) {
        let Some(claim) = mirror.supply_refresh.try_claim() else {
            tracing::trace!(chain_id = mirror.chain_id(), "supply refresh already running");
            return;
        };
        let records = mirror.records.clone();
        let tokens = Arc::clone(&mirror.tokens);
        self.jobs.spawn("total-supply-refresh", async move {
            let _claim = claim;
            let supply = tokens.fetch_total_supply().await?;
            records.set_total_supply(supply).await
        });
    }

    /// Recompute stats from the chain. A failed marketplace read keeps the
    /// cached summary in place.
    fn spawn_stats_refresh(&self, mirror: &ChainMirror, previous: CollectionSummary) {
        let Some(claim) = mirror.stats_refresh.try_claim() else {
            tracing::trace!(chain_id = mirror.chain_id(), "stats refresh already running");
            return;
        };
        let records = mirror.records.clone();
        let tokens = Arc::clone(&mirror.tokens);
        let clock = Arc::clone(&mirror.clock);
        let max_supply = self.settings.max_supply;
        self.jobs.spawn("collection-stats-refresh", async move {
            let _claim = claim;
            let supply = records
                .get_total_supply()
                .await
                .unwrap_or(previous.total_supply)
                .min(max_supply);
            let market = fetch_market(tokens.as_ref(), supply).await?;
            let stats = summarize(&records, clock.as_ref(), supply, max_supply, market).await;
            records.set_collection_stats(&stats).await
        });
    }

    /// Fetch every miss concurrently. Fails only when every miss errored.
    async fn fill_gaps(
        &self,
        mirror: &ChainMirror,
        misses: &[TokenId],
    ) -> MirrorResult<HashMap<TokenId, DerivedView>> {
        let chain_id = mirror.chain_id();
        let outcomes = join_all(misses.iter().map(|id| mirror.fill(*id))).await;

        let mut filled = HashMap::with_capacity(misses.len());
        let mut failed = 0usize;
        for (token_id, outcome) in misses.iter().copied().zip(outcomes) {
            match outcome {
                Fill::Found(view) => {
                    filled.insert(token_id, *view);
                }
                Fill::Absent => {
                    tracing::debug!(chain_id, token_id, "token does not exist, omitting");
                }
                Fill::Failed(error) => {
                    failed += 1;
                    tracing::warn!(chain_id, token_id, error = %error, "token fetch failed");
                }
            }
        }

        if failed > 0 && failed == misses.len() {
            tracing::error!(chain_id, count = failed, "every token fetch in window failed");
            return Err(ChainError::AllFetchesFailed {
                chain_id,
                count: failed,
            }
            .into());
        }
        if failed > 0 {
            tracing::warn!(
                chain_id,
                failed,
                requested = misses.len(),
                "partial window, omitting failed tokens"
            );
        }
        Ok(filled)
    }

    async fn fill_single(
        &self,
        mirror: &ChainMirror,
        token_id: TokenId,
    ) -> MirrorResult<Option<DerivedView>> {
        match mirror.fill(token_id).await {
            Fill::Found(view) => Ok(Some(*view)),
            Fill::Absent => Ok(None),
            Fill::Failed(error) => {
                tracing::warn!(
                    chain_id = mirror.chain_id(),
                    token_id,
                    error = %error,
                    "token fetch failed"
                );
                Err(error)
            }
        }
    }
}

impl std::fmt::Debug for CollectionAssembler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectionAssembler")
            .field("settings", &self.settings)
            .field("chains", &self.chain_ids())
            .finish()
    }
}

/// Token ids `offset+1 ..= offset+limit`, bounded by `supply`.
pub fn window(offset: u64, limit: u32, supply: u64) -> Vec<TokenId> {
    let start = offset.saturating_add(1);
    let end = offset.saturating_add(u64::from(limit)).min(supply);
    if start > end {
        return Vec::new();
    }
    (start..=end).collect()
}

async fn fetch_market(tokens: &dyn TokenSource, supply: u64) -> MirrorResult<MarketSummary> {
    tokens
        .fetch_market_summary(supply.min(FLOOR_SCAN_LIMIT))
        .await
}

async fn summarize(
    records: &RecordStore<dyn KeyValueStore>,
    clock: &dyn Clock,
    supply: u64,
    max_supply: u64,
    market: MarketSummary,
) -> CollectionSummary {
    let minted: Vec<TokenId> = (1..=supply).collect();
    CollectionSummary {
        total_supply: supply,
        max_supply,
        market,
        unique_owners: records.unique_owners(&minted).await,
        last_updated: u64::try_from(clock.now().timestamp_millis()).unwrap_or(0),
    }
}

fn supply_unavailable(chain_id: ChainId, error: MirrorError) -> MirrorError {
    match error {
        MirrorError::Chain(ChainError::SupplyUnavailable { .. }) => error,
        other => ChainError::SupplyUnavailable {
            chain_id,
            reason: other.to_string(),
        }
        .into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_window_bounds() {
        assert_eq!(window(0, 5, 100), vec![1, 2, 3, 4, 5]);
        assert_eq!(window(98, 5, 100), vec![99, 100]);
        assert!(window(100, 5, 100).is_empty());
        assert!(window(0, 5, 0).is_empty());
    }

    #[test]
    fn test_pagination() {
        let p = Pagination::new(0, 24, 100);
        assert_eq!((p.page, p.total_pages, p.has_next, p.has_prev), (1, 5, true, false));

        let p = Pagination::new(96, 24, 100);
        assert_eq!((p.page, p.has_next, p.has_prev), (5, false, true));

        let p = Pagination::new(0, 24, 0);
        assert_eq!((p.page, p.total_pages, p.has_next), (1, 1, false));
    }

    #[test]
    fn test_query_deserializes_camel_case() {
        let query: CollectionQuery =
            serde_json::from_str(r#"{"chainId":8453,"limit":10,"offset":20,"clearCache":true}"#)
                .unwrap();
        assert_eq!(
            query,
            CollectionQuery {
                chain_id: Some(8453),
                limit: Some(10),
                offset: Some(20),
                clear_cache: true,
            }
        );
        let empty: CollectionQuery = serde_json::from_str("{}").unwrap();
        assert!(!empty.clear_cache);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(1000))]

        #[test]
        fn prop_window_within_supply(offset in 0u64..20_000, limit in 1u32..=50, supply in 0u64..10_000) {
            let ids = window(offset, limit, supply);
            prop_assert!(ids.len() <= limit as usize);
            prop_assert!(ids.iter().all(|id| *id > offset && *id <= supply));
            prop_assert!(ids.windows(2).all(|w| w[1] == w[0] + 1));
        }
    }
}
