//! Composes per-token records from individual contract reads.
//!
//! Only the owner lookup and the rug data are required. Aging, maintenance
//! and listing reads each fall back to a default when they fail, so a flaky
//! marketplace facet never hides a token.

use crate::abi;
use crate::{ContractCalls, RawAgingData, RawListing, RawRugData};
use async_trait::async_trait;
use rugmirror_core::constants::{COLLECTION_DESCRIPTION, COLLECTION_NAME, DEFAULT_IMAGE};
use rugmirror_core::{
    is_zero_address, normalize_address, AcquiredVia, Address, AgingThresholds, ChainError,
    ChainId, Clock, ConfigError, ConfigSource, DynamicRecord, FrameTier, MarketSummary,
    MirrorError, MirrorResult, OwnershipEntry, PermanentRecord, TokenId, TokenRecord,
    TokenSource, U256,
};
use std::sync::Arc;

/// Revert reasons that mean "this token was never minted".
const NONEXISTENT_PHRASES: [&str; 3] = [
    "invalid token",
    "nonexistent token",
    "token does not exist",
];

/// Whether `error` is the contract saying the token does not exist.
pub fn is_nonexistent_token(error: &MirrorError) -> bool {
    let MirrorError::Chain(ChainError::Reverted { message, .. }) = error else {
        return false;
    };
    let lower = message.to_ascii_lowercase();
    NONEXISTENT_PHRASES.iter().any(|p| lower.contains(p))
        || lower.contains(&abi::nonexistent_token_selector())
}

/// Active, priced and not yet expired at `now_secs`.
fn is_open(listing: &RawListing, now_secs: u64) -> bool {
    listing.is_active
        && !listing.price.is_zero()
        && (listing.expires_at == 0 || listing.expires_at > now_secs)
}

/// Reads tokens and configuration for one contract on one chain.
pub struct ChainReader<C: ContractCalls> {
    contract: C,
    chain_id: ChainId,
    clock: Arc<dyn Clock>,
}

impl<C: ContractCalls> ChainReader<C> {
    pub fn new(contract: C, chain_id: ChainId, clock: Arc<dyn Clock>) -> Self {
        Self {
            contract,
            chain_id,
            clock,
        }
    }

    pub fn chain_id(&self) -> ChainId {
        self.chain_id
    }

    pub fn contract(&self) -> &C {
        &self.contract
    }

    fn permanent(&self, token_id: TokenId, rug: RawRugData) -> PermanentRecord {
        PermanentRecord {
            token_id,
            seed: rug.seed,
            name: format!("{} #{}", COLLECTION_NAME, token_id),
            description: COLLECTION_DESCRIPTION.to_string(),
            image: DEFAULT_IMAGE.to_string(),
            palette_name: rug.palette_name,
            minified_palette: rug.minified_palette,
            minified_stripe_data: rug.minified_stripe_data,
            text_rows: rug.text_rows,
            warp_thickness: rug.warp_thickness,
            mint_time: rug.mint_time,
            filtered_character_map: rug.filtered_character_map,
            character_count: rug.character_count,
            stripe_count: rug.stripe_count,
            curator: normalize_address(&rug.curator),
        }
    }

    fn now_secs(&self) -> u64 {
        u64::try_from(self.clock.now().timestamp()).unwrap_or(0)
    }

    fn dynamic(
        &self,
        owner: Address,
        mint_time: u64,
        aging: Option<RawAgingData>,
        maintenance_score: u64,
        listing: Option<RawListing>,
    ) -> DynamicRecord {
        let now = self.clock.now();
        let now_secs = u64::try_from(now.timestamp()).unwrap_or(0);
        let now_millis = u64::try_from(now.timestamp_millis()).unwrap_or(0);

        let listing = listing.filter(|l| is_open(l, now_secs));
        let nonzero = |value: u64| (value > 0).then_some(value);

        let mut record = DynamicRecord {
            base_aging_level: 0,
            frame_level: FrameTier::None,
            maintenance_score,
            last_cleaned: now_secs,
            cleaning_count: None,
            restoration_count: None,
            master_restoration_count: None,
            laundering_count: None,
            last_laundered: None,
            frame_achieved_time: None,
            current_owner: owner.clone(),
            ownership_history: vec![OwnershipEntry {
                owner,
                acquired_at: mint_time,
                acquired_via: AcquiredVia::Mint,
                tx_hash: None,
            }],
            sale_history: Vec::new(),
            is_listed: listing.is_some(),
            listing_price: listing.as_ref().map(|l| l.price),
            listing_seller: listing.as_ref().map(|l| normalize_address(&l.seller)),
            listing_expires_at: listing.as_ref().and_then(|l| nonzero(l.expires_at)),
            last_sale_price: None,
            recent_sale_prices: Vec::new(),
            last_updated: now_millis,
        };

        if let Some(aging) = aging {
            record.base_aging_level = aging.aging_level;
            record.frame_level = FrameTier::from_level(aging.frame_level.into());
            record.last_cleaned = aging.last_cleaned;
            record.cleaning_count = Some(aging.cleaning_count);
            record.restoration_count = Some(aging.restoration_count);
            record.master_restoration_count = Some(aging.master_restoration_count);
            record.laundering_count = Some(aging.laundering_count);
            record.last_laundered = nonzero(aging.last_laundered);
            record.frame_achieved_time = nonzero(aging.frame_achieved_time);
            record.last_sale_price =
                (!aging.last_sale_price.is_zero()).then_some(aging.last_sale_price);
            record.recent_sale_prices = aging.recent_sale_prices;
        }
        record
    }
}

#[async_trait]
impl<C: ContractCalls> TokenSource for ChainReader<C> {
    async fn fetch_token(&self, token_id: TokenId) -> MirrorResult<Option<TokenRecord>> {
        let fail = |error: MirrorError| -> MirrorError {
            ChainError::TokenFetchFailed {
                token_id,
                reason: error.to_string(),
            }
            .into()
        };

        let owner = match self.contract.owner_of(token_id).await {
            Ok(owner) if is_zero_address(&owner) => {
                tracing::debug!(chain_id = self.chain_id, token_id, "token has zero owner");
                return Ok(None);
            }
            Ok(owner) => normalize_address(&owner),
            Err(error) if is_nonexistent_token(&error) => {
                tracing::debug!(chain_id = self.chain_id, token_id, "token does not exist");
                return Ok(None);
            }
            Err(error) => return Err(fail(error)),
        };

        let rug = self.contract.rug_data(token_id).await.map_err(fail)?;

        let (aging, score, listing) = tokio::join!(
            self.contract.aging_data(token_id),
            self.contract.maintenance_score(token_id),
            self.contract.listing(token_id),
        );

        let aging = aging
            .map_err(|error| {
                tracing::warn!(
                    chain_id = self.chain_id,
                    token_id,
                    error = %error,
                    "aging data unavailable, using defaults"
                );
            })
            .ok();
        let score = score.unwrap_or_else(|error| {
            tracing::warn!(
                chain_id = self.chain_id,
                token_id,
                error = %error,
                "maintenance score unavailable, using 0"
            );
            0
        });
        let listing = listing
            .map_err(|error| {
                tracing::warn!(
                    chain_id = self.chain_id,
                    token_id,
                    error = %error,
                    "listing unavailable, treating as not listed"
                );
            })
            .ok();

        let mint_time = rug.mint_time;
        let permanent = self.permanent(token_id, rug);
        let dynamic = self.dynamic(owner, mint_time, aging, score, listing);
        Ok(Some(TokenRecord { permanent, dynamic }))
    }

    async fn fetch_total_supply(&self) -> MirrorResult<u64> {
        self.contract.total_supply().await.map_err(|error| {
            ChainError::SupplyUnavailable {
                chain_id: self.chain_id,
                reason: error.to_string(),
            }
            .into()
        })
    }

    async fn fetch_market_summary(&self, scan_count: u64) -> MirrorResult<MarketSummary> {
        let stats = self.contract.marketplace_stats().await?;

        let now_secs = self.now_secs();
        let mut floor: Option<U256> = None;
        for token_id in 1..=scan_count {
            match self.contract.listing(token_id).await {
                Ok(listing) if is_open(&listing, now_secs) => {
                    floor = Some(floor.map_or(listing.price, |f| f.min(listing.price)));
                }
                Ok(_) => {}
                Err(error) => tracing::debug!(
                    chain_id = self.chain_id,
                    token_id,
                    error = %error,
                    "listing unreadable, skipped in floor scan"
                ),
            }
        }

        Ok(MarketSummary {
            total_volume: stats.total_volume,
            total_sales: stats.total_sales,
            floor_price: floor,
        })
    }
}

#[async_trait]
impl<C: ContractCalls> ConfigSource for ChainReader<C> {
    async fn fetch_thresholds(&self, chain_id: ChainId) -> MirrorResult<AgingThresholds> {
        if chain_id != self.chain_id {
            return Err(ConfigError::UnknownChain { chain_id }.into());
        }
        let [dirt_level1_days, dirt_level2_days, aging_advance_days, free_clean_days, free_clean_window] =
            self.contract.aging_thresholds().await?;
        Ok(AgingThresholds {
            dirt_level1_days,
            dirt_level2_days,
            aging_advance_days,
            free_clean_days,
            free_clean_window,
        })
    }
}

impl<C: ContractCalls> std::fmt::Debug for ChainReader<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainReader")
            .field("chain_id", &self.chain_id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RawMarketStats;
    use chrono::DateTime;
    use rugmirror_core::ManualClock;
    use std::collections::HashMap;
    use std::sync::Mutex;

    const OWNER: &str = "0xAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA";
    const NOW: i64 = 1_700_000_000;

    fn reverted(message: &str) -> MirrorError {
        ChainError::Reverted {
            method: "ownerOf".to_string(),
            message: message.to_string(),
        }
        .into()
    }

    fn transport() -> MirrorError {
        ChainError::Transport {
            endpoint: "mock".to_string(),
            reason: "connection reset".to_string(),
        }
        .into()
    }

    /// Contract whose individual reads can be switched to fail.
    struct MockContract {
        owner: Mutex<MirrorResult<Address>>,
        rug_fails: bool,
        aging_fails: bool,
        score_fails: bool,
        listing: Mutex<MirrorResult<RawListing>>,
        /// Per-token listings; tokens not present use `listing`.
        listings: HashMap<TokenId, MirrorResult<RawListing>>,
        stats_fail: bool,
    }

    fn open_listing(price: u64) -> RawListing {
        RawListing {
            seller: OWNER.to_string(),
            price: U256::from(price),
            expires_at: (NOW + 3600) as u64,
            is_active: true,
        }
    }

    impl Default for MockContract {
        fn default() -> Self {
            Self {
                owner: Mutex::new(Ok(OWNER.to_string())),
                rug_fails: false,
                aging_fails: false,
                score_fails: false,
                listing: Mutex::new(Ok(open_listing(2_000_000_000_000_000))),
                listings: HashMap::new(),
                stats_fail: false,
            }
        }
    }

    #[async_trait]
    impl ContractCalls for MockContract {
        async fn total_supply(&self) -> MirrorResult<u64> {
            Ok(42)
        }

        async fn owner_of(&self, _token_id: TokenId) -> MirrorResult<Address> {
            self.owner.lock().unwrap().clone()
        }

        async fn rug_data(&self, _token_id: TokenId) -> MirrorResult<RawRugData> {
            if self.rug_fails {
                return Err(transport());
            }
            Ok(RawRugData {
                seed: U256::MAX - U256::from(1),
                text_rows: vec!["GM".to_string()],
                palette_name: "Sunset".to_string(),
                minified_palette: "{}".to_string(),
                minified_stripe_data: "[]".to_string(),
                warp_thickness: 3,
                mint_time: 1_690_000_000,
                filtered_character_map: "{}".to_string(),
                curator: OWNER.to_string(),
                character_count: 2,
                stripe_count: 14,
            })
        }

        async fn aging_data(&self, _token_id: TokenId) -> MirrorResult<RawAgingData> {
            if self.aging_fails {
                return Err(transport());
            }
            Ok(RawAgingData {
                last_cleaned: 1_699_000_000,
                aging_level: 4,
                frame_level: 2,
                frame_achieved_time: 1_695_000_000,
                cleaning_count: 6,
                restoration_count: 1,
                master_restoration_count: 0,
                laundering_count: 0,
                last_laundered: 0,
                last_sale_price: U256::from(3_000_000_000_000_000u64),
                recent_sale_prices: vec![
                    U256::from(1_000_000_000_000_000u64),
                    U256::from(3_000_000_000_000_000u64),
                ],
            })
        }

        async fn maintenance_score(&self, _token_id: TokenId) -> MirrorResult<u64> {
            if self.score_fails {
                return Err(transport());
            }
            Ok(120)
        }

        async fn listing(&self, token_id: TokenId) -> MirrorResult<RawListing> {
            match self.listings.get(&token_id) {
                Some(listing) => listing.clone(),
                None => self.listing.lock().unwrap().clone(),
            }
        }

        async fn aging_thresholds(&self) -> MirrorResult<[u64; 5]> {
            Ok([7, 14, 30, 30, 11])
        }

        async fn marketplace_stats(&self) -> MirrorResult<RawMarketStats> {
            if self.stats_fail {
                return Err(transport());
            }
            Ok(RawMarketStats {
                total_volume: U256::from(9_000_000_000_000_000_000u64),
                total_sales: 12,
            })
        }
    }

    fn reader(contract: MockContract) -> ChainReader<MockContract> {
        let clock = Arc::new(ManualClock::new(DateTime::from_timestamp(NOW, 0).unwrap()));
        ChainReader::new(contract, 84532, clock)
    }

    #[tokio::test]
    async fn test_fetch_token_builds_both_halves() {
        let record = reader(MockContract::default())
            .fetch_token(7)
            .await
            .unwrap()
            .expect("token exists");

        assert_eq!(record.token_id(), 7);
        assert_eq!(record.permanent.name, "OnchainRug #7");
        assert_eq!(record.permanent.description, "OnchainRugs by valipokkann");
        assert_eq!(record.permanent.image, "/logo.png");
        assert_eq!(record.permanent.seed, U256::MAX - U256::from(1));

        let dynamic = &record.dynamic;
        assert_eq!(dynamic.current_owner, OWNER.to_ascii_lowercase());
        assert_eq!(dynamic.base_aging_level, 4);
        assert_eq!(dynamic.frame_level, FrameTier::Silver);
        assert_eq!(dynamic.maintenance_score, 120);
        assert_eq!(dynamic.cleaning_count, Some(6));
        assert_eq!(dynamic.last_laundered, None);
        assert!(dynamic.is_listed);
        assert_eq!(dynamic.listing_price, Some(U256::from(2_000_000_000_000_000u64)));
        assert_eq!(dynamic.last_updated, (NOW * 1000) as u64);
        assert_eq!(dynamic.ownership_history.len(), 1);
        assert_eq!(dynamic.ownership_history[0].acquired_via, AcquiredVia::Mint);
        assert_eq!(dynamic.ownership_history[0].acquired_at, 1_690_000_000);
    }

    #[tokio::test]
    async fn test_zero_owner_is_absent() {
        let contract = MockContract {
            owner: Mutex::new(Ok(rugmirror_core::constants::ZERO_ADDRESS.to_string())),
            ..Default::default()
        };
        assert!(reader(contract).fetch_token(7).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_nonexistent_reverts_are_absent() {
        for message in [
            "execution reverted: ERC721: invalid token ID",
            "execution reverted (data: 0x7e2732890000000000000000000000000000000000000000000000000000000000000007)",
            "Token does not exist",
        ] {
            let contract = MockContract {
                owner: Mutex::new(Err(reverted(message))),
                ..Default::default()
            };
            assert!(
                reader(contract).fetch_token(7).await.unwrap().is_none(),
                "{message}"
            );
        }
    }

    #[tokio::test]
    async fn test_owner_transport_failure_is_an_error() {
        let contract = MockContract {
            owner: Mutex::new(Err(transport())),
            ..Default::default()
        };
        let err = reader(contract).fetch_token(7).await.unwrap_err();
        assert!(matches!(
            err,
            MirrorError::Chain(ChainError::TokenFetchFailed { token_id: 7, .. })
        ));
    }

    #[tokio::test]
    async fn test_rug_data_failure_fails_token() {
        let contract = MockContract {
            rug_fails: true,
            ..Default::default()
        };
        assert!(reader(contract).fetch_token(7).await.is_err());
    }

    #[tokio::test]
    async fn test_optional_reads_default_on_failure() {
        let contract = MockContract {
            aging_fails: true,
            score_fails: true,
            listing: Mutex::new(Err(transport())),
            ..Default::default()
        };
        let record = reader(contract).fetch_token(7).await.unwrap().unwrap();

        let dynamic = record.dynamic;
        assert_eq!(dynamic.base_aging_level, 0);
        assert_eq!(dynamic.frame_level, FrameTier::None);
        assert_eq!(dynamic.last_cleaned, NOW as u64);
        assert_eq!(dynamic.maintenance_score, 0);
        assert_eq!(dynamic.cleaning_count, None);
        assert!(!dynamic.is_listed);
        assert_eq!(dynamic.listing_price, None);
    }

    #[tokio::test]
    async fn test_expired_or_inactive_listing_is_not_listed() {
        for listing in [
            RawListing {
                seller: OWNER.to_string(),
                price: U256::from(1),
                expires_at: (NOW - 1) as u64,
                is_active: true,
            },
            RawListing {
                seller: OWNER.to_string(),
                price: U256::from(1),
                expires_at: 0,
                is_active: false,
            },
        ] {
            let contract = MockContract {
                listing: Mutex::new(Ok(listing)),
                ..Default::default()
            };
            let record = reader(contract).fetch_token(7).await.unwrap().unwrap();
            assert!(!record.dynamic.is_listed);
        }
    }

    #[tokio::test]
    async fn test_aging_history_is_kept() {
        let record = reader(MockContract::default()).fetch_token(7).await.unwrap().unwrap();

        let dynamic = record.dynamic;
        assert_eq!(dynamic.frame_achieved_time, Some(1_695_000_000));
        assert_eq!(
            dynamic.last_sale_price,
            Some(U256::from(3_000_000_000_000_000u64))
        );
        assert_eq!(
            dynamic.recent_sale_prices,
            vec![
                U256::from(1_000_000_000_000_000u64),
                U256::from(3_000_000_000_000_000u64),
            ]
        );
    }

    #[tokio::test]
    async fn test_market_summary_floor_skips_closed_and_failed_listings() {
        let mut listings = HashMap::new();
        listings.insert(1, Ok(open_listing(5_000)));
        listings.insert(
            2,
            Ok(RawListing {
                is_active: false,
                ..open_listing(10)
            }),
        );
        listings.insert(3, Err(transport()));
        listings.insert(4, Ok(open_listing(3_000)));
        listings.insert(5, Ok(open_listing(0)));
        let contract = MockContract {
            listings,
            ..Default::default()
        };

        let summary = reader(contract).fetch_market_summary(5).await.unwrap();
        assert_eq!(summary.floor_price, Some(U256::from(3_000)));
        assert_eq!(summary.total_sales, 12);
        assert_eq!(
            summary.total_volume,
            U256::from(9_000_000_000_000_000_000u64)
        );
    }

    #[tokio::test]
    async fn test_market_summary_without_listings_has_no_floor() {
        let contract = MockContract {
            listing: Mutex::new(Ok(RawListing {
                is_active: false,
                ..open_listing(1)
            })),
            ..Default::default()
        };
        let summary = reader(contract).fetch_market_summary(3).await.unwrap();
        assert_eq!(summary.floor_price, None);

        let contract = MockContract {
            stats_fail: true,
            ..Default::default()
        };
        assert!(reader(contract).fetch_market_summary(3).await.is_err());
    }

    #[tokio::test]
    async fn test_thresholds_for_own_chain_only() {
        let reader = reader(MockContract::default());
        let thresholds = reader.fetch_thresholds(84532).await.unwrap();
        assert_eq!(thresholds.dirt_level1_days, 7);
        assert_eq!(thresholds.dirt_level2_days, 14);
        assert_eq!(thresholds.aging_advance_days, 30);
        assert_eq!(thresholds.free_clean_window, 11);

        let err = reader.fetch_thresholds(8453).await.unwrap_err();
        assert!(matches!(
            err,
            MirrorError::Config(ConfigError::UnknownChain { chain_id: 8453 })
        ));
    }

    #[tokio::test]
    async fn test_total_supply() {
        assert_eq!(
            reader(MockContract::default())
                .fetch_total_supply()
                .await
                .unwrap(),
            42
        );
    }

    #[test]
    fn test_is_nonexistent_token_ignores_other_errors() {
        assert!(!is_nonexistent_token(&transport()));
        assert!(!is_nonexistent_token(&reverted("execution reverted: paused")));
    }
}
