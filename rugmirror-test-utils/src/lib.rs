//! Rugmirror Test Utilities
//!
//! Shared test infrastructure for the rugmirror workspace:
//! - Mock token and config sources with call counters and failure injection
//! - A fault-injecting store wrapper
//! - Proptest generators for record types
//! - Fixtures for common scenarios

// Re-export core types for convenience
pub use rugmirror_core::{
    AcquiredVia, AgingThresholds, ChainConfig, ChainError, ChainId, Clock, ConfigError,
    ConfigSource, DerivedView, DynamicRecord, FrameTier, ManualClock, MarketSummary, MirrorError,
    MirrorResult, OwnershipEntry, PermanentRecord, SaleEntry, StorageError, TokenId, TokenRecord, TokenSource,
    U256,
};
pub use rugmirror_storage::{InMemoryStore, KeyValueStore, StoreStats};

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Notify;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn transport_error(reason: &str) -> MirrorError {
    ChainError::Transport {
        endpoint: "mock".to_string(),
        reason: reason.to_string(),
    }
    .into()
}

// ============================================================================
// MOCK SOURCES
// ============================================================================

/// In-memory token source.
///
/// Tokens not inserted read as nonexistent. Ids marked failing return a
/// transport error. Every fetch is counted per id. Supply reads can be held
/// open with [`Self::hold_supply`] until [`Self::release_supply`].
#[derive(Debug, Default)]
pub struct MockTokenSource {
    tokens: Mutex<HashMap<TokenId, TokenRecord>>,
    failing: Mutex<HashSet<TokenId>>,
    fetches: Mutex<HashMap<TokenId, usize>>,
    supply: Mutex<Option<u64>>,
    supply_failing: AtomicBool,
    supply_calls: AtomicUsize,
    supply_held: AtomicBool,
    supply_gate: Notify,
    market: Mutex<MarketSummary>,
    market_failing: AtomicBool,
    market_calls: AtomicUsize,
}

impl MockTokenSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Source holding `fixtures::token_record(id)` for ids `1..=count`, with
    /// supply `count`.
    pub fn with_minted(count: u64) -> Self {
        let source = Self::new();
        for id in 1..=count {
            source.insert(fixtures::token_record(id));
        }
        source.set_supply(count);
        source
    }

    pub fn insert(&self, record: TokenRecord) {
        lock(&self.tokens).insert(record.token_id(), record);
    }

    pub fn remove(&self, token_id: TokenId) {
        lock(&self.tokens).remove(&token_id);
    }

    /// Make fetches of `token_id` fail until [`Self::heal`] is called.
    pub fn fail_token(&self, token_id: TokenId) {
        lock(&self.failing).insert(token_id);
    }

    pub fn heal(&self, token_id: TokenId) {
        lock(&self.failing).remove(&token_id);
    }

    /// Reported supply. Unset supply falls back to the number of tokens held.
    pub fn set_supply(&self, supply: u64) {
        *lock(&self.supply) = Some(supply);
    }

    pub fn set_supply_failing(&self, failing: bool) {
        self.supply_failing.store(failing, Ordering::SeqCst);
    }

    /// Number of fetches of one token so far.
    pub fn fetch_count(&self, token_id: TokenId) -> usize {
        lock(&self.fetches).get(&token_id).copied().unwrap_or(0)
    }

    /// Number of token fetches across all ids.
    pub fn total_fetches(&self) -> usize {
        lock(&self.fetches).values().sum()
    }

    pub fn supply_calls(&self) -> usize {
        self.supply_calls.load(Ordering::SeqCst)
    }

    /// Block supply reads until [`Self::release_supply`].
    pub fn hold_supply(&self) {
        self.supply_held.store(true, Ordering::SeqCst);
    }

    pub fn release_supply(&self) {
        self.supply_held.store(false, Ordering::SeqCst);
        self.supply_gate.notify_waiters();
    }

    pub fn set_market(&self, market: MarketSummary) {
        *lock(&self.market) = market;
    }

    pub fn set_market_failing(&self, failing: bool) {
        self.market_failing.store(failing, Ordering::SeqCst);
    }

    pub fn market_calls(&self) -> usize {
        self.market_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenSource for MockTokenSource {
    async fn fetch_token(&self, token_id: TokenId) -> MirrorResult<Option<TokenRecord>> {
        *lock(&self.fetches).entry(token_id).or_insert(0) += 1;
        if lock(&self.failing).contains(&token_id) {
            return Err(ChainError::TokenFetchFailed {
                token_id,
                reason: "injected failure".to_string(),
            }
            .into());
        }
        Ok(lock(&self.tokens).get(&token_id).cloned())
    }

    async fn fetch_total_supply(&self) -> MirrorResult<u64> {
        self.supply_calls.fetch_add(1, Ordering::SeqCst);
        loop {
            let released = self.supply_gate.notified();
            if !self.supply_held.load(Ordering::SeqCst) {
                break;
            }
            released.await;
        }
        if self.supply_failing.load(Ordering::SeqCst) {
            return Err(transport_error("supply unavailable"));
        }
        let supply = *lock(&self.supply);
        Ok(supply.unwrap_or_else(|| lock(&self.tokens).len() as u64))
    }

    async fn fetch_market_summary(&self, _scan_count: u64) -> MirrorResult<MarketSummary> {
        self.market_calls.fetch_add(1, Ordering::SeqCst);
        if self.market_failing.load(Ordering::SeqCst) {
            return Err(transport_error("marketplace stats unavailable"));
        }
        Ok(lock(&self.market).clone())
    }
}

/// Config source returning fixed thresholds for any chain.
#[derive(Debug)]
pub struct MockConfigSource {
    thresholds: Mutex<AgingThresholds>,
    failing: AtomicBool,
    calls: AtomicUsize,
}

impl Default for MockConfigSource {
    fn default() -> Self {
        Self::new(fixtures::thresholds())
    }
}

impl MockConfigSource {
    pub fn new(thresholds: AgingThresholds) -> Self {
        Self {
            thresholds: Mutex::new(thresholds),
            failing: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn set_thresholds(&self, thresholds: AgingThresholds) {
        *lock(&self.thresholds) = thresholds;
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConfigSource for MockConfigSource {
    async fn fetch_thresholds(&self, chain_id: ChainId) -> MirrorResult<AgingThresholds> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(ConfigError::FetchFailed {
                chain_id,
                reason: "injected failure".to_string(),
            }
            .into());
        }
        Ok(*lock(&self.thresholds))
    }
}

// ============================================================================
// FAULT-INJECTING STORE
// ============================================================================

/// Store wrapper whose reads or writes can be switched to fail.
#[derive(Debug)]
pub struct FlakyStore {
    inner: Arc<InMemoryStore>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl FlakyStore {
    pub fn new(inner: Arc<InMemoryStore>) -> Self {
        Self {
            inner,
            fail_reads: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
        }
    }

    pub fn inner(&self) -> &Arc<InMemoryStore> {
        &self.inner
    }

    pub fn set_fail_reads(&self, failing: bool) {
        self.fail_reads.store(failing, Ordering::SeqCst);
    }

    pub fn set_fail_writes(&self, failing: bool) {
        self.fail_writes.store(failing, Ordering::SeqCst);
    }

    fn check(&self, flag: &AtomicBool) -> MirrorResult<()> {
        if flag.load(Ordering::SeqCst) {
            return Err(StorageError::Backend {
                reason: "injected failure".to_string(),
            }
            .into());
        }
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for FlakyStore {
    async fn get(&self, key: &str) -> MirrorResult<Option<Vec<u8>>> {
        self.check(&self.fail_reads)?;
        self.inner.get(key).await
    }

    async fn get_many(&self, keys: &[String]) -> MirrorResult<Vec<Option<Vec<u8>>>> {
        self.check(&self.fail_reads)?;
        self.inner.get_many(keys).await
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> MirrorResult<()> {
        self.check(&self.fail_writes)?;
        self.inner.set(key, value, ttl).await
    }

    async fn delete(&self, keys: &[String]) -> MirrorResult<u64> {
        self.check(&self.fail_writes)?;
        self.inner.delete(keys).await
    }

    async fn stats(&self) -> MirrorResult<StoreStats> {
        self.inner.stats().await
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for record types.

    use super::*;
    use proptest::prelude::*;

    pub fn arb_frame_tier() -> impl Strategy<Value = FrameTier> {
        prop::sample::select(FrameTier::ALL.to_vec())
    }

    /// Lowercase 20-byte hex address.
    pub fn arb_address() -> impl Strategy<Value = String> {
        any::<[u8; 20]>().prop_map(|bytes| {
            let hex: String = bytes.iter().map(|b| format!("{:02x}", b)).collect();
            format!("0x{}", hex)
        })
    }

    /// Thresholds with every interval at least one day.
    pub fn arb_thresholds() -> impl Strategy<Value = AgingThresholds> {
        (1u64..60, 1u64..60, 1u64..120, 1u64..60, 1u64..30).prop_map(
            |(dirt1, dirt_gap, aging, free_clean, window)| AgingThresholds {
                dirt_level1_days: dirt1,
                dirt_level2_days: dirt1 + dirt_gap,
                aging_advance_days: aging,
                free_clean_days: free_clean,
                free_clean_window: window,
            },
        )
    }

    /// Dynamic record cleaned at some point up to a year before `now_secs`.
    pub fn arb_dynamic_record(now_secs: u64) -> impl Strategy<Value = DynamicRecord> {
        (
            0u8..=10,
            arb_frame_tier(),
            0u64..=365 * 86_400,
            arb_address(),
            prop::option::of(1u128..=10u128.pow(20)).prop_map(|p| p.map(U256::from)),
        )
            .prop_map(move |(base, frame, age, owner, listing)| {
                let mut record = fixtures::dynamic_record(&owner, now_secs - age.min(now_secs), frame);
                record.base_aging_level = base;
                record.is_listed = listing.is_some();
                record.listing_price = listing;
                record
            })
    }

    pub fn arb_token_record(now_secs: u64) -> impl Strategy<Value = TokenRecord> {
        (1u64..=10_000, arb_dynamic_record(now_secs)).prop_map(|(token_id, dynamic)| {
            TokenRecord {
                permanent: fixtures::permanent_record(token_id),
                dynamic,
            }
        })
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built records for common scenarios.

    use super::*;
    use chrono::{DateTime, Utc};
    use serde_json::json;

    pub const CHAIN_ID: ChainId = 84532;
    pub const CONTRACT: &str = "0x3d6670ac0a881dcc742c17d687f5dfe05af81cff";
    pub const OWNER: &str = "0x1111111111111111111111111111111111111111";
    pub const CURATOR: &str = "0x2222222222222222222222222222222222222222";

    /// Reference "now" for fixtures, in unix seconds.
    pub const NOW: u64 = 1_750_000_000;
    pub const DAY: u64 = 86_400;

    pub fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(NOW as i64, 0).unwrap_or_default()
    }

    pub fn manual_clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::new(now()))
    }

    /// Base Sepolia thresholds: 7/14 dirt days, 30 aging days.
    pub fn thresholds() -> AgingThresholds {
        AgingThresholds {
            dirt_level1_days: 7,
            dirt_level2_days: 14,
            aging_advance_days: 30,
            free_clean_days: 30,
            free_clean_window: 11,
        }
    }

    pub fn permanent_record(token_id: TokenId) -> PermanentRecord {
        PermanentRecord {
            token_id,
            seed: (U256::from(token_id) << 64) | U256::from(0x5eed_u64),
            name: format!("OnchainRug #{}", token_id),
            description: "OnchainRugs by valipokkann".to_string(),
            image: "/logo.png".to_string(),
            palette_name: "Sunset".to_string(),
            minified_palette: "ff0000,00ff00".to_string(),
            minified_stripe_data: "0:12:1".to_string(),
            text_rows: vec!["GM".to_string()],
            warp_thickness: 3,
            mint_time: NOW - 100 * DAY,
            filtered_character_map: "{}".to_string(),
            character_count: 2,
            stripe_count: 12,
            curator: CURATOR.to_string(),
        }
    }

    pub fn dynamic_record(owner: &str, last_cleaned: u64, frame: FrameTier) -> DynamicRecord {
        DynamicRecord {
            base_aging_level: 0,
            frame_level: frame,
            maintenance_score: 0,
            last_cleaned,
            cleaning_count: Some(0),
            restoration_count: Some(0),
            master_restoration_count: Some(0),
            laundering_count: Some(0),
            last_laundered: None,
            frame_achieved_time: None,
            current_owner: owner.to_string(),
            ownership_history: vec![OwnershipEntry {
                owner: owner.to_string(),
                acquired_at: NOW - 100 * DAY,
                acquired_via: AcquiredVia::Mint,
                tx_hash: None,
            }],
            sale_history: Vec::new(),
            is_listed: false,
            listing_price: None,
            listing_seller: None,
            listing_expires_at: None,
            last_sale_price: None,
            recent_sale_prices: Vec::new(),
            last_updated: NOW * 1000,
        }
    }

    /// Freshly cleaned, unframed token owned by [`OWNER`].
    pub fn token_record(token_id: TokenId) -> TokenRecord {
        TokenRecord {
            permanent: permanent_record(token_id),
            dynamic: dynamic_record(OWNER, NOW, FrameTier::None),
        }
    }

    /// Token last cleaned `days` before [`NOW`].
    pub fn neglected_record(token_id: TokenId, days: u64, frame: FrameTier) -> TokenRecord {
        TokenRecord {
            permanent: permanent_record(token_id),
            dynamic: dynamic_record(OWNER, NOW - days * DAY, frame),
        }
    }

    /// Token listed for `price` wei by [`OWNER`].
    pub fn listed_record(token_id: TokenId, price: u128) -> TokenRecord {
        let mut record = token_record(token_id);
        record.dynamic.is_listed = true;
        record.dynamic.listing_price = Some(U256::from(price));
        record.dynamic.listing_seller = Some(OWNER.to_string());
        record.dynamic.listing_expires_at = Some(0);
        record
    }

    /// Dynamic entry in the pre-migration layout: derived levels persisted,
    /// no `baseAgingLevel`.
    pub fn legacy_dynamic_json(aging_level: u8, last_cleaned: u64) -> serde_json::Value {
        json!({
            "dirtLevel": "2",
            "agingLevel": aging_level.to_string(),
            "frameLevel": "None",
            "maintenanceScore": "0",
            "lastCleaned": last_cleaned.to_string(),
            "currentOwner": OWNER,
            "ownershipHistory": [],
            "saleHistory": [],
            "isListed": false,
            "lastUpdated": (NOW * 1000).to_string()
        })
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions on mirror error variants.

    use super::*;

    #[track_caller]
    pub fn assert_all_fetches_failed<T: std::fmt::Debug>(result: &MirrorResult<T>) {
        match result {
            Err(MirrorError::Chain(ChainError::AllFetchesFailed { .. })) => {}
            other => panic!("Expected AllFetchesFailed, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_unknown_chain<T: std::fmt::Debug>(result: &MirrorResult<T>, chain_id: ChainId) {
        match result {
            Err(MirrorError::Config(ConfigError::UnknownChain { chain_id: got })) => {
                assert_eq!(*got, chain_id, "Wrong chain in UnknownChain error");
            }
            other => panic!("Expected UnknownChain({}), got: {:?}", chain_id, other),
        }
    }

    #[track_caller]
    pub fn assert_invalid_value<T: std::fmt::Debug>(result: &MirrorResult<T>, field: &str) {
        match result {
            Err(MirrorError::Config(ConfigError::InvalidValue { field: got, .. })) => {
                assert_eq!(got, field, "Wrong field in InvalidValue error");
            }
            other => panic!("Expected InvalidValue for {}, got: {:?}", field, other),
        }
    }
}
