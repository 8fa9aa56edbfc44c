//! TTL-bound cache of per-chain aging configuration.
//!
//! Reads are served from the store while the entry is younger than the TTL.
//! Past that, the next reader refetches from the [`ConfigSource`] and writes
//! the result back. Concurrent readers racing an expiry may both refetch;
//! the values are identical and the last write wins.

use std::sync::Arc;
use std::time::Duration;

use rugmirror_core::constants::CONFIG_TTL;
use rugmirror_core::{ChainConfig, ChainId, Clock, ConfigError, ConfigSource, MirrorResult};

use crate::cache::{CacheNamespace, KeyValueStore};
use crate::codec::RecordCodec;

/// Per-chain configuration cache over a [`KeyValueStore`].
pub struct ChainConfigCache<S: KeyValueStore + ?Sized> {
    store: Arc<S>,
    source: Arc<dyn ConfigSource>,
    codec: RecordCodec,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    stale_grace: Duration,
}

impl<S: KeyValueStore + ?Sized> ChainConfigCache<S> {
    pub fn new(
        store: Arc<S>,
        source: Arc<dyn ConfigSource>,
        codec: RecordCodec,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            source,
            codec,
            clock,
            ttl: CONFIG_TTL,
            stale_grace: CONFIG_TTL,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// How long an expired entry stays readable as a fallback when refetch fails.
    pub fn with_stale_grace(mut self, grace: Duration) -> Self {
        self.stale_grace = grace;
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Current configuration for `chain_id`.
    ///
    /// Fails only when the chain cannot be read and no stored entry, fresh or
    /// expired, is available.
    pub async fn get_config(&self, chain_id: ChainId) -> MirrorResult<ChainConfig> {
        let now = self.clock.now();
        let stored = self.read_stored(chain_id).await;

        if let Some(config) = stored {
            if config.is_fresh(now, self.ttl) {
                tracing::debug!(chain_id, "chain config cache hit");
                return Ok(config);
            }
            tracing::debug!(chain_id, fetched_at = %config.fetched_at, "chain config expired");
        }

        match self.fetch_and_store(chain_id).await {
            Ok(config) => Ok(config),
            Err(error) => match stored {
                Some(stale) => {
                    tracing::warn!(
                        chain_id,
                        error = %error,
                        fetched_at = %stale.fetched_at,
                        "chain config refetch failed, serving expired entry"
                    );
                    Ok(stale)
                }
                None => Err(error),
            },
        }
    }

    /// Drop the stored configuration so the next read refetches.
    pub async fn invalidate(&self, chain_id: ChainId) -> MirrorResult<()> {
        let key = CacheNamespace::config_key(chain_id);
        self.store.delete(&[key]).await?;
        tracing::info!(chain_id, "chain config invalidated");
        Ok(())
    }

    /// Invalidate, then read straight from the chain.
    pub async fn refresh(&self, chain_id: ChainId) -> MirrorResult<ChainConfig> {
        if let Err(error) = self.invalidate(chain_id).await {
            tracing::warn!(chain_id, error = %error, "chain config invalidation failed");
        }
        self.fetch_and_store(chain_id).await
    }

    async fn read_stored(&self, chain_id: ChainId) -> Option<ChainConfig> {
        let key = CacheNamespace::config_key(chain_id);
        let bytes = match self.store.get(&key).await {
            Ok(bytes) => bytes?,
            Err(error) => {
                tracing::warn!(chain_id, error = %error, "chain config read failed");
                return None;
            }
        };
        match self.codec.decode_config(&key, &bytes) {
            Ok(config) if config.chain_id == chain_id => Some(config),
            Ok(config) => {
                tracing::warn!(
                    chain_id,
                    stored_chain_id = config.chain_id,
                    "chain config entry belongs to another chain"
                );
                None
            }
            Err(error) => {
                tracing::warn!(chain_id, error = %error, "chain config entry unreadable");
                None
            }
        }
    }

    async fn fetch_and_store(&self, chain_id: ChainId) -> MirrorResult<ChainConfig> {
        let thresholds = self
            .source
            .fetch_thresholds(chain_id)
            .await
            .map_err(|e| ConfigError::FetchFailed {
                chain_id,
                reason: e.to_string(),
            })?;
        let config = ChainConfig::new(chain_id, thresholds, self.clock.now());
        tracing::info!(chain_id, "chain config fetched from chain");

        let key = CacheNamespace::config_key(chain_id);
        let persisted = match self.codec.encode_config(&key, &config) {
            Ok(bytes) => {
                self.store
                    .set(&key, bytes, Some(self.ttl + self.stale_grace))
                    .await
            }
            Err(error) => Err(error),
        };
        if let Err(error) = persisted {
            tracing::warn!(chain_id, error = %error, "chain config write failed");
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryStore;
    use crate::cache::StoreStats;
    use async_trait::async_trait;
    use chrono::DateTime;
    use rugmirror_core::{AgingThresholds, ChainError, ManualClock, MirrorError, StorageError};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingSource {
        calls: AtomicUsize,
        failing: AtomicBool,
    }

    #[async_trait]
    impl ConfigSource for CountingSource {
        async fn fetch_thresholds(&self, _chain_id: ChainId) -> MirrorResult<AgingThresholds> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.failing.load(Ordering::SeqCst) {
                return Err(ChainError::Transport {
                    endpoint: "mock".to_string(),
                    reason: "down".to_string(),
                }
                .into());
            }
            Ok(AgingThresholds {
                dirt_level1_days: 7,
                dirt_level2_days: 14,
                aging_advance_days: 30,
                free_clean_days: 30,
                free_clean_window: 11,
            })
        }
    }

    /// Store whose writes always fail.
    struct ReadOnlyStore(InMemoryStore);

    #[async_trait]
    impl KeyValueStore for ReadOnlyStore {
        async fn get(&self, key: &str) -> MirrorResult<Option<Vec<u8>>> {
            self.0.get(key).await
        }
        async fn get_many(&self, keys: &[String]) -> MirrorResult<Vec<Option<Vec<u8>>>> {
            self.0.get_many(keys).await
        }
        async fn set(&self, _key: &str, _value: Vec<u8>, _ttl: Option<Duration>) -> MirrorResult<()> {
            Err(StorageError::Backend {
                reason: "read only".to_string(),
            }
            .into())
        }
        async fn delete(&self, keys: &[String]) -> MirrorResult<u64> {
            self.0.delete(keys).await
        }
        async fn stats(&self) -> MirrorResult<StoreStats> {
            self.0.stats().await
        }
    }

    fn setup() -> (
        ChainConfigCache<InMemoryStore>,
        Arc<CountingSource>,
        Arc<ManualClock>,
    ) {
        let clock = Arc::new(ManualClock::new(
            DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
        ));
        let store = Arc::new(InMemoryStore::with_clock(clock.clone()));
        let source = Arc::new(CountingSource::default());
        let cache = ChainConfigCache::new(store, source.clone(), RecordCodec::new(), clock.clone());
        (cache, source, clock)
    }

    #[tokio::test]
    async fn test_single_chain_call_within_ttl() {
        let (cache, source, clock) = setup();

        let first = cache.get_config(84532).await.unwrap();
        clock.advance(chrono::Duration::hours(23));
        let second = cache.get_config(84532).await.unwrap();

        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        assert_eq!(first, second);
        assert_eq!(first.thresholds.dirt_level1_days, 7);
    }

    #[tokio::test]
    async fn test_refetch_after_ttl() {
        let (cache, source, clock) = setup();

        cache.get_config(84532).await.unwrap();
        clock.advance(chrono::Duration::hours(24));
        let refreshed = cache.get_config(84532).await.unwrap();
        cache.get_config(84532).await.unwrap();

        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
        assert_eq!(refreshed.fetched_at, clock.now());
    }

    #[tokio::test]
    async fn test_chains_are_cached_separately() {
        let (cache, source, _clock) = setup();
        cache.get_config(84532).await.unwrap();
        cache.get_config(8453).await.unwrap();
        cache.get_config(84532).await.unwrap();
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_fetch_failure_without_entry() {
        let (cache, source, _clock) = setup();
        source.failing.store(true, Ordering::SeqCst);

        let err = cache.get_config(84532).await.unwrap_err();
        assert!(matches!(
            err,
            MirrorError::Config(ConfigError::FetchFailed { chain_id: 84532, .. })
        ));
    }

    #[tokio::test]
    async fn test_expired_entry_served_when_chain_down() {
        let (cache, source, clock) = setup();
        let original = cache.get_config(84532).await.unwrap();

        clock.advance(chrono::Duration::hours(30));
        source.failing.store(true, Ordering::SeqCst);

        let served = cache.get_config(84532).await.unwrap();
        assert_eq!(served, original);
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_invalidate_and_refresh() {
        let (cache, source, _clock) = setup();
        cache.get_config(84532).await.unwrap();

        cache.invalidate(84532).await.unwrap();
        cache.get_config(84532).await.unwrap();
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);

        cache.refresh(84532).await.unwrap();
        assert_eq!(source.calls.load(Ordering::SeqCst), 3);
        cache.get_config(84532).await.unwrap();
        assert_eq!(source.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_write_failure_does_not_fail_read() {
        let clock = Arc::new(ManualClock::new(
            DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
        ));
        let store = Arc::new(ReadOnlyStore(InMemoryStore::with_clock(clock.clone())));
        let source = Arc::new(CountingSource::default());
        let cache = ChainConfigCache::new(store, source.clone(), RecordCodec::new(), clock);

        assert!(cache.get_config(84532).await.is_ok());
        assert!(cache.get_config(84532).await.is_ok());
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }
}
