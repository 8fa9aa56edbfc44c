//! Typed token record cache.
//!
//! Wraps a [`KeyValueStore`] with get/set for the two record halves, batch
//! reads that keep request order, and composite reads that attach derived
//! levels through the [`ChainConfigCache`].
//!
//! Reads never fail: a backend error or an undecodable entry is logged and
//! reported as a miss, which sends the caller to the chain. Writes return
//! errors and leave the choice to the caller.
//!
//! A dynamic entry in the pre-migration layout is still served, and if a
//! [`TokenSource`] is attached the token is re-fetched in the background and
//! rewritten in the current layout.

use std::collections::HashSet;
use std::sync::Arc;

use futures_util::future::join;
use rugmirror_core::constants::{COLLECTION_STATS_TTL, TOTAL_SUPPLY_TTL};
use rugmirror_core::{
    derive_view, ChainConfig, Clock, CollectionSummary, DerivedView, DynamicRecord, MirrorResult,
    PermanentRecord, TokenId, TokenRecord, TokenSource,
};

use crate::cache::{CacheNamespace, KeyValueStore};
use crate::codec::{DecodedDynamic, RecordCodec};
use crate::config_cache::ChainConfigCache;
use crate::jobs::BackgroundJobs;

/// Where legacy entries get re-fetched from.
struct Migration {
    source: Arc<dyn TokenSource>,
    jobs: BackgroundJobs,
}

/// Record cache for one chain + contract.
pub struct RecordStore<S: KeyValueStore + ?Sized> {
    store: Arc<S>,
    namespace: CacheNamespace,
    codec: RecordCodec,
    configs: Arc<ChainConfigCache<S>>,
    clock: Arc<dyn Clock>,
    migration: Option<Arc<Migration>>,
}

impl<S: KeyValueStore + ?Sized> Clone for RecordStore<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            namespace: self.namespace.clone(),
            codec: self.codec,
            configs: Arc::clone(&self.configs),
            clock: Arc::clone(&self.clock),
            migration: self.migration.clone(),
        }
    }
}

impl<S: KeyValueStore + ?Sized + 'static> RecordStore<S> {
    pub fn new(
        store: Arc<S>,
        namespace: CacheNamespace,
        codec: RecordCodec,
        configs: Arc<ChainConfigCache<S>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            namespace,
            codec,
            configs,
            clock,
            migration: None,
        }
    }

    /// Re-fetch legacy entries from `source` on `jobs`.
    pub fn with_migration(mut self, source: Arc<dyn TokenSource>, jobs: BackgroundJobs) -> Self {
        self.migration = Some(Arc::new(Migration { source, jobs }));
        self
    }

    pub fn namespace(&self) -> &CacheNamespace {
        &self.namespace
    }

    // ========================================================================
    // PERMANENT
    // ========================================================================

    pub async fn get_permanent(&self, token_id: TokenId) -> Option<PermanentRecord> {
        let key = self.namespace.permanent_key(token_id);
        let bytes = self.read_one(&key, token_id).await?;
        self.decode_permanent(&key, token_id, &bytes)
    }

    /// Write the permanent half. Overwrites any existing entry.
    pub async fn set_permanent(&self, record: &PermanentRecord) -> MirrorResult<()> {
        let key = self.namespace.permanent_key(record.token_id);
        let bytes = self.codec.encode_permanent(&key, record)?;
        self.store.set(&key, bytes, None).await
    }

    pub async fn get_permanent_batch(&self, token_ids: &[TokenId]) -> Vec<Option<PermanentRecord>> {
        let keys: Vec<String> = token_ids
            .iter()
            .map(|id| self.namespace.permanent_key(*id))
            .collect();
        let raw = self.read_many(&keys).await;
        token_ids
            .iter()
            .zip(keys.iter().zip(raw))
            .map(|(id, (key, bytes))| {
                bytes.and_then(|bytes| self.decode_permanent(key, *id, &bytes))
            })
            .collect()
    }

    // ========================================================================
    // DYNAMIC
    // ========================================================================

    pub async fn get_dynamic(&self, token_id: TokenId) -> Option<DynamicRecord> {
        let key = self.namespace.dynamic_key(token_id);
        let bytes = self.read_one(&key, token_id).await?;
        self.decode_dynamic(&key, token_id, &bytes)
    }

    pub async fn set_dynamic(&self, token_id: TokenId, record: &DynamicRecord) -> MirrorResult<()> {
        let key = self.namespace.dynamic_key(token_id);
        let bytes = self.codec.encode_dynamic(&key, record)?;
        self.store.set(&key, bytes, None).await
    }

    pub async fn get_dynamic_batch(&self, token_ids: &[TokenId]) -> Vec<Option<DynamicRecord>> {
        let keys: Vec<String> = token_ids
            .iter()
            .map(|id| self.namespace.dynamic_key(*id))
            .collect();
        let raw = self.read_many(&keys).await;
        token_ids
            .iter()
            .zip(keys.iter().zip(raw))
            .map(|(id, (key, bytes))| bytes.and_then(|bytes| self.decode_dynamic(key, *id, &bytes)))
            .collect()
    }

    // ========================================================================
    // COMPOSITE
    // ========================================================================

    /// Both halves with derived levels, or `None` if either half is missing.
    pub async fn get_composite(&self, token_id: TokenId) -> Option<DerivedView> {
        let (permanent, dynamic) =
            join(self.get_permanent(token_id), self.get_dynamic(token_id)).await;
        let record = TokenRecord {
            permanent: permanent?,
            dynamic: dynamic?,
        };
        Some(self.compose(record).await)
    }

    /// Write both halves. They are written independently; a reader may see one
    /// without the other, which reads as a miss.
    pub async fn set_composite(&self, record: &TokenRecord) -> MirrorResult<()> {
        self.set_permanent(&record.permanent).await?;
        self.set_dynamic(record.token_id(), &record.dynamic).await
    }

    /// Composite reads for many tokens, in input order. Chain config is read once.
    pub async fn get_composite_batch(&self, token_ids: &[TokenId]) -> Vec<Option<DerivedView>> {
        let (permanents, dynamics) = join(
            self.get_permanent_batch(token_ids),
            self.get_dynamic_batch(token_ids),
        )
        .await;

        let records: Vec<Option<TokenRecord>> = permanents
            .into_iter()
            .zip(dynamics)
            .map(|pair| match pair {
                (Some(permanent), Some(dynamic)) => Some(TokenRecord { permanent, dynamic }),
                _ => None,
            })
            .collect();

        let config = if records.iter().any(Option::is_some) {
            self.current_config().await
        } else {
            None
        };
        let now = self.clock.now();
        records
            .into_iter()
            .map(|record| record.map(|record| derive_view(record, config.as_ref(), now)))
            .collect()
    }

    /// Derive a view for a record through the same path as cached reads.
    pub async fn compose(&self, record: TokenRecord) -> DerivedView {
        let config = self.current_config().await;
        derive_view(record, config.as_ref(), self.clock.now())
    }

    /// Remove both halves of each token.
    pub async fn delete_tokens(&self, token_ids: &[TokenId]) -> MirrorResult<u64> {
        let keys: Vec<String> = token_ids
            .iter()
            .flat_map(|id| {
                [
                    self.namespace.permanent_key(*id),
                    self.namespace.dynamic_key(*id),
                ]
            })
            .collect();
        let removed = self.store.delete(&keys).await?;
        tracing::debug!(
            namespace = %self.namespace,
            tokens = token_ids.len(),
            removed,
            "token entries deleted"
        );
        Ok(removed)
    }

    // ========================================================================
    // TOTAL SUPPLY
    // ========================================================================

    pub async fn get_total_supply(&self) -> Option<u64> {
        let key = self.namespace.total_supply_key();
        let bytes = self.read_collection_entry(&key, "total supply").await?;
        match self.codec.decode_supply(&key, &bytes) {
            Ok(supply) => Some(supply),
            Err(error) => {
                tracing::warn!(namespace = %self.namespace, error = %error, "total supply entry unreadable");
                None
            }
        }
    }

    pub async fn set_total_supply(&self, supply: u64) -> MirrorResult<()> {
        let key = self.namespace.total_supply_key();
        let bytes = self.codec.encode_supply(&key, supply)?;
        self.store.set(&key, bytes, Some(TOTAL_SUPPLY_TTL)).await
    }

    // ========================================================================
    // COLLECTION STATS
    // ========================================================================

    pub async fn get_collection_stats(&self) -> Option<CollectionSummary> {
        let key = self.namespace.collection_stats_key();
        let bytes = self.read_collection_entry(&key, "collection stats").await?;
        match self.codec.decode_stats(&key, &bytes) {
            Ok(stats) => Some(stats),
            Err(error) => {
                tracing::warn!(namespace = %self.namespace, error = %error, "collection stats entry unreadable");
                None
            }
        }
    }

    pub async fn set_collection_stats(&self, stats: &CollectionSummary) -> MirrorResult<()> {
        let key = self.namespace.collection_stats_key();
        let bytes = self.codec.encode_stats(&key, stats)?;
        self.store.set(&key, bytes, Some(COLLECTION_STATS_TTL)).await
    }

    /// Distinct current owners among the cached dynamic records of `token_ids`.
    /// Tokens not in the cache are not counted.
    pub async fn unique_owners(&self, token_ids: &[TokenId]) -> u64 {
        let owners: HashSet<String> = self
            .get_dynamic_batch(token_ids)
            .await
            .into_iter()
            .flatten()
            .map(|record| record.current_owner)
            .collect();
        owners.len() as u64
    }

    // ========================================================================
    // INTERNALS
    // ========================================================================

    async fn read_collection_entry(&self, key: &str, what: &'static str) -> Option<Vec<u8>> {
        match self.store.get(key).await {
            Ok(bytes) => bytes,
            Err(error) => {
                tracing::warn!(namespace = %self.namespace, error = %error, "{} read failed", what);
                None
            }
        }
    }

    async fn current_config(&self) -> Option<ChainConfig> {
        let chain_id = self.namespace.chain_id();
        match self.configs.get_config(chain_id).await {
            Ok(config) => Some(config),
            Err(error) => {
                tracing::warn!(
                    chain_id,
                    error = %error,
                    "chain config unavailable, serving stored aging levels"
                );
                None
            }
        }
    }

    async fn read_one(&self, key: &str, token_id: TokenId) -> Option<Vec<u8>> {
        match self.store.get(key).await {
            Ok(bytes) => bytes,
            Err(error) => {
                tracing::warn!(
                    namespace = %self.namespace,
                    token_id,
                    error = %error,
                    "record read failed"
                );
                None
            }
        }
    }

    async fn read_many(&self, keys: &[String]) -> Vec<Option<Vec<u8>>> {
        match self.store.get_many(keys).await {
            Ok(values) if values.len() == keys.len() => values,
            Ok(values) => {
                tracing::warn!(
                    namespace = %self.namespace,
                    expected = keys.len(),
                    got = values.len(),
                    "batch read returned wrong number of slots"
                );
                vec![None; keys.len()]
            }
            Err(error) => {
                tracing::warn!(namespace = %self.namespace, error = %error, "batch record read failed");
                vec![None; keys.len()]
            }
        }
    }

    fn decode_permanent(&self, key: &str, token_id: TokenId, bytes: &[u8]) -> Option<PermanentRecord> {
        match self.codec.decode_permanent(key, bytes) {
            Ok(record) => Some(record),
            Err(error) => {
                tracing::warn!(token_id, error = %error, "permanent entry unreadable");
                None
            }
        }
    }

    fn decode_dynamic(&self, key: &str, token_id: TokenId, bytes: &[u8]) -> Option<DynamicRecord> {
        match self.codec.decode_dynamic(key, bytes) {
            Ok(DecodedDynamic::Current(record)) => Some(record),
            Ok(DecodedDynamic::Legacy(record)) => {
                self.schedule_migration(token_id);
                Some(record)
            }
            Err(error) => {
                tracing::warn!(token_id, error = %error, "dynamic entry unreadable");
                None
            }
        }
    }

    fn schedule_migration(&self, token_id: TokenId) {
        let Some(migration) = self.migration.clone() else {
            tracing::info!(
                namespace = %self.namespace,
                token_id,
                "legacy dynamic entry served without migration source"
            );
            return;
        };
        tracing::info!(namespace = %self.namespace, token_id, "legacy dynamic entry, scheduling migration");

        let store = self.clone();
        let source = Arc::clone(&migration.source);
        migration.jobs.spawn("legacy-migration", async move {
            match source.fetch_token(token_id).await? {
                Some(record) => {
                    store.set_composite(&record).await?;
                    tracing::info!(namespace = %store.namespace, token_id, "legacy entry migrated");
                }
                None => {
                    store.delete_tokens(&[token_id]).await?;
                    tracing::info!(namespace = %store.namespace, token_id, "legacy entry dropped, token absent");
                }
            }
            Ok(())
        });
    }
}
