//! LMDB-backed key-value store.
//!
//! Uses the heed crate (Rust bindings for LMDB) to provide a persistent,
//! memory-mapped store that survives restarts, so a warm mirror does not have
//! to re-read the whole collection from chain after a deploy.
//!
//! # Value Format
//!
//! `[expires_at: 8 bytes, little-endian unix millis, 0 = never][payload]`
//!
//! Expired entries stay on disk until overwritten or deleted; reads treat
//! them as misses.

use std::path::Path;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions};
use rugmirror_core::{Clock, MirrorError, MirrorResult, StorageError, SystemClock};

use super::traits::{KeyValueStore, StoreStats};

const HEADER_LEN: usize = 8;
const NO_EXPIRY: i64 = 0;

/// Error type for LMDB store operations.
#[derive(Debug, thiserror::Error)]
pub enum LmdbStoreError {
    /// Failed to open or create the LMDB environment.
    #[error("Failed to open LMDB environment: {0}")]
    EnvOpen(String),

    /// Failed to open the database within the environment.
    #[error("Failed to open database: {0}")]
    DbOpen(String),

    /// Transaction error.
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// Stored value is shorter than its header.
    #[error("Corrupt entry at {0}")]
    Corrupt(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<LmdbStoreError> for MirrorError {
    fn from(e: LmdbStoreError) -> Self {
        MirrorError::Storage(StorageError::Backend {
            reason: e.to_string(),
        })
    }
}

fn txn_err(e: heed::Error) -> LmdbStoreError {
    LmdbStoreError::Transaction(e.to_string())
}

/// LMDB-backed store with per-entry expiry.
///
/// # Example
///
/// ```ignore
/// use rugmirror_storage::cache::LmdbStore;
///
/// let store = LmdbStore::open("/var/lib/rugmirror/cache", 256)?;
/// store.set("k", b"v".to_vec(), None).await?;
/// ```
pub struct LmdbStore {
    /// The LMDB environment.
    env: Env,
    /// The main database (single unnamed database).
    db: Database<Bytes, Bytes>,
    clock: Arc<dyn Clock>,
    stats: Arc<RwLock<StoreStats>>,
}

impl LmdbStore {
    /// Open (or create) a store.
    ///
    /// # Arguments
    ///
    /// * `path` - Directory where LMDB files will be stored
    /// * `max_size_mb` - Maximum size of the database in megabytes
    pub fn open<P: AsRef<Path>>(path: P, max_size_mb: usize) -> Result<Self, LmdbStoreError> {
        Self::open_with_clock(path, max_size_mb, Arc::new(SystemClock))
    }

    pub fn open_with_clock<P: AsRef<Path>>(
        path: P,
        max_size_mb: usize,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, LmdbStoreError> {
        std::fs::create_dir_all(&path)?;

        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(max_size_mb * 1024 * 1024)
                .max_dbs(1)
                .open(path.as_ref())
        }
        .map_err(|e| LmdbStoreError::EnvOpen(e.to_string()))?;

        let mut wtxn = env.write_txn().map_err(txn_err)?;
        let db: Database<Bytes, Bytes> = env
            .create_database(&mut wtxn, None)
            .map_err(|e| LmdbStoreError::DbOpen(e.to_string()))?;
        wtxn.commit().map_err(txn_err)?;

        Ok(Self {
            env,
            db,
            clock,
            stats: Arc::new(RwLock::new(StoreStats::default())),
        })
    }

    fn with_stats(&self, f: impl FnOnce(&mut StoreStats)) {
        if let Ok(mut stats) = self.stats.write() {
            f(&mut stats);
        }
    }

    /// Strip the header, returning `None` for expired entries.
    fn unwrap_entry(
        &self,
        key: &str,
        bytes: &[u8],
        now_millis: i64,
    ) -> Result<Option<Vec<u8>>, LmdbStoreError> {
        if bytes.len() < HEADER_LEN {
            return Err(LmdbStoreError::Corrupt(key.to_string()));
        }
        let mut header = [0u8; HEADER_LEN];
        header.copy_from_slice(&bytes[..HEADER_LEN]);
        let expires_at = i64::from_le_bytes(header);

        if expires_at != NO_EXPIRY && now_millis >= expires_at {
            self.with_stats(|s| {
                s.misses += 1;
                s.expirations += 1;
            });
            return Ok(None);
        }
        self.with_stats(|s| s.hits += 1);
        Ok(Some(bytes[HEADER_LEN..].to_vec()))
    }

    fn read(&self, keys: &[&str]) -> Result<Vec<Option<Vec<u8>>>, LmdbStoreError> {
        let now_millis = self.clock.now().timestamp_millis();
        let rtxn = self.env.read_txn().map_err(txn_err)?;

        let mut values = Vec::with_capacity(keys.len());
        for key in keys {
            match self.db.get(&rtxn, key.as_bytes()).map_err(txn_err)? {
                Some(bytes) => values.push(self.unwrap_entry(key, bytes, now_millis)?),
                None => {
                    self.with_stats(|s| s.misses += 1);
                    values.push(None);
                }
            }
        }
        Ok(values)
    }

    fn expiry_millis(&self, ttl: Option<Duration>) -> i64 {
        ttl.and_then(|ttl| chrono::Duration::from_std(ttl).ok())
            .and_then(|ttl| self.clock.now().checked_add_signed(ttl))
            .map(|at: DateTime<Utc>| at.timestamp_millis())
            .unwrap_or(NO_EXPIRY)
    }
}

#[async_trait]
impl KeyValueStore for LmdbStore {
    async fn get(&self, key: &str) -> MirrorResult<Option<Vec<u8>>> {
        let mut values = self.read(&[key])?;
        Ok(values.pop().flatten())
    }

    async fn get_many(&self, keys: &[String]) -> MirrorResult<Vec<Option<Vec<u8>>>> {
        let keys: Vec<&str> = keys.iter().map(String::as_str).collect();
        Ok(self.read(&keys)?)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> MirrorResult<()> {
        let mut full_bytes = Vec::with_capacity(HEADER_LEN + value.len());
        full_bytes.extend_from_slice(&self.expiry_millis(ttl).to_le_bytes());
        full_bytes.extend_from_slice(&value);

        let mut wtxn = self.env.write_txn().map_err(txn_err)?;
        self.db
            .put(&mut wtxn, key.as_bytes(), &full_bytes)
            .map_err(txn_err)?;
        wtxn.commit().map_err(txn_err)?;
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> MirrorResult<u64> {
        let now_millis = self.clock.now().timestamp_millis();
        let mut wtxn = self.env.write_txn().map_err(txn_err)?;

        let mut removed = 0u64;
        for key in keys {
            let live = match self.db.get(&wtxn, key.as_bytes()).map_err(txn_err)? {
                Some(bytes) if bytes.len() >= HEADER_LEN => {
                    let mut header = [0u8; HEADER_LEN];
                    header.copy_from_slice(&bytes[..HEADER_LEN]);
                    let expires_at = i64::from_le_bytes(header);
                    expires_at == NO_EXPIRY || now_millis < expires_at
                }
                _ => false,
            };
            if self.db.delete(&mut wtxn, key.as_bytes()).map_err(txn_err)? && live {
                removed += 1;
            }
        }

        wtxn.commit().map_err(txn_err)?;
        Ok(removed)
    }

    async fn stats(&self) -> MirrorResult<StoreStats> {
        let rtxn = self.env.read_txn().map_err(txn_err)?;
        let entry_count = self.db.len(&rtxn).map_err(txn_err)?;
        let mut stats = self.stats.read().map(|s| s.clone()).unwrap_or_default();
        stats.entry_count = entry_count;
        Ok(stats)
    }
}
