//! In-process key-value store.
//!
//! Used when no cache directory is configured, and by tests. Expiry is checked
//! against the injected [`Clock`], so TTL behavior can be driven by hand.
//!
//! An expired entry is removed when a read finds it. Entries nobody reads
//! again are removed by [`InMemoryStore::purge_expired`], which
//! [`InMemoryStore::spawn_sweeper`] runs on an interval.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rugmirror_core::{Clock, MirrorResult, SystemClock};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

use super::traits::{KeyValueStore, StoreStats};

#[derive(Debug, Clone)]
struct Entry {
    value: Vec<u8>,
    expires_at: Option<DateTime<Utc>>,
}

impl Entry {
    fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map_or(true, |at| now < at)
    }
}

/// `HashMap`-backed store with per-entry TTL.
#[derive(Debug)]
pub struct InMemoryStore {
    entries: RwLock<HashMap<String, Entry>>,
    clock: Arc<dyn Clock>,
    hits: AtomicU64,
    misses: AtomicU64,
    expirations: AtomicU64,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            clock,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            expirations: AtomicU64::new(0),
        }
    }

    /// Read a single entry without touching hit/miss statistics. An expired
    /// entry is removed.
    async fn live_value(&self, key: &str, now: DateTime<Utc>) -> Option<Vec<u8>> {
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                Some(entry) if entry.is_live(now) => return Some(entry.value.clone()),
                Some(_) => {}
                None => return None,
            }
        }

        let mut entries = self.entries.write().await;
        // Another writer may have replaced the entry between the two locks.
        match entries.get(key) {
            Some(entry) if entry.is_live(now) => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(key);
                self.expirations.fetch_add(1, Ordering::Relaxed);
                None
            }
            None => None,
        }
    }

    /// Remove every expired entry. Returns how many were removed.
    pub async fn purge_expired(&self) -> u64 {
        let now = self.clock.now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.is_live(now));
        let removed = (before - entries.len()) as u64;
        if removed > 0 {
            self.expirations.fetch_add(removed, Ordering::Relaxed);
            tracing::debug!(removed, remaining = entries.len(), "expired cache entries purged");
        }
        removed
    }

    /// Run [`Self::purge_expired`] every `period` until the handle is aborted.
    pub fn spawn_sweeper(self: Arc<Self>, period: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                self.purge_expired().await;
            }
        })
    }

    fn record(&self, found: bool) {
        if found {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
    }
}

#[async_trait]
impl KeyValueStore for InMemoryStore {
    async fn get(&self, key: &str) -> MirrorResult<Option<Vec<u8>>> {
        let value = self.live_value(key, self.clock.now()).await;
        self.record(value.is_some());
        Ok(value)
    }

    async fn get_many(&self, keys: &[String]) -> MirrorResult<Vec<Option<Vec<u8>>>> {
        let now = self.clock.now();
        let mut values = Vec::with_capacity(keys.len());
        for key in keys {
            let value = self.live_value(key, now).await;
            self.record(value.is_some());
            values.push(value);
        }
        Ok(values)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> MirrorResult<()> {
        let expires_at = ttl.and_then(|ttl| {
            chrono::Duration::from_std(ttl)
                .ok()
                .and_then(|ttl| self.clock.now().checked_add_signed(ttl))
        });
        let mut entries = self.entries.write().await;
        entries.insert(key.to_string(), Entry { value, expires_at });
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> MirrorResult<u64> {
        let now = self.clock.now();
        let mut entries = self.entries.write().await;
        let mut removed = 0u64;
        for key in keys {
            if let Some(entry) = entries.remove(key) {
                if entry.is_live(now) {
                    removed += 1;
                }
            }
        }
        Ok(removed)
    }

    async fn stats(&self) -> MirrorResult<StoreStats> {
        let entries = self.entries.read().await;
        let bytes = entries.values().map(|entry| entry.value.len() as u64).sum();
        Ok(StoreStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entry_count: entries.len() as u64,
            memory_bytes: bytes,
            expirations: self.expirations.load(Ordering::Relaxed),
        })
    }
}
