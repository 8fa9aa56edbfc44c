//! Key-value store trait and usage statistics.

use async_trait::async_trait;
use rugmirror_core::MirrorResult;
use std::time::Duration;

/// Byte-oriented key-value store underneath the record caches.
///
/// Keys are plain strings (see [`super::keys`]). Implementations must be safe
/// for concurrent use; no cross-key atomicity is assumed by callers.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read one value. Expired entries read as `None`.
    async fn get(&self, key: &str) -> MirrorResult<Option<Vec<u8>>>;

    /// Read many values at once. The result has one slot per key, in key order.
    async fn get_many(&self, keys: &[String]) -> MirrorResult<Vec<Option<Vec<u8>>>>;

    /// Write a value, replacing any previous one. `ttl: None` never expires.
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> MirrorResult<()>;

    /// Remove keys, returning how many live entries were removed.
    async fn delete(&self, keys: &[String]) -> MirrorResult<u64>;

    async fn stats(&self) -> MirrorResult<StoreStats>;
}

/// Statistics about store usage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Number of reads that found a live value.
    pub hits: u64,
    /// Number of reads that found nothing or an expired value.
    pub misses: u64,
    /// Number of live entries.
    pub entry_count: u64,
    /// Approximate payload size in bytes.
    pub memory_bytes: u64,
    /// Number of entries dropped because their TTL passed.
    pub expirations: u64,
}

impl StoreStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
