//! Rugmirror Storage - Record Store and Chain Config Cache
//!
//! Cache-aside storage for token records. The chain stays authoritative;
//! everything here is a read-optimized copy that callers repair from chain
//! on a miss.

pub mod cache;
pub mod codec;
pub mod config_cache;
pub mod jobs;
pub mod record_store;

pub use cache::{
    CacheNamespace, InMemoryStore, KeyValueStore, LmdbStore, LmdbStoreError, StoreStats,
};
pub use codec::{DecodedDynamic, RecordCodec};
pub use config_cache::ChainConfigCache;
pub use jobs::{BackgroundJobs, JobFailure, JobMetricsSnapshot};
pub use record_store::RecordStore;
