//! Key-value stores and the key layout over them.
//!
//! Two backends implement [`KeyValueStore`]: [`InMemoryStore`] for single
//! process deployments and tests, and [`LmdbStore`] for a cache that survives
//! restarts. Record-level concerns (encoding, schema detection, derived
//! levels) live above this module.

pub mod keys;
pub mod lmdb_backend;
pub mod memory;
pub mod traits;

pub use keys::{CacheNamespace, RecordHalf, TokenKey};
pub use lmdb_backend::{LmdbStore, LmdbStoreError};
pub use memory::InMemoryStore;
pub use traits::{KeyValueStore, StoreStats};
