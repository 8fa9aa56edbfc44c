//! Constants shared across the mirror crates.

use std::time::Duration;

// ============================================================================
// CHAIN
// ============================================================================

/// Default chain (Base Sepolia).
pub const DEFAULT_CHAIN_ID: u64 = 84532;

/// The zero address returned by `ownerOf` for unminted tokens on some deployments.
pub const ZERO_ADDRESS: &str = "0x0000000000000000000000000000000000000000";

/// Hard ceiling on collection size; supply reported above this is clamped.
pub const MAX_SUPPLY: u64 = 10_000;

// ============================================================================
// CACHE LIFETIMES
// ============================================================================

/// Chain configuration is considered fresh for this long after fetch (24 hours).
pub const CONFIG_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Cached total supply expires after this long (1 hour).
pub const TOTAL_SUPPLY_TTL: Duration = Duration::from_secs(60 * 60);

/// Cached collection stats expire after this long (1 hour).
pub const COLLECTION_STATS_TTL: Duration = Duration::from_secs(60 * 60);

/// Listings of tokens `1..=N` scanned for the floor price.
pub const FLOOR_SCAN_LIMIT: u64 = 100;

// ============================================================================
// PAGINATION
// ============================================================================

/// Default page size for collection queries
pub const DEFAULT_PAGE_SIZE: u32 = 24;

/// Maximum page size for collection queries
pub const MAX_PAGE_SIZE: u32 = 50;

// ============================================================================
// DISPLAY DEFAULTS
// ============================================================================

/// Token display names are `"{COLLECTION_NAME} #{token_id}"`.
pub const COLLECTION_NAME: &str = "OnchainRug";

pub const COLLECTION_DESCRIPTION: &str = "OnchainRugs by valipokkann";

pub const DEFAULT_IMAGE: &str = "/logo.png";
