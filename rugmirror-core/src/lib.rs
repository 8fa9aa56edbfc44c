//! Rugmirror Core - Record Types and Derived State
//!
//! Data structures shared by every mirror crate, plus the pure rules that
//! turn a stored record into what callers see. No I/O lives here.

pub mod clock;
pub mod config;
pub mod constants;
pub mod decimal;
pub mod derived;
pub mod entities;
pub mod enums;
pub mod error;
pub mod source;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{AgingThresholds, ChainConfig};
pub use derived::{aging_level, derive_view, dirt_level, normalize_timestamp};
pub use entities::{
    CollectionSummary, DerivedDynamic, DerivedView, DynamicRecord, MarketSummary, OwnershipEntry,
    PermanentRecord, SaleEntry, TokenRecord,
};
pub use enums::{AcquiredVia, FrameTier};
pub use error::{ChainError, ConfigError, MirrorError, MirrorResult, StorageError};
pub use source::{ConfigSource, TokenSource};

// ============================================================================
// IDENTITY TYPES
// ============================================================================

/// ERC-721 token id. Rug ids start at 1.
pub type TokenId = u64;

/// EVM chain id.
pub type ChainId = u64;

/// Full-width unsigned integer for on-chain seeds and wei amounts.
pub use alloy_primitives::U256;

/// Lowercase `0x`-prefixed hex address.
pub type Address = String;

/// Lowercase an address for use in keys and comparisons.
pub fn normalize_address(address: &str) -> Address {
    address.trim().to_ascii_lowercase()
}

/// Whether an address is the zero address (in any casing or padding).
pub fn is_zero_address(address: &str) -> bool {
    let hex = address.trim().trim_start_matches("0x").trim_start_matches("0X");
    !hex.is_empty() && hex.chars().all(|c| c == '0')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_address_detection() {
        assert!(is_zero_address(constants::ZERO_ADDRESS));
        assert!(is_zero_address("0x0"));
        assert!(!is_zero_address("0x3d6670aC0A881Dcc742c17D687F5dfE05Af81cff"));
        assert!(!is_zero_address("0x"));
    }

    #[test]
    fn test_normalize_address() {
        assert_eq!(
            normalize_address(" 0x3d6670aC0A881Dcc742c17D687F5dfE05Af81cff "),
            "0x3d6670ac0a881dcc742c17d687f5dfe05af81cff"
        );
    }
}
