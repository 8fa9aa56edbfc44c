//! Error types for mirror operations

use crate::{ChainId, TokenId};
use thiserror::Error;

/// Cache store errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Store backend failure: {reason}")]
    Backend { reason: String },

    #[error("Failed to encode value for key {key}: {reason}")]
    Encode { key: String, reason: String },

    #[error("Failed to decode value at key {key}: {reason}")]
    Decode { key: String, reason: String },

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

/// Chain read errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChainError {
    #[error("No RPC endpoints configured for chain {chain_id}")]
    NoEndpoints { chain_id: ChainId },

    #[error("RPC request to {endpoint} failed: {reason}")]
    Transport { endpoint: String, reason: String },

    #[error("Call to {method} reverted: {message}")]
    Reverted { method: String, message: String },

    #[error("Invalid response from {method}: {reason}")]
    Decode { method: String, reason: String },

    #[error("Fetch failed for token {token_id}: {reason}")]
    TokenFetchFailed { token_id: TokenId, reason: String },

    #[error("All {count} token fetches failed on chain {chain_id}")]
    AllFetchesFailed { chain_id: ChainId, count: usize },

    #[error("Total supply unavailable on chain {chain_id}: {reason}")]
    SupplyUnavailable { chain_id: ChainId, reason: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Chain {chain_id} is not configured")]
    UnknownChain { chain_id: ChainId },

    #[error("Chain config fetch failed for chain {chain_id}: {reason}")]
    FetchFailed { chain_id: ChainId, reason: String },
}

/// Master error type for all mirror errors.
#[derive(Debug, Clone, Error)]
pub enum MirrorError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Chain error: {0}")]
    Chain(#[from] ChainError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type alias for mirror operations.
pub type MirrorResult<T> = Result<T, MirrorError>;

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_error_display_decode() {
        let err = StorageError::Decode {
            key: "rugmarket:84532:0xabc:nft:7:dynamic".to_string(),
            reason: "expected string".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("Failed to decode"));
        assert!(msg.contains("nft:7:dynamic"));
        assert!(msg.contains("expected string"));
    }

    #[test]
    fn test_chain_error_display_reverted() {
        let err = ChainError::Reverted {
            method: "ownerOf".to_string(),
            message: "ERC721: invalid token ID".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("ownerOf"));
        assert!(msg.contains("invalid token ID"));
    }

    #[test]
    fn test_chain_error_display_all_failed() {
        let err = ChainError::AllFetchesFailed {
            chain_id: 84532,
            count: 5,
        };
        let msg = format!("{}", err);
        assert!(msg.contains("All 5 token fetches failed"));
        assert!(msg.contains("84532"));
    }

    #[test]
    fn test_config_error_display_invalid_value() {
        let err = ConfigError::InvalidValue {
            field: "limit".to_string(),
            value: "500".to_string(),
            reason: "must be between 1 and 50".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("limit"));
        assert!(msg.contains("500"));
        assert!(msg.contains("between 1 and 50"));
    }

    #[test]
    fn test_mirror_error_from_variants() {
        let storage = MirrorError::from(StorageError::LockPoisoned);
        assert!(matches!(storage, MirrorError::Storage(_)));

        let chain = MirrorError::from(ChainError::NoEndpoints { chain_id: 1 });
        assert!(matches!(chain, MirrorError::Chain(_)));

        let config = MirrorError::from(ConfigError::UnknownChain { chain_id: 1 });
        assert!(matches!(config, MirrorError::Config(_)));
    }
}
