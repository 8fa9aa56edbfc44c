//! Contract bindings for the view calls the mirror makes.
//!
//! Encoding and decoding go through `alloy`'s `sol!` types. Counters and
//! timestamps are declared `uint256` so a narrower on-chain width still
//! decodes; they are narrowed to Rust integers in [`narrow`].

use alloy::primitives::{hex, U256};
use alloy::sol;
use alloy::sol_types::{SolCall, SolError};
use rugmirror_core::{ChainError, MirrorResult};

sol! {
    struct RugData {
        uint256 seed;
        string[] textRows;
        string paletteName;
        string minifiedPalette;
        string minifiedStripeData;
        uint8 warpThickness;
        uint256 mintTime;
        string filteredCharacterMap;
        address curator;
        uint256 characterCount;
        uint256 stripeCount;
    }

    struct AgingData {
        uint256 lastCleaned;
        uint256 dirtLevel;
        uint256 agingLevel;
        uint256 frameLevel;
        uint256 frameAchievedTime;
        uint256 cleaningCount;
        uint256 restorationCount;
        uint256 masterRestorationCount;
        uint256 launderingCount;
        uint256 lastLaundered;
        uint256 lastSalePrice;
        uint256[] recentSalePrices;
    }

    function totalSupply() external view returns (uint256);
    function ownerOf(uint256 tokenId) external view returns (address);
    function getRugData(uint256 tokenId) external view returns (RugData memory);
    function getAgingData(uint256 tokenId) external view returns (AgingData memory);
    function getMaintenanceScore(uint256 tokenId) external view returns (uint256);
    function getListing(uint256 tokenId) external view returns (address seller, uint256 price, uint256 expiresAt, bool isActive);
    function getAgingThresholds() external view returns (
        uint256 dirtLevel1Days,
        uint256 dirtLevel2Days,
        uint256 agingAdvanceDays,
        uint256 freeCleanDays,
        uint256 freeCleanWindow
    );
    function getMarketplaceStats() external view returns (
        uint256 totalFeesCollected,
        uint256 totalVolume,
        uint256 totalSales,
        uint256 marketplaceFeeBPS
    );

    error ERC721NonexistentToken(uint256 tokenId);
}

/// `0x`-prefixed calldata for `call`.
pub fn encode<C: SolCall>(call: &C) -> String {
    hex::encode_prefixed(call.abi_encode())
}

/// Decode the return data of `C`, validating it against the declared types.
pub fn decode<C: SolCall>(data: &[u8]) -> MirrorResult<C::Return> {
    C::abi_decode_returns(data, true).map_err(|e| {
        ChainError::Decode {
            method: C::SIGNATURE.to_string(),
            reason: e.to_string(),
        }
        .into()
    })
}

/// Decode a `0x`-prefixed hex string.
pub fn decode_hex(method: &str, text: &str) -> MirrorResult<Vec<u8>> {
    let digits = text.trim();
    let digits = digits.strip_prefix("0x").unwrap_or(digits);
    hex::decode(digits).map_err(|e| {
        ChainError::Decode {
            method: method.to_string(),
            reason: format!("invalid hex: {e}"),
        }
        .into()
    })
}

/// Narrow a `uint256` field to the width the mirror stores it in.
pub fn narrow<T: TryFrom<U256>>(method: &str, field: &str, value: U256) -> MirrorResult<T> {
    T::try_from(value).map_err(|_| {
        ChainError::Decode {
            method: method.to_string(),
            reason: format!("{field} value {value} out of range"),
        }
        .into()
    })
}

/// Revert-data prefix of `ERC721NonexistentToken(uint256)`.
pub fn nonexistent_token_selector() -> String {
    hex::encode_prefixed(ERC721NonexistentToken::SELECTOR)
}
