//! Cache key layout.
//!
//! Every token key is scoped to a [`CacheNamespace`] (chain id + contract), so
//! two deployments of the collection can share one store without collisions.
//!
//! # Format
//!
//! - `rugmarket:{chain}:{contract}:nft:{token}:permanent`
//! - `rugmarket:{chain}:{contract}:nft:{token}:dynamic`
//! - `rugmarket:{chain}:{contract}:collection:total-supply`
//! - `rugmarket:{chain}:{contract}:collection:stats`
//! - `rugmarket:contract:config:{chain}` (chain-wide, shared by every contract)

use rugmirror_core::{normalize_address, Address, ChainId, TokenId};
use std::fmt;

const PREFIX: &str = "rugmarket";

/// Which half of a token a key holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordHalf {
    Permanent,
    Dynamic,
}

impl RecordHalf {
    fn as_str(self) -> &'static str {
        match self {
            RecordHalf::Permanent => "permanent",
            RecordHalf::Dynamic => "dynamic",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "permanent" => Some(RecordHalf::Permanent),
            "dynamic" => Some(RecordHalf::Dynamic),
            _ => None,
        }
    }
}

/// Chain id and contract address that scope a set of token keys.
///
/// Fields are private so the contract address is always normalized.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheNamespace {
    chain_id: ChainId,
    contract: Address,
}

impl CacheNamespace {
    pub fn new(chain_id: ChainId, contract: &str) -> Self {
        Self {
            chain_id,
            contract: normalize_address(contract),
        }
    }

    pub fn chain_id(&self) -> ChainId {
        self.chain_id
    }

    pub fn contract(&self) -> &str {
        &self.contract
    }

    pub fn token_key(&self, token_id: TokenId, half: RecordHalf) -> TokenKey {
        TokenKey {
            namespace: self.clone(),
            token_id,
            half,
        }
    }

    pub fn permanent_key(&self, token_id: TokenId) -> String {
        self.token_key(token_id, RecordHalf::Permanent).encode()
    }

    pub fn dynamic_key(&self, token_id: TokenId) -> String {
        self.token_key(token_id, RecordHalf::Dynamic).encode()
    }

    pub fn total_supply_key(&self) -> String {
        format!(
            "{PREFIX}:{}:{}:collection:total-supply",
            self.chain_id, self.contract
        )
    }

    pub fn collection_stats_key(&self) -> String {
        format!("{PREFIX}:{}:{}:collection:stats", self.chain_id, self.contract)
    }

    /// Chain configuration key. Not contract-scoped.
    pub fn config_key(chain_id: ChainId) -> String {
        format!("{PREFIX}:contract:config:{chain_id}")
    }
}

impl fmt::Display for CacheNamespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{PREFIX}:{}:{}", self.chain_id, self.contract)
    }
}

/// Key of one record half.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TokenKey {
    namespace: CacheNamespace,
    token_id: TokenId,
    half: RecordHalf,
}

impl TokenKey {
    pub fn namespace(&self) -> &CacheNamespace {
        &self.namespace
    }

    pub fn token_id(&self) -> TokenId {
        self.token_id
    }

    pub fn half(&self) -> RecordHalf {
        self.half
    }

    pub fn encode(&self) -> String {
        format!("{}:nft:{}:{}", self.namespace, self.token_id, self.half.as_str())
    }

    /// Parse a key produced by [`TokenKey::encode`].
    pub fn decode(key: &str) -> Option<Self> {
        let mut parts = key.split(':');
        if parts.next()? != PREFIX {
            return None;
        }
        let chain_id = parts.next()?.parse().ok()?;
        let contract = parts.next()?;
        if parts.next()? != "nft" {
            return None;
        }
        let token_id = parts.next()?.parse().ok()?;
        let half = RecordHalf::parse(parts.next()?)?;
        if parts.next().is_some() {
            return None;
        }
        Some(CacheNamespace::new(chain_id, contract).token_key(token_id, half))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const CONTRACT: &str = "0x3d6670aC0A881Dcc742c17D687F5dfE05Af81cff";

    #[test]
    fn test_key_layout() {
        let ns = CacheNamespace::new(84532, CONTRACT);
        assert_eq!(
            ns.permanent_key(7),
            "rugmarket:84532:0x3d6670ac0a881dcc742c17d687f5dfe05af81cff:nft:7:permanent"
        );
        assert_eq!(
            ns.dynamic_key(7),
            "rugmarket:84532:0x3d6670ac0a881dcc742c17d687f5dfe05af81cff:nft:7:dynamic"
        );
        assert_eq!(
            ns.total_supply_key(),
            "rugmarket:84532:0x3d6670ac0a881dcc742c17d687f5dfe05af81cff:collection:total-supply"
        );
        assert_eq!(
            ns.collection_stats_key(),
            "rugmarket:84532:0x3d6670ac0a881dcc742c17d687f5dfe05af81cff:collection:stats"
        );
        assert_eq!(CacheNamespace::config_key(84532), "rugmarket:contract:config:84532");
    }

    #[test]
    fn test_contract_case_does_not_split_namespace() {
        let upper = CacheNamespace::new(1, CONTRACT);
        let lower = CacheNamespace::new(1, &CONTRACT.to_lowercase());
        assert_eq!(upper, lower);
        assert_eq!(upper.dynamic_key(1), lower.dynamic_key(1));
    }

    #[test]
    fn test_decode_rejects_foreign_keys() {
        assert!(TokenKey::decode("rugmarket:contract:config:84532").is_none());
        assert!(TokenKey::decode("other:1:0xabc:nft:1:dynamic").is_none());
        assert!(TokenKey::decode("rugmarket:1:0xabc:nft:1:derived").is_none());
        assert!(TokenKey::decode("rugmarket:1:0xabc:nft:1:dynamic:extra").is_none());
    }

    fn half_strategy() -> impl Strategy<Value = RecordHalf> {
        prop_oneof![Just(RecordHalf::Permanent), Just(RecordHalf::Dynamic)]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(1000))]

        #[test]
        fn prop_encode_decode(
            chain_id in any::<u64>(),
            contract in "0x[0-9a-f]{40}",
            token_id in any::<u64>(),
            half in half_strategy(),
        ) {
            let key = CacheNamespace::new(chain_id, &contract).token_key(token_id, half);
            prop_assert_eq!(TokenKey::decode(&key.encode()), Some(key));
        }

        #[test]
        fn prop_distinct_tokens_distinct_keys(
            chain_id in any::<u64>(),
            contract in "0x[0-9a-f]{40}",
            a in any::<u64>(),
            b in any::<u64>(),
        ) {
            prop_assume!(a != b);
            let ns = CacheNamespace::new(chain_id, &contract);
            prop_assert_ne!(ns.dynamic_key(a), ns.dynamic_key(b));
            prop_assert_ne!(ns.permanent_key(a), ns.dynamic_key(a));
        }
    }
}
