//! API Configuration Module
//!
//! Server settings and the chain registry, loaded from `RUGMIRROR_*`
//! environment variables with defaults suitable for local development.

use std::path::PathBuf;
use std::time::Duration;

use rugmirror_core::constants::{
    CONFIG_TTL, DEFAULT_CHAIN_ID, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE, MAX_SUPPLY,
};
use rugmirror_core::{normalize_address, Address, ChainId, ConfigError, MirrorResult};

// ============================================================================
// API CONFIGURATION
// ============================================================================

/// Server-wide settings.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Socket address to listen on.
    pub bind_addr: String,

    /// LMDB directory. `None` keeps the cache in memory.
    pub cache_path: Option<PathBuf>,

    /// LMDB map size in megabytes.
    pub cache_max_mb: usize,

    /// How often the in-memory cache drops expired entries.
    pub cache_sweep_interval: Duration,

    /// Chain used when a request does not name one.
    pub default_chain_id: ChainId,

    pub default_page_size: u32,

    /// Larger `limit`s are capped to this; never above [`MAX_PAGE_SIZE`].
    pub max_page_size: u32,

    /// Reported supply is clamped to this.
    pub max_supply: u64,

    /// Freshness window for cached chain configuration.
    pub config_ttl: Duration,

    /// Per-request timeout for RPC calls.
    pub rpc_timeout: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:3000".to_string(),
            cache_path: None,
            cache_max_mb: 256,
            cache_sweep_interval: Duration::from_secs(300),
            default_chain_id: DEFAULT_CHAIN_ID,
            default_page_size: DEFAULT_PAGE_SIZE,
            max_page_size: MAX_PAGE_SIZE,
            max_supply: MAX_SUPPLY,
            config_ttl: CONFIG_TTL,
            rpc_timeout: Duration::from_millis(10_000),
        }
    }
}

impl ApiConfig {
    /// Create ApiConfig from environment variables.
    ///
    /// Environment variables:
    /// - `RUGMIRROR_BIND_ADDR`: Listen address (default: 0.0.0.0:3000)
    /// - `RUGMIRROR_CACHE_PATH`: LMDB directory (default: in-memory cache)
    /// - `RUGMIRROR_CACHE_MAX_MB`: LMDB map size (default: 256)
    /// - `RUGMIRROR_CACHE_SWEEP_SECS`: In-memory expiry sweep interval (default: 300)
    /// - `RUGMIRROR_DEFAULT_CHAIN_ID`: Chain for requests without `chainId` (default: 84532)
    /// - `RUGMIRROR_DEFAULT_PAGE_SIZE`: Page size when `limit` is absent (default: 24)
    /// - `RUGMIRROR_MAX_PAGE_SIZE`: Cap applied to `limit`, at most 50 (default: 50)
    /// - `RUGMIRROR_MAX_SUPPLY`: Supply ceiling (default: 10000)
    /// - `RUGMIRROR_CONFIG_TTL_SECS`: Chain config freshness (default: 86400)
    /// - `RUGMIRROR_RPC_TIMEOUT_MS`: RPC request timeout (default: 10000)
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable lookup. Unparseable values fall back
    /// to their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let parsed = |key: &str| lookup(key).and_then(|s| s.trim().parse::<u64>().ok());

        let max_page_size = parsed("RUGMIRROR_MAX_PAGE_SIZE")
            .map(|n| n.clamp(1, u64::from(MAX_PAGE_SIZE)) as u32)
            .unwrap_or(defaults.max_page_size);
        let default_page_size = parsed("RUGMIRROR_DEFAULT_PAGE_SIZE")
            .map(|n| n.clamp(1, u64::from(max_page_size)) as u32)
            .unwrap_or_else(|| defaults.default_page_size.min(max_page_size));

        Self {
            bind_addr: lookup("RUGMIRROR_BIND_ADDR")
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .unwrap_or(defaults.bind_addr),
            cache_path: lookup("RUGMIRROR_CACHE_PATH")
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .map(PathBuf::from),
            cache_max_mb: parsed("RUGMIRROR_CACHE_MAX_MB")
                .and_then(|n| usize::try_from(n).ok())
                .unwrap_or(defaults.cache_max_mb),
            cache_sweep_interval: parsed("RUGMIRROR_CACHE_SWEEP_SECS")
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.cache_sweep_interval),
            default_chain_id: parsed("RUGMIRROR_DEFAULT_CHAIN_ID")
                .unwrap_or(defaults.default_chain_id),
            default_page_size,
            max_page_size,
            max_supply: parsed("RUGMIRROR_MAX_SUPPLY").unwrap_or(defaults.max_supply),
            config_ttl: parsed("RUGMIRROR_CONFIG_TTL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.config_ttl),
            rpc_timeout: parsed("RUGMIRROR_RPC_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.rpc_timeout),
        }
    }
}

// ============================================================================
// CHAIN REGISTRY
// ============================================================================

/// Public RPC endpoint for the networks the collection is deployed on.
pub fn default_rpc_url(chain_id: ChainId) -> Option<&'static str> {
    match chain_id {
        84532 => Some("https://sepolia.base.org"),
        8453 => Some("https://mainnet.base.org"),
        11155111 => Some("https://ethereum-sepolia-rpc.publicnode.com"),
        11011 => Some("https://sepolia.shape.network"),
        360 => Some("https://mainnet.shape.network"),
        _ => None,
    }
}

/// Contract deployment on one chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainSettings {
    pub chain_id: ChainId,
    pub contract: Address,
    pub rpc_urls: Vec<String>,
}

/// Every chain the server mirrors.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChainRegistry {
    chains: Vec<ChainSettings>,
}

impl ChainRegistry {
    pub fn new(chains: Vec<ChainSettings>) -> Self {
        Self { chains }
    }

    /// Load from environment variables.
    ///
    /// - `RUGMIRROR_CHAINS`: Comma-separated chain ids (default: 84532)
    /// - `RUGMIRROR_CHAIN_<id>_CONTRACT`: Contract address (required per chain)
    /// - `RUGMIRROR_CHAIN_<id>_RPC_URLS`: Comma-separated RPC URLs (default: public endpoint)
    pub fn from_env() -> MirrorResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> MirrorResult<Self> {
        let ids = lookup("RUGMIRROR_CHAINS").unwrap_or_else(|| DEFAULT_CHAIN_ID.to_string());

        let mut chains: Vec<ChainSettings> = Vec::new();
        for raw in ids.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let chain_id: ChainId = raw.parse().map_err(|_| ConfigError::InvalidValue {
                field: "RUGMIRROR_CHAINS".to_string(),
                value: raw.to_string(),
                reason: "chain ids must be unsigned integers".to_string(),
            })?;
            if chains.iter().any(|c| c.chain_id == chain_id) {
                continue;
            }

            let contract_var = format!("RUGMIRROR_CHAIN_{}_CONTRACT", chain_id);
            let contract = lookup(&contract_var)
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .ok_or(ConfigError::MissingRequired {
                    field: contract_var.clone(),
                })?;

            let urls_var = format!("RUGMIRROR_CHAIN_{}_RPC_URLS", chain_id);
            let mut rpc_urls: Vec<String> = lookup(&urls_var)
                .map(|s| {
                    s.split(',')
                        .map(|u| u.trim().to_string())
                        .filter(|u| !u.is_empty())
                        .collect()
                })
                .unwrap_or_default();
            if rpc_urls.is_empty() {
                rpc_urls = default_rpc_url(chain_id)
                    .map(|url| vec![url.to_string()])
                    .ok_or(ConfigError::MissingRequired { field: urls_var })?;
            }

            chains.push(ChainSettings {
                chain_id,
                contract: normalize_address(&contract),
                rpc_urls,
            });
        }

        Ok(Self { chains })
    }

    pub fn get(&self, chain_id: ChainId) -> Option<&ChainSettings> {
        self.chains.iter().find(|c| c.chain_id == chain_id)
    }

    pub fn chains(&self) -> &[ChainSettings] {
        &self.chains
    }

    pub fn chain_ids(&self) -> Vec<ChainId> {
        self.chains.iter().map(|c| c.chain_id).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rugmirror_core::MirrorError;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_api_config_defaults() {
        let config = ApiConfig::from_lookup(|_| None);
        assert_eq!(config.bind_addr, "0.0.0.0:3000");
        assert_eq!(config.cache_path, None);
        assert_eq!(config.default_chain_id, 84532);
        assert_eq!(config.default_page_size, 24);
        assert_eq!(config.max_page_size, 50);
        assert_eq!(config.max_supply, 10_000);
        assert_eq!(config.config_ttl, Duration::from_secs(86_400));
        assert_eq!(config.rpc_timeout, Duration::from_millis(10_000));
        assert_eq!(config.cache_sweep_interval, Duration::from_secs(300));
    }

    #[test]
    fn test_api_config_overrides_and_clamps() {
        let config = ApiConfig::from_lookup(lookup_from(&[
            ("RUGMIRROR_CACHE_PATH", "/tmp/rugs"),
            ("RUGMIRROR_MAX_PAGE_SIZE", "500"),
            ("RUGMIRROR_DEFAULT_PAGE_SIZE", "80"),
            ("RUGMIRROR_CONFIG_TTL_SECS", "60"),
            ("RUGMIRROR_MAX_SUPPLY", "not-a-number"),
            ("RUGMIRROR_CACHE_SWEEP_SECS", "0"),
        ]));
        assert_eq!(config.cache_path, Some(PathBuf::from("/tmp/rugs")));
        assert_eq!(config.max_page_size, 50);
        assert_eq!(config.default_page_size, 50);
        assert_eq!(config.config_ttl, Duration::from_secs(60));
        assert_eq!(config.max_supply, 10_000);
        assert_eq!(config.cache_sweep_interval, Duration::from_secs(300));
    }

    #[test]
    fn test_registry_uses_default_rpc() {
        let registry = ChainRegistry::from_lookup(lookup_from(&[(
            "RUGMIRROR_CHAIN_84532_CONTRACT",
            "0x3D6670aC0A881Dcc742c17D687F5dfE05Af81cff",
        )]))
        .unwrap();

        let chain = registry.get(84532).unwrap();
        assert_eq!(chain.contract, "0x3d6670ac0a881dcc742c17d687f5dfe05af81cff");
        assert_eq!(chain.rpc_urls, vec!["https://sepolia.base.org"]);
        assert!(registry.get(8453).is_none());
    }

    #[test]
    fn test_registry_multiple_chains() {
        let registry = ChainRegistry::from_lookup(lookup_from(&[
            ("RUGMIRROR_CHAINS", "8453, 360,8453"),
            ("RUGMIRROR_CHAIN_8453_CONTRACT", "0xaaaa"),
            ("RUGMIRROR_CHAIN_8453_RPC_URLS", "https://a.example, https://b.example"),
            ("RUGMIRROR_CHAIN_360_CONTRACT", "0xbbbb"),
        ]))
        .unwrap();

        assert_eq!(registry.chain_ids(), vec![8453, 360]);
        assert_eq!(
            registry.get(8453).unwrap().rpc_urls,
            vec!["https://a.example", "https://b.example"]
        );
        assert_eq!(
            registry.get(360).unwrap().rpc_urls,
            vec!["https://mainnet.shape.network"]
        );
    }

    #[test]
    fn test_registry_requires_contract() {
        let err = ChainRegistry::from_lookup(lookup_from(&[("RUGMIRROR_CHAINS", "8453")]))
            .unwrap_err();
        assert!(matches!(
            err,
            MirrorError::Config(ConfigError::MissingRequired { ref field })
                if field == "RUGMIRROR_CHAIN_8453_CONTRACT"
        ));
    }

    #[test]
    fn test_registry_unknown_chain_needs_urls() {
        let err = ChainRegistry::from_lookup(lookup_from(&[
            ("RUGMIRROR_CHAINS", "31337"),
            ("RUGMIRROR_CHAIN_31337_CONTRACT", "0xcccc"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("RUGMIRROR_CHAIN_31337_RPC_URLS"));

        let err = ChainRegistry::from_lookup(lookup_from(&[("RUGMIRROR_CHAINS", "base")]))
            .unwrap_err();
        assert!(err.to_string().contains("base"));
    }
}
