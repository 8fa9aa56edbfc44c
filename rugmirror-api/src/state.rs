//! Shared application state for Axum routers.

use std::sync::Arc;

use rugmirror_chain::{ChainReader, RpcClient, RpcContract};
use rugmirror_core::{Clock, MirrorResult, SystemClock};
use rugmirror_storage::{BackgroundJobs, CacheNamespace, InMemoryStore, KeyValueStore, LmdbStore};

use crate::assembler::{AssemblerSettings, ChainMirror, CollectionAssembler};
use crate::config::{ApiConfig, ChainRegistry};

/// Application-wide state shared across all routes.
#[derive(Clone)]
pub struct AppState {
    pub assembler: Arc<CollectionAssembler>,
    /// The store every chain caches into, for usage reporting.
    pub store: Arc<dyn KeyValueStore>,
    pub start_time: std::time::Instant,
}

impl AppState {
    pub fn new(assembler: CollectionAssembler, store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            assembler: Arc::new(assembler),
            store,
            start_time: std::time::Instant::now(),
        }
    }

    /// Open the store and wire a chain reader for every registered chain.
    pub fn from_config(
        config: &ApiConfig,
        registry: &ChainRegistry,
        jobs: BackgroundJobs,
    ) -> MirrorResult<Self> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let store = open_store(config, Arc::clone(&clock))?;

        let mut assembler = CollectionAssembler::new(AssemblerSettings::from(config), jobs.clone());
        for chain in registry.chains() {
            let client = RpcClient::new(chain.chain_id, chain.rpc_urls.clone(), config.rpc_timeout)?;
            let contract = RpcContract::new(client, &chain.contract);
            let reader = Arc::new(ChainReader::new(contract, chain.chain_id, Arc::clone(&clock)));

            assembler = assembler.with_chain(ChainMirror::new(
                Arc::clone(&store),
                CacheNamespace::new(chain.chain_id, &chain.contract),
                reader.clone(),
                reader,
                Arc::clone(&clock),
                jobs.clone(),
                config.config_ttl,
            ));
            tracing::info!(
                chain_id = chain.chain_id,
                contract = %chain.contract,
                endpoints = chain.rpc_urls.len(),
                "chain registered"
            );
        }

        Ok(Self::new(assembler, store))
    }
}

fn open_store(config: &ApiConfig, clock: Arc<dyn Clock>) -> MirrorResult<Arc<dyn KeyValueStore>> {
    match &config.cache_path {
        Some(path) => {
            let store = LmdbStore::open_with_clock(path, config.cache_max_mb, clock)?;
            tracing::info!(path = %path.display(), max_mb = config.cache_max_mb, "LMDB cache opened");
            Ok(Arc::new(store))
        }
        None => {
            let store = Arc::new(InMemoryStore::with_clock(clock));
            // Detached; runs for the life of the process.
            let _sweeper = Arc::clone(&store).spawn_sweeper(config.cache_sweep_interval);
            tracing::info!(
                sweep_secs = config.cache_sweep_interval.as_secs(),
                "using in-memory cache"
            );
            Ok(store)
        }
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("assembler", &self.assembler)
            .finish()
    }
}
