//! Rugmirror API - Collection Assembler and HTTP Surface
//!
//! Serves the OnchainRugs collection from the record cache, filling gaps from
//! the chain. The binary in `main.rs` wires configuration, the store and one
//! chain reader per registered chain into an Axum router.

pub mod assembler;
pub mod config;
pub mod error;
pub mod routes;
pub mod state;
pub mod telemetry;

pub use assembler::{
    window, AssemblerSettings, ChainMirror, CollectionAssembler, CollectionPage, CollectionQuery,
    CollectionStats, Pagination,
};
pub use config::{default_rpc_url, ApiConfig, ChainRegistry, ChainSettings};
pub use error::{ApiError, ApiResult, ErrorCode};
pub use routes::create_api_router;
pub use state::AppState;
