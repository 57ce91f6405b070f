//! RPC Manager Module
//!
//! Per-network endpoint pool with failure-driven demotion and restore cycles,
//! and the JSON-RPC client that fails over across it

pub mod rpc_client;
pub mod rpc_config;
pub mod rpc_errors;
pub mod rpc_pool;

// Re-exports for convenience
pub use rpc_client::RpcClient;
pub use rpc_config::{RestorePolicy, RpcConfig};
pub use rpc_errors::{PoolError, RetryPolicy, RpcError};
pub use rpc_pool::{EndpointPool, EndpointStats, PoolStats};
