//! eth-gateway - JSON-RPC gateway library
//!
//! Forwards JSON-RPC calls across a failover pool of upstream nodes, serves
//! a small set of predefined functions and signs transactions locally under
//! a single serialized nonce counter.

pub mod config;
pub mod contract;
pub mod crypto;
pub mod gateway;
pub mod jsonrpc;
pub mod metrics;
pub mod observability;
pub mod predefined;
pub mod types;

// Component modules with non-standard paths (directories with spaces)
#[path = "nonce manager/mod.rs"]
pub mod nonce_manager;

#[path = "rpc manager/mod.rs"]
pub mod rpc_manager;

pub use config::Config;
pub use gateway::{Gateway, GatewayError, GatewayReply};
pub use jsonrpc::{RpcRequest, RpcResponse};
pub use nonce_manager::SigningCoordinator;
pub use rpc_manager::{EndpointPool, RpcClient};
pub use types::Network;

#[cfg(test)]
mod tests;
