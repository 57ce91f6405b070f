//! Chain-side nonce lookup used to resynchronize the local counter
use alloy::primitives::Address;
use async_trait::async_trait;
use serde_json::Value;

use super::nonce_errors::{SigningError, SigningResult};
use crate::rpc_manager::RpcClient;

/// Source of the chain's transaction count for an address
#[async_trait]
pub trait NonceSource: Send + Sync {
    /// Next nonce the chain expects from `address`, pending transactions included
    async fn transaction_count(&self, address: Address) -> SigningResult<u64>;
}

#[async_trait]
impl NonceSource for RpcClient {
    async fn transaction_count(&self, address: Address) -> SigningResult<u64> {
        let response = self.get_transaction_count(address, "pending").await?;

        if let Some(error) = response.error.filter(|e| e.code != 0) {
            return Err(SigningError::Rejected {
                code: error.code,
                message: error.message,
            });
        }

        let result = response
            .result
            .ok_or_else(|| SigningError::InvalidNonce("response carries no result".to_string()))?;
        parse_quantity(&result)
    }
}

/// Parse a JSON-RPC quantity (`"0x1a"`, or a plain number)
pub fn parse_quantity(value: &Value) -> SigningResult<u64> {
    match value {
        Value::String(s) => {
            let digits = s
                .strip_prefix("0x")
                .or_else(|| s.strip_prefix("0X"))
                .ok_or_else(|| SigningError::InvalidNonce(format!("not a hex quantity: {}", s)))?;
            if digits.is_empty() {
                return Err(SigningError::InvalidNonce(format!("empty quantity: {}", s)));
            }
            u64::from_str_radix(digits, 16)
                .map_err(|e| SigningError::InvalidNonce(format!("{}: {}", s, e)))
        }
        Value::Number(n) => n
            .as_u64()
            .ok_or_else(|| SigningError::InvalidNonce(format!("not an unsigned integer: {}", n))),
        other => Err(SigningError::InvalidNonce(format!("unexpected value: {}", other))),
    }
}

/// In-memory nonce source for tests
#[cfg(any(test, feature = "test_utils"))]
#[derive(Debug, Default)]
pub struct MockNonceSource {
    count: std::sync::atomic::AtomicU64,
    calls: std::sync::atomic::AtomicUsize,
}

#[cfg(any(test, feature = "test_utils"))]
impl MockNonceSource {
    pub fn new(count: u64) -> Self {
        Self {
            count: std::sync::atomic::AtomicU64::new(count),
            calls: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    pub fn set(&self, count: u64) {
        self.count.store(count, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(any(test, feature = "test_utils"))]
#[async_trait]
impl NonceSource for MockNonceSource {
    async fn transaction_count(&self, _address: Address) -> SigningResult<u64> {
        self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        Ok(self.count.load(std::sync::atomic::Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc_manager::{EndpointPool, RpcConfig};
    use crate::types::Network;
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn test_parse_quantity() {
        assert_eq!(parse_quantity(&json!("0x0")).unwrap(), 0);
        assert_eq!(parse_quantity(&json!("0x1a")).unwrap(), 26);
        assert_eq!(parse_quantity(&json!(42)).unwrap(), 42);
        assert!(parse_quantity(&json!("26")).is_err());
        assert!(parse_quantity(&json!("0x")).is_err());
        assert!(parse_quantity(&json!(null)).is_err());
        assert!(parse_quantity(&json!(-1)).is_err());
    }

    #[tokio::test]
    async fn test_rpc_client_transaction_count() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/")
            .match_body(mockito::Matcher::PartialJson(json!({
                "method": "eth_getTransactionCount",
                "params": ["0x0000000000000000000000000000000000000000", "pending"]
            })))
            .with_status(200)
            .with_body(r#"{"jsonrpc":"2.0","result":"0x2a","id":1}"#)
            .create_async()
            .await;

        let config = RpcConfig::from_urls(Network::Testnet, &[&server.url()]);
        let pool = Arc::new(EndpointPool::new(&config));
        let client = RpcClient::new(pool, Network::Testnet, &config).unwrap();

        assert_eq!(client.transaction_count(Address::ZERO).await.unwrap(), 42);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_mock_source_counts_calls() {
        let source = MockNonceSource::new(5);
        assert_eq!(source.transaction_count(Address::ZERO).await.unwrap(), 5);
        source.set(9);
        assert_eq!(source.transaction_count(Address::ZERO).await.unwrap(), 9);
        assert_eq!(source.calls(), 2);
    }
}
