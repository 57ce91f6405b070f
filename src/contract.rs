//! Contract helpers over pre-packed calldata
//!
//! Three ways to talk to a contract:
//! - `call`: read-only `eth_call`
//! - `send_transaction`: `eth_sendTransaction`, the node holds the key
//! - `send_transaction_with_sign`: legacy transaction signed by the
//!   coordinator and relayed with `eth_sendRawTransaction`
use alloy::consensus::TxLegacy;
use alloy::primitives::{Address, Bytes, TxKind, U256};
use std::sync::Arc;
use tracing::{debug, info, instrument};

use crate::jsonrpc::RpcResponse;
use crate::nonce_manager::{parse_quantity, SigningCoordinator, SigningError, SigningResult};
use crate::rpc_manager::{RpcClient, RpcError};

/// Unsigned transaction fields supplied by the caller.
/// Nonce and chain id are always assigned by the coordinator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TxRequest {
    /// `None` deploys a contract
    pub to: Option<Address>,
    pub data: Bytes,
    pub value: U256,
    pub gas_limit: Option<u64>,
    /// Fetched with `eth_gasPrice` when absent
    pub gas_price: Option<u128>,
}

impl TxRequest {
    pub fn call(to: Address, data: Bytes) -> Self {
        Self {
            to: Some(to),
            data,
            ..Default::default()
        }
    }

    fn into_legacy(self, nonce: u64, gas_price: u128, default_gas_limit: u64) -> TxLegacy {
        TxLegacy {
            chain_id: None,
            nonce,
            gas_price,
            gas_limit: self.gas_limit.unwrap_or(default_gas_limit),
            to: self.to.map(TxKind::Call).unwrap_or(TxKind::Create),
            value: self.value,
            input: self.data,
        }
    }
}

/// Read-only call against the latest block
pub async fn call(client: &RpcClient, to: Address, data: Bytes) -> Result<RpcResponse, RpcError> {
    client.call(to, data).await
}

/// Node-signed transaction sent from the coordinator's address
pub async fn send_transaction(
    client: &RpcClient,
    coordinator: &SigningCoordinator,
    to: Address,
    data: Bytes,
    gas: Option<u64>,
) -> SigningResult<RpcResponse> {
    let from = coordinator.address().await?;
    Ok(client.send_transaction(from, to, data, gas).await?)
}

/// Sign locally under the coordinator's nonce lock and relay the raw bytes.
///
/// An upstream error response fails the cycle, so the nonce is not consumed.
#[instrument(skip_all, fields(to = ?request.to))]
pub async fn send_transaction_with_sign(
    client: Arc<RpcClient>,
    coordinator: &Arc<SigningCoordinator>,
    request: TxRequest,
    default_gas_limit: u64,
) -> SigningResult<RpcResponse> {
    let build_client = Arc::clone(&client);

    coordinator
        .sign_with_nonce(
            move |nonce| async move {
                let gas_price = match request.gas_price {
                    Some(price) => price,
                    None => fetch_gas_price(&build_client).await?,
                };
                debug!(nonce, gas_price, "Building transaction");
                Ok(request.into_legacy(nonce, gas_price, default_gas_limit))
            },
            move |signed| async move {
                let response = client.send_raw_transaction(&signed.raw).await?;
                if let Some(error) = response.error.as_ref().filter(|e| e.code != 0) {
                    return Err(SigningError::Rejected {
                        code: error.code,
                        message: error.message.clone(),
                    });
                }
                info!(nonce = signed.nonce, hash = %signed.hash, "Raw transaction relayed");
                Ok(response)
            },
        )
        .await
}

async fn fetch_gas_price(client: &RpcClient) -> SigningResult<u128> {
    let response = client.gas_price().await?;
    if let Some(error) = response.error.filter(|e| e.code != 0) {
        return Err(SigningError::Rejected {
            code: error.code,
            message: error.message,
        });
    }
    let result = response
        .result
        .ok_or_else(|| SigningError::InvalidTransaction("eth_gasPrice returned no result".to_string()))?;
    parse_quantity(&result)
        .map(u128::from)
        .map_err(|e| SigningError::InvalidTransaction(format!("gas price: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc_manager::{EndpointPool, RpcConfig};
    use crate::types::Network;
    use alloy::consensus::TxEnvelope;
    use alloy::eips::eip2718::Decodable2718;
    use mockito::Matcher;
    use serde_json::json;

    const CHAIN_ID: u64 = 11155111;

    fn client_for(url: &str) -> Arc<RpcClient> {
        let config = RpcConfig::from_urls(Network::Testnet, &[url]);
        let pool = Arc::new(EndpointPool::new(&config));
        Arc::new(RpcClient::new(pool, Network::Testnet, &config).unwrap())
    }

    #[test]
    fn test_into_legacy_defaults() {
        let tx = TxRequest::default().into_legacy(3, 7, 21_000);
        assert_eq!(tx.to, TxKind::Create);
        assert_eq!(tx.gas_limit, 21_000);
        assert_eq!(tx.nonce, 3);

        let to = Address::repeat_byte(0x22);
        let tx = TxRequest {
            gas_limit: Some(50_000),
            ..TxRequest::call(to, Bytes::from_static(&[0xab]))
        }
        .into_legacy(0, 1, 21_000);
        assert_eq!(tx.to, TxKind::Call(to));
        assert_eq!(tx.gas_limit, 50_000);
    }

    #[tokio::test]
    async fn test_send_transaction_uses_coordinator_address() {
        let mut server = mockito::Server::new_async().await;
        let coordinator = SigningCoordinator::dummy(CHAIN_ID).unwrap();
        let from = coordinator.address().await.unwrap();

        let mock = server
            .mock("POST", "/")
            .match_body(Matcher::PartialJson(json!({
                "method": "eth_sendTransaction",
                "params": [{ "from": from, "gas": "0x5208" }]
            })))
            .with_status(200)
            .with_body(r#"{"jsonrpc":"2.0","result":"0xabc","id":1}"#)
            .create_async()
            .await;

        let client = client_for(&server.url());
        let response = send_transaction(&client, &coordinator, Address::repeat_byte(1), Bytes::new(), Some(21_000))
            .await
            .unwrap();
        assert_eq!(response.result, Some(json!("0xabc")));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_send_with_sign_fetches_gas_price_and_advances() {
        let mut server = mockito::Server::new_async().await;
        let gas = server
            .mock("POST", "/")
            .match_body(Matcher::PartialJson(json!({ "method": "eth_gasPrice" })))
            .with_status(200)
            .with_body(r#"{"jsonrpc":"2.0","result":"0x3b9aca00","id":1}"#)
            .create_async()
            .await;
        let raw = server
            .mock("POST", "/")
            .match_body(Matcher::PartialJson(json!({ "method": "eth_sendRawTransaction" })))
            .with_status(200)
            .with_body(r#"{"jsonrpc":"2.0","result":"0xfeed","id":2}"#)
            .create_async()
            .await;

        let client = client_for(&server.url());
        let coordinator = SigningCoordinator::dummy(CHAIN_ID).unwrap();
        let request = TxRequest::call(Address::repeat_byte(0x33), Bytes::from_static(&[1, 2, 3]));

        let response = send_transaction_with_sign(client, &coordinator, request, 100_000)
            .await
            .unwrap();
        assert_eq!(response.result, Some(json!("0xfeed")));
        assert_eq!(coordinator.next_nonce().await, 1);
        gas.assert_async().await;
        raw.assert_async().await;
    }

    #[tokio::test]
    async fn test_signed_payload_carries_chain_id_and_nonce() {
        let mut server = mockito::Server::new_async().await;
        let captured = Arc::new(parking_lot::Mutex::new(None::<String>));
        let sink = Arc::clone(&captured);
        let raw = server
            .mock("POST", "/")
            .match_body(Matcher::PartialJson(json!({ "method": "eth_sendRawTransaction" })))
            .with_status(200)
            .with_body_from_request(move |request| {
                let body: serde_json::Value =
                    serde_json::from_slice(request.body().unwrap()).unwrap();
                *sink.lock() = body["params"][0].as_str().map(str::to_string);
                br#"{"jsonrpc":"2.0","result":"0x01","id":1}"#.to_vec()
            })
            .create_async()
            .await;

        let client = client_for(&server.url());
        let coordinator = SigningCoordinator::dummy(CHAIN_ID).unwrap();
        let request = TxRequest {
            gas_price: Some(5),
            gas_limit: Some(21_000),
            value: U256::from(10u64),
            ..TxRequest::call(Address::repeat_byte(0x44), Bytes::new())
        };

        send_transaction_with_sign(client, &coordinator, request, 100_000)
            .await
            .unwrap();
        raw.assert_async().await;

        let hex_raw = captured.lock().clone().unwrap();
        let bytes = hex::decode(hex_raw.trim_start_matches("0x")).unwrap();
        match TxEnvelope::decode_2718(&mut &bytes[..]).unwrap() {
            TxEnvelope::Legacy(signed) => {
                assert_eq!(signed.tx().nonce, 0);
                assert_eq!(signed.tx().chain_id, Some(CHAIN_ID));
                assert_eq!(signed.tx().gas_price, 5);
                assert_eq!(signed.tx().value, U256::from(10u64));
            }
            other => panic!("expected legacy transaction, got {:?}", other.tx_type()),
        }
    }

    #[tokio::test]
    async fn test_rejection_keeps_nonce_and_flags_drift() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/")
            .match_body(Matcher::PartialJson(json!({ "method": "eth_sendRawTransaction" })))
            .with_status(200)
            .with_body(r#"{"jsonrpc":"2.0","error":{"code":-32000,"message":"nonce too low"},"id":1}"#)
            .create_async()
            .await;

        let client = client_for(&server.url());
        let coordinator = SigningCoordinator::dummy(CHAIN_ID).unwrap();
        let request = TxRequest {
            gas_price: Some(1),
            ..TxRequest::call(Address::repeat_byte(0x55), Bytes::new())
        };

        let err = send_transaction_with_sign(client, &coordinator, request, 21_000)
            .await
            .unwrap_err();
        assert!(err.is_nonce_drift());
        assert_eq!(coordinator.next_nonce().await, 0);
    }
}
