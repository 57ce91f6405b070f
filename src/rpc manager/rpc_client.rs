//! JSON-RPC client with failover across the endpoint pool
use alloy::primitives::{Address, Bytes};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use super::rpc_config::RpcConfig;
use super::rpc_errors::{PoolError, RetryPolicy, RpcError};
use super::rpc_pool::EndpointPool;
use crate::jsonrpc::{RpcRequest, RpcResponse};
use crate::metrics::{metrics, Timer};
use crate::types::Network;

/// RPC client bound to one network of the endpoint pool
#[derive(Debug)]
pub struct RpcClient {
    http: reqwest::Client,
    pool: Arc<EndpointPool>,
    network: Network,
    max_attempts: u32,
    timeout_ms: u64,
    retry: RetryPolicy,
    next_id: AtomicU64,
}

impl RpcClient {
    pub fn new(pool: Arc<EndpointPool>, network: Network, config: &RpcConfig) -> Result<Self, RpcError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| RpcError::ClientSetup(e.to_string()))?;

        Ok(Self {
            http,
            pool,
            network,
            max_attempts: config.max_attempts.max(1),
            timeout_ms: config.timeout_ms,
            retry: config.retry_policy(),
            next_id: AtomicU64::new(1),
        })
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn network(&self) -> Network {
        self.network
    }

    pub fn pool(&self) -> &Arc<EndpointPool> {
        &self.pool
    }

    fn request(&self, method: &str, params: Vec<Value>) -> RpcRequest {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        RpcRequest::new(method, params, id)
    }

    /// Forward an arbitrary request, failing over on transport errors.
    ///
    /// Tries at most `min(max_attempts, available endpoints)` endpoints. A
    /// well-formed JSON-RPC error from the node is returned as the response
    /// and never counts against the endpoint.
    #[instrument(skip(self, request), fields(method = %request.method, network = %self.network))]
    pub async fn generic_rpc(&self, request: &RpcRequest) -> Result<RpcResponse, RpcError> {
        let available = self.pool.available_count(self.network) as u32;
        let attempts = self.max_attempts.min(available).max(1);
        let mut last_error: Option<String> = None;

        for attempt in 0..attempts {
            let url = match self.pool.select(self.network) {
                Ok(url) => url,
                Err(PoolError::Empty { .. }) => {
                    return Err(RpcError::PoolExhausted {
                        network: self.network,
                        attempts: attempt,
                        last_error,
                    });
                }
                Err(e) => return Err(e.into()),
            };

            match self.post(&url, request).await {
                Ok(response) => {
                    self.pool.report_success(self.network, &url);
                    if response.is_error() {
                        debug!(url = %url, "Upstream returned an application error");
                    }
                    return Ok(response);
                }
                Err(e) if e.is_transport() => {
                    metrics()
                        .upstream_transport_failures
                        .with_label_values(&[self.network.as_str()])
                        .inc();
                    self.pool.report_failure(self.network, &url);
                    warn!(url = %url, attempt = attempt + 1, attempts, error = %e, "Upstream call failed");
                    last_error = Some(e.to_string());

                    if attempt + 1 < attempts {
                        tokio::time::sleep(self.retry.delay_for(attempt)).await;
                    }
                }
                Err(e) => return Err(e),
            }
        }

        // Failures may have demoted the last available endpoint
        if self.pool.available_count(self.network) == 0 {
            Err(RpcError::PoolExhausted {
                network: self.network,
                attempts,
                last_error,
            })
        } else {
            Err(RpcError::RetriesExhausted {
                network: self.network,
                attempts,
                last_error,
            })
        }
    }

    async fn post(&self, url: &str, request: &RpcRequest) -> Result<RpcResponse, RpcError> {
        let timer = Timer::new();
        let response = self
            .http
            .post(url)
            .json(request)
            .send()
            .await
            .map_err(|e| RpcError::from_reqwest(e, url, self.timeout_ms))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| RpcError::from_reqwest(e, url, self.timeout_ms))?;
        timer.observe_duration(&metrics().upstream_latency);

        RpcResponse::from_json(&body).map_err(|e| RpcError::MalformedResponse {
            endpoint: url.to_string(),
            message: format!("HTTP {}: {}", status, e),
        })
    }

    /// `eth_call` against the latest block
    pub async fn call(&self, to: Address, data: Bytes) -> Result<RpcResponse, RpcError> {
        let request = self.request("eth_call", vec![json!({ "to": to, "data": data }), json!("latest")]);
        self.generic_rpc(&request).await
    }

    /// `eth_sendTransaction`, signed by the node
    pub async fn send_transaction(
        &self,
        from: Address,
        to: Address,
        data: Bytes,
        gas: Option<u64>,
    ) -> Result<RpcResponse, RpcError> {
        let mut tx = json!({ "from": from, "to": to, "data": data });
        if let Some(gas) = gas {
            tx["gas"] = json!(format!("{:#x}", gas));
        }
        let request = self.request("eth_sendTransaction", vec![tx]);
        self.generic_rpc(&request).await
    }

    /// `eth_sendRawTransaction` with pre-signed wire bytes
    pub async fn send_raw_transaction(&self, raw: &[u8]) -> Result<RpcResponse, RpcError> {
        let request = self.request(
            "eth_sendRawTransaction",
            vec![json!(format!("0x{}", hex::encode(raw)))],
        );
        self.generic_rpc(&request).await
    }

    /// `eth_getCode` against the latest block
    pub async fn get_code(&self, address: Address) -> Result<RpcResponse, RpcError> {
        let request = self.request("eth_getCode", vec![json!(address), json!("latest")]);
        self.generic_rpc(&request).await
    }

    /// `eth_getTransactionCount` at the given block tag
    pub async fn get_transaction_count(&self, address: Address, block: &str) -> Result<RpcResponse, RpcError> {
        let request = self.request("eth_getTransactionCount", vec![json!(address), json!(block)]);
        self.generic_rpc(&request).await
    }

    pub async fn gas_price(&self) -> Result<RpcResponse, RpcError> {
        let request = self.request("eth_gasPrice", vec![]);
        self.generic_rpc(&request).await
    }
}
