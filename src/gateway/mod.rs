//! Gateway handler: predefined-vs-forward routing and status mapping
//!
//! Transports (`http`, `lambda`) only move bodies in and out; every request
//! goes through [`Gateway::handle_body`].

pub mod http;
pub mod lambda;

use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info_span, warn, Instrument};

use crate::jsonrpc::{
    RpcRequest, RpcResponse, GATEWAY_ERROR_CODE, INVALID_PARAMS_CODE, PARSE_ERROR_CODE,
};
use crate::metrics::metrics;
use crate::nonce_manager::{SigningCoordinator, SigningError};
use crate::observability::CorrelationId;
use crate::predefined::{Predefined, PredefinedTable};
use crate::rpc_manager::{RpcClient, RpcError};
use crate::types::Network;

pub const STATUS_OK: u16 = 200;
pub const STATUS_BAD_REQUEST: u16 = 400;

#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    #[error(transparent)]
    Rpc(#[from] RpcError),

    #[error(transparent)]
    Signing(#[from] SigningError),

    #[error("invalid params: {0}")]
    InvalidParams(String),

    #[error("parse error: {0}")]
    Parse(String),
}

impl GatewayError {
    /// JSON-RPC error code and message reported to the client
    pub fn to_error_parts(&self) -> (i64, String) {
        match self {
            GatewayError::InvalidParams(_) => (INVALID_PARAMS_CODE, self.to_string()),
            GatewayError::Parse(_) => (PARSE_ERROR_CODE, self.to_string()),
            GatewayError::Signing(SigningError::Rejected { code, message }) => (*code, message.clone()),
            _ => (GATEWAY_ERROR_CODE, self.to_string()),
        }
    }
}

/// Status code plus JSON-RPC body for one inbound request
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayReply {
    pub status: u16,
    pub response: RpcResponse,
}

impl GatewayReply {
    fn new(status: u16, response: RpcResponse) -> Self {
        if status != STATUS_OK {
            metrics().gateway_failures.inc();
        }
        Self { status, response }
    }

    pub fn body(&self) -> String {
        self.response.to_json()
    }
}

pub struct Gateway {
    client: Arc<RpcClient>,
    coordinator: Arc<SigningCoordinator>,
    predefined: PredefinedTable,
}

impl Gateway {
    pub fn new(client: Arc<RpcClient>, coordinator: Arc<SigningCoordinator>, default_gas_limit: u64) -> Self {
        let predefined = PredefinedTable::new(Arc::clone(&client), Arc::clone(&coordinator), default_gas_limit);
        Self {
            client,
            coordinator,
            predefined,
        }
    }

    pub fn client(&self) -> &Arc<RpcClient> {
        &self.client
    }

    pub fn coordinator(&self) -> &Arc<SigningCoordinator> {
        &self.coordinator
    }

    pub fn network(&self) -> Network {
        self.client.network()
    }

    /// Parse a raw body and handle it. A non-empty `func` replaces the
    /// request method; with `func` set an empty body is an empty request.
    pub async fn handle_body(&self, body: &str, func: Option<&str>) -> GatewayReply {
        self.handle_body_as(CorrelationId::new(), body, func).await
    }

    /// [`Gateway::handle_body`] under a caller-supplied correlation id
    pub async fn handle_body_as(
        &self,
        correlation_id: CorrelationId,
        body: &str,
        func: Option<&str>,
    ) -> GatewayReply {
        let func = func.map(str::trim).filter(|f| !f.is_empty());

        let parsed = match (body.trim().is_empty(), func) {
            (true, Some(func)) => Ok(RpcRequest::new(func, Vec::new(), Value::Null)),
            _ => RpcRequest::from_json(body).map_err(|e| GatewayError::Parse(e.to_string())),
        };

        let mut request = match parsed {
            Ok(request) => request,
            Err(e) => {
                metrics().gateway_requests.inc();
                debug!(error = %e, "Rejecting unparseable request body");
                let (code, message) = e.to_error_parts();
                return GatewayReply::new(STATUS_BAD_REQUEST, RpcResponse::failure(Value::Null, code, message));
            }
        };

        if let Some(func) = func {
            request.method = func.to_string();
        }
        self.handle_as(correlation_id, request).await
    }

    /// Route one request to a predefined function or the upstream pool
    pub async fn handle(&self, request: RpcRequest) -> GatewayReply {
        self.handle_as(CorrelationId::new(), request).await
    }

    async fn handle_as(&self, correlation_id: CorrelationId, request: RpcRequest) -> GatewayReply {
        let span = info_span!(
            "gateway_request",
            correlation_id = %correlation_id,
            method = %request.method,
        );
        self.route(request).instrument(span).await
    }

    async fn route(&self, request: RpcRequest) -> GatewayReply {
        metrics().gateway_requests.inc();
        let id = request.id.clone();

        let result = match Predefined::lookup(&request.method) {
            Some(entry) => {
                metrics().predefined_calls.with_label_values(&[entry.method()]).inc();
                self.predefined.dispatch(entry, request).await
            }
            None => self.client.generic_rpc(&request).await.map_err(GatewayError::from),
        };

        match result {
            Ok(response) if response.is_error() => {
                debug!(error = ?response.error, "Upstream application error");
                GatewayReply::new(STATUS_BAD_REQUEST, response)
            }
            Ok(response) => GatewayReply::new(STATUS_OK, response),
            Err(e) => {
                warn!(error = %e, "Request failed");
                let (code, message) = e.to_error_parts();
                GatewayReply::new(STATUS_BAD_REQUEST, RpcResponse::failure(id, code, message))
            }
        }
    }
}
