//! JSON-RPC 2.0 request/response envelopes
//!
//! The gateway treats params and results as opaque `serde_json::Value`s; only
//! the predefined handlers look inside them.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

pub const JSONRPC_VERSION: &str = "2.0";

/// Error code used for gateway-side failures (transport, pool, signing)
pub const GATEWAY_ERROR_CODE: i64 = -1;
pub const PARSE_ERROR_CODE: i64 = -32700;
pub const INVALID_PARAMS_CODE: i64 = -32602;

fn default_version() -> String {
    JSONRPC_VERSION.to_string()
}

/// A present `result` stays `Some` even when it is `null`
fn present_value<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Value>, D::Error> {
    Value::deserialize(deserializer).map(Some)
}

/// Inbound or outbound JSON-RPC request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcRequest {
    #[serde(default = "default_version")]
    pub jsonrpc: String,

    pub method: String,

    #[serde(default)]
    pub params: Vec<Value>,

    #[serde(default)]
    pub id: Value,
}

impl RpcRequest {
    pub fn new(method: impl Into<String>, params: Vec<Value>, id: impl Into<Value>) -> Self {
        Self {
            jsonrpc: default_version(),
            method: method.into(),
            params,
            id: id.into(),
        }
    }

    /// Parse a request body
    pub fn from_json(body: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(body)
    }

    pub fn to_json(&self) -> String {
        // A request built from `Value`s always serializes
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// JSON-RPC error object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcErrorObject {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// JSON-RPC response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcResponse {
    #[serde(default = "default_version")]
    pub jsonrpc: String,

    /// `Some(Value::Null)` is an explicit `"result": null`
    #[serde(default, deserialize_with = "present_value", skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcErrorObject>,

    #[serde(default)]
    pub id: Value,
}

impl RpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: default_version(),
            result: Some(result),
            error: None,
            id,
        }
    }

    pub fn failure(id: Value, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: default_version(),
            result: None,
            error: Some(RpcErrorObject {
                code,
                message: message.into(),
                data: None,
            }),
            id,
        }
    }

    /// Parse an upstream response body. A body that is not a JSON object with
    /// at least one of `result`/`error` is rejected as malformed.
    pub fn from_json(body: &str) -> Result<Self, serde_json::Error> {
        let value: Value = serde_json::from_str(body)?;
        let looks_like_response = value
            .as_object()
            .map(|o| o.contains_key("result") || o.contains_key("error"))
            .unwrap_or(false);
        if !looks_like_response {
            return Err(serde::de::Error::custom(
                "response carries neither result nor error",
            ));
        }
        serde_json::from_value(value)
    }

    /// True when the node reported an application-level error
    pub fn is_error(&self) -> bool {
        self.error.as_ref().map(|e| e.code != 0).unwrap_or(false)
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}
