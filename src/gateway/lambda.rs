//! Serverless transport over the AWS Lambda Runtime API
//!
//! Each invocation carries an API Gateway proxy event; the function name may
//! come from `queryStringParameters.func` or `pathParameters.func`, the query
//! taking precedence.
use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::{Gateway, STATUS_BAD_REQUEST};
use crate::config::LAMBDA_RUNTIME_API_ENV;
use crate::jsonrpc::{RpcResponse, PARSE_ERROR_CODE};
use crate::observability::CorrelationId;

const RUNTIME_API_VERSION: &str = "2018-06-01";
const REQUEST_ID_HEADER: &str = "Lambda-Runtime-Aws-Request-Id";

/// API Gateway proxy request (only the fields the gateway reads)
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyRequest {
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub is_base64_encoded: bool,
    #[serde(default)]
    pub query_string_parameters: Option<HashMap<String, String>>,
    #[serde(default)]
    pub path_parameters: Option<HashMap<String, String>>,
}

impl ProxyRequest {
    pub fn func(&self) -> Option<&str> {
        fn lookup(params: &Option<HashMap<String, String>>) -> Option<&str> {
            params
                .as_ref()
                .and_then(|p| p.get("func"))
                .map(String::as_str)
                .filter(|f| !f.is_empty())
        }
        lookup(&self.query_string_parameters).or_else(|| lookup(&self.path_parameters))
    }

    pub fn decoded_body(&self) -> Result<String, String> {
        let body = self.body.clone().unwrap_or_default();
        if !self.is_base64_encoded {
            return Ok(body);
        }
        let bytes = BASE64_STANDARD
            .decode(body.as_bytes())
            .map_err(|e| format!("invalid base64 body: {}", e))?;
        String::from_utf8(bytes).map_err(|e| format!("body is not UTF-8: {}", e))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyResponse {
    pub status_code: u16,
    pub headers: HashMap<String, String>,
    pub body: String,
}

impl ProxyResponse {
    fn json(status_code: u16, body: String) -> Self {
        let headers = HashMap::from([("Content-Type".to_string(), "application/json".to_string())]);
        Self {
            status_code,
            headers,
            body,
        }
    }
}

/// Handle one proxy event, logged under the invocation's correlation id
pub async fn handle_event(
    gateway: &Gateway,
    correlation_id: CorrelationId,
    event: ProxyRequest,
) -> ProxyResponse {
    let body = match event.decoded_body() {
        Ok(body) => body,
        Err(e) => {
            warn!(error = %e, "Undecodable proxy body");
            let response = RpcResponse::failure(Value::Null, PARSE_ERROR_CODE, e);
            return ProxyResponse::json(STATUS_BAD_REQUEST, response.to_json());
        }
    };

    let reply = gateway.handle_body_as(correlation_id, &body, event.func()).await;
    ProxyResponse::json(reply.status, reply.body())
}

/// Minimal Lambda Runtime API client
pub struct LambdaRuntime {
    http: reqwest::Client,
    base: String,
}

impl LambdaRuntime {
    /// `api` is the `host:port` from `AWS_LAMBDA_RUNTIME_API`
    pub fn new(api: &str) -> anyhow::Result<Self> {
        // `invocation/next` long-polls, so no request timeout
        let http = reqwest::Client::builder().build()?;
        Ok(Self {
            http,
            base: format!("http://{}/{}/runtime", api, RUNTIME_API_VERSION),
        })
    }

    pub fn from_env() -> anyhow::Result<Self> {
        let api = std::env::var(LAMBDA_RUNTIME_API_ENV)
            .map_err(|_| anyhow::anyhow!("{} is not set", LAMBDA_RUNTIME_API_ENV))?;
        Self::new(&api)
    }

    /// Block until the next invocation arrives: `(request id, raw event)`
    pub async fn next_invocation(&self) -> anyhow::Result<(String, String)> {
        let response = self
            .http
            .get(format!("{}/invocation/next", self.base))
            .send()
            .await?
            .error_for_status()?;

        let request_id = response
            .headers()
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| anyhow::anyhow!("invocation without {} header", REQUEST_ID_HEADER))?;
        let event = response.text().await?;
        Ok((request_id, event))
    }

    pub async fn respond(&self, request_id: &str, response: &ProxyResponse) -> anyhow::Result<()> {
        self.http
            .post(format!("{}/invocation/{}/response", self.base, request_id))
            .json(response)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    pub async fn report_error(&self, request_id: &str, message: &str) -> anyhow::Result<()> {
        self.http
            .post(format!("{}/invocation/{}/error", self.base, request_id))
            .json(&json!({ "errorMessage": message, "errorType": "InvalidEvent" }))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    /// Fetch, handle and answer a single invocation
    pub async fn process_next(&self, gateway: &Gateway) -> anyhow::Result<()> {
        let (request_id, raw) = self.next_invocation().await?;
        debug!(request_id = %request_id, "Invocation received");

        match serde_json::from_str::<ProxyRequest>(&raw) {
            Ok(event) => {
                let correlation_id = CorrelationId::from(request_id.as_str());
                let response = handle_event(gateway, correlation_id, event).await;
                self.respond(&request_id, &response).await
            }
            Err(e) => {
                warn!(request_id = %request_id, error = %e, "Invocation is not a proxy event");
                self.report_error(&request_id, &e.to_string()).await
            }
        }
    }

    /// Process invocations until `shutdown` resolves
    pub async fn run<F>(&self, gateway: Arc<Gateway>, shutdown: F) -> anyhow::Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        info!(runtime = %self.base, network = %gateway.network(), "🚀 Lambda runtime loop started");
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Lambda runtime loop stopped");
                    return Ok(());
                }
                result = self.process_next(&gateway) => {
                    if let Err(e) = result {
                        error!(error = %e, "Lambda invocation failed");
                        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
                    }
                }
            }
        }
    }
}
