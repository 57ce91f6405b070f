//! HTTP transport
use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

use super::{Gateway, GatewayReply};
use crate::metrics::metrics;

#[derive(Debug, Default, Deserialize)]
pub struct FuncQuery {
    func: Option<String>,
}

pub fn router(gateway: Arc<Gateway>) -> Router {
    Router::new()
        .route("/", post(rpc_root))
        .route("/health", get(health))
        .route("/metrics", get(render_metrics))
        .route("/:func", post(rpc_func))
        .with_state(gateway)
}

/// Bind `addr` and serve until `shutdown` resolves
pub async fn serve<F>(gateway: Arc<Gateway>, addr: SocketAddr, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind(addr).await?;
    serve_listener(listener, gateway, shutdown).await
}

pub async fn serve_listener<F>(listener: TcpListener, gateway: Arc<Gateway>, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    info!(addr = %listener.local_addr()?, network = %gateway.network(), "🚀 HTTP gateway listening");
    axum::serve(listener, router(gateway))
        .with_graceful_shutdown(shutdown)
        .await?;
    info!("HTTP gateway stopped");
    Ok(())
}

async fn rpc_root(
    State(gateway): State<Arc<Gateway>>,
    Query(query): Query<FuncQuery>,
    body: String,
) -> Response {
    let reply = gateway.handle_body(&body, query.func.as_deref()).await;
    reply_response(reply)
}

async fn rpc_func(
    State(gateway): State<Arc<Gateway>>,
    Path(func): Path<String>,
    Query(query): Query<FuncQuery>,
    body: String,
) -> Response {
    // Query parameter wins over the path segment
    let func = query.func.filter(|f| !f.is_empty()).unwrap_or(func);
    let reply = gateway.handle_body(&body, Some(&func)).await;
    reply_response(reply)
}

async fn health(State(gateway): State<Arc<Gateway>>) -> Json<serde_json::Value> {
    let network = gateway.network();
    Json(json!({
        "status": "ok",
        "network": network,
        "signer_ready": gateway.coordinator().is_ready(),
        "pool": gateway.client().pool().network_stats(network),
    }))
}

async fn render_metrics() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics().render(),
    )
}

fn reply_response(reply: GatewayReply) -> Response {
    let status = StatusCode::from_u16(reply.status).unwrap_or(StatusCode::BAD_REQUEST);
    (
        status,
        [(header::CONTENT_TYPE, "application/json")],
        reply.body(),
    )
        .into_response()
}
