// Gateway HTTP surface
//
// POST /rpc speaks JSON-RPC 2.0; GET /health reports budget and pause state.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use agora_core::tools::rpc::{JsonRpcRequest, JsonRpcResponse};
use agora_core::tools::{ToolError, ToolErrorKind};
use axum::{
    body::Bytes,
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde_json::Value;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::dispatch::{Gateway, HealthReport};

pub fn router(gateway: Arc<Gateway>) -> Router {
    Router::new()
        .route("/rpc", post(rpc_handler))
        .route("/health", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(gateway)
}

/// Bind `addr` and serve until `shutdown` resolves.
pub async fn serve(
    addr: SocketAddr,
    gateway: Arc<Gateway>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(
        target: "gateway",
        url = %format!("http://{}", listener.local_addr()?),
        "Tool gateway ready"
    );
    axum::serve(listener, router(gateway))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

// Malformed bodies still get a JSON-RPC error object, never a bare 4xx.
async fn rpc_handler(State(gateway): State<Arc<Gateway>>, body: Bytes) -> Json<JsonRpcResponse> {
    let request = match serde_json::from_slice::<JsonRpcRequest>(&body) {
        Ok(r) => r,
        Err(e) => {
            let id = serde_json::from_slice::<Value>(&body)
                .ok()
                .and_then(|v| v.get("id").cloned())
                .unwrap_or(Value::Null);
            let err = ToolError::new(ToolErrorKind::InvalidRequest, format!("malformed request: {e}"));
            return Json(JsonRpcResponse::failure(id, &err));
        }
    };
    Json(gateway.handle_rpc(request).await)
}

async fn health_handler(State(gateway): State<Arc<Gateway>>) -> Json<HealthReport> {
    Json(gateway.health().await)
}
