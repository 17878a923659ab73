use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::error::{ToolError, ToolErrorKind, ToolResult};
use super::rpc::{CallToolParams, CallToolResult, JsonRpcRequest, JsonRpcResponse};
use super::schema::ToolCall;

/// Decoded result of a successful tool call.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutput {
    pub value: Value,
    /// True when the gateway replayed a stored result for the idempotency key.
    pub idempotent: bool,
}

impl ToolOutput {
    pub fn decode<T: DeserializeOwned>(&self, tool: &str) -> ToolResult<T> {
        serde_json::from_value(self.value.clone()).map_err(|e| {
            ToolError::new(
                ToolErrorKind::Upstream,
                format!("{tool}: unexpected result shape: {e}"),
            )
        })
    }
}

/// Seam between the agent and whatever executes its tool calls.
#[async_trait]
pub trait ToolInvoker: Send + Sync {
    async fn invoke(&self, call: &ToolCall) -> ToolResult<ToolOutput>;
}

/// Invoke and decode in one step.
pub async fn invoke_as<T: DeserializeOwned>(
    invoker: &dyn ToolInvoker,
    call: &ToolCall,
) -> ToolResult<T> {
    invoker.invoke(call).await?.decode(call.name())
}

/// HTTP client for the gateway's `POST /rpc` endpoint.
pub struct GatewayClient {
    client: reqwest::Client,
    rpc_url: String,
    next_id: AtomicU64,
}

impl GatewayClient {
    pub fn new(base_url: &str, timeout: Duration) -> ToolResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ToolError::new(ToolErrorKind::Transport, e.to_string()))?;
        Ok(Self {
            client,
            rpc_url: format!("{}/rpc", base_url.trim_end_matches('/')),
            next_id: AtomicU64::new(1),
        })
    }

    async fn send(&self, method: &str, params: Option<Value>) -> ToolResult<Value> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let request = JsonRpcRequest::new(id, method, params);

        let resp = self
            .client
            .post(&self.rpc_url)
            .json(&request)
            .send()
            .await
            .map_err(transport_error)?;

        let status = resp.status();
        let body: JsonRpcResponse = resp.json().await.map_err(|e| {
            ToolError::new(
                ToolErrorKind::Transport,
                format!("gateway returned {status} with unreadable body: {e}"),
            )
        })?;

        if let Some(err) = body.error {
            return Err(err.into());
        }
        body.result.ok_or_else(|| {
            ToolError::new(ToolErrorKind::Transport, "gateway response had no result")
        })
    }

    /// Handshake used at startup to confirm the gateway is reachable.
    pub async fn initialize(&self) -> ToolResult<Value> {
        self.send("initialize", Some(json!({"clientInfo": {"name": "bounty-agent"}})))
            .await
    }
}

fn transport_error(e: reqwest::Error) -> ToolError {
    if e.is_timeout() {
        ToolError::new(ToolErrorKind::Timeout, e.to_string())
    } else {
        ToolError::new(ToolErrorKind::Transport, e.to_string())
    }
}

#[async_trait]
impl ToolInvoker for GatewayClient {
    async fn invoke(&self, call: &ToolCall) -> ToolResult<ToolOutput> {
        debug!(target: "tool_client", tool = call.name(), "Calling tool");
        let params = CallToolParams {
            name: call.name().to_string(),
            arguments: Some(call.arguments()),
        };
        let params = serde_json::to_value(params).map_err(|e| ToolError::internal(e.to_string()))?;
        let result = self.send("tools/call", Some(params)).await.map_err(|e| {
            warn!(target: "tool_client", tool = call.name(), error = %e, "Tool call failed");
            e
        })?;
        let result: CallToolResult = serde_json::from_value(result).map_err(|e| {
            ToolError::new(
                ToolErrorKind::Transport,
                format!("invalid tools/call result: {e}"),
            )
        })?;
        Ok(ToolOutput {
            value: result.value(),
            idempotent: result.idempotent,
        })
    }
}
