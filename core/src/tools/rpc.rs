/// Tool RPC wire types
///
/// JSON-RPC 2.0 style envelope spoken between the agent and its gateway.
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::error::{ToolError, ToolErrorKind};
use super::schema::ToolDescriptor;

pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// JSON-RPC 2.0 Request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    #[serde(default = "default_jsonrpc")]
    pub jsonrpc: String,
    #[serde(default)]
    pub id: Value, // string or number
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

fn default_jsonrpc() -> String {
    "2.0".to_string()
}

impl JsonRpcRequest {
    pub fn new(id: impl Into<Value>, method: &str, params: Option<Value>) -> Self {
        Self {
            jsonrpc: default_jsonrpc(),
            id: id.into(),
            method: method.to_string(),
            params,
        }
    }
}

/// JSON-RPC 2.0 Response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    #[serde(default = "default_jsonrpc")]
    pub jsonrpc: String,
    #[serde(default)]
    pub id: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: default_jsonrpc(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: Value, err: &ToolError) -> Self {
        Self {
            jsonrpc: default_jsonrpc(),
            id,
            result: None,
            error: Some(JsonRpcError::from(err)),
        }
    }
}

/// JSON-RPC 2.0 Error
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl From<&ToolError> for JsonRpcError {
    fn from(err: &ToolError) -> Self {
        Self {
            code: err.kind.code(),
            message: err.message.clone(),
            data: Some(json!({ "kind": err.kind.as_str() })),
        }
    }
}

impl From<JsonRpcError> for ToolError {
    fn from(err: JsonRpcError) -> Self {
        // `data.kind` wins over the numeric code when both are present
        let kind = err
            .data
            .as_ref()
            .and_then(|d| d.get("kind"))
            .and_then(|k| serde_json::from_value::<ToolErrorKind>(k.clone()).ok())
            .unwrap_or_else(|| ToolErrorKind::from_code(err.code));
        ToolError::new(kind, err.message)
    }
}

/// tools/call request parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallToolParams {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Value>,
}

/// tools/call result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallToolResult {
    pub content: Vec<ToolContent>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub idempotent: bool,
}

impl CallToolResult {
    pub fn json(value: &Value, idempotent: bool) -> Self {
        Self {
            content: vec![ToolContent::Text {
                text: value.to_string(),
            }],
            idempotent,
        }
    }

    /// First text block decoded as JSON; non-JSON text is returned as a string value.
    pub fn value(&self) -> Value {
        self.content
            .iter()
            .map(|c| match c {
                ToolContent::Text { text } => {
                    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.clone()))
                }
            })
            .next()
            .unwrap_or(Value::Null)
    }
}

/// Tool content block
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ToolContent {
    #[serde(rename = "text")]
    Text { text: String },
}

/// tools/list result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListToolsResult {
    pub tools: Vec<ToolDescriptor>,
}

/// initialize result
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    pub protocol_version: String,
    pub server_info: ServerInfo,
    pub capabilities: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_from_data() {
        let e = JsonRpcError {
            code: -32603,
            message: "boom".into(),
            data: Some(json!({"kind": "window_closed"})),
        };
        let t: ToolError = e.into();
        assert_eq!(t.kind, ToolErrorKind::WindowClosed);
    }

    #[test]
    fn test_error_kind_from_code() {
        let e = JsonRpcError {
            code: -32006,
            message: "question missing".into(),
            data: None,
        };
        let t: ToolError = e.into();
        assert_eq!(t.kind, ToolErrorKind::NotFound);
    }

    #[test]
    fn test_call_result_shape() {
        let r = CallToolResult::json(&json!({"answerId": "a1"}), true);
        let v = serde_json::to_value(&r).unwrap();
        assert_eq!(v["content"][0]["type"], "text");
        assert_eq!(v["idempotent"], true);
        assert_eq!(r.value()["answerId"], "a1");

        let fresh = serde_json::to_value(CallToolResult::json(&json!(1), false)).unwrap();
        assert!(fresh.get("idempotent").is_none());
    }

    #[test]
    fn test_request_without_jsonrpc_field() {
        let req: JsonRpcRequest =
            serde_json::from_value(json!({"id": 7, "method": "tools/list"})).unwrap();
        assert_eq!(req.jsonrpc, "2.0");
        assert!(req.params.is_none());
    }
}
