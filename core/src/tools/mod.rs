pub mod client;
pub mod error;
pub mod rpc;
pub mod schema;

// Re-export common types
pub use client::{invoke_as, GatewayClient, ToolInvoker, ToolOutput};
pub use error::{ToolError, ToolErrorKind, ToolResult, ValidationError};
pub use schema::{ToolCall, ToolKind};
