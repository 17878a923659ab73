use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure classes a tool call can surface. Each maps to a stable JSON-RPC
/// error code so the agent can react without string matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolErrorKind {
    InvalidRequest,
    /// Unknown RPC method or tool name
    MethodNotFound,
    /// Marketplace resource does not exist
    NotFound,
    Validation,
    RateLimited,
    BudgetExceeded,
    Paused,
    WindowClosed,
    Upstream,
    Timeout,
    PaymentRejected,
    Transport,
    Internal,
}

impl ToolErrorKind {
    pub fn code(self) -> i32 {
        match self {
            ToolErrorKind::InvalidRequest => -32600,
            ToolErrorKind::MethodNotFound => -32601,
            ToolErrorKind::NotFound => -32006,
            ToolErrorKind::Validation => -32602,
            ToolErrorKind::Internal => -32603,
            ToolErrorKind::RateLimited => -32001,
            ToolErrorKind::BudgetExceeded => -32002,
            ToolErrorKind::Paused => -32003,
            ToolErrorKind::WindowClosed => -32004,
            ToolErrorKind::Upstream => -32005,
            ToolErrorKind::Timeout => -32007,
            ToolErrorKind::PaymentRejected => -32008,
            // never produced by the gateway; client-side only
            ToolErrorKind::Transport => -32099,
        }
    }

    pub fn from_code(code: i32) -> Self {
        match code {
            -32600 => ToolErrorKind::InvalidRequest,
            -32601 => ToolErrorKind::MethodNotFound,
            -32006 => ToolErrorKind::NotFound,
            -32602 => ToolErrorKind::Validation,
            -32001 => ToolErrorKind::RateLimited,
            -32002 => ToolErrorKind::BudgetExceeded,
            -32003 => ToolErrorKind::Paused,
            -32004 => ToolErrorKind::WindowClosed,
            -32005 => ToolErrorKind::Upstream,
            -32007 => ToolErrorKind::Timeout,
            -32008 => ToolErrorKind::PaymentRejected,
            -32099 => ToolErrorKind::Transport,
            _ => ToolErrorKind::Internal,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ToolErrorKind::InvalidRequest => "invalid_request",
            ToolErrorKind::MethodNotFound => "method_not_found",
            ToolErrorKind::NotFound => "not_found",
            ToolErrorKind::Validation => "validation",
            ToolErrorKind::RateLimited => "rate_limited",
            ToolErrorKind::BudgetExceeded => "budget_exceeded",
            ToolErrorKind::Paused => "paused",
            ToolErrorKind::WindowClosed => "window_closed",
            ToolErrorKind::Upstream => "upstream",
            ToolErrorKind::Timeout => "timeout",
            ToolErrorKind::PaymentRejected => "payment_rejected",
            ToolErrorKind::Transport => "transport",
            ToolErrorKind::Internal => "internal",
        }
    }

    /// Rejections the gateway issues before any external call is made.
    pub fn is_precheck_rejection(self) -> bool {
        matches!(
            self,
            ToolErrorKind::Validation
                | ToolErrorKind::RateLimited
                | ToolErrorKind::BudgetExceeded
                | ToolErrorKind::Paused
        )
    }
}

impl std::fmt::Display for ToolErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct ToolError {
    pub kind: ToolErrorKind,
    pub message: String,
}

impl ToolError {
    pub fn new(kind: ToolErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ToolErrorKind::Validation, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ToolErrorKind::NotFound, message)
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(ToolErrorKind::MethodNotFound, format!("unknown method or tool: {method}"))
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ToolErrorKind::Internal, message)
    }
}

/// Typed rejection of malformed tool arguments.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid arguments for {tool}: {reason}")]
pub struct ValidationError {
    pub tool: String,
    pub reason: String,
}

impl From<ValidationError> for ToolError {
    fn from(e: ValidationError) -> Self {
        ToolError::validation(e.to_string())
    }
}

pub type ToolResult<T> = Result<T, ToolError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_roundtrip() {
        for kind in [
            ToolErrorKind::InvalidRequest,
            ToolErrorKind::MethodNotFound,
            ToolErrorKind::NotFound,
            ToolErrorKind::Validation,
            ToolErrorKind::RateLimited,
            ToolErrorKind::BudgetExceeded,
            ToolErrorKind::Paused,
            ToolErrorKind::WindowClosed,
            ToolErrorKind::Upstream,
            ToolErrorKind::Timeout,
            ToolErrorKind::PaymentRejected,
            ToolErrorKind::Internal,
        ] {
            assert_eq!(ToolErrorKind::from_code(kind.code()), kind);
        }
    }

    #[test]
    fn test_display() {
        let e = ToolError::new(ToolErrorKind::RateLimited, "vote_post: 60/min");
        assert_eq!(e.to_string(), "rate_limited: vote_post: 60/min");
    }
}
