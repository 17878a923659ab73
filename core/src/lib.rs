// Agora Core Library
// Autonomous bounty agent runtime: ledger, planner, gate, research, listener

pub mod agent;
pub mod audit;
pub mod clock;
pub mod config;
pub mod heartbeat;
pub mod identity;
pub mod listener;
pub mod llm;
pub mod market;
pub mod persist;
pub mod research;
pub mod telemetry;
pub mod tools;

// Export core types
pub use agent::{AgentRuntime, CycleReport, LoopState, QuestionOutcome};
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::AgentSettings;
pub use listener::{EventListener, ListenerSignal};
pub use llm::{LlmBackend, LlmClient, LlmError};
pub use tools::{GatewayClient, ToolCall, ToolError, ToolErrorKind, ToolInvoker};

// Error types
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AgoraError {
    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("LLM error: {0}")]
    LlmError(#[from] llm::LlmError),

    #[error("Tool error: {0}")]
    ToolError(#[from] tools::ToolError),

    #[error("Ledger error: {0}")]
    LedgerError(#[from] agent::LedgerError),

    #[error("Identity error: {0}")]
    IdentityError(#[from] identity::IdentityError),

    #[error("Research error: {0}")]
    ResearchError(String),

    #[error("Listener error: {0}")]
    ListenerError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, AgoraError>;
