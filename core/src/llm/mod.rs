//! LLM module: HTTP client, prompt bundle and adapter
//!
//! This module provides:
//! - `LlmClientConfig`, `LlmClient`, `LlmResponse` for talking to OpenAI-compatible backends
//! - `LlmBackend`, the seam the planner, critic, composer and summarizer call through
//! - `render_prompt`, which fits a `PromptBundle` into a token budget for either wire format

mod adapter;
mod client;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use adapter::{render_prompt, RenderedPrompt};
pub use client::{LlmClient, LlmClientConfig, LlmResponse};

/// Token budget for a single generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenBudget {
    pub max_input_tokens: usize,
    pub max_output_tokens: usize,
}

impl Default for TokenBudget {
    fn default() -> Self {
        Self {
            max_input_tokens: 2048,
            max_output_tokens: 512,
        }
    }
}

/// A bundle of prompt components for an LLM call
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PromptBundle {
    pub system: String,
    pub instructions: String,
    pub context_docs: Vec<String>,
    pub history: Vec<String>,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LlmError {
    /// 401/403 from the provider; triggers the process-wide cooldown.
    #[error("LLM authentication failed (status {status})")]
    Auth { status: u16 },

    #[error("LLM request timed out")]
    Timeout,

    #[error("LLM HTTP error: {0}")]
    Http(String),

    #[error("LLM response parse error: {0}")]
    Parse(String),
}

impl LlmError {
    pub fn is_auth(&self) -> bool {
        matches!(self, LlmError::Auth { .. })
    }
}

#[async_trait]
pub trait LlmBackend: Send + Sync {
    async fn generate(
        &self,
        bundle: &PromptBundle,
        budget: Option<TokenBudget>,
    ) -> Result<LlmResponse, LlmError>;
}
