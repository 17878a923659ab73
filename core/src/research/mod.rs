//! Research subsystem: gathers evidence for an answer from the marketplace's
//! own Q&A history and, when enabled, from the open web.
//!
//! Every provider failure degrades to "no evidence"; research never blocks
//! an evaluation.

mod qa;
pub mod robots;
pub mod web;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::market::Question;

pub use qa::QaSearchProvider;
pub use web::{HostPolicy, WebResearchProvider};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResearchError {
    #[error("search failed: {0}")]
    Search(String),

    #[error("fetch failed for {url}: {reason}")]
    Fetch { url: String, reason: String },

    #[error("summarizer failed: {0}")]
    Summarize(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claim {
    pub text: String,
    pub source_url: String,
}

/// One provider's contribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Evidence {
    pub provider: String,
    pub summary: String,
    #[serde(default)]
    pub claims: Vec<Claim>,
    /// 0 = certain, 1 = unreliable
    #[serde(default)]
    pub uncertainty: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvidenceBundle {
    pub items: Vec<Evidence>,
}

impl EvidenceBundle {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Flattened into prompt context lines.
    pub fn context_docs(&self) -> Vec<String> {
        let mut docs = Vec::new();
        for item in &self.items {
            docs.push(format!(
                "[{}] {} (uncertainty {:.1})",
                item.provider, item.summary, item.uncertainty
            ));
            for claim in &item.claims {
                docs.push(format!("{} <{}>", claim.text, claim.source_url));
            }
        }
        docs
    }
}

#[async_trait]
pub trait EvidenceProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn gather(&self, question: &Question, queries: &[String]) -> Result<Option<Evidence>, ResearchError>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchConfig {
    pub web_enabled: bool,
    pub max_queries: usize,
    pub max_fetches: usize,
    pub max_response_bytes: usize,
    pub fetch_timeout_ms: u64,
    pub robots_ttl_secs: u64,
    /// Host suffixes that may be fetched; empty allows any host not denied
    pub allow_hosts: Vec<String>,
    pub deny_hosts: Vec<String>,
    pub user_agent: String,
    #[serde(skip_serializing)]
    pub brave_api_key: Option<String>,
    pub duckduckgo_url: String,
    pub brave_url: String,
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            web_enabled: std::env::var("AGORA_WEB_RESEARCH")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
            max_queries: 3,
            max_fetches: 4,
            max_response_bytes: 200 * 1024,
            fetch_timeout_ms: 8_000,
            robots_ttl_secs: 3_600,
            allow_hosts: Vec::new(),
            deny_hosts: vec!["localhost".to_string(), "internal".to_string()],
            user_agent: "AgoraBot/0.1 (+bounty-agent)".to_string(),
            brave_api_key: std::env::var("BRAVE_API_KEY").ok().filter(|s| !s.is_empty()),
            duckduckgo_url: "https://api.duckduckgo.com".to_string(),
            brave_url: "https://api.search.brave.com/res/v1/web/search".to_string(),
        }
    }
}

/// Runs every provider in turn and keeps what succeeds.
#[derive(Default, Clone)]
pub struct Researcher {
    providers: Vec<Arc<dyn EvidenceProvider>>,
}

impl Researcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_provider(mut self, provider: Arc<dyn EvidenceProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    pub async fn research(&self, question: &Question, queries: &[String]) -> EvidenceBundle {
        let mut bundle = EvidenceBundle::default();
        for provider in &self.providers {
            match provider.gather(question, queries).await {
                Ok(Some(evidence)) => bundle.items.push(evidence),
                Ok(None) => debug!(target: "research", provider = provider.name(), question_id = %question.id, "No evidence"),
                Err(e) => warn!(target: "research", provider = provider.name(), question_id = %question.id, error = %e, "Provider failed; continuing without it"),
            }
        }
        bundle
    }
}
