use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tracing::{debug, error, warn};

use super::adapter::render_prompt;
use super::{LlmBackend, LlmError, PromptBundle, TokenBudget};

/// Configuration for LlmClient loaded from environment variables
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmClientConfig {
    pub base_url: String, // e.g., http://localhost:8000/v1
    pub model: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub request_timeout_ms: u64,
    pub temperature: f32,
}

impl Default for LlmClientConfig {
    fn default() -> Self {
        Self {
            base_url: std::env::var("VLLM_BASE_URL")
                .ok()
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "http://localhost:8000/v1".to_string()),
            model: std::env::var("VLLM_MODEL")
                .ok()
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "qwen2.5-7b-instruct".to_string()),
            api_key: std::env::var("VLLM_API_KEY").ok().filter(|s| !s.is_empty()),
            request_timeout_ms: std::env::var("REQUEST_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(30_000),
            temperature: std::env::var("VLLM_TEMPERATURE")
                .ok()
                .and_then(|v| v.parse::<f32>().ok())
                .unwrap_or(0.2),
        }
    }
}

/// Minimal response containing the assistant text
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LlmResponse {
    pub text: String,
    pub model: Option<String>,
    pub provider: Option<String>, // "responses" or "chat.completions"
    pub usage: Option<serde_json::Value>,
}

impl LlmResponse {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }
}

/// HTTP client that prefers the OpenAI Responses API and falls back to Chat Completions
#[derive(Clone)]
pub struct LlmClient {
    http: Client,
    cfg: LlmClientConfig,
}

impl LlmClient {
    pub fn new(cfg: LlmClientConfig) -> Result<Self, LlmError> {
        let http = Client::builder()
            .timeout(Duration::from_millis(cfg.request_timeout_ms))
            .build()
            .map_err(|e| LlmError::Http(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { http, cfg })
    }

    pub fn from_env() -> Result<Self, LlmError> {
        Self::new(LlmClientConfig::default())
    }

    pub fn config(&self) -> &LlmClientConfig {
        &self.cfg
    }

    fn post(&self, url: &str) -> reqwest::RequestBuilder {
        let req = self.http.post(url).header("content-type", "application/json");
        match &self.cfg.api_key {
            Some(key) => req.bearer_auth(key),
            None => req,
        }
    }
}

fn auth_status(status: StatusCode) -> Option<LlmError> {
    matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN)
        .then(|| LlmError::Auth { status: status.as_u16() })
}

fn http_error(e: reqwest::Error) -> LlmError {
    if e.is_timeout() {
        LlmError::Timeout
    } else {
        LlmError::Http(e.to_string())
    }
}

#[async_trait]
impl LlmBackend for LlmClient {
    /// Contract:
    /// - Input: PromptBundle + optional budget
    /// - Output: LlmResponse with assistant text
    /// - Error: auth failures surface immediately; other Responses API
    ///   failures fall back to Chat Completions before erroring
    async fn generate(
        &self,
        bundle: &PromptBundle,
        budget: Option<TokenBudget>,
    ) -> Result<LlmResponse, LlmError> {
        let budget = budget.unwrap_or_default();
        let prompt = render_prompt(bundle, budget);

        let responses_url = format!("{}/responses", self.cfg.base_url.trim_end_matches('/'));
        debug!(target: "llm_client", url = %responses_url, "POST via Responses API");

        let body = json!({
            "model": self.cfg.model,
            "input": prompt.input,
            "max_output_tokens": budget.max_output_tokens as u32,
            "temperature": self.cfg.temperature,
        });

        match self.post(&responses_url).json(&body).send().await {
            Ok(resp) => {
                let status = resp.status();
                if let Some(auth) = auth_status(status) {
                    error!(target: "llm_client", %status, "LLM provider rejected credentials");
                    return Err(auth);
                }
                if status.is_success() {
                    let val: serde_json::Value = resp
                        .json()
                        .await
                        .map_err(|e| LlmError::Parse(format!("Responses JSON: {e}")))?;
                    if let Some(text) = extract_text_from_responses(&val) {
                        return Ok(LlmResponse {
                            text,
                            model: val.get("model").and_then(|v| v.as_str()).map(str::to_string),
                            provider: Some("responses".to_string()),
                            usage: val.get("usage").cloned(),
                        });
                    }
                    // fallthrough to chat if we couldn't parse
                } else if status != StatusCode::NOT_FOUND {
                    let body = resp.text().await.unwrap_or_default();
                    warn!(target: "llm_client", %status, body = %body, "Responses API error; trying chat.completions fallback");
                }
            }
            Err(err) if err.is_timeout() => return Err(LlmError::Timeout),
            Err(err) => {
                warn!(target: "llm_client", error = %err, "Responses API request failed; trying chat.completions fallback");
            }
        }

        let chat_url = format!("{}/chat/completions", self.cfg.base_url.trim_end_matches('/'));
        debug!(target: "llm_client", url = %chat_url, "POST via Chat Completions");

        let body = json!({
            "model": self.cfg.model,
            "messages": prompt.messages,
            "max_tokens": budget.max_output_tokens as u32,
            "temperature": self.cfg.temperature,
        });

        let resp = self.post(&chat_url).json(&body).send().await.map_err(http_error)?;
        let status = resp.status();
        if let Some(auth) = auth_status(status) {
            error!(target: "llm_client", %status, "LLM provider rejected credentials");
            return Err(auth);
        }
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            error!(target: "llm_client", %status, body = %text, "Chat Completions error");
            return Err(LlmError::Http(format!("status={status} body={text}")));
        }

        let val: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| LlmError::Parse(format!("Chat Completions JSON: {e}")))?;
        let text = extract_text_from_chat_completions(&val)
            .ok_or_else(|| LlmError::Parse("missing choices[0].message.content".into()))?;
        Ok(LlmResponse {
            text,
            model: val.get("model").and_then(|v| v.as_str()).map(str::to_string),
            provider: Some("chat.completions".to_string()),
            usage: val.get("usage").cloned(),
        })
    }
}

fn extract_text_from_chat_completions(v: &serde_json::Value) -> Option<String> {
    v.get("choices")?
        .get(0)?
        .get("message")?
        .get("content")?
        .as_str()
        .map(|s| s.to_string())
}

fn extract_text_from_responses(v: &serde_json::Value) -> Option<String> {
    if let Some(s) = v.get("output_text").and_then(|x| x.as_str()) {
        if !s.is_empty() {
            return Some(s.to_string());
        }
    }
    // unified output array schema
    let mut acc = String::new();
    for item in v.get("output").and_then(|x| x.as_array()).into_iter().flatten() {
        for c in item.get("content").and_then(|c| c.as_array()).into_iter().flatten() {
            let segment = c
                .get("text")
                .and_then(|t| t.get("value"))
                .and_then(|v| v.as_str())
                .or_else(|| c.get("text").and_then(|v| v.as_str()));
            if let Some(t) = segment {
                acc.push_str(t);
            }
        }
    }
    if !acc.is_empty() {
        return Some(acc);
    }
    extract_text_from_chat_completions(v)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(base: &str) -> LlmClient {
        LlmClient::new(LlmClientConfig {
            base_url: base.to_string(),
            model: "test-model".into(),
            api_key: Some("k".into()),
            request_timeout_ms: 2_000,
            temperature: 0.0,
        })
        .unwrap()
    }

    fn bundle() -> PromptBundle {
        PromptBundle {
            system: "You are terse.".into(),
            instructions: "Say hi".into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_falls_back_to_chat_on_404() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/responses"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "model": "test-model",
                "choices": [{"message": {"content": "hi"}}]
            })))
            .mount(&server)
            .await;

        let resp = client(&server.uri()).generate(&bundle(), None).await.unwrap();
        assert_eq!(resp.text, "hi");
        assert_eq!(resp.provider.as_deref(), Some("chat.completions"));
    }

    #[tokio::test]
    async fn test_auth_failure_is_typed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/responses"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let err = client(&server.uri()).generate(&bundle(), None).await.unwrap_err();
        assert!(err.is_auth());
    }

    #[test]
    fn test_extract_output_array() {
        let v = json!({"output": [{"content": [{"text": "a"}, {"text": {"value": "b"}}]}]});
        assert_eq!(extract_text_from_responses(&v).as_deref(), Some("ab"));
    }
}
