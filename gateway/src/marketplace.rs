//! Marketplace REST adapter.
//!
//! Maps each validated [`ToolCall`] onto one marketplace endpoint. Paid
//! writes carry a signed identity envelope and may be challenged once with
//! `402 Payment Required`.

use std::sync::Arc;
use std::time::Duration;

use agora_core::clock::{Clock, SystemClock};
use agora_core::identity::{SignedHeaders, HEADER_PAYMENT};
use agora_core::tools::ToolCall;
use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::signer::{PaymentChallenge, Signer};
use crate::{GatewayError, Result};

const HEADER_IDEMPOTENCY_KEY: &str = "idempotency-key";

/// Whatever executes a validated call against the marketplace.
#[async_trait]
pub trait MarketplaceApi: Send + Sync {
    async fn execute(&self, call: &ToolCall) -> Result<Value>;
}

#[derive(Debug, Clone, PartialEq)]
struct Endpoint {
    method: Method,
    path: String,
    query: Vec<(&'static str, String)>,
    body: Option<Value>,
}

impl Endpoint {
    fn get(path: String) -> Self {
        Self {
            method: Method::GET,
            path,
            query: Vec::new(),
            body: None,
        }
    }

    fn send(method: Method, path: String, body: Value) -> Self {
        Self {
            method,
            path,
            query: Vec::new(),
            body: Some(body),
        }
    }

    fn query(mut self, key: &'static str, value: impl ToString) -> Self {
        self.query.push((key, value.to_string()));
        self
    }
}

pub struct HttpMarketplace {
    client: reqwest::Client,
    base_url: String,
    agent_id: String,
    signer: Option<Signer>,
    clock: Arc<dyn Clock>,
}

impl HttpMarketplace {
    pub fn new(base_url: &str, timeout: Duration, agent_id: &str, signer: Option<Signer>) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            agent_id: agent_id.to_string(),
            signer,
            clock: Arc::new(SystemClock),
        })
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    fn endpoint(&self, call: &ToolCall) -> Result<Endpoint> {
        let agent = urlencoding::encode(&self.agent_id).into_owned();
        let seg = |s: &str| urlencoding::encode(s).into_owned();
        let ep = match call {
            ToolCall::GetAgentProfile => Endpoint::get(format!("/api/agents/{agent}")),
            ToolCall::ListOpenQuestions(a) => Endpoint::get("/api/questions".into())
                .query("status", "open")
                .query("limit", a.limit),
            ToolCall::GetQuestion(a) => Endpoint::get(format!("/api/questions/{}", seg(&a.question_id))),
            ToolCall::SearchSimilarQuestions(a) => Endpoint::get("/api/questions/search".into())
                .query("q", &a.query)
                .query("limit", a.limit),
            ToolCall::ListAgentWikis => Endpoint::get(format!("/api/agents/{agent}/wikis")),
            ToolCall::ListDiscoveryCandidates(a) => Endpoint::get("/api/wikis/discover".into())
                .query("agentId", &self.agent_id)
                .query("limit", a.limit),
            ToolCall::PostAnswer(a) => Endpoint::send(
                Method::POST,
                format!("/api/questions/{}/answers", seg(&a.question_id)),
                json!({
                    "agentId": self.agent_id,
                    "content": a.content,
                    "bidAmountCents": a.bid_amount_cents,
                }),
            ),
            ToolCall::VotePost(a) | ToolCall::VoteAnswer(a) => {
                let reaction = a
                    .vote
                    .reaction()
                    .ok_or_else(|| GatewayError::Config("vote carries no reaction".into()))?;
                let kind = if matches!(call, ToolCall::VotePost(_)) { "posts" } else { "answers" };
                Endpoint::send(
                    Method::POST,
                    format!("/api/{kind}/{}/reactions", seg(&a.target_id)),
                    json!({ "agentId": self.agent_id, "reaction": reaction }),
                )
            }
            ToolCall::JoinWiki(a) => Endpoint::send(
                Method::POST,
                format!("/api/wikis/{}/members", seg(&a.wiki_id)),
                json!({ "agentId": self.agent_id }),
            ),
            ToolCall::SetAgentStatus(a) => Endpoint::send(
                Method::PATCH,
                format!("/api/agents/{agent}/status"),
                json!({ "status": a.status }),
            ),
            ToolCall::LogAgentEvent(a) => Endpoint::send(
                Method::POST,
                format!("/api/agents/{agent}/events"),
                json!({ "eventType": a.event_type, "detail": a.detail }),
            ),
            ToolCall::GetBudgetStatus => {
                return Err(GatewayError::Config(
                    "get_budget_status is answered by the gateway".into(),
                ))
            }
        };
        Ok(ep)
    }

    fn request(
        &self,
        ep: &Endpoint,
        call: &ToolCall,
        identity: Option<&SignedHeaders>,
        payment: Option<&str>,
    ) -> reqwest::RequestBuilder {
        let mut req = self
            .client
            .request(ep.method.clone(), format!("{}{}", self.base_url, ep.path));
        if !ep.query.is_empty() {
            req = req.query(&ep.query);
        }
        if let Some(body) = &ep.body {
            req = req.json(body);
        }
        if let Some(key) = call.idempotency_key() {
            req = req.header(HEADER_IDEMPOTENCY_KEY, key);
        }
        if let Some(headers) = identity {
            for (name, value) in headers.pairs() {
                req = req.header(name, value);
            }
        }
        if let Some(payment) = payment {
            req = req.header(HEADER_PAYMENT, payment);
        }
        req
    }

    fn identity(&self, call: &ToolCall) -> Result<Option<SignedHeaders>> {
        let bid = call.bid_cents().unwrap_or(0);
        if bid == 0 {
            return Ok(None);
        }
        let signer = self
            .signer
            .as_ref()
            .ok_or_else(|| GatewayError::Config("paid write requires a signing key".into()))?;
        let target = call.target_id().unwrap_or_default();
        Ok(Some(signer.identity_headers(&self.agent_id, target, bid, self.clock.now())?))
    }

    /// Answer a 402 challenge once; a second 402 means the payment was refused.
    async fn pay_and_retry(
        &self,
        ep: &Endpoint,
        call: &ToolCall,
        identity: Option<&SignedHeaders>,
        challenged: reqwest::Response,
    ) -> Result<reqwest::Response> {
        let bid = call.bid_cents().unwrap_or(0);
        let signer = self
            .signer
            .as_ref()
            .ok_or_else(|| GatewayError::PaymentRejected("no signing key for payment".into()))?;
        let challenge: PaymentChallenge = challenged
            .json()
            .await
            .map_err(|e| GatewayError::PaymentRejected(format!("unreadable challenge: {e}")))?;
        let action_id = identity
            .map(|h| h.action_id.clone())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let payment = signer.payment_header(&challenge, &action_id, &self.agent_id, bid)?;
        info!(target: "gateway", tool = call.name(), amount_cents = challenge.amount_cents, pay_to = %challenge.pay_to, "Answering payment challenge");

        let resp = self
            .request(ep, call, identity, Some(&payment))
            .send()
            .await?;
        if resp.status() == StatusCode::PAYMENT_REQUIRED {
            return Err(GatewayError::PaymentRejected(
                "marketplace refused the payment authorization".into(),
            ));
        }
        Ok(resp)
    }
}

#[async_trait]
impl MarketplaceApi for HttpMarketplace {
    async fn execute(&self, call: &ToolCall) -> Result<Value> {
        let ep = self.endpoint(call)?;
        let identity = self.identity(call)?;
        debug!(target: "gateway", tool = call.name(), method = %ep.method, path = %ep.path, "Marketplace request");

        let mut resp = self.request(&ep, call, identity.as_ref(), None).send().await?;
        if resp.status() == StatusCode::PAYMENT_REQUIRED {
            resp = self.pay_and_retry(&ep, call, identity.as_ref(), resp).await?;
        }
        let value = read_response(resp).await.map_err(|e| {
            warn!(target: "gateway", tool = call.name(), error = %e, "Marketplace call failed");
            e
        })?;
        Ok(unwrap_list(value))
    }
}

async fn read_response(resp: reqwest::Response) -> Result<Value> {
    let status = resp.status();
    let body = resp.text().await?;
    if status.is_success() {
        if body.trim().is_empty() {
            return Ok(json!({ "ok": true }));
        }
        return serde_json::from_str(&body).map_err(|e| GatewayError::Decode(e.to_string()));
    }
    Err(match status.as_u16() {
        404 => GatewayError::NotFound(body),
        409 | 410 | 422 if mentions_answer_window(&body) => GatewayError::WindowClosed(body),
        code => GatewayError::Status { status: code, body },
    })
}

const WINDOW_CODES: [&str; 3] = ["window_closed", "answer_window_closed", "answering_closed"];
const WINDOW_PHRASES: [&str; 5] = [
    "answer window",
    "window closed",
    "window has closed",
    "answers closed",
    "no longer accepting answers",
];

/// True when a rejection says the answer window is shut: a structured
/// `code`/`error` value, or one of a few unambiguous phrases.
fn mentions_answer_window(body: &str) -> bool {
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(body) {
        let coded = ["code", "error", "reason"].iter().any(|k| {
            map.get(*k)
                .and_then(Value::as_str)
                .is_some_and(|v| WINDOW_CODES.contains(&v.trim().to_ascii_lowercase().as_str()))
        });
        if coded {
            return true;
        }
    }
    let lower = body.to_ascii_lowercase();
    WINDOW_PHRASES.iter().any(|p| lower.contains(p))
}

/// List endpoints may wrap their array, e.g. `{"questions": [...]}`.
fn unwrap_list(value: Value) -> Value {
    const KEYS: [&str; 5] = ["questions", "wikis", "results", "items", "data"];
    match value {
        Value::Object(mut map) if map.len() == 1 => {
            let key = KEYS.iter().find(|k| map.get(**k).is_some_and(Value::is_array));
            match key {
                Some(k) => map.remove(*k).unwrap_or(Value::Null),
                None => Value::Object(map),
            }
        }
        other => other,
    }
}
