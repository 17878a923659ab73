#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use agora_core::agent::gate::{DecisionRng, GateDraws};
use agora_core::agent::{AgentRuntime, Persona, RiskProfile};
use agora_core::llm::{LlmBackend, LlmError, LlmResponse, PromptBundle, TokenBudget};
use agora_core::research::Researcher;
use agora_core::tools::{ToolCall, ToolError, ToolErrorKind, ToolInvoker, ToolOutput, ToolResult};
use agora_core::{AgentSettings, FixedClock};
use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::{json, Value};

pub const AGENT: &str = "agent-t";

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 18, 9, 0, 0).unwrap()
}

/// LLM stand-in that routes on the system prompt of each stage.
pub struct ScriptedLlm {
    pub plan: Mutex<Result<String, LlmError>>,
    pub critique: Mutex<String>,
    pub answer: Mutex<String>,
    pub calls: Mutex<Vec<&'static str>>,
}

impl ScriptedLlm {
    pub fn confident() -> Self {
        Self {
            plan: Mutex::new(Ok(json!({
                "action": "answer",
                "confidence": 0.92,
                "expectedValue": 0.5,
                "bidAmountCents": 20,
                "vote": "up",
                "joinWikiIds": ["w-rust"],
                "reason": "well understood"
            })
            .to_string())),
            critique: Mutex::new(json!({"approve": true, "issues": []}).to_string()),
            answer: Mutex::new("Use tokio::select! with a shutdown branch. It cancels the other futures.".into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn set_plan(&self, plan: Result<String, LlmError>) {
        *self.plan.lock().unwrap() = plan;
    }

    pub fn stages(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl LlmBackend for ScriptedLlm {
    async fn generate(&self, bundle: &PromptBundle, _: Option<TokenBudget>) -> Result<LlmResponse, LlmError> {
        let stage = if bundle.system.contains("independent reviewer") {
            "critique"
        } else if bundle.system.contains("self-contained answers") {
            "compose"
        } else if bundle.system.contains("join communities") {
            "discovery"
        } else {
            "plan"
        };
        self.calls.lock().unwrap().push(stage);
        let text = match stage {
            "critique" => self.critique.lock().unwrap().clone(),
            "compose" => self.answer.lock().unwrap().clone(),
            "discovery" => json!({"joinWikiIds": [], "reason": "none"}).to_string(),
            _ => self.plan.lock().unwrap().clone()?,
        };
        Ok(LlmResponse::text(text))
    }
}

/// In-memory marketplace behind the tool seam.
#[derive(Default)]
pub struct FakeMarket {
    pub questions: Mutex<HashMap<String, Value>>,
    pub calls: Mutex<Vec<ToolCall>>,
    pub paused: Mutex<bool>,
    pub answers: AtomicUsize,
    /// When set, `post_answer` is rejected with this error.
    pub post_error: Mutex<Option<ToolError>>,
}

impl FakeMarket {
    pub fn add_question(&self, id: &str, closes_at: DateTime<Utc>) {
        self.questions.lock().unwrap().insert(
            id.to_string(),
            json!({
                "id": id,
                "title": "How do I cancel a tokio task cleanly?",
                "body": "I spawn a task in async rust and need graceful shutdown.",
                "tags": ["rust", "tokio"],
                "bountyCents": 500,
                "requiredBidCents": 10,
                "answerCount": 0,
                "settlementStatus": "open",
                "answersCloseAt": closes_at,
            }),
        );
    }

    pub fn set_field(&self, id: &str, field: &str, value: Value) {
        if let Some(q) = self.questions.lock().unwrap().get_mut(id) {
            q[field] = value;
        }
    }

    pub fn reject_answers(&self, err: Option<ToolError>) {
        *self.post_error.lock().unwrap() = err;
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().iter().map(|c| c.name()).collect()
    }

    pub fn count(&self, tool: &str) -> usize {
        self.names().into_iter().filter(|n| *n == tool).count()
    }

    pub fn last(&self, tool: &str) -> Option<ToolCall> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|c| c.name() == tool)
            .cloned()
    }
}

fn ok(value: Value) -> ToolResult<ToolOutput> {
    Ok(ToolOutput {
        value,
        idempotent: false,
    })
}

#[async_trait]
impl ToolInvoker for FakeMarket {
    async fn invoke(&self, call: &ToolCall) -> ToolResult<ToolOutput> {
        self.calls.lock().unwrap().push(call.clone());
        match call {
            ToolCall::GetAgentProfile => ok(json!({"id": AGENT, "name": "tester", "status": "active"})),
            ToolCall::GetBudgetStatus => ok(json!({
                "dayKey": "2026-10-18",
                "dailySpendCents": 0,
                "maxDailySpendCents": 1000,
                "maxBidPerActionCents": 200,
                "paused": *self.paused.lock().unwrap(),
            })),
            ToolCall::ListOpenQuestions(_) => {
                let open: Vec<Value> = self
                    .questions
                    .lock()
                    .unwrap()
                    .values()
                    .filter(|q| q["settlementStatus"] == "open")
                    .cloned()
                    .collect();
                ok(Value::Array(open))
            }
            ToolCall::GetQuestion(q) => match self.questions.lock().unwrap().get(&q.question_id) {
                Some(v) => ok(v.clone()),
                None => Err(ToolError::not_found(q.question_id.clone())),
            },
            ToolCall::SearchSimilarQuestions(_)
            | ToolCall::ListAgentWikis
            | ToolCall::ListDiscoveryCandidates(_) => ok(json!([])),
            ToolCall::PostAnswer(a) => {
                if let Some(err) = self.post_error.lock().unwrap().clone() {
                    return Err(err);
                }
                let n = self.answers.fetch_add(1, Ordering::SeqCst) + 1;
                ok(json!({"answerId": format!("ans-{}-{n}", a.question_id)}))
            }
            ToolCall::VotePost(_) | ToolCall::VoteAnswer(_) | ToolCall::JoinWiki(_) => ok(json!({"ok": true})),
            ToolCall::SetAgentStatus(_) | ToolCall::LogAgentEvent(_) => ok(json!({"ok": true})),
        }
    }
}

/// Always commits on the gate's random draws.
pub struct AlwaysCommit;

impl DecisionRng for AlwaysCommit {
    fn draws(&mut self) -> GateDraws {
        GateDraws {
            borderline: 0.0,
            propensity: 0.0,
        }
    }
}

pub fn settings(dir: &Path) -> AgentSettings {
    let mut s = AgentSettings {
        agent_id: AGENT.to_string(),
        state_dir: dir.to_path_buf(),
        gate_seed: Some(7),
        persona: Persona::preset(RiskProfile::Balanced),
        questions_per_cycle: 3,
        revisit_interval_secs: 20 * 60,
        ..AgentSettings::default()
    };
    s.discovery.enabled = false;
    s.research.web_enabled = false;
    s
}

pub struct Harness {
    pub runtime: AgentRuntime,
    pub llm: Arc<ScriptedLlm>,
    pub market: Arc<FakeMarket>,
    pub clock: Arc<FixedClock>,
}

pub async fn harness(dir: &Path, llm: ScriptedLlm) -> Harness {
    let llm = Arc::new(llm);
    let market = Arc::new(FakeMarket::default());
    let clock = Arc::new(FixedClock::new(t0()));
    let runtime = AgentRuntime::new(
        settings(dir),
        llm.clone(),
        market.clone(),
        Researcher::new(),
        clock.clone(),
    )
    .await
    .with_rng(Box::new(AlwaysCommit));
    Harness {
        runtime,
        llm,
        market,
        clock,
    }
}

pub fn in_an_hour() -> DateTime<Utc> {
    t0() + Duration::hours(1)
}

pub fn transport_error() -> ToolError {
    ToolError::new(ToolErrorKind::Transport, "connection refused")
}
