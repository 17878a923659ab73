//! Lightweight like/dislike reactions to new posts and answers.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use crate::agent::cooldown::AuthCooldown;
use crate::agent::decision::{ParseDecision, ReactionDecision};
use crate::agent::persona::Persona;
use crate::agent::prompt::reaction_prompt;
use crate::audit::{AuditLog, AuditRecord};
use crate::clock::minute_bucket;
use crate::llm::{LlmBackend, TokenBudget};
use crate::market::Vote;
use crate::tools::schema::VoteArgs;
use crate::tools::{ToolCall, ToolInvoker};

/// Cooldown applied when no duration is configured.
pub const DEFAULT_AUTH_COOLDOWN_SECS: i64 = 15 * 60;

/// Fixed-window limiter over UTC minutes.
#[derive(Debug)]
pub struct MinuteLimiter {
    per_minute: u32,
    bucket: i64,
    count: u32,
}

impl MinuteLimiter {
    pub fn new(per_minute: u32) -> Self {
        Self {
            per_minute,
            bucket: i64::MIN,
            count: 0,
        }
    }

    pub fn try_acquire(&mut self, now: DateTime<Utc>) -> bool {
        let bucket = minute_bucket(now);
        if bucket != self.bucket {
            self.bucket = bucket;
            self.count = 0;
        }
        if self.count >= self.per_minute {
            return false;
        }
        self.count += 1;
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReactionTargetKind {
    Post,
    Answer,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReactionTarget {
    pub kind: ReactionTargetKind,
    pub id: String,
    pub author_agent_id: Option<String>,
    pub title: String,
    pub body: String,
}

/// What happened to one reaction opportunity.
#[derive(Debug, Clone, PartialEq)]
pub enum ReactionOutcome {
    OwnContent,
    RateLimited,
    CoolingDown,
    Declined(String),
    Voted(Vote),
    Failed(String),
}

pub struct ReactionPolicy {
    agent_id: String,
    persona: Persona,
    llm: Arc<dyn LlmBackend>,
    tools: Arc<dyn ToolInvoker>,
    cooldown: Arc<AuthCooldown>,
    cooldown_for: Duration,
    audit: Option<AuditLog>,
    limiter: MinuteLimiter,
    min_confidence: f64,
}

impl ReactionPolicy {
    pub fn new(
        agent_id: impl Into<String>,
        persona: Persona,
        llm: Arc<dyn LlmBackend>,
        tools: Arc<dyn ToolInvoker>,
        cooldown: Arc<AuthCooldown>,
        per_minute: u32,
        min_confidence: f64,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            persona,
            llm,
            tools,
            cooldown,
            cooldown_for: Duration::seconds(DEFAULT_AUTH_COOLDOWN_SECS),
            audit: None,
            limiter: MinuteLimiter::new(per_minute),
            min_confidence,
        }
    }

    /// How long an auth rejection pauses LLM work for the whole process.
    pub fn with_auth_cooldown(mut self, duration: Duration) -> Self {
        self.cooldown_for = duration;
        self
    }

    pub fn with_audit(mut self, audit: AuditLog) -> Self {
        self.audit = Some(audit);
        self
    }

    async fn record_failure(&self, target: &ReactionTarget, tool: Option<&str>, now: DateTime<Utc>, err: &str) {
        let Some(audit) = &self.audit else {
            return;
        };
        let mut record = AuditRecord::new(now, &self.agent_id, "react", "failed").error(err);
        if target.kind == ReactionTargetKind::Post {
            record = record.question(target.id.clone());
        }
        if let Some(tool) = tool {
            record = record.tool(tool);
        }
        audit.record(record).await;
    }

    pub async fn react(&mut self, target: &ReactionTarget, now: DateTime<Utc>) -> ReactionOutcome {
        if target.author_agent_id.as_deref() == Some(self.agent_id.as_str()) {
            return ReactionOutcome::OwnContent;
        }
        if self.cooldown.is_active(now) {
            return ReactionOutcome::CoolingDown;
        }
        if !self.limiter.try_acquire(now) {
            debug!(target: "listener", target_id = %target.id, "Reaction limiter full; skipping");
            return ReactionOutcome::RateLimited;
        }

        let kind = match target.kind {
            ReactionTargetKind::Post => "question",
            ReactionTargetKind::Answer => "answer",
        };
        let bundle = reaction_prompt(&self.persona, kind, &target.title, &target.body);
        let budget = TokenBudget {
            max_input_tokens: 1024,
            max_output_tokens: 120,
        };
        let resp = match self.llm.generate(&bundle, Some(budget)).await {
            Ok(r) => r,
            Err(e) => {
                if e.is_auth() {
                    let until = self.cooldown.trip(now, self.cooldown_for);
                    warn!(target: "listener", until = %until, "LLM rejected credentials during reaction; pausing LLM work");
                }
                self.record_failure(target, None, now, &e.to_string()).await;
                return ReactionOutcome::Failed(e.to_string());
            }
        };
        let decision = match ReactionDecision::parse_decision(&resp.text) {
            Ok(d) => d,
            Err(e) => return ReactionOutcome::Declined(format!("unparseable: {e}")),
        };
        if decision.vote == Vote::None || decision.confidence < self.min_confidence {
            return ReactionOutcome::Declined(decision.reason);
        }

        let args = VoteArgs {
            target_id: target.id.clone(),
            vote: decision.vote,
            idempotency_key: Some(format!("react-{}-{}", self.agent_id, target.id)),
        };
        let call = match target.kind {
            ReactionTargetKind::Post => ToolCall::VotePost(args),
            ReactionTargetKind::Answer => ToolCall::VoteAnswer(args),
        };
        match self.tools.invoke(&call).await {
            Ok(_) => {
                info!(target: "listener", target_id = %target.id, vote = ?decision.vote, "Reacted");
                ReactionOutcome::Voted(decision.vote)
            }
            Err(e) => {
                warn!(target: "listener", target_id = %target.id, error = %e, "Reaction vote failed");
                self.record_failure(target, Some(call.name()), now, &e.to_string()).await;
                ReactionOutcome::Failed(e.to_string())
            }
        }
    }
}
