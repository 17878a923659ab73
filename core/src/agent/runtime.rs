use std::sync::{Arc, Mutex};
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use super::compose::{compose_answer, ComposeError};
use super::cooldown::AuthCooldown;
use super::decision::{Critique, ParseDecision, Plan, PlanAction};
use super::discovery::{DiscoveryPulse, PulseTrigger};
use super::gate::{self, DecisionRng, GateDecision, GateInput, StdDecisionRng};
use super::ledger::{Disposition, QuestionStatus};
use super::memory::{AgentMemory, Reflection, TopicOutcome};
use super::observe::{self, domain_alignment, infer_topics, QuestionContext};
use super::prompt::{critic_prompt, planner_prompt};
use crate::audit::{AuditLog, AuditRecord};
use crate::clock::Clock;
use crate::config::AgentSettings;
use crate::heartbeat::{Heartbeat, HeartbeatStatus, HeartbeatWriter};
use crate::listener::ListenerSignal;
use crate::llm::{LlmBackend, LlmError};
use crate::market::{AgentStatus, AnswerReceipt, BudgetStatus, Vote};
use crate::research::Researcher;
use crate::tools::schema::{JoinWikiArgs, PostAnswerArgs, VoteArgs};
use crate::tools::{invoke_as, ToolCall, ToolErrorKind, ToolInvoker, ToolOutput, ToolResult};
use crate::AgoraError;

const UNPARSEABLE_PLAN: &str = "unparseable_plan";
const UNPARSEABLE_CRITIQUE: &str = "unparseable_critique";

/// State owned by the loop task. The listener never sees it.
#[derive(Debug)]
pub struct LoopState {
    pub memory: AgentMemory,
    /// Start of this process run; `invalid` entries decided after it are not retried
    pub run_started_at: DateTime<Utc>,
    pub discovery: DiscoveryPulse,
    pub loop_count: u64,
    pub last_error: Option<String>,
}

/// Result of one per-question evaluation.
#[derive(Debug, Clone, PartialEq)]
pub enum QuestionOutcome {
    Skipped,
    /// Answered entry re-observed; still waiting for settlement.
    Rechecked,
    /// Skipped because LLM credentials are cooling down.
    CoolingDown,
    Answered {
        answer_id: String,
        bid_amount_cents: u64,
    },
    Abstained(String),
    Failed(String),
    Invalid(String),
    Settled,
    ClosedWindow,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleReport {
    pub outcomes: Vec<(String, QuestionOutcome)>,
    /// Set when the whole cycle was skipped
    pub skipped: Option<String>,
    pub wikis_joined: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default)]
struct Scores {
    confidence: f64,
    expected_value: f64,
    domain_alignment: f64,
}

impl From<&GateDecision> for Scores {
    fn from(d: &GateDecision) -> Self {
        Scores {
            confidence: d.confidence,
            expected_value: d.expected_value,
            domain_alignment: 0.0,
        }
    }
}

struct ToolSample {
    tool: &'static str,
    result: Result<(), String>,
    latency_ms: u64,
    at: DateTime<Utc>,
}

/// Times every tool call so the loop can fold the samples into `ToolStats`.
struct TimedTools {
    inner: Arc<dyn ToolInvoker>,
    clock: Arc<dyn Clock>,
    samples: Mutex<Vec<ToolSample>>,
}

impl TimedTools {
    fn drain(&self) -> Vec<ToolSample> {
        match self.samples.lock() {
            Ok(mut s) => std::mem::take(&mut *s),
            Err(_) => Vec::new(),
        }
    }
}

#[async_trait]
impl ToolInvoker for TimedTools {
    async fn invoke(&self, call: &ToolCall) -> ToolResult<ToolOutput> {
        let started = Instant::now();
        let result = self.inner.invoke(call).await;
        let sample = ToolSample {
            tool: call.name(),
            result: result.as_ref().map(|_| ()).map_err(|e| e.to_string()),
            latency_ms: started.elapsed().as_millis() as u64,
            at: self.clock.now(),
        };
        if let Ok(mut s) = self.samples.lock() {
            s.push(sample);
        }
        result
    }
}

/// The observe → plan → critique → gate → act loop for one agent identity.
pub struct AgentRuntime {
    settings: AgentSettings,
    llm: Arc<dyn LlmBackend>,
    tools: Arc<TimedTools>,
    researcher: Researcher,
    rng: Box<dyn DecisionRng>,
    clock: Arc<dyn Clock>,
    cooldown: Arc<AuthCooldown>,
    audit: AuditLog,
    heartbeat: HeartbeatWriter,
    state: LoopState,
}

impl AgentRuntime {
    /// Build a runtime and load persisted memory from `state_dir/<agent_id>/memory.json`.
    pub async fn new(
        settings: AgentSettings,
        llm: Arc<dyn LlmBackend>,
        tools: Arc<dyn ToolInvoker>,
        researcher: Researcher,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let memory = AgentMemory::load(&settings.memory_path()).await;
        info!(
            target: "agent.loop",
            agent_id = %settings.agent_id,
            known_questions = memory.ledger.len(),
            "Loaded agent memory"
        );
        let rng: Box<dyn DecisionRng> = match settings.gate_seed {
            Some(seed) => Box::new(StdDecisionRng::seeded(seed)),
            None => Box::new(StdDecisionRng::from_entropy()),
        };
        let state = LoopState {
            memory,
            run_started_at: clock.now(),
            discovery: DiscoveryPulse::default(),
            loop_count: 0,
            last_error: None,
        };
        Self {
            audit: AuditLog::new(settings.audit_path()),
            heartbeat: HeartbeatWriter::new(settings.heartbeat_path()),
            tools: Arc::new(TimedTools {
                inner: tools,
                clock: Arc::clone(&clock),
                samples: Mutex::new(Vec::new()),
            }),
            settings,
            llm,
            researcher,
            rng,
            clock,
            cooldown: Arc::new(AuthCooldown::default()),
            state,
        }
    }

    pub fn with_rng(mut self, rng: Box<dyn DecisionRng>) -> Self {
        self.rng = rng;
        self
    }

    /// Share an existing cooldown, e.g. with the listener's reaction policy.
    pub fn with_cooldown(mut self, cooldown: Arc<AuthCooldown>) -> Self {
        self.cooldown = cooldown;
        self
    }

    pub fn cooldown(&self) -> Arc<AuthCooldown> {
        Arc::clone(&self.cooldown)
    }

    pub fn state(&self) -> &LoopState {
        &self.state
    }

    pub fn settings(&self) -> &AgentSettings {
        &self.settings
    }

    /// Drive cycles on the timer and targeted passes on listener signals until shutdown.
    pub async fn run(
        &mut self,
        mut signals: mpsc::Receiver<ListenerSignal>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let period = std::time::Duration::from_secs(self.settings.loop_interval_secs.max(1));
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!(target: "agent.loop", agent_id = %self.settings.agent_id, interval_secs = period.as_secs(), "Agent loop started");

        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = ticker.tick() => {
                    let report = self.run_cycle().await;
                    debug!(target: "agent.loop", outcomes = report.outcomes.len(), skipped = ?report.skipped, "Cycle finished");
                }
                Some(signal) = signals.recv() => self.handle_signal(signal).await,
            }
        }

        self.persist().await;
        self.beat(HeartbeatStatus::Offline).await;
        info!(target: "agent.loop", loop_count = self.state.loop_count, "Agent loop stopped");
    }

    /// One full observation and planning cycle.
    pub async fn run_cycle(&mut self) -> CycleReport {
        self.state.loop_count += 1;
        let mut report = CycleReport::default();
        let now = self.clock.now();

        if let Some(until) = self.cooldown.active_until(now) {
            debug!(target: "agent.loop", until = %until, "LLM auth cooldown active; skipping planning");
            report.skipped = Some("auth_cooldown".to_string());
            self.beat(HeartbeatStatus::Degraded).await;
            return report;
        }

        let snapshot = observe::snapshot(self.tools.as_ref(), self.settings.list_limit).await;
        self.fold_tool_samples();
        let snapshot = match snapshot {
            Ok(s) => s,
            Err(e) => {
                warn!(target: "agent.loop", error = %e, "Observation failed; skipping cycle");
                self.state.last_error = Some(e.to_string());
                self.audit
                    .record(AuditRecord::new(now, &self.settings.agent_id, "observe", "failed").error(&e))
                    .await;
                report.skipped = Some(format!("observe_failed: {}", e.kind));
                self.beat(HeartbeatStatus::Online).await;
                return report;
            }
        };

        if snapshot.profile.status == AgentStatus::Paused || snapshot.budget.paused {
            info!(target: "agent.loop", "Agent is paused; observing only");
            report.skipped = Some("paused".to_string());
            self.beat(HeartbeatStatus::Online).await;
            return report;
        }

        report.wikis_joined = self.maybe_discover(PulseTrigger::Timer).await;

        let mut budget = snapshot.budget;
        let revisit = self.revisit();
        let candidates: Vec<String> = snapshot
            .open_questions
            .iter()
            .map(|q| q.id.clone())
            .filter(|id| {
                self.state
                    .memory
                    .ledger
                    .disposition(id, now, revisit, self.state.run_started_at)
                    == Disposition::Evaluate
            })
            .take(self.settings.questions_per_cycle)
            .collect();
        let rechecks: Vec<String> = self
            .state
            .memory
            .ledger
            .due_rechecks(now, revisit)
            .into_iter()
            .take(self.settings.questions_per_cycle)
            .collect();

        for id in candidates.into_iter().chain(rechecks) {
            let outcome = self.evaluate_question(&id, &budget).await;
            if let QuestionOutcome::Answered {
                bid_amount_cents, ..
            } = &outcome
            {
                budget.daily_spend_cents += bid_amount_cents;
            }
            let stop = outcome == QuestionOutcome::CoolingDown;
            report.outcomes.push((id, outcome));
            if stop {
                break;
            }
        }

        let status = if self.cooldown.is_active(self.clock.now()) {
            HeartbeatStatus::Degraded
        } else {
            HeartbeatStatus::Online
        };
        self.beat(status).await;
        report
    }

    pub async fn handle_signal(&mut self, signal: ListenerSignal) {
        match signal {
            ListenerSignal::QuestionCreated { question_id } => {
                if self.cooldown.is_active(self.clock.now()) {
                    return;
                }
                let budget = invoke_as::<BudgetStatus>(self.tools.as_ref(), &ToolCall::GetBudgetStatus).await;
                self.fold_tool_samples();
                match budget {
                    Ok(b) if b.paused => debug!(target: "agent.loop", "Paused; ignoring new question"),
                    Ok(b) => {
                        let outcome = self.evaluate_question(&question_id, &b).await;
                        debug!(target: "agent.loop", question_id = %question_id, outcome = ?outcome, "Targeted pass finished");
                    }
                    Err(e) => {
                        warn!(target: "agent.loop", question_id = %question_id, error = %e, "Budget check failed; leaving question to the timer")
                    }
                }
            }
            ListenerSignal::WikiCreated { wiki_id } => {
                debug!(target: "agent.loop", wiki_id = %wiki_id, "Wiki created");
                self.maybe_discover(PulseTrigger::WikiEvent).await;
            }
        }
    }

    /// Full per-question pass. Never panics and never propagates: every
    /// failure ends up in the ledger, the audit log or both.
    pub async fn evaluate_question(&mut self, question_id: &str, budget: &BudgetStatus) -> QuestionOutcome {
        let now = self.clock.now();
        let disposition =
            self.state
                .memory
                .ledger
                .disposition(question_id, now, self.revisit(), self.state.run_started_at);
        if disposition == Disposition::Skip {
            return QuestionOutcome::Skipped;
        }
        let prior_status = self
            .state
            .memory
            .ledger
            .get(question_id)
            .map(|e| e.status)
            .unwrap_or_default();
        self.state.memory.ledger.observe(question_id, now);

        let fetched = observe::fetch_question(self.tools.as_ref(), question_id).await;
        self.fold_tool_samples();
        let question = match fetched {
            Ok(q) => match q.validate() {
                Ok(()) => q,
                Err(reason) => return self.fetch_failed(question_id, prior_status, "malformed", reason).await,
            },
            Err(e) => {
                let tag = if e.kind == ToolErrorKind::NotFound { "not_found" } else { "fetch_failed" };
                return self.fetch_failed(question_id, prior_status, tag, e.to_string()).await;
            }
        };

        let topics = infer_topics(&question);
        self.state.memory.ledger.set_topics(question_id, &topics);
        let topics = self
            .state
            .memory
            .ledger
            .get(question_id)
            .map(|e| e.topics.clone())
            .unwrap_or(topics);

        if !question.is_open() {
            let outcome = match (prior_status, question.winning_agent_id.as_deref()) {
                (QuestionStatus::Answered, Some(winner)) if winner == self.settings.agent_id => {
                    Some(TopicOutcome::Won)
                }
                (QuestionStatus::Answered, _) => Some(TopicOutcome::Lost),
                _ => None,
            };
            let reason = match outcome {
                Some(TopicOutcome::Won) => "settled_won",
                Some(_) => "settled_lost",
                None => "settled",
            };
            self.conclude(question_id, &topics, QuestionStatus::Settled, reason, Scores::default(), outcome)
                .await;
            return QuestionOutcome::Settled;
        }

        if disposition == Disposition::Recheck {
            // answered questions wait for settlement even once the window has closed
            self.state.memory.ledger.mark_checked(question_id, now);
            self.persist().await;
            return QuestionOutcome::Rechecked;
        }

        if question.window_closed(now) {
            self.conclude(question_id, &topics, QuestionStatus::ClosedWindow, "window_closed", Scores::default(), None)
                .await;
            return QuestionOutcome::ClosedWindow;
        }

        if self.cooldown.is_active(now) {
            return QuestionOutcome::CoolingDown;
        }

        let ctx = QuestionContext {
            topic_prior: self.state.memory.topic_prior(&topics),
            domain_alignment: domain_alignment(&topics, &self.settings.persona.domains),
            similar: observe::similar_questions(self.tools.as_ref(), &question, self.settings.similar_limit).await,
            topics,
            question,
        };
        self.fold_tool_samples();
        let mut scores = Scores {
            domain_alignment: ctx.domain_alignment,
            ..Scores::default()
        };

        // plan
        let plan = match self
            .llm
            .generate(&planner_prompt(&self.settings.persona, &ctx, budget), None)
            .await
        {
            Ok(resp) => Plan::parse_decision(&resp.text).unwrap_or_else(|e| {
                warn!(target: "agent.loop", question_id, error = %e, "Planner reply rejected");
                Plan::abstain(UNPARSEABLE_PLAN)
            }),
            Err(e) => return self.llm_failed(question_id, &ctx.topics, "plan", e).await,
        };
        scores.confidence = plan.confidence;
        scores.expected_value = plan.expected_value;

        if plan.action == PlanAction::Abstain {
            let reason = if plan.reason == UNPARSEABLE_PLAN {
                UNPARSEABLE_PLAN
            } else {
                "plan_abstain"
            };
            self.conclude(question_id, &ctx.topics, QuestionStatus::Abstained, reason, scores, Some(TopicOutcome::Abstained))
                .await;
            return QuestionOutcome::Abstained(reason.to_string());
        }

        // critique
        let critique = match self.llm.generate(&critic_prompt(&ctx, &plan), None).await {
            Ok(resp) => Critique::parse_decision(&resp.text).unwrap_or_else(|e| {
                warn!(target: "agent.loop", question_id, error = %e, "Critic reply rejected; treating as veto");
                Critique::veto(UNPARSEABLE_CRITIQUE)
            }),
            Err(e) => return self.llm_failed(question_id, &ctx.topics, "critique", e).await,
        };

        // gate
        let draws = self.rng.draws();
        let decision = gate::evaluate(
            &GateInput {
                plan: &plan,
                critique: &critique,
                persona: &self.settings.persona,
                topic_prior: ctx.topic_prior,
                domain_alignment: ctx.domain_alignment,
                answer_count: ctx.question.answer_count,
                required_bid_cents: ctx.question.required_bid_cents,
                max_bid_per_action_cents: budget.max_bid_per_action_cents,
                remaining_budget_cents: budget.remaining_cents(),
            },
            draws,
        );
        scores = Scores {
            domain_alignment: ctx.domain_alignment,
            ..Scores::from(&decision)
        };
        info!(
            target: "agent.loop",
            question_id,
            should_answer = decision.should_answer,
            confidence = decision.confidence,
            expected_value = decision.expected_value,
            bid = decision.bid_amount_cents,
            reason = %decision.reason,
            "Gate decision"
        );

        if decision.vote != Vote::None {
            self.cast_vote(question_id, decision.vote).await;
        }

        if !decision.should_answer {
            self.conclude(
                question_id,
                &ctx.topics,
                QuestionStatus::Abstained,
                &decision.reason,
                scores,
                Some(TopicOutcome::Abstained),
            )
            .await;
            return QuestionOutcome::Abstained(decision.reason);
        }

        // act
        let evidence = self.researcher.research(&ctx.question, &plan.research_queries).await;
        self.fold_tool_samples();
        let content =
            match compose_answer(self.llm.as_ref(), &ctx, &plan, &evidence, self.settings.answer_char_budget).await {
                Ok(c) => c,
                Err(ComposeError::Llm(e)) => return self.llm_failed(question_id, &ctx.topics, "compose", e).await,
                Err(ComposeError::Empty) => {
                    self.conclude(question_id, &ctx.topics, QuestionStatus::Failed, "empty_answer", scores, Some(TopicOutcome::Failed))
                        .await;
                    return QuestionOutcome::Failed("empty_answer".to_string());
                }
            };

        let call = ToolCall::PostAnswer(PostAnswerArgs {
            question_id: question_id.to_string(),
            content,
            bid_amount_cents: decision.bid_amount_cents,
            idempotency_key: Some(format!("answer-{}-{}", self.settings.agent_id, question_id)),
        });
        let posted = invoke_as::<AnswerReceipt>(self.tools.as_ref(), &call).await;
        self.fold_tool_samples();

        match posted {
            Ok(receipt) => {
                self.conclude(
                    question_id,
                    &ctx.topics,
                    QuestionStatus::Answered,
                    &decision.reason,
                    scores,
                    Some(TopicOutcome::Answered {
                        confidence: decision.confidence,
                    }),
                )
                .await;
                self.audit
                    .record(
                        AuditRecord::new(self.clock.now(), &self.settings.agent_id, "post_answer", "ok")
                            .question(question_id)
                            .tool("post_answer")
                            .detail(json!({
                                "answerId": receipt.answer_id,
                                "paymentTxHash": receipt.payment_tx_hash,
                                "bidAmountCents": decision.bid_amount_cents,
                            })),
                    )
                    .await;
                self.join_planned_wikis(&plan).await;
                QuestionOutcome::Answered {
                    answer_id: receipt.answer_id,
                    bid_amount_cents: decision.bid_amount_cents,
                }
            }
            Err(e) if e.kind == ToolErrorKind::WindowClosed => {
                self.conclude(question_id, &ctx.topics, QuestionStatus::ClosedWindow, "window_closed", scores, None)
                    .await;
                QuestionOutcome::ClosedWindow
            }
            Err(e) => {
                warn!(target: "agent.loop", question_id, error = %e, "post_answer failed");
                self.state.last_error = Some(e.to_string());
                self.audit
                    .record(
                        AuditRecord::new(self.clock.now(), &self.settings.agent_id, "post_answer", "failed")
                            .question(question_id)
                            .tool("post_answer")
                            .error(&e),
                    )
                    .await;
                let reason = e.kind.as_str();
                self.conclude(question_id, &ctx.topics, QuestionStatus::Failed, reason, scores, Some(TopicOutcome::Failed))
                    .await;
                QuestionOutcome::Failed(reason.to_string())
            }
        }
    }

    async fn fetch_failed(
        &mut self,
        question_id: &str,
        prior: QuestionStatus,
        tag: &str,
        detail: String,
    ) -> QuestionOutcome {
        warn!(target: "agent.loop", question_id, reason = tag, detail = %detail, "Question unavailable");
        self.audit
            .record(
                AuditRecord::new(self.clock.now(), &self.settings.agent_id, "observe", tag)
                    .question(question_id)
                    .tool("get_question")
                    .error(&detail),
            )
            .await;
        match prior {
            QuestionStatus::New => {
                self.conclude(question_id, &[], QuestionStatus::Invalid, tag, Scores::default(), None)
                    .await;
                QuestionOutcome::Invalid(tag.to_string())
            }
            QuestionStatus::Answered => {
                self.state.memory.ledger.mark_checked(question_id, self.clock.now());
                self.persist().await;
                QuestionOutcome::Rechecked
            }
            _ => {
                self.conclude(question_id, &[], QuestionStatus::Failed, tag, Scores::default(), None)
                    .await;
                QuestionOutcome::Failed(tag.to_string())
            }
        }
    }

    async fn llm_failed(&mut self, question_id: &str, topics: &[String], stage: &str, err: LlmError) -> QuestionOutcome {
        let now = self.clock.now();
        self.state.last_error = Some(format!("{stage}: {err}"));
        self.audit
            .record(
                AuditRecord::new(now, &self.settings.agent_id, stage, "llm_error")
                    .question(question_id)
                    .error(&err),
            )
            .await;
        if err.is_auth() {
            self.trip_cooldown(now);
            return QuestionOutcome::CoolingDown;
        }
        warn!(target: "agent.loop", question_id, stage, error = %err, "LLM call failed");
        self.conclude(question_id, topics, QuestionStatus::Failed, "llm_error", Scores::default(), Some(TopicOutcome::Failed))
            .await;
        QuestionOutcome::Failed("llm_error".to_string())
    }

    fn trip_cooldown(&mut self, now: DateTime<Utc>) {
        let until = self
            .cooldown
            .trip(now, self.settings.auth_cooldown());
        warn!(target: "agent.loop", until = %until, "LLM rejected credentials; pausing planning");
    }

    /// Apply a ledger transition and record everything that follows from it.
    async fn conclude(
        &mut self,
        question_id: &str,
        topics: &[String],
        to: QuestionStatus,
        reason: &str,
        scores: Scores,
        topic_outcome: Option<TopicOutcome>,
    ) {
        let now = self.clock.now();
        match self.state.memory.ledger.transition(question_id, to, reason, now) {
            Ok(from) => debug!(target: "agent.loop", question_id, %from, %to, reason, "Ledger transition"),
            Err(e) => {
                warn!(target: "agent.loop", error = %e, "Ledger rejected transition");
                self.state.last_error = Some(e.to_string());
                return;
            }
        }
        if let Some(outcome) = topic_outcome {
            self.state.memory.record_topic_outcome(topics, outcome);
        }
        self.state.memory.reflect(Reflection {
            timestamp: now,
            question_id: question_id.to_string(),
            action: to.as_str().to_string(),
            confidence: scores.confidence,
            expected_value: scores.expected_value,
            domain_alignment: scores.domain_alignment,
            outcome: reason.to_string(),
        });
        self.audit
            .record(AuditRecord::new(now, &self.settings.agent_id, to.as_str(), reason).question(question_id))
            .await;
        self.persist().await;
    }

    async fn cast_vote(&mut self, question_id: &str, vote: Vote) {
        let call = ToolCall::VotePost(VoteArgs {
            target_id: question_id.to_string(),
            vote,
            idempotency_key: Some(format!("react-{}-{}", self.settings.agent_id, question_id)),
        });
        let result = self.tools.invoke(&call).await;
        self.fold_tool_samples();
        if let Err(e) = result {
            debug!(target: "agent.loop", question_id, error = %e, "vote_post failed");
        }
    }

    async fn join_planned_wikis(&mut self, plan: &Plan) {
        let agent_id = self.settings.agent_id.clone();
        for wiki_id in plan
            .join_wiki_ids
            .iter()
            .take(self.settings.discovery.max_joins_per_pulse)
        {
            let call = ToolCall::JoinWiki(JoinWikiArgs {
                wiki_id: wiki_id.clone(),
                idempotency_key: Some(format!("join-{agent_id}-{wiki_id}")),
            });
            if let Err(e) = self.tools.invoke(&call).await {
                debug!(target: "agent.loop", wiki_id = %wiki_id, error = %e, "join_wiki failed");
            }
        }
        self.fold_tool_samples();
    }

    async fn maybe_discover(&mut self, trigger: PulseTrigger) -> Vec<String> {
        let now = self.clock.now();
        if self.cooldown.is_active(now) || !self.state.discovery.is_due(&self.settings.discovery, trigger, now) {
            return Vec::new();
        }
        let result = self
            .state
            .discovery
            .run(
                &self.settings.discovery,
                &self.settings.agent_id,
                &self.settings.persona,
                self.llm.as_ref(),
                self.tools.as_ref(),
                now,
            )
            .await;
        self.fold_tool_samples();
        match result {
            Ok(joined) => joined,
            Err(AgoraError::LlmError(e)) if e.is_auth() => {
                self.trip_cooldown(now);
                Vec::new()
            }
            Err(e) => {
                warn!(target: "agent.discovery", error = %e, "Discovery pulse failed");
                self.state.last_error = Some(e.to_string());
                Vec::new()
            }
        }
    }

    fn revisit(&self) -> Duration {
        Duration::seconds(self.settings.revisit_interval_secs as i64)
    }

    fn fold_tool_samples(&mut self) {
        for s in self.tools.drain() {
            self.state.memory.record_tool(s.tool, s.result, s.latency_ms, s.at);
        }
    }

    async fn persist(&mut self) {
        self.fold_tool_samples();
        if let Err(e) = self.state.memory.save(&self.settings.memory_path()).await {
            warn!(target: "agent.loop", error = %e, "Failed to persist memory");
        }
    }

    async fn beat(&self, status: HeartbeatStatus) {
        let now = self.clock.now();
        let beat = Heartbeat {
            agent_id: self.settings.agent_id.clone(),
            status,
            loop_count: self.state.loop_count,
            last_error: self.state.last_error.clone(),
            cooldown_until: self.cooldown.active_until(now),
            updated_at: now,
        };
        if let Err(e) = self.heartbeat.write(&beat).await {
            warn!(target: "agent.loop", error = %e, "Failed to write heartbeat");
        }
    }
}
