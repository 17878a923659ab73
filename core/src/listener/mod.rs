//! Realtime event listener.
//!
//! Holds one websocket subscription per agent, deduplicates frames, runs the
//! reaction policy and forwards planning/discovery signals to the loop over
//! a bounded channel. It never touches the ledger.

pub mod dedupe;
pub mod reaction;

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

use crate::clock::Clock;
use dedupe::DedupeCache;
use reaction::{ReactionPolicy, ReactionTarget, ReactionTargetKind};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListenerConfig {
    /// Websocket endpoint; the listener is disabled when unset
    pub url: Option<String>,
    pub reconnect_delay_ms: u64,
    pub max_reconnect_delay_ms: u64,
    pub dedupe_cap: usize,
    pub channel_capacity: usize,
    pub reactions_enabled: bool,
    pub reactions_per_minute: u32,
    pub reaction_min_confidence: f64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            url: std::env::var("AGORA_REALTIME_URL").ok().filter(|s| !s.is_empty()),
            reconnect_delay_ms: 5_000,
            max_reconnect_delay_ms: 60_000,
            dedupe_cap: dedupe::DEFAULT_DEDUPE_CAP,
            channel_capacity: 64,
            reactions_enabled: true,
            reactions_per_minute: 6,
            reaction_min_confidence: 0.6,
        }
    }
}

/// Notification from the listener to the loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenerSignal {
    /// Run a targeted planning pass for this question.
    QuestionCreated { question_id: String },
    /// A wiki appeared; consider a discovery pulse.
    WikiCreated { wiki_id: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarketEventKind {
    QuestionCreated,
    AnswerCreated,
    WikiCreated,
}

impl MarketEventKind {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "question.created" => Some(MarketEventKind::QuestionCreated),
            "answer.created" => Some(MarketEventKind::AnswerCreated),
            "wiki.created" => Some(MarketEventKind::WikiCreated),
            _ => None,
        }
    }
}

/// Raw event frame as delivered over the socket.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MarketEvent {
    pub id: String,
    pub kind: String,
    #[serde(default)]
    pub payload: Value,
}

fn payload_str(payload: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|k| payload.get(*k).and_then(|v| v.as_str()))
        .map(str::to_string)
}

pub struct EventListener {
    cfg: ListenerConfig,
    agent_id: String,
    dedupe: DedupeCache,
    signals: mpsc::Sender<ListenerSignal>,
    reactions: Option<ReactionPolicy>,
    clock: Arc<dyn Clock>,
}

impl EventListener {
    pub fn new(
        cfg: ListenerConfig,
        agent_id: impl Into<String>,
        signals: mpsc::Sender<ListenerSignal>,
        reactions: Option<ReactionPolicy>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            dedupe: DedupeCache::new(cfg.dedupe_cap),
            cfg,
            agent_id: agent_id.into(),
            signals,
            reactions,
            clock,
        }
    }

    /// Bounded channel sized from config.
    pub fn channel(cfg: &ListenerConfig) -> (mpsc::Sender<ListenerSignal>, mpsc::Receiver<ListenerSignal>) {
        mpsc::channel(cfg.channel_capacity.max(1))
    }

    fn subscribe_frame(&self) -> String {
        json!({
            "type": "subscribe",
            "agentId": self.agent_id,
            "channels": ["questions", "answers", "wikis"],
        })
        .to_string()
    }

    fn backoff(&self, consecutive_failures: u32) -> Duration {
        let base = self.cfg.reconnect_delay_ms.max(1);
        let factor = 1u64 << consecutive_failures.saturating_sub(1).min(16);
        Duration::from_millis(base.saturating_mul(factor).min(self.cfg.max_reconnect_delay_ms))
    }

    /// Connect, subscribe and process frames until shutdown, reconnecting on failure.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let Some(url) = self.cfg.url.clone() else {
            info!(target: "listener", "No realtime URL configured; listener disabled");
            return;
        };
        let mut failures: u32 = 0;

        loop {
            if *shutdown.borrow() {
                break;
            }
            match connect_async(url.as_str()).await {
                Ok((ws, _)) => {
                    info!(target: "listener", url = %url, "Connected to realtime feed");
                    failures = 0;
                    let (mut sink, mut stream) = ws.split();
                    if let Err(e) = sink.send(Message::Text(self.subscribe_frame().into())).await {
                        warn!(target: "listener", error = %e, "Subscribe failed");
                    } else {
                        loop {
                            tokio::select! {
                                _ = shutdown.changed() => {
                                    let _ = sink.send(Message::Close(None)).await;
                                    return;
                                }
                                frame = stream.next() => match frame {
                                    Some(Ok(Message::Text(text))) => self.handle_frame(text.as_str()).await,
                                    Some(Ok(Message::Ping(data))) => {
                                        let _ = sink.send(Message::Pong(data)).await;
                                    }
                                    Some(Ok(Message::Close(_))) | None => {
                                        warn!(target: "listener", "Realtime feed closed");
                                        break;
                                    }
                                    Some(Ok(_)) => {}
                                    Some(Err(e)) => {
                                        warn!(target: "listener", error = %e, "Realtime feed error");
                                        break;
                                    }
                                }
                            }
                        }
                    }
                    failures = failures.saturating_add(1);
                }
                Err(e) => {
                    failures = failures.saturating_add(1);
                    warn!(target: "listener", error = %e, failures, "Connect failed");
                }
            }

            let delay = self.backoff(failures);
            debug!(target: "listener", delay_ms = delay.as_millis() as u64, "Reconnecting");
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }
        info!(target: "listener", "Listener stopped");
    }

    pub async fn handle_frame(&mut self, text: &str) {
        match serde_json::from_str::<MarketEvent>(text) {
            Ok(event) => self.handle_event(event).await,
            Err(e) => debug!(target: "listener", error = %e, "Dropping malformed frame"),
        }
    }

    pub async fn handle_event(&mut self, event: MarketEvent) {
        let Some(kind) = MarketEventKind::parse(&event.kind) else {
            debug!(target: "listener", kind = %event.kind, "Dropping unknown event kind");
            return;
        };
        if !self.dedupe.insert(&event.id) {
            return;
        }
        let payload = &event.payload;
        let author = payload_str(payload, &["authorAgentId", "agentId"]);
        let now = self.clock.now();

        match kind {
            MarketEventKind::QuestionCreated => {
                let Some(question_id) = payload_str(payload, &["questionId", "id"]) else {
                    debug!(target: "listener", event_id = %event.id, "question.created without id");
                    return;
                };
                if author.as_deref() != Some(self.agent_id.as_str()) {
                    self.signal(ListenerSignal::QuestionCreated {
                        question_id: question_id.clone(),
                    });
                }
                let target = ReactionTarget {
                    kind: ReactionTargetKind::Post,
                    id: question_id,
                    author_agent_id: author,
                    title: payload_str(payload, &["title"]).unwrap_or_default(),
                    body: payload_str(payload, &["body"]).unwrap_or_default(),
                };
                self.react(&target, now).await;
            }
            MarketEventKind::AnswerCreated => {
                let Some(answer_id) = payload_str(payload, &["answerId", "id"]) else {
                    return;
                };
                let target = ReactionTarget {
                    kind: ReactionTargetKind::Answer,
                    id: answer_id,
                    author_agent_id: author,
                    title: payload_str(payload, &["questionTitle", "title"]).unwrap_or_default(),
                    body: payload_str(payload, &["content", "body"]).unwrap_or_default(),
                };
                self.react(&target, now).await;
            }
            MarketEventKind::WikiCreated => {
                if let Some(wiki_id) = payload_str(payload, &["wikiId", "id"]) {
                    self.signal(ListenerSignal::WikiCreated { wiki_id });
                }
            }
        }
    }

    async fn react(&mut self, target: &ReactionTarget, now: chrono::DateTime<chrono::Utc>) {
        if !self.cfg.reactions_enabled {
            return;
        }
        if let Some(policy) = self.reactions.as_mut() {
            let outcome = policy.react(target, now).await;
            debug!(target: "listener", target_id = %target.id, outcome = ?outcome, "Reaction evaluated");
        }
    }

    fn signal(&self, signal: ListenerSignal) {
        match self.signals.try_send(signal) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(dropped)) => {
                warn!(target: "listener", signal = ?dropped, "Loop channel full; dropping signal");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!(target: "listener", "Loop channel closed");
            }
        }
    }
}
