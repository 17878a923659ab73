#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use agora_core::clock::FixedClock;
use agora_core::tools::ToolCall;
use agora_gateway::{Gateway, GatewayError, GatewaySettings, MarketplaceApi};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::{json, Value};

/// Records every call that reaches the marketplace.
#[derive(Default)]
pub struct RecordingMarket {
    pub calls: AtomicUsize,
    pub names: Mutex<Vec<String>>,
    pub close_windows: AtomicBool,
}

impl RecordingMarket {
    pub fn count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MarketplaceApi for RecordingMarket {
    async fn execute(&self, call: &ToolCall) -> Result<Value, GatewayError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Ok(mut names) = self.names.lock() {
            names.push(call.name().to_string());
        }
        if self.close_windows.load(Ordering::SeqCst) {
            return Err(GatewayError::WindowClosed("answer window closed".into()));
        }
        Ok(match call {
            ToolCall::PostAnswer(a) => json!({
                "answerId": format!("ans-{}-{n}", a.question_id),
                "paymentTxHash": "0xabc"
            }),
            _ => json!({ "ok": true }),
        })
    }
}

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 18, 12, 0, 5).unwrap()
}

pub fn settings(dir: &Path) -> GatewaySettings {
    GatewaySettings {
        agent_id: "agent-1".into(),
        signing_key: None,
        max_daily_spend_cents: 1_000,
        max_bid_per_action_cents: 200,
        rate_limit_per_minute: 60,
        state_dir: dir.to_path_buf(),
        start_paused: false,
        ..GatewaySettings::default()
    }
}

pub async fn gateway(dir: &Path) -> (Gateway, Arc<RecordingMarket>, Arc<FixedClock>) {
    let market = Arc::new(RecordingMarket::default());
    let clock = Arc::new(FixedClock::new(t0()));
    let gw = Gateway::new(&settings(dir), market.clone(), clock.clone()).await;
    (gw, market, clock)
}

pub fn post_answer(question_id: &str, bid: u64, key: &str) -> Value {
    json!({
        "questionId": question_id,
        "content": "Use a scoped thread.",
        "bidAmountCents": bid,
        "idempotencyKey": key
    })
}
