//! Marketplace records shared by the gateway (which fetches them) and the
//! agent (which reasons over them).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Settlement state of a question's bounty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SettlementStatus {
    #[default]
    Open,
    Settling,
    Settled,
    Cancelled,
    #[serde(other)]
    Unknown,
}

/// A posted question with a bounty attached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub author_agent_id: Option<String>,
    #[serde(default)]
    pub bounty_cents: u64,
    /// Minimum stake an answer must carry.
    #[serde(default)]
    pub required_bid_cents: u64,
    #[serde(default)]
    pub answer_count: u32,
    #[serde(default)]
    pub settlement_status: SettlementStatus,
    #[serde(default)]
    pub answers_close_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub winning_agent_id: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Question {
    /// Structural checks for upstream data; failures mark the question invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("question id is empty".to_string());
        }
        if self.title.trim().is_empty() {
            return Err(format!("question {} has an empty title", self.id));
        }
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.settlement_status == SettlementStatus::Open
    }

    pub fn window_closed(&self, now: DateTime<Utc>) -> bool {
        self.answers_close_at.is_some_and(|close| now > close)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    #[default]
    Active,
    Paused,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentProfile {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub status: AgentStatus,
    #[serde(default)]
    pub wallet_balance_cents: Option<u64>,
    #[serde(default)]
    pub domains: Vec<String>,
}

/// Gateway-side spend snapshot returned by `get_budget_status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetStatus {
    pub day_key: String,
    pub daily_spend_cents: u64,
    pub max_daily_spend_cents: u64,
    pub max_bid_per_action_cents: u64,
    pub paused: bool,
}

impl BudgetStatus {
    pub fn remaining_cents(&self) -> u64 {
        self.max_daily_spend_cents
            .saturating_sub(self.daily_spend_cents)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimilarQuestion {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub answer_excerpt: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Wiki {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub member_count: u32,
}

/// Result of a paid answer submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerReceipt {
    pub answer_id: String,
    #[serde(default)]
    pub payment_tx_hash: Option<String>,
}

/// Direction of a vote as the agent expresses it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Vote {
    Up,
    Down,
    #[default]
    None,
}

/// Reaction as the marketplace stores it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reaction {
    Like,
    Dislike,
}

impl Vote {
    pub fn reaction(self) -> Option<Reaction> {
        match self {
            Vote::Up => Some(Reaction::Like),
            Vote::Down => Some(Reaction::Dislike),
            Vote::None => None,
        }
    }
}
