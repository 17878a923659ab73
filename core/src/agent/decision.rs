//! Boundary between free-form LLM text and validated decision values.
//!
//! Model output is located (fenced block or the outermost `{…}`), decoded
//! into a permissive raw shape, then validated field by field. Out-of-range
//! numbers and unknown enum values are errors, never clamped or guessed.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::market::Vote;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("no JSON object found in model output")]
    NoJson,

    #[error("malformed JSON: {0}")]
    Json(String),

    #[error("invalid {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },
}

/// A validated decision parsed from raw model text.
pub trait ParseDecision: Sized {
    fn parse_decision(raw: &str) -> Result<Self, ParseError>;
}

/// Locate the JSON object in a model reply.
pub fn extract_json(raw: &str) -> Option<&str> {
    if let Some(start) = raw.find("```") {
        let after = &raw[start + 3..];
        let body_start = after.find('\n').map(|i| i + 1).unwrap_or(0);
        let body = &after[body_start..];
        if let Some(end) = body.find("```") {
            let inner = body[..end].trim();
            if inner.starts_with('{') {
                return Some(inner);
            }
        }
    }
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    (end > start).then(|| &raw[start..=end])
}

fn decode<T: DeserializeOwned>(raw: &str) -> Result<T, ParseError> {
    let json = extract_json(raw).ok_or(ParseError::NoJson)?;
    serde_json::from_str(json).map_err(|e| ParseError::Json(e.to_string()))
}

fn in_range(field: &'static str, v: f64, lo: f64, hi: f64) -> Result<f64, ParseError> {
    if v.is_finite() && (lo..=hi).contains(&v) {
        Ok(v)
    } else {
        Err(ParseError::InvalidField {
            field,
            reason: format!("{v} outside [{lo}, {hi}]"),
        })
    }
}

fn parse_vote(field: &'static str, v: Option<String>) -> Result<Vote, ParseError> {
    match v.as_deref().map(|s| s.trim().to_ascii_lowercase()).as_deref() {
        None | Some("none") | Some("") => Ok(Vote::None),
        Some("up") | Some("like") => Ok(Vote::Up),
        Some("down") | Some("dislike") => Ok(Vote::Down),
        Some(other) => Err(ParseError::InvalidField {
            field,
            reason: format!("unknown vote {other:?}"),
        }),
    }
}

fn clean_list(items: Vec<String>, max: usize) -> Vec<String> {
    items
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .take(max)
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanAction {
    Answer,
    Abstain,
}

impl PlanAction {
    fn parse(field: &'static str, s: &str) -> Result<Self, ParseError> {
        match s.trim().to_ascii_lowercase().as_str() {
            "answer" => Ok(PlanAction::Answer),
            "abstain" | "skip" => Ok(PlanAction::Abstain),
            other => Err(ParseError::InvalidField {
                field,
                reason: format!("unknown action {other:?}"),
            }),
        }
    }
}

/// Planner output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub action: PlanAction,
    pub confidence: f64,
    pub expected_value: f64,
    pub bid_amount_cents: u64,
    pub vote: Vote,
    pub join_wiki_ids: Vec<String>,
    pub research_queries: Vec<String>,
    pub reason: String,
    pub risk_flags: Vec<String>,
}

impl Plan {
    /// Fallback used when the planner reply cannot be parsed.
    pub fn abstain(reason: impl Into<String>) -> Self {
        Self {
            action: PlanAction::Abstain,
            confidence: 0.0,
            expected_value: 0.0,
            bid_amount_cents: 0,
            vote: Vote::None,
            join_wiki_ids: Vec::new(),
            research_queries: Vec::new(),
            reason: reason.into(),
            risk_flags: Vec::new(),
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPlan {
    action: String,
    confidence: f64,
    #[serde(alias = "expected_value")]
    expected_value: f64,
    #[serde(default, alias = "bid_amount_cents")]
    bid_amount_cents: Option<u64>,
    #[serde(default)]
    vote: Option<String>,
    #[serde(default, alias = "join_wiki_ids")]
    join_wiki_ids: Vec<String>,
    #[serde(default, alias = "research_queries")]
    research_queries: Vec<String>,
    #[serde(default)]
    reason: String,
    #[serde(default, alias = "risk_flags")]
    risk_flags: Vec<String>,
}

impl ParseDecision for Plan {
    fn parse_decision(raw: &str) -> Result<Self, ParseError> {
        let r: RawPlan = decode(raw)?;
        Ok(Plan {
            action: PlanAction::parse("action", &r.action)?,
            confidence: in_range("confidence", r.confidence, 0.0, 1.0)?,
            expected_value: in_range("expectedValue", r.expected_value, -1.0, 1.0)?,
            bid_amount_cents: r.bid_amount_cents.unwrap_or(0),
            vote: parse_vote("vote", r.vote)?,
            join_wiki_ids: clean_list(r.join_wiki_ids, 8),
            research_queries: clean_list(r.research_queries, 8),
            reason: r.reason.trim().to_string(),
            risk_flags: clean_list(r.risk_flags, 8),
        })
    }
}

/// Critic output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Critique {
    pub approve: bool,
    pub adjusted_action: Option<PlanAction>,
    pub adjusted_bid_amount_cents: Option<u64>,
    pub adjusted_vote: Option<Vote>,
    pub confidence_adjustment: f64,
    pub issues: Vec<String>,
}

impl Critique {
    /// Used when the critic reply is unusable: the critic vetoes.
    pub fn veto(issue: impl Into<String>) -> Self {
        Self {
            approve: false,
            adjusted_action: None,
            adjusted_bid_amount_cents: None,
            adjusted_vote: None,
            confidence_adjustment: 0.0,
            issues: vec![issue.into()],
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawCritique {
    approve: bool,
    #[serde(default, alias = "adjusted_action")]
    adjusted_action: Option<String>,
    #[serde(default, alias = "adjusted_bid_amount_cents")]
    adjusted_bid_amount_cents: Option<u64>,
    #[serde(default, alias = "adjusted_vote")]
    adjusted_vote: Option<String>,
    #[serde(default, alias = "confidence_adjustment")]
    confidence_adjustment: f64,
    #[serde(default)]
    issues: Vec<String>,
}

impl ParseDecision for Critique {
    fn parse_decision(raw: &str) -> Result<Self, ParseError> {
        let r: RawCritique = decode(raw)?;
        let adjusted_action = r
            .adjusted_action
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .map(|s| PlanAction::parse("adjustedAction", s))
            .transpose()?;
        let adjusted_vote = match r.adjusted_vote {
            Some(v) => Some(parse_vote("adjustedVote", Some(v))?),
            None => None,
        };
        Ok(Critique {
            approve: r.approve,
            adjusted_action,
            adjusted_bid_amount_cents: r.adjusted_bid_amount_cents,
            adjusted_vote,
            confidence_adjustment: in_range("confidenceAdjustment", r.confidence_adjustment, -0.5, 0.5)?,
            issues: clean_list(r.issues, 8),
        })
    }
}

/// Discovery pulse output.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DiscoveryPlan {
    pub join_wiki_ids: Vec<String>,
    pub reason: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawDiscovery {
    #[serde(default, alias = "join_wiki_ids")]
    join_wiki_ids: Vec<String>,
    #[serde(default)]
    reason: String,
}

impl ParseDecision for DiscoveryPlan {
    fn parse_decision(raw: &str) -> Result<Self, ParseError> {
        let r: RawDiscovery = decode(raw)?;
        Ok(DiscoveryPlan {
            join_wiki_ids: clean_list(r.join_wiki_ids, 16),
            reason: r.reason.trim().to_string(),
        })
    }
}

/// Lightweight reaction to a post or answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReactionDecision {
    pub vote: Vote,
    pub confidence: f64,
    pub reason: String,
}

#[derive(Deserialize)]
struct RawReaction {
    #[serde(default)]
    vote: Option<String>,
    #[serde(default)]
    confidence: f64,
    #[serde(default)]
    reason: String,
}

impl ParseDecision for ReactionDecision {
    fn parse_decision(raw: &str) -> Result<Self, ParseError> {
        let r: RawReaction = decode(raw)?;
        Ok(ReactionDecision {
            vote: parse_vote("vote", r.vote)?,
            confidence: in_range("confidence", r.confidence, 0.0, 1.0)?,
            reason: r.reason.trim().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_from_fenced_block() {
        let raw = "Sure, here is my plan:\n```json\n{\"action\":\"answer\",\"confidence\":0.8,\"expectedValue\":0.3,\"bidAmountCents\":25,\"vote\":\"up\",\"researchQueries\":[\"tokio select\", \"\"]}\n```\nthanks";
        let plan = Plan::parse_decision(raw).unwrap();
        assert_eq!(plan.action, PlanAction::Answer);
        assert_eq!(plan.bid_amount_cents, 25);
        assert_eq!(plan.vote, Vote::Up);
        assert_eq!(plan.research_queries, vec!["tokio select"]);
    }

    #[test]
    fn test_plan_bare_snake_case() {
        let raw = r#"{"action": "abstain", "confidence": 0.2, "expected_value": -0.4, "reason": "off topic"}"#;
        let plan = Plan::parse_decision(raw).unwrap();
        assert_eq!(plan.action, PlanAction::Abstain);
        assert_eq!(plan.reason, "off topic");
    }

    #[test]
    fn test_out_of_range_rejected() {
        let raw = r#"{"action": "answer", "confidence": 1.4, "expectedValue": 0.1}"#;
        assert!(matches!(
            Plan::parse_decision(raw),
            Err(ParseError::InvalidField { field: "confidence", .. })
        ));
    }

    #[test]
    fn test_unknown_action_rejected() {
        let raw = r#"{"action": "maybe", "confidence": 0.4, "expectedValue": 0.1}"#;
        assert!(Plan::parse_decision(raw).is_err());
    }

    #[test]
    fn test_no_json() {
        assert_eq!(Plan::parse_decision("I cannot help"), Err(ParseError::NoJson));
    }

    #[test]
    fn test_critique_parse() {
        let raw = r#"{"approve": true, "adjustedBidAmountCents": 30, "confidenceAdjustment": -0.1, "issues": ["thin evidence"]}"#;
        let c = Critique::parse_decision(raw).unwrap();
        assert!(c.approve);
        assert_eq!(c.adjusted_bid_amount_cents, Some(30));
        assert_eq!(c.adjusted_action, None);
        assert!((c.confidence_adjustment + 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_critique_adjustment_bounds() {
        let raw = r#"{"approve": true, "confidenceAdjustment": 0.9}"#;
        assert!(Critique::parse_decision(raw).is_err());
    }

    #[test]
    fn test_reaction_parse() {
        let r = ReactionDecision::parse_decision(r#"{"vote":"dislike","confidence":0.7}"#).unwrap();
        assert_eq!(r.vote, Vote::Down);
    }
}
