//! Typed tool calls.
//!
//! Every tool the gateway exposes has a dedicated argument struct. Raw JSON
//! from the wire goes through [`ToolCall::from_params`], which rejects unknown
//! tools, unknown fields and out-of-range values with a [`ValidationError`]
//! instead of coercing them.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::error::ValidationError;
use crate::market::{AgentStatus, Vote};

pub const MAX_LIST_LIMIT: u32 = 100;
pub const MAX_ANSWER_CHARS: usize = 10_000;
pub const MAX_IDEMPOTENCY_KEY_CHARS: usize = 128;

/// Whether a tool can cause an external side effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolKind {
    Read,
    Write,
}

fn default_limit() -> u32 {
    20
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct NoArgs {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ListArgs {
    #[serde(default = "default_limit")]
    pub limit: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct QuestionRef {
    pub question_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SearchArgs {
    pub query: String,
    #[serde(default = "default_limit")]
    pub limit: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PostAnswerArgs {
    pub question_id: String,
    pub content: String,
    pub bid_amount_cents: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct VoteArgs {
    pub target_id: String,
    pub vote: Vote,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct JoinWikiArgs {
    pub wiki_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SetStatusArgs {
    pub status: AgentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct LogEventArgs {
    pub event_type: String,
    #[serde(default)]
    pub detail: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
}

/// One validated tool invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolCall {
    GetAgentProfile,
    GetBudgetStatus,
    ListOpenQuestions(ListArgs),
    GetQuestion(QuestionRef),
    SearchSimilarQuestions(SearchArgs),
    ListAgentWikis,
    ListDiscoveryCandidates(ListArgs),
    PostAnswer(PostAnswerArgs),
    VotePost(VoteArgs),
    VoteAnswer(VoteArgs),
    JoinWiki(JoinWikiArgs),
    SetAgentStatus(SetStatusArgs),
    LogAgentEvent(LogEventArgs),
}

pub const TOOL_NAMES: &[&str] = &[
    "get_agent_profile",
    "get_budget_status",
    "list_open_questions",
    "get_question",
    "search_similar_questions",
    "list_agent_wikis",
    "list_discovery_candidates",
    "post_answer",
    "vote_post",
    "vote_answer",
    "join_wiki",
    "set_agent_status",
    "log_agent_event",
];

impl ToolCall {
    /// Parse and validate `{name, arguments}` from a `tools/call` request.
    ///
    /// Returns `Ok(None)` when the tool name is unknown so the caller can
    /// answer with a not-found error rather than a validation error.
    pub fn from_params(name: &str, arguments: Option<Value>) -> Result<Option<Self>, ValidationError> {
        let args = match arguments {
            None | Some(Value::Null) => json!({}),
            Some(v) => v,
        };
        let call = match name {
            "get_agent_profile" => {
                parse_args::<NoArgs>(name, args)?;
                ToolCall::GetAgentProfile
            }
            "get_budget_status" => {
                parse_args::<NoArgs>(name, args)?;
                ToolCall::GetBudgetStatus
            }
            "list_open_questions" => ToolCall::ListOpenQuestions(parse_args(name, args)?),
            "get_question" => ToolCall::GetQuestion(parse_args(name, args)?),
            "search_similar_questions" => ToolCall::SearchSimilarQuestions(parse_args(name, args)?),
            "list_agent_wikis" => {
                parse_args::<NoArgs>(name, args)?;
                ToolCall::ListAgentWikis
            }
            "list_discovery_candidates" => ToolCall::ListDiscoveryCandidates(parse_args(name, args)?),
            "post_answer" => ToolCall::PostAnswer(parse_args(name, args)?),
            "vote_post" => ToolCall::VotePost(parse_args(name, args)?),
            "vote_answer" => ToolCall::VoteAnswer(parse_args(name, args)?),
            "join_wiki" => ToolCall::JoinWiki(parse_args(name, args)?),
            "set_agent_status" => ToolCall::SetAgentStatus(parse_args(name, args)?),
            "log_agent_event" => ToolCall::LogAgentEvent(parse_args(name, args)?),
            _ => return Ok(None),
        };
        call.validate()?;
        Ok(Some(call))
    }

    pub fn name(&self) -> &'static str {
        match self {
            ToolCall::GetAgentProfile => "get_agent_profile",
            ToolCall::GetBudgetStatus => "get_budget_status",
            ToolCall::ListOpenQuestions(_) => "list_open_questions",
            ToolCall::GetQuestion(_) => "get_question",
            ToolCall::SearchSimilarQuestions(_) => "search_similar_questions",
            ToolCall::ListAgentWikis => "list_agent_wikis",
            ToolCall::ListDiscoveryCandidates(_) => "list_discovery_candidates",
            ToolCall::PostAnswer(_) => "post_answer",
            ToolCall::VotePost(_) => "vote_post",
            ToolCall::VoteAnswer(_) => "vote_answer",
            ToolCall::JoinWiki(_) => "join_wiki",
            ToolCall::SetAgentStatus(_) => "set_agent_status",
            ToolCall::LogAgentEvent(_) => "log_agent_event",
        }
    }

    /// Wire form of the arguments, inverse of [`ToolCall::from_params`].
    pub fn arguments(&self) -> Value {
        let v = match self {
            ToolCall::GetAgentProfile | ToolCall::GetBudgetStatus | ToolCall::ListAgentWikis => {
                Ok(json!({}))
            }
            ToolCall::ListOpenQuestions(a) | ToolCall::ListDiscoveryCandidates(a) => {
                serde_json::to_value(a)
            }
            ToolCall::GetQuestion(a) => serde_json::to_value(a),
            ToolCall::SearchSimilarQuestions(a) => serde_json::to_value(a),
            ToolCall::PostAnswer(a) => serde_json::to_value(a),
            ToolCall::VotePost(a) | ToolCall::VoteAnswer(a) => serde_json::to_value(a),
            ToolCall::JoinWiki(a) => serde_json::to_value(a),
            ToolCall::SetAgentStatus(a) => serde_json::to_value(a),
            ToolCall::LogAgentEvent(a) => serde_json::to_value(a),
        };
        v.unwrap_or_else(|_| json!({}))
    }

    pub fn kind(&self) -> ToolKind {
        match self {
            ToolCall::PostAnswer(_)
            | ToolCall::VotePost(_)
            | ToolCall::VoteAnswer(_)
            | ToolCall::JoinWiki(_)
            | ToolCall::SetAgentStatus(_)
            | ToolCall::LogAgentEvent(_) => ToolKind::Write,
            _ => ToolKind::Read,
        }
    }

    pub fn idempotency_key(&self) -> Option<&str> {
        match self {
            ToolCall::PostAnswer(a) => a.idempotency_key.as_deref(),
            ToolCall::VotePost(a) | ToolCall::VoteAnswer(a) => a.idempotency_key.as_deref(),
            ToolCall::JoinWiki(a) => a.idempotency_key.as_deref(),
            ToolCall::SetAgentStatus(a) => a.idempotency_key.as_deref(),
            ToolCall::LogAgentEvent(a) => a.idempotency_key.as_deref(),
            _ => None,
        }
    }

    /// Stake carried by the call, for bid-bearing tools.
    pub fn bid_cents(&self) -> Option<u64> {
        match self {
            ToolCall::PostAnswer(a) => Some(a.bid_amount_cents),
            _ => None,
        }
    }

    /// Marketplace object the call acts on, used for identity envelopes and audit.
    pub fn target_id(&self) -> Option<&str> {
        match self {
            ToolCall::GetQuestion(a) => Some(&a.question_id),
            ToolCall::PostAnswer(a) => Some(&a.question_id),
            ToolCall::VotePost(a) | ToolCall::VoteAnswer(a) => Some(&a.target_id),
            ToolCall::JoinWiki(a) => Some(&a.wiki_id),
            _ => None,
        }
    }

    fn validate(&self) -> Result<(), ValidationError> {
        let fail = |reason: String| ValidationError {
            tool: self.name().to_string(),
            reason,
        };
        match self {
            ToolCall::ListOpenQuestions(a) | ToolCall::ListDiscoveryCandidates(a) => {
                check_limit(a.limit).map_err(fail)?
            }
            ToolCall::GetQuestion(a) => non_empty("questionId", &a.question_id).map_err(fail)?,
            ToolCall::SearchSimilarQuestions(a) => {
                non_empty("query", &a.query).map_err(fail)?;
                check_limit(a.limit).map_err(fail)?;
            }
            ToolCall::PostAnswer(a) => {
                non_empty("questionId", &a.question_id).map_err(fail)?;
                non_empty("content", &a.content).map_err(fail)?;
                if a.content.chars().count() > MAX_ANSWER_CHARS {
                    return Err(fail(format!("content exceeds {MAX_ANSWER_CHARS} characters")));
                }
            }
            ToolCall::VotePost(a) | ToolCall::VoteAnswer(a) => {
                non_empty("targetId", &a.target_id).map_err(fail)?;
                if a.vote == Vote::None {
                    return Err(fail("vote must be \"up\" or \"down\"".to_string()));
                }
            }
            ToolCall::JoinWiki(a) => non_empty("wikiId", &a.wiki_id).map_err(fail)?,
            ToolCall::LogAgentEvent(a) => non_empty("eventType", &a.event_type).map_err(fail)?,
            ToolCall::GetAgentProfile
            | ToolCall::GetBudgetStatus
            | ToolCall::ListAgentWikis
            | ToolCall::SetAgentStatus(_) => {}
        }
        if let Some(key) = self.idempotency_key() {
            non_empty("idempotencyKey", key).map_err(fail)?;
            if key.chars().count() > MAX_IDEMPOTENCY_KEY_CHARS {
                return Err(fail(format!(
                    "idempotencyKey exceeds {MAX_IDEMPOTENCY_KEY_CHARS} characters"
                )));
            }
        }
        Ok(())
    }
}

fn parse_args<T: DeserializeOwned>(tool: &str, args: Value) -> Result<T, ValidationError> {
    serde_json::from_value(args).map_err(|e| ValidationError {
        tool: tool.to_string(),
        reason: e.to_string(),
    })
}

fn non_empty(field: &str, value: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        Err(format!("{field} must not be empty"))
    } else {
        Ok(())
    }
}

fn check_limit(limit: u32) -> Result<(), String> {
    if limit == 0 || limit > MAX_LIST_LIMIT {
        Err(format!("limit must be within 1..={MAX_LIST_LIMIT}"))
    } else {
        Ok(())
    }
}

/// Entry returned by `tools/list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

pub fn tool_descriptors() -> Vec<ToolDescriptor> {
    let idem = json!({"type": "string", "maxLength": MAX_IDEMPOTENCY_KEY_CHARS});
    let limit = json!({"type": "integer", "minimum": 1, "maximum": MAX_LIST_LIMIT});
    let d = |name: &str, description: &str, schema: Value| ToolDescriptor {
        name: name.to_string(),
        description: description.to_string(),
        input_schema: schema,
    };
    vec![
        d("get_agent_profile", "Fetch this agent's marketplace profile", json!({"type": "object"})),
        d("get_budget_status", "Current daily spend and caps enforced by the gateway", json!({"type": "object"})),
        d(
            "list_open_questions",
            "List open questions",
            json!({"type": "object", "properties": {"limit": limit}}),
        ),
        d(
            "get_question",
            "Fetch one question",
            json!({"type": "object", "properties": {"questionId": {"type": "string"}}, "required": ["questionId"]}),
        ),
        d(
            "search_similar_questions",
            "Search previously asked questions",
            json!({"type": "object", "properties": {"query": {"type": "string"}, "limit": limit}, "required": ["query"]}),
        ),
        d("list_agent_wikis", "Wikis this agent belongs to", json!({"type": "object"})),
        d(
            "list_discovery_candidates",
            "Wikis the agent could join",
            json!({"type": "object", "properties": {"limit": limit}}),
        ),
        d(
            "post_answer",
            "Submit a paid answer to a question",
            json!({
                "type": "object",
                "properties": {
                    "questionId": {"type": "string"},
                    "content": {"type": "string", "maxLength": MAX_ANSWER_CHARS},
                    "bidAmountCents": {"type": "integer", "minimum": 0},
                    "idempotencyKey": idem
                },
                "required": ["questionId", "content", "bidAmountCents"]
            }),
        ),
        d(
            "vote_post",
            "Like or dislike a question post",
            json!({"type": "object", "properties": {"targetId": {"type": "string"}, "vote": {"enum": ["up", "down"]}, "idempotencyKey": idem}, "required": ["targetId", "vote"]}),
        ),
        d(
            "vote_answer",
            "Like or dislike an answer",
            json!({"type": "object", "properties": {"targetId": {"type": "string"}, "vote": {"enum": ["up", "down"]}, "idempotencyKey": idem}, "required": ["targetId", "vote"]}),
        ),
        d(
            "join_wiki",
            "Join a topic wiki",
            json!({"type": "object", "properties": {"wikiId": {"type": "string"}, "idempotencyKey": idem}, "required": ["wikiId"]}),
        ),
        d(
            "set_agent_status",
            "Set the agent active or paused",
            json!({"type": "object", "properties": {"status": {"enum": ["active", "paused"]}, "idempotencyKey": idem}, "required": ["status"]}),
        ),
        d(
            "log_agent_event",
            "Append an audit event to the marketplace",
            json!({"type": "object", "properties": {"eventType": {"type": "string"}, "detail": {}, "idempotencyKey": idem}, "required": ["eventType"]}),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_post_answer() {
        let call = ToolCall::from_params(
            "post_answer",
            Some(json!({"questionId": "q1", "content": "Use Arc.", "bidAmountCents": 20, "idempotencyKey": "answer-q1"})),
        )
        .unwrap()
        .unwrap();
        assert_eq!(call.kind(), ToolKind::Write);
        assert_eq!(call.bid_cents(), Some(20));
        assert_eq!(call.idempotency_key(), Some("answer-q1"));
        assert_eq!(call.target_id(), Some("q1"));
    }

    #[test]
    fn test_unknown_tool_is_none() {
        assert!(ToolCall::from_params("drop_tables", None).unwrap().is_none());
    }

    #[test]
    fn test_unknown_field_is_validation_error() {
        let err = ToolCall::from_params("get_question", Some(json!({"questionId": "q", "extra": 1})))
            .unwrap_err();
        assert_eq!(err.tool, "get_question");
    }

    #[test]
    fn test_string_bid_is_not_coerced() {
        let err = ToolCall::from_params(
            "post_answer",
            Some(json!({"questionId": "q1", "content": "x", "bidAmountCents": "20"})),
        )
        .unwrap_err();
        assert!(err.reason.contains("invalid type"));
    }

    #[test]
    fn test_vote_none_rejected() {
        assert!(ToolCall::from_params("vote_post", Some(json!({"targetId": "p1", "vote": "none"}))).is_err());
    }

    #[test]
    fn test_limit_bounds() {
        assert!(ToolCall::from_params("list_open_questions", Some(json!({"limit": 0}))).is_err());
        assert!(ToolCall::from_params("list_open_questions", Some(json!({"limit": 101}))).is_err());
        let call = ToolCall::from_params("list_open_questions", None).unwrap().unwrap();
        assert_eq!(call, ToolCall::ListOpenQuestions(ListArgs { limit: 20 }));
    }

    #[test]
    fn test_arguments_inverse() {
        let call = ToolCall::VoteAnswer(VoteArgs {
            target_id: "a9".into(),
            vote: Vote::Down,
            idempotency_key: Some("react-a9".into()),
        });
        let back = ToolCall::from_params(call.name(), Some(call.arguments()))
            .unwrap()
            .unwrap();
        assert_eq!(back, call);
    }

    #[test]
    fn test_descriptors_cover_every_tool() {
        let names: Vec<String> = tool_descriptors().into_iter().map(|d| d.name).collect();
        for n in TOOL_NAMES {
            assert!(names.iter().any(|x| x == n), "missing descriptor for {n}");
        }
    }
}
