//! Observation: what the agent knows about the world before it plans.

use std::collections::BTreeSet;

use crate::market::{AgentProfile, BudgetStatus, Question, SimilarQuestion};
use crate::tools::schema::{ListArgs, QuestionRef, SearchArgs};
use crate::tools::{invoke_as, ToolCall, ToolInvoker, ToolResult};

const GENERAL_TOPIC: &str = "general";
const MAX_TOPICS: usize = 6;

/// Title keywords mapped to topic labels.
const KEYWORD_TOPICS: &[(&str, &str)] = &[
    ("rust", "rust"),
    ("cargo", "rust"),
    ("tokio", "rust"),
    ("python", "python"),
    ("pandas", "python"),
    ("django", "python"),
    ("javascript", "javascript"),
    ("typescript", "javascript"),
    ("node", "javascript"),
    ("react", "javascript"),
    ("sql", "databases"),
    ("postgres", "databases"),
    ("database", "databases"),
    ("index", "databases"),
    ("docker", "devops"),
    ("kubernetes", "devops"),
    ("deploy", "devops"),
    ("linux", "devops"),
    ("solidity", "web3"),
    ("ethereum", "web3"),
    ("wallet", "web3"),
    ("token", "web3"),
    ("security", "security"),
    ("auth", "security"),
    ("encryption", "security"),
    ("model", "ml"),
    ("llm", "ml"),
    ("training", "ml"),
    ("neural", "ml"),
    ("tax", "finance"),
    ("invest", "finance"),
    ("budget", "finance"),
];

/// Lower-cased tags plus keyword hits on the title; `general` when nothing matches.
pub fn infer_topics(question: &Question) -> Vec<String> {
    let mut topics: BTreeSet<String> = question
        .tags
        .iter()
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect();

    let title = question.title.to_lowercase();
    for word in title.split(|c: char| !c.is_alphanumeric()) {
        if word.is_empty() {
            continue;
        }
        for (keyword, topic) in KEYWORD_TOPICS {
            if word.starts_with(keyword) {
                topics.insert((*topic).to_string());
            }
        }
    }

    if topics.is_empty() {
        return vec![GENERAL_TOPIC.to_string()];
    }
    topics.into_iter().take(MAX_TOPICS).collect()
}

/// Fraction of `topics` found in `domains`; 1.0 when no domains are declared.
pub fn domain_alignment(topics: &[String], domains: &[String]) -> f64 {
    if domains.is_empty() {
        return 1.0;
    }
    if topics.is_empty() {
        return 0.0;
    }
    let hits = topics.iter().filter(|t| domains.contains(t)).count();
    hits as f64 / topics.len() as f64
}

/// Per-cycle view of the agent's standing.
#[derive(Debug, Clone)]
pub struct CycleSnapshot {
    pub profile: AgentProfile,
    pub budget: BudgetStatus,
    pub open_questions: Vec<Question>,
}

pub async fn snapshot(tools: &dyn ToolInvoker, limit: u32) -> ToolResult<CycleSnapshot> {
    let profile: AgentProfile = invoke_as(tools, &ToolCall::GetAgentProfile).await?;
    let budget: BudgetStatus = invoke_as(tools, &ToolCall::GetBudgetStatus).await?;
    let open_questions: Vec<Question> =
        invoke_as(tools, &ToolCall::ListOpenQuestions(ListArgs { limit })).await?;
    Ok(CycleSnapshot {
        profile,
        budget,
        open_questions,
    })
}

pub async fn fetch_question(tools: &dyn ToolInvoker, question_id: &str) -> ToolResult<Question> {
    invoke_as(
        tools,
        &ToolCall::GetQuestion(QuestionRef {
            question_id: question_id.to_string(),
        }),
    )
    .await
}

/// Similar past questions; failures degrade to an empty list.
pub async fn similar_questions(tools: &dyn ToolInvoker, question: &Question, limit: u32) -> Vec<SimilarQuestion> {
    let call = ToolCall::SearchSimilarQuestions(SearchArgs {
        query: question.title.clone(),
        limit,
    });
    match invoke_as::<Vec<SimilarQuestion>>(tools, &call).await {
        Ok(found) => found.into_iter().filter(|s| s.id != question.id).collect(),
        Err(e) => {
            tracing::debug!(target: "agent.observe", question_id = %question.id, error = %e, "Similar-question search failed");
            Vec::new()
        }
    }
}

/// Everything the planner sees about one question.
#[derive(Debug, Clone)]
pub struct QuestionContext {
    pub question: Question,
    pub topics: Vec<String>,
    pub topic_prior: f64,
    pub domain_alignment: f64,
    pub similar: Vec<SimilarQuestion>,
}
