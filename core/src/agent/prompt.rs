//! Prompt construction for the planner, critic, composer, discovery and
//! reaction calls.

use std::fmt::Write as _;

use super::decision::Plan;
use super::observe::QuestionContext;
use super::persona::Persona;
use crate::llm::PromptBundle;
use crate::market::{BudgetStatus, Wiki};
use crate::research::EvidenceBundle;

const PLAN_SCHEMA: &str = r#"{"action":"answer|abstain","confidence":0.0-1.0,"expectedValue":-1.0-1.0,"bidAmountCents":int,"vote":"up|down|none","joinWikiIds":[],"researchQueries":[],"reason":"...","riskFlags":[]}"#;
const CRITIQUE_SCHEMA: &str = r#"{"approve":bool,"adjustedAction":"answer|abstain|null","adjustedBidAmountCents":int|null,"adjustedVote":"up|down|none|null","confidenceAdjustment":-0.5-0.5,"issues":[]}"#;

fn question_block(ctx: &QuestionContext) -> String {
    let q = &ctx.question;
    let mut s = String::new();
    let _ = writeln!(s, "Question {}: {}", q.id, q.title);
    if !q.body.is_empty() {
        let _ = writeln!(s, "{}", q.body);
    }
    let _ = writeln!(
        s,
        "Bounty: {}c; required bid: {}c; existing answers: {}",
        q.bounty_cents, q.required_bid_cents, q.answer_count
    );
    let _ = writeln!(s, "Topics: {}", ctx.topics.join(", "));
    let _ = writeln!(
        s,
        "Topic prior: {:+.2}; domain alignment: {:.2}",
        ctx.topic_prior, ctx.domain_alignment
    );
    s
}

pub fn planner_prompt(persona: &Persona, ctx: &QuestionContext, budget: &BudgetStatus) -> PromptBundle {
    let mut instructions = question_block(ctx);
    let _ = writeln!(
        instructions,
        "Budget: {}c left today, max {}c per answer.",
        budget.remaining_cents(),
        budget.max_bid_per_action_cents
    );
    let _ = write!(
        instructions,
        "Decide whether to answer. Reply with one JSON object only:\n{PLAN_SCHEMA}"
    );

    let context_docs = ctx
        .similar
        .iter()
        .map(|s| match &s.answer_excerpt {
            Some(excerpt) => format!("Similar question \"{}\": {}", s.title, excerpt),
            None => format!("Similar question \"{}\"", s.title),
        })
        .collect();

    PromptBundle {
        system: format!(
            "{} You stake real money on every answer, so abstain unless you can add real value. Domains: {}.",
            persona.description,
            if persona.domains.is_empty() {
                "any".to_string()
            } else {
                persona.domains.join(", ")
            }
        ),
        instructions,
        context_docs,
        history: Vec::new(),
    }
}

pub fn critic_prompt(ctx: &QuestionContext, plan: &Plan) -> PromptBundle {
    let mut instructions = question_block(ctx);
    let _ = writeln!(
        instructions,
        "Proposed plan: action={:?} confidence={:.2} expectedValue={:.2} bid={}c vote={:?}",
        plan.action, plan.confidence, plan.expected_value, plan.bid_amount_cents, plan.vote
    );
    if !plan.reason.is_empty() {
        let _ = writeln!(instructions, "Planner rationale: {}", plan.reason);
    }
    if !plan.risk_flags.is_empty() {
        let _ = writeln!(instructions, "Risk flags: {}", plan.risk_flags.join("; "));
    }
    let _ = write!(
        instructions,
        "Review the plan skeptically. Reply with one JSON object only:\n{CRITIQUE_SCHEMA}"
    );
    PromptBundle {
        system: "You are an independent reviewer guarding a paid answering agent against overconfidence and wasted bids.".to_string(),
        instructions,
        context_docs: Vec::new(),
        history: Vec::new(),
    }
}

pub fn compose_prompt(ctx: &QuestionContext, plan: &Plan, evidence: &EvidenceBundle, char_budget: usize) -> PromptBundle {
    let q = &ctx.question;
    let mut instructions = format!("Question: {}\n", q.title);
    if !q.body.is_empty() {
        let _ = writeln!(instructions, "{}", q.body);
    }
    if !plan.reason.is_empty() {
        let _ = writeln!(instructions, "Your plan: {}", plan.reason);
    }
    let _ = write!(
        instructions,
        "Write the answer directly, in plain prose, under {char_budget} characters. Cite sources inline when you rely on evidence."
    );
    PromptBundle {
        system: "You write precise, self-contained answers for a paid Q&A marketplace.".to_string(),
        instructions,
        context_docs: evidence.context_docs(),
        history: Vec::new(),
    }
}

pub fn discovery_prompt(persona: &Persona, candidates: &[Wiki], member_of: &[Wiki], max_joins: usize) -> PromptBundle {
    let mut instructions = String::from("Candidate wikis:\n");
    for w in candidates {
        let _ = writeln!(
            instructions,
            "- {} \"{}\" topics=[{}] members={}: {}",
            w.id,
            w.name,
            w.topics.join(", "),
            w.member_count,
            w.description
        );
    }
    if !member_of.is_empty() {
        let names: Vec<&str> = member_of.iter().map(|w| w.name.as_str()).collect();
        let _ = writeln!(instructions, "Already a member of: {}", names.join(", "));
    }
    let _ = write!(
        instructions,
        "Pick at most {max_joins} wikis worth joining. Reply with JSON only: {{\"joinWikiIds\":[],\"reason\":\"...\"}}"
    );
    PromptBundle {
        system: format!("{} You join communities that match your expertise.", persona.description),
        instructions,
        context_docs: Vec::new(),
        history: Vec::new(),
    }
}

pub fn reaction_prompt(persona: &Persona, kind: &str, title: &str, body: &str) -> PromptBundle {
    PromptBundle {
        system: format!("{} You occasionally react to posts you have an informed opinion on.", persona.description),
        instructions: format!(
            "A new {kind} appeared.\nTitle: {title}\n{body}\nShould you like it, dislike it, or do nothing? Reply with JSON only: {{\"vote\":\"up|down|none\",\"confidence\":0.0-1.0,\"reason\":\"...\"}}"
        ),
        context_docs: Vec::new(),
        history: Vec::new(),
    }
}
