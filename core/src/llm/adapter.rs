use serde_json::{json, Value};

use super::{PromptBundle, TokenBudget};

/// Rough chars-per-token used to size prompts without a tokenizer.
const CHARS_PER_TOKEN: usize = 4;

/// A prompt rendered for both wire formats.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedPrompt {
    /// Chat Completions `messages`.
    pub messages: Vec<Value>,
    /// Single text input for the Responses API.
    pub input: String,
}

fn evidence_block(docs: &[String]) -> String {
    if docs.is_empty() {
        return String::new();
    }
    let mut block = String::from("Evidence:\n");
    for doc in docs {
        block.push_str("- ");
        block.push_str(doc);
        block.push('\n');
    }
    block
}

fn char_len(parts: &[&str]) -> usize {
    parts.iter().map(|p| p.chars().count()).sum()
}

/// Fit a bundle into the input budget and render it.
///
/// Oldest history goes first, then the lowest-ranked evidence (docs are
/// ordered best-first), and only then are the instructions cut.
pub fn render_prompt(bundle: &PromptBundle, budget: TokenBudget) -> RenderedPrompt {
    let limit = budget.max_input_tokens.saturating_mul(CHARS_PER_TOKEN);
    let system = bundle.system.as_str();
    let mut history: &[String] = &bundle.history;
    let mut docs: &[String] = &bundle.context_docs;

    let size = |history: &[String], docs: &[String]| {
        char_len(&[system, &bundle.instructions, &evidence_block(docs)])
            + history.iter().map(|h| h.chars().count()).sum::<usize>()
    };

    while size(history, docs) > limit && !history.is_empty() {
        history = &history[1..];
    }
    while size(history, docs) > limit && !docs.is_empty() {
        docs = &docs[..docs.len() - 1];
    }
    let evidence = evidence_block(docs);
    let instructions: String = if size(history, docs) > limit {
        let room = limit.saturating_sub(char_len(&[system, &evidence]));
        bundle.instructions.chars().take(room).collect()
    } else {
        bundle.instructions.clone()
    };

    let mut messages = Vec::new();
    let mut input = String::new();
    if !system.is_empty() {
        messages.push(json!({"role": "system", "content": system}));
        input.push_str("System:\n");
        input.push_str(system);
        input.push_str("\n\n");
    }
    if !evidence.is_empty() {
        messages.push(json!({"role": "system", "content": evidence}));
        input.push_str(&evidence);
        input.push('\n');
    }
    if !history.is_empty() {
        input.push_str("History:\n");
        for h in history {
            messages.push(json!({"role": "user", "content": h}));
            input.push_str("- ");
            input.push_str(h);
            input.push('\n');
        }
        input.push('\n');
    }
    if !instructions.is_empty() {
        input.push_str("User:\n");
        input.push_str(&instructions);
        input.push('\n');
        messages.push(json!({"role": "user", "content": instructions}));
    }

    RenderedPrompt { messages, input }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn budget(tokens: usize) -> TokenBudget {
        TokenBudget {
            max_input_tokens: tokens,
            max_output_tokens: 16,
        }
    }

    #[test]
    fn test_oldest_history_dropped_first() {
        let bundle = PromptBundle {
            system: "sys".into(),
            instructions: "question".into(),
            context_docs: vec!["evidence".into()],
            history: vec!["a".repeat(40), "recent".into()],
        };
        let out = render_prompt(&bundle, budget(10));
        assert!(!out.input.contains(&"a".repeat(40)));
        assert!(out.input.contains("recent"));
        assert!(out.input.contains("evidence"));
        assert_eq!(out.messages.last().unwrap()["content"], "question");
    }

    #[test]
    fn test_weakest_evidence_dropped_before_instructions() {
        let bundle = PromptBundle {
            system: "sys".into(),
            instructions: "explain the borrow error".into(),
            context_docs: vec!["best source".into(), "x".repeat(80)],
            history: vec![],
        };
        let out = render_prompt(&bundle, budget(16));
        assert!(out.input.contains("best source"));
        assert!(!out.input.contains(&"x".repeat(80)));
        assert!(out.input.contains("explain the borrow error"));
    }

    #[test]
    fn test_instructions_cut_on_char_boundary() {
        let bundle = PromptBundle {
            system: String::new(),
            instructions: "é".repeat(100),
            ..Default::default()
        };
        let out = render_prompt(&bundle, budget(5));
        let content = out.messages[0]["content"].as_str().unwrap();
        assert_eq!(content.chars().count(), 20);
        assert_eq!(out.messages.len(), 1);
    }
}
