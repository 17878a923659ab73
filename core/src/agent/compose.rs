//! Answer composition under a hard character budget.

use thiserror::Error;

use super::decision::Plan;
use super::observe::QuestionContext;
use super::prompt::compose_prompt;
use crate::llm::{LlmBackend, LlmError, TokenBudget};
use crate::research::EvidenceBundle;

pub const DEFAULT_CHAR_BUDGET: usize = 1800;
const ELLIPSIS: char = '…';

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ComposeError {
    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error("composition was empty")]
    Empty,
}

/// Fit `text` into `budget` characters.
///
/// Prefers the last sentence end (`.`, `!` or `?` followed by whitespace)
/// when it falls within the final 40% of the budget; otherwise hard-cuts and
/// appends `…`, keeping the total within budget.
pub fn truncate_answer(text: &str, budget: usize) -> String {
    let text = text.trim();
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= budget {
        return text.to_string();
    }
    if budget == 0 {
        return String::new();
    }

    let min_cut = (budget as f64 * 0.6).ceil() as usize;
    let boundary = (0..budget)
        .rev()
        .find(|&i| matches!(chars[i], '.' | '!' | '?') && chars.get(i + 1).is_some_and(|c| c.is_whitespace()));
    if let Some(i) = boundary {
        if i + 1 >= min_cut {
            return chars[..=i].iter().collect();
        }
    }

    let mut cut: String = chars[..budget - 1].iter().collect::<String>().trim_end().to_string();
    cut.push(ELLIPSIS);
    cut
}

pub async fn compose_answer(
    llm: &dyn LlmBackend,
    ctx: &QuestionContext,
    plan: &Plan,
    evidence: &EvidenceBundle,
    char_budget: usize,
) -> Result<String, ComposeError> {
    let bundle = compose_prompt(ctx, plan, evidence, char_budget);
    let budget = TokenBudget {
        max_input_tokens: 3072,
        // ~4 chars per token plus headroom for the model overshooting
        max_output_tokens: (char_budget / 3).max(64),
    };
    let resp = llm.generate(&bundle, Some(budget)).await?;
    let answer = truncate_answer(&resp.text, char_budget);
    if answer.is_empty() {
        return Err(ComposeError::Empty);
    }
    Ok(answer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_text_untouched() {
        assert_eq!(truncate_answer("  Use a Mutex.  ", 100), "Use a Mutex.");
    }

    #[test]
    fn test_cut_at_late_sentence_boundary() {
        let text = "First sentence here. Second sentence is longer and keeps going on.";
        // budget 30: boundary after "here." at index 19 (20 chars) >= 18
        let out = truncate_answer(text, 30);
        assert_eq!(out, "First sentence here.");
    }

    #[test]
    fn test_hard_cut_when_boundary_too_early() {
        let text = "Hi. then a very long run of words without any sentence end at all";
        let out = truncate_answer(text, 30);
        assert!(out.ends_with('…'));
        assert!(out.chars().count() <= 30);
    }

    #[test]
    fn test_multibyte_safe() {
        let text = "ééééééééééééééééééééééééééééééééééééé";
        let out = truncate_answer(text, 10);
        assert_eq!(out.chars().count(), 10);
    }
}
