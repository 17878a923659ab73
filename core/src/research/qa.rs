use std::sync::Arc;

use async_trait::async_trait;

use super::{Evidence, EvidenceProvider, ResearchError};
use crate::market::{Question, SimilarQuestion};
use crate::tools::schema::SearchArgs;
use crate::tools::{invoke_as, ToolCall, ToolInvoker};

/// Evidence from previously answered marketplace questions.
pub struct QaSearchProvider {
    tools: Arc<dyn ToolInvoker>,
    limit: u32,
    max_queries: usize,
}

impl QaSearchProvider {
    pub fn new(tools: Arc<dyn ToolInvoker>, limit: u32, max_queries: usize) -> Self {
        Self {
            tools,
            limit,
            max_queries,
        }
    }
}

#[async_trait]
impl EvidenceProvider for QaSearchProvider {
    fn name(&self) -> &str {
        "marketplace_qa"
    }

    async fn gather(&self, question: &Question, queries: &[String]) -> Result<Option<Evidence>, ResearchError> {
        let mut hits: Vec<SimilarQuestion> = Vec::new();
        let searches = std::iter::once(question.title.as_str())
            .chain(queries.iter().map(String::as_str))
            .take(self.max_queries.max(1));
        for query in searches {
            let call = ToolCall::SearchSimilarQuestions(SearchArgs {
                query: query.to_string(),
                limit: self.limit,
            });
            let found: Vec<SimilarQuestion> = invoke_as(self.tools.as_ref(), &call)
                .await
                .map_err(|e| ResearchError::Search(e.to_string()))?;
            for s in found {
                if s.id != question.id && s.answer_excerpt.is_some() && !hits.iter().any(|h| h.id == s.id) {
                    hits.push(s);
                }
            }
        }
        if hits.is_empty() {
            return Ok(None);
        }

        let summary = hits
            .iter()
            .filter_map(|h| h.answer_excerpt.as_ref().map(|a| format!("\"{}\": {}", h.title, a)))
            .collect::<Vec<_>>()
            .join(" | ");
        let best = hits.iter().filter_map(|h| h.score).fold(0.0_f64, f64::max);
        Ok(Some(Evidence {
            provider: self.name().to_string(),
            summary,
            claims: Vec::new(),
            uncertainty: (1.0 - best).clamp(0.0, 1.0),
        }))
    }
}
