//! Gated web research: search, polite fetching, text extraction and an LLM
//! summary with per-claim sources.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use scraper::{Html, Selector};
use serde::Deserialize;
use tracing::{debug, warn};

use super::robots::RobotsCache;
use super::{Claim, Evidence, EvidenceProvider, ResearchConfig, ResearchError};
use crate::agent::decision::{extract_json, ParseDecision, ParseError};
use crate::llm::{LlmBackend, PromptBundle, TokenBudget};
use crate::market::Question;

const MAX_DOC_CHARS: usize = 6_000;
/// Redirect hops followed per candidate page.
const MAX_REDIRECTS: usize = 3;

/// Host allow/deny lists, matched by domain suffix. Deny wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostPolicy {
    allow: Vec<String>,
    deny: Vec<String>,
}

fn suffix_match(host: &str, pattern: &str) -> bool {
    host == pattern || host.ends_with(&format!(".{pattern}"))
}

impl HostPolicy {
    pub fn new(allow: &[String], deny: &[String]) -> Self {
        let norm = |v: &[String]| -> Vec<String> {
            v.iter()
                .map(|s| s.trim().trim_start_matches('.').to_ascii_lowercase())
                .filter(|s| !s.is_empty())
                .collect()
        };
        Self {
            allow: norm(allow),
            deny: norm(deny),
        }
    }

    pub fn permits(&self, url: &Url) -> bool {
        if !matches!(url.scheme(), "http" | "https") {
            return false;
        }
        let Some(host) = url.host_str().map(|h| h.to_ascii_lowercase()) else {
            return false;
        };
        if self.deny.iter().any(|d| suffix_match(&host, d)) {
            return false;
        }
        self.allow.is_empty() || self.allow.iter().any(|a| suffix_match(&host, a))
    }
}

pub fn content_type_allowed(content_type: &str) -> bool {
    let ct = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();
    ct == "text/html" || ct == "text/plain" || ct.ends_with("xml") || ct.ends_with("json")
}

/// Read at most `cap` bytes of a body, dropping the rest.
pub async fn read_capped(mut resp: reqwest::Response, cap: usize) -> Result<Vec<u8>, reqwest::Error> {
    let mut buf = Vec::new();
    while let Some(chunk) = resp.chunk().await? {
        let room = cap.saturating_sub(buf.len());
        if chunk.len() >= room {
            buf.extend_from_slice(&chunk[..room]);
            break;
        }
        buf.extend_from_slice(&chunk);
    }
    Ok(buf)
}

/// Visible text from content-bearing elements, in document order.
pub fn html_to_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let Ok(selector) = Selector::parse("title, h1, h2, h3, h4, p, li, pre, blockquote, td") else {
        return String::new();
    };
    let mut out = String::new();
    for el in document.select(&selector) {
        let text = el.text().collect::<Vec<_>>().join(" ");
        let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
        if text.is_empty() {
            continue;
        }
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(&text);
    }
    out
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub snippet: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BraveSearchResponse {
    web: Option<BraveWebResults>,
}

#[derive(Debug, Deserialize)]
struct BraveWebResults {
    results: Vec<BraveWebResult>,
}

#[derive(Debug, Deserialize)]
struct BraveWebResult {
    title: String,
    url: String,
    description: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DuckDuckGoResponse {
    #[serde(default)]
    heading: String,
    #[serde(default)]
    abstract_text: String,
    #[serde(default, rename = "AbstractURL")]
    abstract_url: String,
    #[serde(default)]
    related_topics: Vec<DuckDuckGoTopic>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DuckDuckGoTopic {
    #[serde(default, rename = "FirstURL")]
    first_url: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    topics: Vec<DuckDuckGoTopic>,
}

fn flatten_ddg(topics: Vec<DuckDuckGoTopic>, out: &mut Vec<SearchHit>) {
    for t in topics {
        if let (Some(url), Some(text)) = (t.first_url, t.text) {
            out.push(SearchHit {
                title: text.clone(),
                url,
                snippet: Some(text),
            });
        }
        flatten_ddg(t.topics, out);
    }
}

/// Summarizer output.
#[derive(Debug, Clone, PartialEq)]
pub struct ResearchSummary {
    pub summary: String,
    pub claims: Vec<Claim>,
    pub uncertainty: f64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSummary {
    summary: String,
    #[serde(default)]
    claims: Vec<Claim>,
    #[serde(default = "default_uncertainty")]
    uncertainty: f64,
}

fn default_uncertainty() -> f64 {
    0.5
}

impl ParseDecision for ResearchSummary {
    fn parse_decision(raw: &str) -> Result<Self, ParseError> {
        let json = extract_json(raw).ok_or(ParseError::NoJson)?;
        let r: RawSummary = serde_json::from_str(json).map_err(|e| ParseError::Json(e.to_string()))?;
        if !(0.0..=1.0).contains(&r.uncertainty) {
            return Err(ParseError::InvalidField {
                field: "uncertainty",
                reason: format!("{} outside [0, 1]", r.uncertainty),
            });
        }
        Ok(ResearchSummary {
            summary: r.summary.trim().to_string(),
            claims: r.claims,
            uncertainty: r.uncertainty,
        })
    }
}

struct FetchedDoc {
    url: String,
    text: String,
}

pub struct WebResearchProvider {
    cfg: ResearchConfig,
    http: reqwest::Client,
    robots: RobotsCache,
    policy: HostPolicy,
    llm: Arc<dyn LlmBackend>,
}

impl WebResearchProvider {
    pub fn new(cfg: ResearchConfig, llm: Arc<dyn LlmBackend>) -> Result<Self, ResearchError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(cfg.fetch_timeout_ms))
            .user_agent(cfg.user_agent.clone())
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| ResearchError::Search(format!("Failed to build HTTP client: {e}")))?;
        let robots = RobotsCache::new(
            http.clone(),
            cfg.user_agent.clone(),
            Duration::from_secs(cfg.robots_ttl_secs),
        );
        let policy = HostPolicy::new(&cfg.allow_hosts, &cfg.deny_hosts);
        Ok(Self {
            cfg,
            http,
            robots,
            policy,
            llm,
        })
    }

    async fn search(&self, query: &str) -> Result<Vec<SearchHit>, ResearchError> {
        match &self.cfg.brave_api_key {
            Some(key) => self.search_brave(query, key).await,
            None => self.search_duckduckgo(query).await,
        }
    }

    async fn search_brave(&self, query: &str, api_key: &str) -> Result<Vec<SearchHit>, ResearchError> {
        debug!(target: "research", query = %query, "Brave search");
        let url = format!("{}?q={}&count=5", self.cfg.brave_url, urlencoding::encode(query));
        let resp = self
            .http
            .get(&url)
            .header("Accept", "application/json")
            .header("X-Subscription-Token", api_key)
            .send()
            .await
            .map_err(|e| ResearchError::Search(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(ResearchError::Search(format!("Brave Search API error: {}", resp.status())));
        }
        let data: BraveSearchResponse = resp
            .json()
            .await
            .map_err(|e| ResearchError::Search(format!("Failed to parse search response: {e}")))?;
        Ok(data
            .web
            .map(|web| {
                web.results
                    .into_iter()
                    .map(|r| SearchHit {
                        title: r.title,
                        url: r.url,
                        snippet: r.description,
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn search_duckduckgo(&self, query: &str) -> Result<Vec<SearchHit>, ResearchError> {
        debug!(target: "research", query = %query, "DuckDuckGo instant answer");
        let url = format!(
            "{}/?q={}&format=json&no_html=1&skip_disambig=1",
            self.cfg.duckduckgo_url.trim_end_matches('/'),
            urlencoding::encode(query)
        );
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| ResearchError::Search(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(ResearchError::Search(format!("DuckDuckGo error: {}", resp.status())));
        }
        let bytes = read_capped(resp, self.cfg.max_response_bytes)
            .await
            .map_err(|e| ResearchError::Search(e.to_string()))?;
        let data: DuckDuckGoResponse =
            serde_json::from_slice(&bytes).map_err(|e| ResearchError::Search(format!("Failed to parse DuckDuckGo response: {e}")))?;

        let mut hits = Vec::new();
        if !data.abstract_url.is_empty() {
            hits.push(SearchHit {
                title: data.heading,
                url: data.abstract_url,
                snippet: (!data.abstract_text.is_empty()).then_some(data.abstract_text),
            });
        }
        flatten_ddg(data.related_topics, &mut hits);
        Ok(hits)
    }

    /// Fetch one page, following redirects by hand so every hop passes the
    /// host policy and robots.txt. Each request spends one unit of `budget`.
    async fn fetch(&self, url: &Url, budget: &mut usize) -> Result<FetchedDoc, ResearchError> {
        let fail = |reason: String| ResearchError::Fetch {
            url: url.to_string(),
            reason,
        };
        let mut current = url.clone();
        for _ in 0..=MAX_REDIRECTS {
            if *budget == 0 {
                return Err(fail("fetch budget spent".to_string()));
            }
            *budget -= 1;
            let resp = self.http.get(current.clone()).send().await.map_err(|e| fail(e.to_string()))?;
            let status = resp.status();
            if status.is_redirection() {
                let next = resp
                    .headers()
                    .get(reqwest::header::LOCATION)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|loc| current.join(loc).ok())
                    .ok_or_else(|| fail(format!("status {status} without a usable Location")))?;
                if !self.policy.permits(&next) {
                    return Err(fail(format!("redirect to {next} not permitted by host policy")));
                }
                if !self.robots.allowed(&next).await {
                    return Err(fail(format!("redirect to {next} blocked by robots.txt")));
                }
                debug!(target: "research", from = %current, to = %next, "Following redirect");
                current = next;
                continue;
            }
            if !status.is_success() {
                return Err(fail(format!("status {status}")));
            }
            return self.read_doc(current, resp).await.map_err(fail);
        }
        Err(fail(format!("more than {MAX_REDIRECTS} redirects")))
    }

    async fn read_doc(&self, url: Url, resp: reqwest::Response) -> Result<FetchedDoc, String> {
        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        if !content_type_allowed(&content_type) {
            return Err(format!("content type {content_type:?} not allowed"));
        }
        let bytes = read_capped(resp, self.cfg.max_response_bytes)
            .await
            .map_err(|e| e.to_string())?;
        let body = String::from_utf8_lossy(&bytes);
        let text = if content_type.contains("html") {
            html_to_text(&body)
        } else {
            body.into_owned()
        };
        Ok(FetchedDoc {
            url: url.to_string(),
            text: text.chars().take(MAX_DOC_CHARS).collect(),
        })
    }

    async fn summarize(&self, question: &Question, docs: &[FetchedDoc]) -> Result<ResearchSummary, ResearchError> {
        let bundle = PromptBundle {
            system: "You extract verifiable facts from documents. Never invent sources.".to_string(),
            instructions: format!(
                "Question: {}\nSummarize what the documents say that helps answer it. Reply with JSON only: {{\"summary\":\"...\",\"claims\":[{{\"text\":\"...\",\"sourceUrl\":\"...\"}}],\"uncertainty\":0.0-1.0}}",
                question.title
            ),
            context_docs: docs.iter().map(|d| format!("<{}>\n{}", d.url, d.text)).collect(),
            history: Vec::new(),
        };
        let budget = TokenBudget {
            max_input_tokens: 6_000,
            max_output_tokens: 600,
        };
        let resp = self
            .llm
            .generate(&bundle, Some(budget))
            .await
            .map_err(|e| ResearchError::Summarize(e.to_string()))?;
        let mut summary = ResearchSummary::parse_decision(&resp.text).map_err(|e| ResearchError::Summarize(e.to_string()))?;
        // claims must cite a document that was actually fetched
        let fetched: HashSet<&str> = docs.iter().map(|d| d.url.as_str()).collect();
        summary.claims.retain(|c| fetched.contains(c.source_url.as_str()));
        Ok(summary)
    }
}

#[async_trait]
impl EvidenceProvider for WebResearchProvider {
    fn name(&self) -> &str {
        "web"
    }

    async fn gather(&self, question: &Question, queries: &[String]) -> Result<Option<Evidence>, ResearchError> {
        if !self.cfg.web_enabled {
            return Ok(None);
        }
        let fallback = [question.title.clone()];
        let queries = if queries.is_empty() { &fallback[..] } else { queries };

        let mut candidates: Vec<Url> = Vec::new();
        let mut seen = HashSet::new();
        for query in queries.iter().take(self.cfg.max_queries) {
            let hits = match self.search(query).await {
                Ok(h) => h,
                Err(e) => {
                    warn!(target: "research", query = %query, error = %e, "Search failed");
                    continue;
                }
            };
            for hit in hits {
                let Ok(url) = Url::parse(&hit.url) else {
                    continue;
                };
                if self.policy.permits(&url) && seen.insert(url.to_string()) {
                    candidates.push(url);
                }
            }
        }

        let mut docs = Vec::new();
        let mut budget = self.cfg.max_fetches;
        for url in candidates {
            if budget == 0 {
                break;
            }
            if !self.robots.allowed(&url).await {
                debug!(target: "research", url = %url, "Blocked by robots.txt");
                continue;
            }
            match self.fetch(&url, &mut budget).await {
                Ok(doc) if !doc.text.trim().is_empty() => docs.push(doc),
                Ok(_) => {}
                Err(e) => debug!(target: "research", error = %e, "Fetch skipped"),
            }
        }
        if docs.is_empty() {
            return Ok(None);
        }

        let summary = self.summarize(question, &docs).await?;
        if summary.summary.is_empty() {
            return Ok(None);
        }
        Ok(Some(Evidence {
            provider: self.name().to_string(),
            summary: summary.summary,
            claims: summary.claims,
            uncertainty: summary.uncertainty,
        }))
    }
}
