//! Discovery pulse: occasionally decide whether to join more topic wikis.

use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::decision::{DiscoveryPlan, ParseDecision};
use super::persona::Persona;
use super::prompt::discovery_prompt;
use crate::llm::LlmBackend;
use crate::market::Wiki;
use crate::tools::schema::{JoinWikiArgs, ListArgs};
use crate::tools::{invoke_as, ToolCall, ToolInvoker};
use crate::Result;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    pub enabled: bool,
    /// Minimum time between timer-driven pulses
    pub interval_secs: u64,
    /// Minimum time since the last pulse before a wiki event may trigger one
    pub event_min_gap_secs: u64,
    pub max_joins_per_pulse: usize,
    pub candidate_limit: u32,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            enabled: std::env::var("AGORA_DISCOVERY_ENABLED")
                .map(|v| v != "0" && !v.eq_ignore_ascii_case("false"))
                .unwrap_or(true),
            interval_secs: 30 * 60,
            event_min_gap_secs: 5 * 60,
            max_joins_per_pulse: 2,
            candidate_limit: 20,
        }
    }
}

/// Why a pulse is being considered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PulseTrigger {
    Timer,
    WikiEvent,
}

#[derive(Debug, Default)]
pub struct DiscoveryPulse {
    last_pulse_at: Option<DateTime<Utc>>,
}

impl DiscoveryPulse {
    pub fn last_pulse_at(&self) -> Option<DateTime<Utc>> {
        self.last_pulse_at
    }

    pub fn is_due(&self, cfg: &DiscoveryConfig, trigger: PulseTrigger, now: DateTime<Utc>) -> bool {
        if !cfg.enabled {
            return false;
        }
        let Some(last) = self.last_pulse_at else {
            return true;
        };
        let gap = match trigger {
            PulseTrigger::Timer => cfg.interval_secs,
            PulseTrigger::WikiEvent => cfg.event_min_gap_secs,
        };
        now - last >= Duration::seconds(gap as i64)
    }

    /// Run one pulse. Returns the ids of wikis joined.
    pub async fn run(
        &mut self,
        cfg: &DiscoveryConfig,
        agent_id: &str,
        persona: &Persona,
        llm: &dyn LlmBackend,
        tools: &dyn ToolInvoker,
        now: DateTime<Utc>,
    ) -> Result<Vec<String>> {
        // counts as a pulse even if it fails, so a broken endpoint is not hammered
        self.last_pulse_at = Some(now);

        let candidates: Vec<Wiki> = invoke_as(
            tools,
            &ToolCall::ListDiscoveryCandidates(ListArgs {
                limit: cfg.candidate_limit,
            }),
        )
        .await?;
        let member_of: Vec<Wiki> = invoke_as(tools, &ToolCall::ListAgentWikis).await?;

        let members: HashSet<&str> = member_of.iter().map(|w| w.id.as_str()).collect();
        let open: Vec<Wiki> = candidates
            .into_iter()
            .filter(|w| !members.contains(w.id.as_str()))
            .collect();
        if open.is_empty() {
            debug!(target: "agent.discovery", "No joinable wikis");
            return Ok(Vec::new());
        }

        let bundle = discovery_prompt(persona, &open, &member_of, cfg.max_joins_per_pulse);
        let resp = llm.generate(&bundle, None).await?;
        let plan = match DiscoveryPlan::parse_decision(&resp.text) {
            Ok(p) => p,
            Err(e) => {
                warn!(target: "agent.discovery", error = %e, "Unparseable discovery plan; joining nothing");
                return Ok(Vec::new());
            }
        };

        let chosen = constrain(&plan, &open, cfg.max_joins_per_pulse);
        let mut joined = Vec::new();
        for wiki_id in chosen {
            let call = ToolCall::JoinWiki(JoinWikiArgs {
                wiki_id: wiki_id.clone(),
                idempotency_key: Some(format!("join-{agent_id}-{wiki_id}")),
            });
            match tools.invoke(&call).await {
                Ok(_) => {
                    info!(target: "agent.discovery", wiki_id = %wiki_id, reason = %plan.reason, "Joined wiki");
                    joined.push(wiki_id);
                }
                Err(e) => warn!(target: "agent.discovery", wiki_id = %wiki_id, error = %e, "join_wiki failed"),
            }
        }
        Ok(joined)
    }
}

/// Keep only known, non-member candidates, deduplicated, at most `max_joins`.
pub fn constrain(plan: &DiscoveryPlan, open: &[Wiki], max_joins: usize) -> Vec<String> {
    let known: HashSet<&str> = open.iter().map(|w| w.id.as_str()).collect();
    let mut seen = HashSet::new();
    plan.join_wiki_ids
        .iter()
        .filter(|id| known.contains(id.as_str()))
        .filter(|id| seen.insert(id.as_str()))
        .take(max_joins)
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn wiki(id: &str) -> Wiki {
        Wiki {
            id: id.into(),
            name: id.into(),
            description: String::new(),
            topics: vec![],
            member_count: 0,
        }
    }

    #[test]
    fn test_constrain_filters_and_caps() {
        let plan = DiscoveryPlan {
            join_wiki_ids: vec!["w1".into(), "ghost".into(), "w1".into(), "w2".into(), "w3".into()],
            reason: String::new(),
        };
        let open = vec![wiki("w1"), wiki("w2"), wiki("w3")];
        assert_eq!(constrain(&plan, &open, 2), vec!["w1", "w2"]);
    }

    #[test]
    fn test_pulse_gating() {
        let cfg = DiscoveryConfig {
            enabled: true,
            ..DiscoveryConfig::default()
        };
        let t = Utc.with_ymd_and_hms(2026, 10, 18, 8, 0, 0).unwrap();
        let mut pulse = DiscoveryPulse::default();
        assert!(pulse.is_due(&cfg, PulseTrigger::Timer, t));
        pulse.last_pulse_at = Some(t);
        let later = t + Duration::minutes(6);
        assert!(!pulse.is_due(&cfg, PulseTrigger::Timer, later));
        assert!(pulse.is_due(&cfg, PulseTrigger::WikiEvent, later));
        assert!(pulse.is_due(&cfg, PulseTrigger::Timer, t + Duration::minutes(30)));
    }
}
