//! Cross-run agent memory: ledger, topic statistics, tool statistics and
//! the reflection log, persisted together as `memory.json`.

use std::collections::{HashMap, VecDeque};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ledger::QuestionLedger;
use crate::persist;

pub const TOPIC_OBSERVATION_CAP: u32 = 500;
pub const MAX_REFLECTIONS: usize = 1000;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicStats {
    pub observations: u32,
    pub wins: u32,
    pub losses: u32,
    pub abstains: u32,
    pub cumulative_confidence: f64,
}

impl TopicStats {
    /// Net win rate in [-1, 1]; 0 for an unseen topic.
    pub fn score(&self) -> f64 {
        if self.observations == 0 {
            return 0.0;
        }
        ((self.wins as f64 - self.losses as f64) / self.observations as f64).clamp(-1.0, 1.0)
    }

    fn decay(&mut self) {
        self.observations /= 2;
        self.wins /= 2;
        self.losses /= 2;
        self.abstains /= 2;
        self.cumulative_confidence /= 2.0;
    }
}

/// Outcome fed back into topic statistics.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TopicOutcome {
    Answered { confidence: f64 },
    Abstained,
    Failed,
    Won,
    Lost,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolStats {
    pub ok: u64,
    pub fail: u64,
    #[serde(default)]
    pub last_error: Option<String>,
    #[serde(default)]
    pub last_used_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_latency_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reflection {
    pub timestamp: DateTime<Utc>,
    pub question_id: String,
    pub action: String,
    pub confidence: f64,
    pub expected_value: f64,
    pub domain_alignment: f64,
    pub outcome: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentMemory {
    #[serde(default)]
    pub ledger: QuestionLedger,
    #[serde(default)]
    pub topics: HashMap<String, TopicStats>,
    #[serde(default)]
    pub tools: HashMap<String, ToolStats>,
    #[serde(default)]
    pub reflections: VecDeque<Reflection>,
}

impl AgentMemory {
    pub async fn load(path: &Path) -> Self {
        persist::read_json_or_default(path).await
    }

    pub async fn save(&self, path: &Path) -> crate::Result<()> {
        persist::write_json_atomic(path, self).await
    }

    /// Clipped mean of per-topic scores; unseen topics count as zero.
    pub fn topic_prior(&self, topics: &[String]) -> f64 {
        if topics.is_empty() {
            return 0.0;
        }
        let sum: f64 = topics
            .iter()
            .map(|t| self.topics.get(t).map(TopicStats::score).unwrap_or(0.0))
            .sum();
        (sum / topics.len() as f64).clamp(-1.0, 1.0)
    }

    pub fn record_topic_outcome(&mut self, topics: &[String], outcome: TopicOutcome) {
        for topic in topics {
            let stats = self.topics.entry(topic.clone()).or_default();
            match outcome {
                TopicOutcome::Answered { confidence } => {
                    stats.observations += 1;
                    stats.cumulative_confidence += confidence;
                }
                TopicOutcome::Abstained => {
                    stats.observations += 1;
                    stats.abstains += 1;
                }
                TopicOutcome::Failed => {
                    stats.observations += 1;
                    stats.losses += 1;
                }
                TopicOutcome::Won => stats.wins += 1,
                TopicOutcome::Lost => stats.losses += 1,
            }
            if stats.observations > TOPIC_OBSERVATION_CAP {
                stats.decay();
            }
        }
    }

    pub fn record_tool(&mut self, tool: &str, result: Result<(), String>, latency_ms: u64, now: DateTime<Utc>) {
        let stats = self.tools.entry(tool.to_string()).or_default();
        stats.last_used_at = Some(now);
        stats.last_latency_ms = latency_ms;
        match result {
            Ok(()) => stats.ok += 1,
            Err(e) => {
                stats.fail += 1;
                stats.last_error = Some(e);
            }
        }
    }

    pub fn reflect(&mut self, reflection: Reflection) {
        self.reflections.push_back(reflection);
        while self.reflections.len() > MAX_REFLECTIONS {
            self.reflections.pop_front();
        }
    }
}
