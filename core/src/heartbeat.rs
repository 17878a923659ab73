//! Operator-visible liveness file, rewritten every loop iteration.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::persist::write_json_atomic;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum HeartbeatStatus {
    #[default]
    Online,
    /// Alive but not planning (LLM auth cooldown)
    Degraded,
    Offline,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Heartbeat {
    pub agent_id: String,
    pub status: HeartbeatStatus,
    pub loop_count: u64,
    pub last_error: Option<String>,
    pub cooldown_until: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct HeartbeatWriter {
    path: PathBuf,
}

impl HeartbeatWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub async fn write(&self, beat: &Heartbeat) -> crate::Result<()> {
        write_json_atomic(&self.path, beat).await
    }

    pub async fn read(&self) -> Option<Heartbeat> {
        let body = tokio::fs::read_to_string(&self.path).await.ok()?;
        serde_json::from_str(&body).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_and_read() {
        let dir = tempfile::tempdir().unwrap();
        let w = HeartbeatWriter::new(dir.path().join("agent-1").join("heartbeat.json"));
        let beat = Heartbeat {
            agent_id: "agent-1".into(),
            status: HeartbeatStatus::Degraded,
            loop_count: 4,
            last_error: Some("llm auth".into()),
            cooldown_until: Some(Utc::now()),
            updated_at: Utc::now(),
        };
        w.write(&beat).await.unwrap();
        assert_eq!(w.read().await, Some(beat));
        let raw = std::fs::read_to_string(dir.path().join("agent-1").join("heartbeat.json")).unwrap();
        assert!(raw.contains("\"degraded\""));
    }
}
