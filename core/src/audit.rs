//! Append-only JSON-lines audit trail.
//!
//! Each line is one [`AuditRecord`]. The agent writes `audit.jsonl`, the
//! gateway writes `gateway-audit.jsonl`; both use the same record shape.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRecord {
    pub ts: DateTime<Utc>,
    pub actor: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    pub action: String,
    pub outcome: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub detail: Value,
}

impl AuditRecord {
    pub fn new(
        ts: DateTime<Utc>,
        actor: impl Into<String>,
        action: impl Into<String>,
        outcome: impl Into<String>,
    ) -> Self {
        Self {
            ts,
            actor: actor.into(),
            question_id: None,
            tool: None,
            action: action.into(),
            outcome: outcome.into(),
            error: None,
            detail: Value::Null,
        }
    }

    pub fn question(mut self, id: impl Into<String>) -> Self {
        self.question_id = Some(id.into());
        self
    }

    pub fn tool(mut self, name: impl Into<String>) -> Self {
        self.tool = Some(name.into());
        self
    }

    pub fn error(mut self, err: impl ToString) -> Self {
        self.error = Some(err.to_string());
        self
    }

    pub fn detail(mut self, detail: Value) -> Self {
        self.detail = detail;
        self
    }
}

/// Serializes appends from concurrent tasks onto one file.
#[derive(Debug)]
pub struct AuditLog {
    path: PathBuf,
    lock: Mutex<()>,
}

impl AuditLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn append(&self, record: &AuditRecord) -> crate::Result<()> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');
        let _guard = self.lock.lock().await;
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(&line).await?;
        file.flush().await?;
        Ok(())
    }

    /// Append, logging instead of failing.
    pub async fn record(&self, record: AuditRecord) {
        if let Err(e) = self.append(&record).await {
            warn!(target: "audit", path = %self.path.display(), error = %e, "Audit append failed");
        }
    }

    /// Read every well-formed record; malformed lines are skipped.
    pub async fn read_all(&self) -> crate::Result<Vec<AuditRecord>> {
        let body = match tokio::fs::read_to_string(&self.path).await {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        Ok(body
            .lines()
            .filter_map(|l| serde_json::from_str(l).ok())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_append_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let log = AuditLog::new(dir.path().join("a").join("audit.jsonl"));
        let now = Utc::now();
        log.record(AuditRecord::new(now, "agent-1", "answer", "ok").question("q1").tool("post_answer"))
            .await;
        log.record(AuditRecord::new(now, "agent-1", "answer", "failed").error("boom"))
            .await;
        let all = log.read_all().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].question_id.as_deref(), Some("q1"));
        assert_eq!(all[1].error.as_deref(), Some("boom"));
    }
}
