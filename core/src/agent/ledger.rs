//! Per-question decision ledger.
//!
//! Every question the agent has seen gets one entry that records where it
//! stands (`QuestionStatus`) and when it was last decided on. Transitions are
//! checked against a fixed table; an illegal transition is rejected and the
//! entry is left untouched.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const MAX_RECENT_REASONS: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum QuestionStatus {
    #[default]
    New,
    Answered,
    Abstained,
    Failed,
    Invalid,
    Settled,
    ClosedWindow,
}

impl QuestionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, QuestionStatus::Settled | QuestionStatus::ClosedWindow)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            QuestionStatus::New => "new",
            QuestionStatus::Answered => "answered",
            QuestionStatus::Abstained => "abstained",
            QuestionStatus::Failed => "failed",
            QuestionStatus::Invalid => "invalid",
            QuestionStatus::Settled => "settled",
            QuestionStatus::ClosedWindow => "closed_window",
        }
    }

    pub fn can_transition_to(self, to: QuestionStatus) -> bool {
        use QuestionStatus::*;
        match self {
            Settled | ClosedWindow => false,
            New => to != New,
            Abstained | Failed => matches!(to, Abstained | Failed | Answered | Settled | ClosedWindow),
            Answered => matches!(to, Settled | ClosedWindow),
            Invalid => to != New,
        }
    }
}

impl std::fmt::Display for QuestionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("illegal transition for {question_id}: {from} -> {to}")]
    IllegalTransition {
        question_id: String,
        from: QuestionStatus,
        to: QuestionStatus,
    },

    #[error("unknown question: {0}")]
    UnknownQuestion(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionLedgerEntry {
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    #[serde(default)]
    pub last_decision_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub status: QuestionStatus,
    #[serde(default)]
    pub abstain_count: u32,
    #[serde(default)]
    pub answer_count: u32,
    #[serde(default)]
    pub failure_count: u32,
    #[serde(default)]
    pub recent_reasons: Vec<String>,
    /// Topics inferred at first evaluation, reused for settlement outcomes.
    #[serde(default)]
    pub topics: Vec<String>,
}

impl QuestionLedgerEntry {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            first_seen_at: now,
            last_seen_at: now,
            last_decision_at: None,
            status: QuestionStatus::New,
            abstain_count: 0,
            answer_count: 0,
            failure_count: 0,
            recent_reasons: Vec::new(),
            topics: Vec::new(),
        }
    }

    fn push_reason(&mut self, reason: String) {
        self.recent_reasons.push(reason);
        if self.recent_reasons.len() > MAX_RECENT_REASONS {
            let excess = self.recent_reasons.len() - MAX_RECENT_REASONS;
            self.recent_reasons.drain(..excess);
        }
    }
}

/// What the loop should do with a question on this pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Full observe → plan → critique → gate pass.
    Evaluate,
    /// Already answered: only check for settlement or window close.
    Recheck,
    Skip,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuestionLedger {
    entries: HashMap<String, QuestionLedgerEntry>,
}

impl QuestionLedger {
    pub fn get(&self, question_id: &str) -> Option<&QuestionLedgerEntry> {
        self.entries.get(question_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &QuestionLedgerEntry)> {
        self.entries.iter()
    }

    /// Record a sighting; creates the entry on first sight.
    pub fn observe(&mut self, question_id: &str, now: DateTime<Utc>) -> &QuestionLedgerEntry {
        let entry = self
            .entries
            .entry(question_id.to_string())
            .or_insert_with(|| QuestionLedgerEntry::new(now));
        entry.last_seen_at = now;
        entry
    }

    pub fn set_topics(&mut self, question_id: &str, topics: &[String]) {
        if let Some(entry) = self.entries.get_mut(question_id) {
            if entry.topics.is_empty() {
                entry.topics = topics.to_vec();
            }
        }
    }

    pub fn disposition(
        &self,
        question_id: &str,
        now: DateTime<Utc>,
        revisit: Duration,
        run_started_at: DateTime<Utc>,
    ) -> Disposition {
        let Some(entry) = self.entries.get(question_id) else {
            return Disposition::Evaluate;
        };
        if entry.status.is_terminal() {
            return Disposition::Skip;
        }
        let Some(last) = entry.last_decision_at else {
            return Disposition::Evaluate;
        };
        // invalid questions are not retried within the run that found them
        if entry.status == QuestionStatus::Invalid && last >= run_started_at {
            return Disposition::Skip;
        }
        if now - last < revisit {
            return Disposition::Skip;
        }
        if entry.status == QuestionStatus::Answered {
            Disposition::Recheck
        } else {
            Disposition::Evaluate
        }
    }

    /// Apply a decision outcome. Illegal transitions leave the entry untouched.
    pub fn transition(
        &mut self,
        question_id: &str,
        to: QuestionStatus,
        reason: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<QuestionStatus, LedgerError> {
        let entry = self
            .entries
            .get_mut(question_id)
            .ok_or_else(|| LedgerError::UnknownQuestion(question_id.to_string()))?;
        let from = entry.status;
        if !from.can_transition_to(to) {
            return Err(LedgerError::IllegalTransition {
                question_id: question_id.to_string(),
                from,
                to,
            });
        }
        match to {
            QuestionStatus::Abstained => entry.abstain_count += 1,
            QuestionStatus::Failed => entry.failure_count += 1,
            QuestionStatus::Answered => entry.answer_count += 1,
            _ => {}
        }
        entry.status = to;
        entry.last_decision_at = Some(now);
        entry.push_reason(reason.into());
        Ok(from)
    }

    /// Stamp a re-observation that did not change the status, restarting the
    /// revisit window.
    pub fn mark_checked(&mut self, question_id: &str, now: DateTime<Utc>) {
        if let Some(entry) = self.entries.get_mut(question_id) {
            entry.last_decision_at = Some(now);
        }
    }

    /// Answered entries whose revisit window has elapsed.
    pub fn due_rechecks(&self, now: DateTime<Utc>, revisit: Duration) -> Vec<String> {
        let mut due: Vec<(&String, DateTime<Utc>)> = self
            .entries
            .iter()
            .filter(|(_, e)| e.status == QuestionStatus::Answered)
            .filter_map(|(id, e)| e.last_decision_at.map(|t| (id, t)))
            .filter(|(_, t)| now - *t >= revisit)
            .collect();
        due.sort_by_key(|(_, t)| *t);
        due.into_iter().map(|(id, _)| id.clone()).collect()
    }

    pub fn count_by_status(&self, status: QuestionStatus) -> usize {
        self.entries.values().filter(|e| e.status == status).count()
    }
}
