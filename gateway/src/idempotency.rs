//! Bounded store of completed writes keyed by caller idempotency key.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const DEFAULT_CAP: usize = 5_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdempotencyRecord {
    pub key: String,
    pub tool: String,
    pub result: Value,
    pub stored_at: DateTime<Utc>,
}

/// Insertion-ordered; the oldest record is evicted first once `cap` is reached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "Snapshot", into = "Snapshot")]
pub struct IdempotencyStore {
    cap: usize,
    order: VecDeque<String>,
    records: HashMap<String, IdempotencyRecord>,
}

#[derive(Serialize, Deserialize)]
struct Snapshot {
    #[serde(default = "default_cap")]
    cap: usize,
    #[serde(default)]
    records: Vec<IdempotencyRecord>,
}

fn default_cap() -> usize {
    DEFAULT_CAP
}

impl From<Snapshot> for IdempotencyStore {
    fn from(s: Snapshot) -> Self {
        let mut store = IdempotencyStore::new(s.cap);
        for r in s.records {
            store.insert(r);
        }
        store
    }
}

impl From<IdempotencyStore> for Snapshot {
    fn from(mut s: IdempotencyStore) -> Self {
        let records = s
            .order
            .iter()
            .filter_map(|k| s.records.remove(k))
            .collect();
        Snapshot {
            cap: s.cap,
            records,
        }
    }
}

impl Default for IdempotencyStore {
    fn default() -> Self {
        Self::new(DEFAULT_CAP)
    }
}

impl IdempotencyStore {
    pub fn new(cap: usize) -> Self {
        Self {
            cap: cap.max(1),
            order: VecDeque::new(),
            records: HashMap::new(),
        }
    }

    pub fn set_cap(&mut self, cap: usize) {
        self.cap = cap.max(1);
        self.evict();
    }

    pub fn get(&self, key: &str) -> Option<&IdempotencyRecord> {
        self.records.get(key)
    }

    pub fn insert(&mut self, record: IdempotencyRecord) {
        let key = record.key.clone();
        if self.records.insert(key.clone(), record).is_none() {
            self.order.push_back(key);
        }
        self.evict();
    }

    fn evict(&mut self) {
        while self.records.len() > self.cap {
            match self.order.pop_front() {
                Some(oldest) => {
                    self.records.remove(&oldest);
                }
                None => break,
            }
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rec(key: &str) -> IdempotencyRecord {
        IdempotencyRecord {
            key: key.to_string(),
            tool: "post_answer".to_string(),
            result: json!({"answerId": key}),
            stored_at: Utc::now(),
        }
    }

    #[test]
    fn test_oldest_evicted_first() {
        let mut s = IdempotencyStore::new(2);
        s.insert(rec("a"));
        s.insert(rec("b"));
        s.insert(rec("c"));
        assert!(s.get("a").is_none());
        assert!(s.get("b").is_some());
        assert_eq!(s.len(), 2);
    }

    #[test]
    fn test_persisted_order_survives() {
        let mut s = IdempotencyStore::new(3);
        for k in ["x", "y", "z"] {
            s.insert(rec(k));
        }
        let json = serde_json::to_string(&s).unwrap();
        let mut back: IdempotencyStore = serde_json::from_str(&json).unwrap();
        back.insert(rec("w"));
        assert!(back.get("x").is_none());
        assert!(back.get("y").is_some());
    }
}
