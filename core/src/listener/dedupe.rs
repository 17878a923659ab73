use std::collections::HashMap;

pub const DEFAULT_DEDUPE_CAP: usize = 2048;

/// Bounded recently-seen set of event ids.
///
/// When the set grows past `cap`, the least recently seen half is evicted.
#[derive(Debug)]
pub struct DedupeCache {
    cap: usize,
    seq: u64,
    seen: HashMap<String, u64>,
}

impl DedupeCache {
    pub fn new(cap: usize) -> Self {
        Self {
            cap: cap.max(2),
            seq: 0,
            seen: HashMap::new(),
        }
    }

    /// Returns true the first time an id is seen.
    pub fn insert(&mut self, id: &str) -> bool {
        self.seq += 1;
        if let Some(last) = self.seen.get_mut(id) {
            *last = self.seq;
            return false;
        }
        self.seen.insert(id.to_string(), self.seq);
        if self.seen.len() > self.cap {
            self.evict_oldest_half();
        }
        true
    }

    fn evict_oldest_half(&mut self) {
        let mut order: Vec<(u64, String)> = self.seen.iter().map(|(k, v)| (*v, k.clone())).collect();
        order.sort_unstable();
        let drop = order.len() / 2;
        for (_, id) in order.into_iter().take(drop) {
            self.seen.remove(&id);
        }
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

impl Default for DedupeCache {
    fn default() -> Self {
        Self::new(DEFAULT_DEDUPE_CAP)
    }
}
