use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Duration, TimeZone, Utc};

const INACTIVE: i64 = i64::MIN;

/// Process-wide pause on LLM work after the provider rejects our credentials.
///
/// Shared between the loop and the listener's reaction policy.
#[derive(Debug)]
pub struct AuthCooldown {
    until_ms: AtomicI64,
}

impl Default for AuthCooldown {
    fn default() -> Self {
        Self {
            until_ms: AtomicI64::new(INACTIVE),
        }
    }
}

impl AuthCooldown {
    pub fn trip(&self, now: DateTime<Utc>, duration: Duration) -> DateTime<Utc> {
        let until = now + duration;
        self.until_ms.store(until.timestamp_millis(), Ordering::SeqCst);
        until
    }

    /// Deadline of the cooldown if it is still running at `now`.
    pub fn active_until(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let ms = self.until_ms.load(Ordering::SeqCst);
        if ms == INACTIVE || now.timestamp_millis() >= ms {
            return None;
        }
        Utc.timestamp_millis_opt(ms).single()
    }

    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.active_until(now).is_some()
    }
}
