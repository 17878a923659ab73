use agora_core::clock::minute_bucket;
use agora_core::tools::{ToolError, ToolErrorKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Calls made to one tool within one UTC minute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitWindow {
    pub tool: String,
    pub minute_bucket: i64,
    pub count: u32,
}

/// Fixed-window limiter keyed by `(tool, minute)`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimiter {
    windows: Vec<RateLimitWindow>,
}

impl RateLimiter {
    /// Count one call, or reject it if the tool's window is full.
    pub fn check(&mut self, tool: &str, per_minute: u32, now: DateTime<Utc>) -> Result<(), ToolError> {
        let bucket = minute_bucket(now);
        self.windows.retain(|w| w.minute_bucket >= bucket);

        let idx = match self.windows.iter().position(|w| w.tool == tool && w.minute_bucket == bucket) {
            Some(i) => i,
            None => {
                self.windows.push(RateLimitWindow {
                    tool: tool.to_string(),
                    minute_bucket: bucket,
                    count: 0,
                });
                self.windows.len() - 1
            }
        };
        let window = &mut self.windows[idx];
        if window.count >= per_minute {
            return Err(ToolError::new(
                ToolErrorKind::RateLimited,
                format!("{tool}: {per_minute}/min"),
            ));
        }
        window.count += 1;
        Ok(())
    }

    pub fn windows(&self) -> &[RateLimitWindow] {
        &self.windows
    }
}
