use std::path::{Path, PathBuf};

use agora_core::persist::{read_json_or_default, write_json_atomic};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::warn;

use crate::budget::BudgetLedger;
use crate::idempotency::IdempotencyStore;
use crate::rate_limit::RateLimiter;

/// Everything the gateway must remember across restarts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayState {
    pub budget: BudgetLedger,
    #[serde(default)]
    pub idempotency: IdempotencyStore,
    #[serde(default)]
    pub rate_limits: RateLimiter,
}

impl Default for GatewayState {
    fn default() -> Self {
        Self {
            budget: BudgetLedger::new(Utc::now(), false),
            idempotency: IdempotencyStore::default(),
            rate_limits: RateLimiter::default(),
        }
    }
}

/// Location of `gateway-state.json`.
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn load(&self) -> GatewayState {
        read_json_or_default(&self.path).await
    }

    pub async fn save(&self, state: &GatewayState) -> agora_core::Result<()> {
        write_json_atomic(&self.path, state).await
    }
}

/// Latest snapshot waiting to be written, tagged with its submit order.
type Pending = Option<(u64, GatewayState)>;

/// One background task per state file. Snapshots submitted while a write
/// is in flight collapse to the newest, so the file never goes backwards.
#[derive(Debug)]
pub struct StateWriter {
    pending: watch::Sender<Pending>,
    written: watch::Receiver<u64>,
}

impl StateWriter {
    pub fn spawn(store: StateStore) -> Self {
        let (pending, mut rx) = watch::channel::<Pending>(None);
        let (done_tx, written) = watch::channel(0u64);
        tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let Some((seq, state)) = rx.borrow_and_update().clone() else {
                    continue;
                };
                if let Err(e) = store.save(&state).await {
                    warn!(target: "gateway", path = %store.path().display(), error = %e, "Failed to persist gateway state");
                }
                let _ = done_tx.send(seq);
            }
        });
        Self { pending, written }
    }

    /// Queue `state` and return immediately. Failures are logged only.
    pub fn submit(&self, state: GatewayState) {
        self.pending.send_modify(|slot| {
            let seq = slot.as_ref().map_or(1, |(s, _)| s + 1);
            *slot = Some((seq, state));
        });
    }

    /// Wait until everything submitted so far has reached disk.
    pub async fn flush(&self) {
        let target = self.pending.borrow().as_ref().map_or(0, |(s, _)| *s);
        let mut written = self.written.clone();
        let _ = written.wait_for(|seq| *seq >= target).await;
    }
}
