use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::Deserialize;

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|s| !s.is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env_string(key).and_then(|v| v.parse::<T>().ok())
}

/// Gateway deployment settings. One gateway serves one agent identity.
#[derive(Clone)]
pub struct GatewaySettings {
    pub listen_addr: SocketAddr,
    pub marketplace_url: String,
    pub agent_id: String,
    /// Hex secp256k1 secret used for identity envelopes and payments
    pub signing_key: Option<String>,
    pub max_daily_spend_cents: u64,
    pub max_bid_per_action_cents: u64,
    pub rate_limit_per_minute: u32,
    pub request_timeout_ms: u64,
    pub idempotency_cap: usize,
    pub state_dir: PathBuf,
    /// Start with writes paused
    pub start_paused: bool,
}

impl std::fmt::Debug for GatewaySettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewaySettings")
            .field("listen_addr", &self.listen_addr)
            .field("marketplace_url", &self.marketplace_url)
            .field("agent_id", &self.agent_id)
            .field("signing_key", &self.signing_key.as_ref().map(|_| "<redacted>"))
            .field("max_daily_spend_cents", &self.max_daily_spend_cents)
            .field("max_bid_per_action_cents", &self.max_bid_per_action_cents)
            .field("rate_limit_per_minute", &self.rate_limit_per_minute)
            .field("request_timeout_ms", &self.request_timeout_ms)
            .field("idempotency_cap", &self.idempotency_cap)
            .field("state_dir", &self.state_dir)
            .field("start_paused", &self.start_paused)
            .finish()
    }
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            listen_addr: env_parse("AGORA_GATEWAY_ADDR")
                .unwrap_or_else(|| SocketAddr::from(([127, 0, 0, 1], 8787))),
            marketplace_url: env_string("AGORA_MARKETPLACE_URL")
                .unwrap_or_else(|| "http://localhost:3000".to_string()),
            agent_id: env_string("AGORA_AGENT_ID").unwrap_or_else(|| "agent-local".to_string()),
            signing_key: env_string("AGORA_AGENT_PRIVATE_KEY"),
            max_daily_spend_cents: env_parse("AGORA_MAX_DAILY_SPEND_CENTS").unwrap_or(1_000),
            max_bid_per_action_cents: env_parse("AGORA_MAX_BID_PER_ACTION_CENTS").unwrap_or(200),
            rate_limit_per_minute: env_parse("AGORA_RATE_LIMIT_PER_MINUTE").unwrap_or(60),
            request_timeout_ms: env_parse("AGORA_MARKETPLACE_TIMEOUT_MS").unwrap_or(15_000),
            idempotency_cap: crate::idempotency::DEFAULT_CAP,
            state_dir: env_string("AGORA_STATE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("state")),
            start_paused: env_string("AGORA_GATEWAY_PAUSED")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
        }
    }
}

impl GatewaySettings {
    /// Load from the TOML file named by `AGORA_GATEWAY_CONFIG`
    /// (default `./gateway.toml`), overlaid onto env-driven defaults.
    pub fn load() -> Self {
        let path = std::env::var("AGORA_GATEWAY_CONFIG").unwrap_or_else(|_| "gateway.toml".into());
        Self::load_from(Path::new(&path))
    }

    pub fn load_from(path: &Path) -> Self {
        let default = Self::default();
        if !path.exists() {
            tracing::info!(target: "gateway", path = %path.display(), "No TOML config found; using defaults/env");
            return default;
        }
        match fs::read_to_string(path) {
            Ok(s) => match toml::from_str::<GatewayToml>(&s) {
                Ok(t) => t.overlay(default),
                Err(e) => {
                    tracing::warn!(target: "gateway", error = %e, "Failed to parse TOML; using defaults");
                    default
                }
            },
            Err(e) => {
                tracing::warn!(target: "gateway", error = %e, "Failed to read TOML; using defaults");
                default
            }
        }
    }

    pub fn agent_dir(&self) -> PathBuf {
        self.state_dir.join(&self.agent_id)
    }

    pub fn state_path(&self) -> PathBuf {
        self.agent_dir().join("gateway-state.json")
    }

    pub fn audit_path(&self) -> PathBuf {
        self.agent_dir().join("gateway-audit.jsonl")
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
struct GatewayToml {
    listen_addr: Option<SocketAddr>,
    marketplace_url: Option<String>,
    agent_id: Option<String>,
    max_daily_spend_cents: Option<u64>,
    max_bid_per_action_cents: Option<u64>,
    rate_limit_per_minute: Option<u32>,
    request_timeout_ms: Option<u64>,
    idempotency_cap: Option<usize>,
    state_dir: Option<PathBuf>,
    start_paused: Option<bool>,
}

impl GatewayToml {
    fn overlay(self, mut base: GatewaySettings) -> GatewaySettings {
        if let Some(x) = self.listen_addr {
            base.listen_addr = x;
        }
        if let Some(x) = self.marketplace_url {
            base.marketplace_url = x;
        }
        if let Some(x) = self.agent_id {
            base.agent_id = x;
        }
        if let Some(x) = self.max_daily_spend_cents {
            base.max_daily_spend_cents = x;
        }
        if let Some(x) = self.max_bid_per_action_cents {
            base.max_bid_per_action_cents = x;
        }
        if let Some(x) = self.rate_limit_per_minute {
            base.rate_limit_per_minute = x;
        }
        if let Some(x) = self.request_timeout_ms {
            base.request_timeout_ms = x;
        }
        if let Some(x) = self.idempotency_cap {
            base.idempotency_cap = x.max(1);
        }
        if let Some(x) = self.state_dir {
            base.state_dir = x;
        }
        if let Some(x) = self.start_paused {
            base.start_paused = x;
        }
        base
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_overlay_caps() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            f,
            "agent_id = \"agent-9\"\nmax_bid_per_action_cents = 150\nlisten_addr = \"0.0.0.0:9000\""
        )
        .unwrap();
        let s = GatewaySettings::load_from(f.path());
        assert_eq!(s.agent_id, "agent-9");
        assert_eq!(s.max_bid_per_action_cents, 150);
        assert_eq!(s.listen_addr.port(), 9000);
        assert!(s.state_path().ends_with("agent-9/gateway-state.json"));
    }

    #[test]
    fn test_signing_key_redacted() {
        let s = GatewaySettings {
            signing_key: Some("deadbeef".into()),
            ..GatewaySettings::default()
        };
        assert!(!format!("{s:?}").contains("deadbeef"));
    }
}
