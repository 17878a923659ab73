use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::agent::discovery::DiscoveryConfig;
use crate::agent::persona::{Persona, RiskProfile};
use crate::listener::ListenerConfig;
use crate::llm::LlmClientConfig;
use crate::research::ResearchConfig;

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|s| !s.is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env_string(key).and_then(|v| v.parse::<T>().ok())
}

fn env_list(key: &str) -> Option<Vec<String>> {
    env_string(key).map(|v| {
        v.split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    })
}

/// Settings for one agent process.
#[derive(Clone, Debug)]
pub struct AgentSettings {
    pub agent_id: String,
    /// Tool gateway base URL (the `/rpc` path is appended)
    pub gateway_url: String,
    pub state_dir: PathBuf,
    pub loop_interval_secs: u64,
    pub revisit_interval_secs: u64,
    pub questions_per_cycle: usize,
    pub list_limit: u32,
    pub similar_limit: u32,
    pub auth_cooldown_secs: u64,
    pub answer_char_budget: usize,
    pub tool_timeout_ms: u64,
    /// Fixed seed for the gate's random draws; entropy-seeded when unset
    pub gate_seed: Option<u64>,
    pub persona: Persona,
    pub llm: LlmClientConfig,
    pub research: ResearchConfig,
    pub listener: ListenerConfig,
    pub discovery: DiscoveryConfig,
}

impl Default for AgentSettings {
    fn default() -> Self {
        let profile = env_string("AGORA_RISK_PROFILE")
            .and_then(|p| p.parse::<RiskProfile>().ok())
            .unwrap_or_default();
        let mut persona = Persona::preset(profile);
        if let Some(domains) = env_list("AGORA_DOMAINS") {
            persona = persona.with_domains(domains);
        }

        Self {
            agent_id: env_string("AGORA_AGENT_ID").unwrap_or_else(|| "agent-local".to_string()),
            gateway_url: env_string("AGORA_GATEWAY_URL")
                .unwrap_or_else(|| "http://127.0.0.1:8787".to_string()),
            state_dir: env_string("AGORA_STATE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("state")),
            loop_interval_secs: env_parse("AGORA_LOOP_INTERVAL_SECS").unwrap_or(60),
            revisit_interval_secs: env_parse("AGORA_REVISIT_INTERVAL_SECS").unwrap_or(20 * 60),
            questions_per_cycle: env_parse("AGORA_QUESTIONS_PER_CYCLE").unwrap_or(3),
            list_limit: 20,
            similar_limit: 5,
            auth_cooldown_secs: env_parse("AGORA_AUTH_COOLDOWN_SECS").unwrap_or(15 * 60),
            answer_char_budget: crate::agent::compose::DEFAULT_CHAR_BUDGET,
            tool_timeout_ms: env_parse("AGORA_TOOL_TIMEOUT_MS").unwrap_or(15_000),
            gate_seed: env_parse("AGORA_GATE_SEED"),
            persona,
            llm: LlmClientConfig::default(),
            research: ResearchConfig::default(),
            listener: ListenerConfig::default(),
            discovery: DiscoveryConfig::default(),
        }
    }
}

impl AgentSettings {
    /// Load from the TOML file named by `AGORA_CONFIG` (default `./agora.toml`),
    /// overlaid onto env-driven defaults.
    pub fn load() -> Self {
        let path = std::env::var("AGORA_CONFIG").unwrap_or_else(|_| "agora.toml".into());
        Self::load_from(Path::new(&path))
    }

    pub fn load_from(path: &Path) -> Self {
        let default = Self::default();
        if !path.exists() {
            tracing::info!(target: "config", path = %path.display(), "No TOML config found; using defaults/env");
            return default;
        }
        match fs::read_to_string(path) {
            Ok(s) => match toml::from_str::<AgentToml>(&s) {
                Ok(t) => t.overlay(default),
                Err(e) => {
                    tracing::warn!(target: "config", error = %e, "Failed to parse TOML; using defaults");
                    default
                }
            },
            Err(e) => {
                tracing::warn!(target: "config", error = %e, "Failed to read TOML; using defaults");
                default
            }
        }
    }

    /// `state_dir/<agent_id>/`
    pub fn agent_dir(&self) -> PathBuf {
        self.state_dir.join(&self.agent_id)
    }

    pub fn memory_path(&self) -> PathBuf {
        self.agent_dir().join("memory.json")
    }

    pub fn heartbeat_path(&self) -> PathBuf {
        self.agent_dir().join("heartbeat.json")
    }

    pub fn audit_path(&self) -> PathBuf {
        self.agent_dir().join("audit.jsonl")
    }

    pub fn auth_cooldown(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.auth_cooldown_secs as i64)
    }
}

// TOML overlay

#[derive(Debug, Clone, Default, Deserialize)]
struct AgentToml {
    agent_id: Option<String>,
    gateway_url: Option<String>,
    state_dir: Option<PathBuf>,
    loop_interval_secs: Option<u64>,
    revisit_interval_secs: Option<u64>,
    questions_per_cycle: Option<usize>,
    list_limit: Option<u32>,
    similar_limit: Option<u32>,
    auth_cooldown_secs: Option<u64>,
    answer_char_budget: Option<usize>,
    tool_timeout_ms: Option<u64>,
    gate_seed: Option<u64>,
    persona: Option<PersonaToml>,
    llm: Option<LlmToml>,
    research: Option<ResearchToml>,
    listener: Option<ListenerToml>,
    discovery: Option<DiscoveryToml>,
}

impl AgentToml {
    fn overlay(self, mut base: AgentSettings) -> AgentSettings {
        if let Some(x) = self.agent_id {
            base.agent_id = x;
        }
        if let Some(x) = self.gateway_url {
            base.gateway_url = x;
        }
        if let Some(x) = self.state_dir {
            base.state_dir = x;
        }
        if let Some(x) = self.loop_interval_secs {
            base.loop_interval_secs = x.max(1);
        }
        if let Some(x) = self.revisit_interval_secs {
            base.revisit_interval_secs = x;
        }
        if let Some(x) = self.questions_per_cycle {
            base.questions_per_cycle = x;
        }
        if let Some(x) = self.list_limit {
            base.list_limit = x.clamp(1, 100);
        }
        if let Some(x) = self.similar_limit {
            base.similar_limit = x.clamp(1, 100);
        }
        if let Some(x) = self.auth_cooldown_secs {
            base.auth_cooldown_secs = x;
        }
        if let Some(x) = self.answer_char_budget {
            base.answer_char_budget = x;
        }
        if let Some(x) = self.tool_timeout_ms {
            base.tool_timeout_ms = x;
        }
        if let Some(x) = self.gate_seed {
            base.gate_seed = Some(x);
        }
        if let Some(p) = self.persona {
            p.apply(&mut base.persona);
        }
        if let Some(l) = self.llm {
            l.apply(&mut base.llm);
        }
        if let Some(r) = self.research {
            r.apply(&mut base.research);
        }
        if let Some(l) = self.listener {
            l.apply(&mut base.listener);
        }
        if let Some(d) = self.discovery {
            d.apply(&mut base.discovery);
        }
        base
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
struct PersonaToml {
    profile: Option<RiskProfile>,
    description: Option<String>,
    domains: Option<Vec<String>>,
    min_confidence: Option<f64>,
    min_expected_value: Option<f64>,
    min_domain_alignment: Option<f64>,
    borderline_commit_rate: Option<f64>,
    answer_propensity: Option<f64>,
    confidence_bias: Option<f64>,
    ev_bias: Option<f64>,
}

impl PersonaToml {
    fn apply(self, p: &mut Persona) {
        // A profile switch resets to that preset before field overrides.
        if let Some(profile) = self.profile {
            let domains = std::mem::take(&mut p.domains);
            *p = Persona::preset(profile);
            p.domains = domains;
        }
        if let Some(x) = self.description {
            p.description = x;
        }
        if let Some(x) = self.domains {
            *p = std::mem::take(p).with_domains(x);
        }
        if let Some(x) = self.min_confidence {
            p.min_confidence = x.clamp(0.0, 1.0);
        }
        if let Some(x) = self.min_expected_value {
            p.min_expected_value = x.clamp(-1.0, 1.0);
        }
        if let Some(x) = self.min_domain_alignment {
            p.min_domain_alignment = x.clamp(0.0, 1.0);
        }
        if let Some(x) = self.borderline_commit_rate {
            p.borderline_commit_rate = x.clamp(0.0, 1.0);
        }
        if let Some(x) = self.answer_propensity {
            p.answer_propensity = x.clamp(0.0, 1.0);
        }
        if let Some(x) = self.confidence_bias {
            p.confidence_bias = x;
        }
        if let Some(x) = self.ev_bias {
            p.ev_bias = x;
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
struct LlmToml {
    base_url: Option<String>,
    model: Option<String>,
    api_key: Option<String>,
    request_timeout_ms: Option<u64>,
    temperature: Option<f32>,
}

impl LlmToml {
    fn apply(self, l: &mut LlmClientConfig) {
        if let Some(x) = self.base_url {
            l.base_url = x;
        }
        if let Some(x) = self.model {
            l.model = x;
        }
        if let Some(x) = self.api_key {
            l.api_key = Some(x);
        }
        if let Some(x) = self.request_timeout_ms {
            l.request_timeout_ms = x;
        }
        if let Some(x) = self.temperature {
            l.temperature = x;
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ResearchToml {
    web_enabled: Option<bool>,
    max_queries: Option<usize>,
    max_fetches: Option<usize>,
    max_response_bytes: Option<usize>,
    fetch_timeout_ms: Option<u64>,
    robots_ttl_secs: Option<u64>,
    allow_hosts: Option<Vec<String>>,
    deny_hosts: Option<Vec<String>>,
    user_agent: Option<String>,
    duckduckgo_url: Option<String>,
    brave_url: Option<String>,
}

impl ResearchToml {
    fn apply(self, r: &mut ResearchConfig) {
        if let Some(x) = self.web_enabled {
            r.web_enabled = x;
        }
        if let Some(x) = self.max_queries {
            r.max_queries = x;
        }
        if let Some(x) = self.max_fetches {
            r.max_fetches = x;
        }
        if let Some(x) = self.max_response_bytes {
            r.max_response_bytes = x;
        }
        if let Some(x) = self.fetch_timeout_ms {
            r.fetch_timeout_ms = x;
        }
        if let Some(x) = self.robots_ttl_secs {
            r.robots_ttl_secs = x;
        }
        if let Some(x) = self.allow_hosts {
            r.allow_hosts = x;
        }
        if let Some(x) = self.deny_hosts {
            r.deny_hosts = x;
        }
        if let Some(x) = self.user_agent {
            r.user_agent = x;
        }
        if let Some(x) = self.duckduckgo_url {
            r.duckduckgo_url = x;
        }
        if let Some(x) = self.brave_url {
            r.brave_url = x;
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ListenerToml {
    url: Option<String>,
    reconnect_delay_ms: Option<u64>,
    max_reconnect_delay_ms: Option<u64>,
    dedupe_cap: Option<usize>,
    channel_capacity: Option<usize>,
    reactions_enabled: Option<bool>,
    reactions_per_minute: Option<u32>,
    reaction_min_confidence: Option<f64>,
}

impl ListenerToml {
    fn apply(self, l: &mut ListenerConfig) {
        if let Some(x) = self.url {
            l.url = Some(x).filter(|s| !s.is_empty());
        }
        if let Some(x) = self.reconnect_delay_ms {
            l.reconnect_delay_ms = x;
        }
        if let Some(x) = self.max_reconnect_delay_ms {
            l.max_reconnect_delay_ms = x;
        }
        if let Some(x) = self.dedupe_cap {
            l.dedupe_cap = x;
        }
        if let Some(x) = self.channel_capacity {
            l.channel_capacity = x.max(1);
        }
        if let Some(x) = self.reactions_enabled {
            l.reactions_enabled = x;
        }
        if let Some(x) = self.reactions_per_minute {
            l.reactions_per_minute = x;
        }
        if let Some(x) = self.reaction_min_confidence {
            l.reaction_min_confidence = x.clamp(0.0, 1.0);
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
struct DiscoveryToml {
    enabled: Option<bool>,
    interval_secs: Option<u64>,
    event_min_gap_secs: Option<u64>,
    max_joins_per_pulse: Option<usize>,
    candidate_limit: Option<u32>,
}

impl DiscoveryToml {
    fn apply(self, d: &mut DiscoveryConfig) {
        if let Some(x) = self.enabled {
            d.enabled = x;
        }
        if let Some(x) = self.interval_secs {
            d.interval_secs = x;
        }
        if let Some(x) = self.event_min_gap_secs {
            d.event_min_gap_secs = x;
        }
        if let Some(x) = self.max_joins_per_pulse {
            d.max_joins_per_pulse = x;
        }
        if let Some(x) = self.candidate_limit {
            d.candidate_limit = x.clamp(1, 100);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let s = AgentSettings::load_from(&dir.path().join("absent.toml"));
        assert_eq!(s.revisit_interval_secs, AgentSettings::default().revisit_interval_secs);
    }

    #[test]
    fn test_overlay_applies_nested_sections() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            f,
            r#"
agent_id = "agent-7"
questions_per_cycle = 5

[persona]
profile = "conservative"
domains = ["Rust", "databases"]
borderline_commit_rate = 0.0

[listener]
reactions_per_minute = 2
"#
        )
        .unwrap();
        let s = AgentSettings::load_from(f.path());
        assert_eq!(s.agent_id, "agent-7");
        assert_eq!(s.questions_per_cycle, 5);
        assert_eq!(s.persona.profile, RiskProfile::Conservative);
        assert_eq!(s.persona.min_confidence, 0.75);
        assert_eq!(s.persona.borderline_commit_rate, 0.0);
        assert_eq!(s.persona.domains, vec!["rust", "databases"]);
        assert_eq!(s.listener.reactions_per_minute, 2);
        assert_eq!(s.memory_path(), s.state_dir.join("agent-7").join("memory.json"));
    }

    #[test]
    fn test_malformed_file_falls_back() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "questions_per_cycle = \"many\"").unwrap();
        let s = AgentSettings::load_from(f.path());
        assert_eq!(s.questions_per_cycle, AgentSettings::default().questions_per_cycle);
    }
}
