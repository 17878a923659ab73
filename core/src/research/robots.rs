//! robots.txt fetching, parsing and per-origin caching.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use reqwest::Url;
use tracing::debug;

const MAX_ROBOTS_BYTES: usize = 64 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    pub allow: bool,
    pub prefix: String,
}

/// Rules that apply to this crawler on one origin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RobotsRules {
    AllowAll,
    DisallowAll,
    Rules(Vec<Rule>),
}

impl RobotsRules {
    /// Parse a robots.txt body for `agent_token`, falling back to the `*` group.
    pub fn parse(body: &str, agent_token: &str) -> Self {
        let token = agent_token.to_ascii_lowercase();
        let mut groups: Vec<(Vec<String>, Vec<Rule>)> = Vec::new();
        let mut in_agents = false;

        for line in body.lines() {
            let line = line.split('#').next().unwrap_or("").trim();
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let key = key.trim().to_ascii_lowercase();
            let value = value.trim();
            match key.as_str() {
                "user-agent" => {
                    if !in_agents {
                        groups.push((Vec::new(), Vec::new()));
                        in_agents = true;
                    }
                    if let Some(group) = groups.last_mut() {
                        group.0.push(value.to_ascii_lowercase());
                    }
                }
                "allow" | "disallow" => {
                    in_agents = false;
                    let Some(group) = groups.last_mut() else {
                        continue;
                    };
                    // an empty Disallow permits everything
                    if value.is_empty() {
                        continue;
                    }
                    group.1.push(Rule {
                        allow: key == "allow",
                        prefix: value.to_string(),
                    });
                }
                _ => {}
            }
        }

        let specific = groups
            .iter()
            .find(|(agents, _)| agents.iter().any(|a| a != "*" && token.contains(a.as_str())));
        let chosen = specific.or_else(|| groups.iter().find(|(agents, _)| agents.iter().any(|a| a == "*")));
        match chosen {
            Some((_, rules)) if !rules.is_empty() => RobotsRules::Rules(rules.clone()),
            _ => RobotsRules::AllowAll,
        }
    }

    /// Longest matching prefix wins; `Allow` wins ties.
    pub fn is_allowed(&self, path: &str) -> bool {
        match self {
            RobotsRules::AllowAll => true,
            RobotsRules::DisallowAll => false,
            RobotsRules::Rules(rules) => {
                let mut best: Option<&Rule> = None;
                for rule in rules.iter().filter(|r| path.starts_with(r.prefix.as_str())) {
                    best = match best {
                        Some(b) if b.prefix.len() > rule.prefix.len() => Some(b),
                        Some(b) if b.prefix.len() == rule.prefix.len() && b.allow => Some(b),
                        _ => Some(rule),
                    };
                }
                best.map(|r| r.allow).unwrap_or(true)
            }
        }
    }
}

/// Per-origin robots cache with a fixed TTL.
pub struct RobotsCache {
    http: reqwest::Client,
    agent_token: String,
    ttl: Duration,
    entries: DashMap<String, (RobotsRules, Instant)>,
}

impl RobotsCache {
    pub fn new(http: reqwest::Client, agent_token: impl Into<String>, ttl: Duration) -> Self {
        Self {
            http,
            agent_token: agent_token.into(),
            ttl,
            entries: DashMap::new(),
        }
    }

    pub async fn allowed(&self, url: &Url) -> bool {
        let origin = url.origin().ascii_serialization();
        let cached = self
            .entries
            .get(&origin)
            .filter(|e| e.value().1.elapsed() < self.ttl)
            .map(|e| e.value().0.clone());
        let rules = match cached {
            Some(rules) => rules,
            None => {
                let rules = self.fetch(&origin).await;
                self.entries.insert(origin, (rules.clone(), Instant::now()));
                rules
            }
        };
        let mut path = url.path().to_string();
        if let Some(q) = url.query() {
            path.push('?');
            path.push_str(q);
        }
        rules.is_allowed(&path)
    }

    async fn fetch(&self, origin: &str) -> RobotsRules {
        let url = format!("{origin}/robots.txt");
        let resp = match self.http.get(&url).send().await {
            Ok(r) => r,
            Err(e) => {
                debug!(target: "research", url = %url, error = %e, "robots.txt unreachable; disallowing");
                return RobotsRules::DisallowAll;
            }
        };
        let status = resp.status();
        if status.is_client_error() {
            return RobotsRules::AllowAll;
        }
        if !status.is_success() {
            // redirects are not followed here either
            debug!(target: "research", url = %url, %status, "robots.txt not served directly; disallowing");
            return RobotsRules::DisallowAll;
        }
        match super::web::read_capped(resp, MAX_ROBOTS_BYTES).await {
            Ok(bytes) => RobotsRules::parse(&String::from_utf8_lossy(&bytes), &self.agent_token),
            Err(_) => RobotsRules::DisallowAll,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROBOTS: &str = "\
# comment
User-agent: *
Disallow: /private
Allow: /private/public

User-agent: agorabot
User-agent: otherbot
Disallow: /
";

    #[test]
    fn test_specific_group_wins() {
        let rules = RobotsRules::parse(ROBOTS, "AgoraBot/0.1");
        assert!(!rules.is_allowed("/anything"));
    }

    #[test]
    fn test_wildcard_group_longest_match() {
        let rules = RobotsRules::parse(ROBOTS, "somebot");
        assert!(rules.is_allowed("/docs"));
        assert!(!rules.is_allowed("/private/x"));
        assert!(rules.is_allowed("/private/public/page"));
    }

    #[test]
    fn test_empty_disallow_allows_all() {
        let rules = RobotsRules::parse("User-agent: *\nDisallow:\n", "agorabot");
        assert_eq!(rules, RobotsRules::AllowAll);
        assert!(RobotsRules::parse("", "x").is_allowed("/"));
    }
}
