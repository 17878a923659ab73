//! Risk profile that parameterizes the gate.

use serde::{Deserialize, Serialize};

/// Named starting point for a persona
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RiskProfile {
    Conservative,
    #[default]
    Balanced,
    Aggressive,
}

impl std::str::FromStr for RiskProfile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "conservative" => Ok(RiskProfile::Conservative),
            "balanced" => Ok(RiskProfile::Balanced),
            "aggressive" => Ok(RiskProfile::Aggressive),
            other => Err(format!("unknown risk profile: {other}")),
        }
    }
}

/// Persona consulted by the gate and the prompts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Persona {
    pub profile: RiskProfile,

    /// Short self-description injected into the planner's system prompt
    pub description: String,

    /// Declared expertise; empty means "answers anything"
    pub domains: Vec<String>,

    /// Blended confidence needed to commit outside the borderline band
    pub min_confidence: f64,

    /// Adjusted expected value needed to commit outside the borderline band
    pub min_expected_value: f64,

    /// Fraction of a question's topics that must be in `domains`
    pub min_domain_alignment: f64,

    /// Probability of committing when a score sits inside the borderline band
    pub borderline_commit_rate: f64,

    /// Final probability of acting on an approved decision
    pub answer_propensity: f64,

    pub confidence_bias: f64,
    pub ev_bias: f64,
}

impl Default for Persona {
    fn default() -> Self {
        Self::preset(RiskProfile::Balanced)
    }
}

impl Persona {
    pub fn preset(profile: RiskProfile) -> Self {
        let base = Self {
            profile,
            description: "A careful technical expert who answers only when sure.".to_string(),
            domains: Vec::new(),
            min_confidence: 0.62,
            min_expected_value: 0.05,
            min_domain_alignment: 0.34,
            borderline_commit_rate: 0.35,
            answer_propensity: 0.9,
            confidence_bias: 0.0,
            ev_bias: 0.0,
        };
        match profile {
            RiskProfile::Balanced => base,
            RiskProfile::Conservative => Self {
                min_confidence: 0.75,
                min_expected_value: 0.2,
                min_domain_alignment: 0.5,
                borderline_commit_rate: 0.1,
                answer_propensity: 0.7,
                confidence_bias: -0.05,
                ev_bias: -0.05,
                ..base
            },
            RiskProfile::Aggressive => Self {
                description: "A fast, confident generalist who likes to compete for bounties."
                    .to_string(),
                min_confidence: 0.5,
                min_expected_value: -0.05,
                min_domain_alignment: 0.2,
                borderline_commit_rate: 0.6,
                answer_propensity: 1.0,
                confidence_bias: 0.05,
                ev_bias: 0.05,
                ..base
            },
        }
    }

    /// Set the declared domains (lower-cased)
    pub fn with_domains<I, S>(mut self, domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.domains = domains
            .into_iter()
            .map(|d| d.as_ref().trim().to_lowercase())
            .filter(|d| !d.is_empty())
            .collect();
        self
    }
}
