//! The gate: turns a plan and its critique into a final act/abstain decision.
//!
//! `evaluate` is pure. All randomness arrives through [`GateDraws`], so a
//! fixed set of inputs and draws always yields the same decision.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::decision::{Critique, Plan, PlanAction};
use super::persona::Persona;
use crate::market::Vote;

pub const PRIOR_WEIGHT: f64 = 0.18;
pub const BORDERLINE_MARGIN: f64 = 0.05;
pub const CROWDING_STEP: f64 = 0.06;
pub const CROWDING_CAP: f64 = 0.45;

pub fn crowding_penalty(answer_count: u32) -> f64 {
    (CROWDING_STEP * answer_count as f64).min(CROWDING_CAP)
}

/// Uniform draws in [0, 1) consumed by one gate evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GateDraws {
    pub borderline: f64,
    pub propensity: f64,
}

pub trait DecisionRng: Send {
    fn draws(&mut self) -> GateDraws;
}

/// `StdRng`-backed draws; seeded in tests, entropy-seeded in production.
pub struct StdDecisionRng {
    rng: StdRng,
}

impl StdDecisionRng {
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }
}

impl DecisionRng for StdDecisionRng {
    fn draws(&mut self) -> GateDraws {
        GateDraws {
            borderline: self.rng.gen::<f64>(),
            propensity: self.rng.gen::<f64>(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct GateInput<'a> {
    pub plan: &'a Plan,
    pub critique: &'a Critique,
    pub persona: &'a Persona,
    pub topic_prior: f64,
    pub domain_alignment: f64,
    pub answer_count: u32,
    pub required_bid_cents: u64,
    pub max_bid_per_action_cents: u64,
    pub remaining_budget_cents: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GateDecision {
    pub should_answer: bool,
    /// Blended confidence.
    pub confidence: f64,
    /// Crowding-adjusted expected value.
    pub expected_value: f64,
    pub bid_amount_cents: u64,
    /// Vote on the question post; `None` unless the critic approved.
    pub vote: Vote,
    pub reason: String,
}

pub fn evaluate(input: &GateInput<'_>, draws: GateDraws) -> GateDecision {
    let GateInput {
        plan,
        critique,
        persona,
        ..
    } = *input;

    let confidence = (plan.confidence
        + input.topic_prior * PRIOR_WEIGHT
        + critique.confidence_adjustment
        + persona.confidence_bias)
        .clamp(0.0, 1.0);
    let expected_value = (plan.expected_value - crowding_penalty(input.answer_count)
        + persona.ev_bias)
        .clamp(-1.0, 1.0);

    let proposed = critique
        .adjusted_bid_amount_cents
        .unwrap_or(plan.bid_amount_cents);
    let bid_amount_cents = proposed
        .max(input.required_bid_cents)
        .min(input.max_bid_per_action_cents);

    let vote = if critique.approve {
        critique.adjusted_vote.unwrap_or(plan.vote)
    } else {
        Vote::None
    };

    let decide = |should_answer: bool, reason: &str| GateDecision {
        should_answer,
        confidence,
        expected_value,
        bid_amount_cents,
        vote,
        reason: reason.to_string(),
    };

    if !critique.approve {
        return decide(false, "critic_veto");
    }
    if critique.adjusted_action.unwrap_or(plan.action) == PlanAction::Abstain {
        return decide(false, "plan_abstain");
    }
    if input.domain_alignment < persona.min_domain_alignment {
        return decide(false, "domain_misaligned");
    }
    if input.required_bid_cents > input.max_bid_per_action_cents {
        return decide(false, "required_bid_exceeds_cap");
    }
    if bid_amount_cents > input.remaining_budget_cents {
        return decide(false, "insufficient_budget");
    }

    // a score is "near" inside the band and "clear" at or above its threshold;
    // borderline needs one score near and neither score far below
    let conf_gap = confidence - persona.min_confidence;
    let ev_gap = expected_value - persona.min_expected_value;
    let conf_near = conf_gap.abs() <= BORDERLINE_MARGIN;
    let ev_near = ev_gap.abs() <= BORDERLINE_MARGIN;
    let conf_ok = conf_near || conf_gap >= 0.0;
    let ev_ok = ev_near || ev_gap >= 0.0;
    if !conf_ok || !ev_ok {
        return decide(false, "below_threshold");
    }
    let borderline = conf_near || ev_near;
    if borderline && draws.borderline >= persona.borderline_commit_rate {
        return decide(false, "borderline_declined");
    }

    if draws.propensity >= persona.answer_propensity {
        return decide(false, "propensity_declined");
    }
    decide(true, if borderline { "borderline_commit" } else { "commit" })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan(conf: f64, ev: f64, bid: u64) -> Plan {
        Plan {
            action: PlanAction::Answer,
            confidence: conf,
            expected_value: ev,
            bid_amount_cents: bid,
            vote: Vote::Up,
            join_wiki_ids: vec![],
            research_queries: vec![],
            reason: String::new(),
            risk_flags: vec![],
        }
    }

    fn approve() -> Critique {
        Critique {
            approve: true,
            adjusted_action: None,
            adjusted_bid_amount_cents: None,
            adjusted_vote: None,
            confidence_adjustment: 0.0,
            issues: vec![],
        }
    }

    const ALWAYS: GateDraws = GateDraws {
        borderline: 0.0,
        propensity: 0.0,
    };

    fn input<'a>(p: &'a Plan, c: &'a Critique, persona: &'a Persona) -> GateInput<'a> {
        GateInput {
            plan: p,
            critique: c,
            persona,
            topic_prior: 0.0,
            domain_alignment: 1.0,
            answer_count: 0,
            required_bid_cents: 10,
            max_bid_per_action_cents: 200,
            remaining_budget_cents: 1000,
        }
    }

    #[test]
    fn test_confident_plan_commits() {
        let persona = Persona::default();
        let (p, c) = (plan(0.9, 0.5, 25), approve());
        let d = evaluate(&input(&p, &c, &persona), ALWAYS);
        assert!(d.should_answer);
        assert_eq!(d.bid_amount_cents, 25);
        assert_eq!(d.reason, "commit");
        assert_eq!(d.vote, Vote::Up);
    }

    #[test]
    fn test_bid_raised_to_required_and_capped() {
        let persona = Persona::default();
        let (p, c) = (plan(0.9, 0.5, 5), approve());
        let mut i = input(&p, &c, &persona);
        i.required_bid_cents = 40;
        assert_eq!(evaluate(&i, ALWAYS).bid_amount_cents, 40);

        let p2 = plan(0.9, 0.5, 900);
        let i2 = input(&p2, &c, &persona);
        assert_eq!(evaluate(&i2, ALWAYS).bid_amount_cents, 200);
    }

    #[test]
    fn test_required_bid_over_cap_rejected() {
        let persona = Persona::default();
        let (p, c) = (plan(0.9, 0.5, 250), approve());
        let mut i = input(&p, &c, &persona);
        i.required_bid_cents = 250;
        let d = evaluate(&i, ALWAYS);
        assert!(!d.should_answer);
        assert_eq!(d.reason, "required_bid_exceeds_cap");
    }

    #[test]
    fn test_budget_exhausted() {
        let persona = Persona::default();
        let (p, c) = (plan(0.9, 0.5, 50), approve());
        let mut i = input(&p, &c, &persona);
        i.remaining_budget_cents = 49;
        assert_eq!(evaluate(&i, ALWAYS).reason, "insufficient_budget");
    }

    #[test]
    fn test_critic_veto_clears_vote() {
        let persona = Persona::default();
        let p = plan(0.95, 0.9, 20);
        let c = Critique::veto("hallucinated API");
        let d = evaluate(&input(&p, &c, &persona), ALWAYS);
        assert!(!d.should_answer);
        assert_eq!(d.vote, Vote::None);
    }

    #[test]
    fn test_critic_can_flip_to_abstain() {
        let persona = Persona::default();
        let p = plan(0.95, 0.9, 20);
        let mut c = approve();
        c.adjusted_action = Some(PlanAction::Abstain);
        assert_eq!(evaluate(&input(&p, &c, &persona), ALWAYS).reason, "plan_abstain");
    }

    #[test]
    fn test_crowding_lowers_ev() {
        assert!((crowding_penalty(3) - 0.18).abs() < 1e-9);
        assert_eq!(crowding_penalty(100), CROWDING_CAP);
        let persona = Persona::default();
        let (p, c) = (plan(0.9, 0.2, 20), approve());
        let mut i = input(&p, &c, &persona);
        i.answer_count = 5;
        let d = evaluate(&i, ALWAYS);
        assert!(!d.should_answer);
        assert_eq!(d.reason, "below_threshold");
    }

    #[test]
    fn test_borderline_uses_draw() {
        let persona = Persona::default();
        let p = plan(persona.min_confidence + 0.01, 0.5, 20);
        let c = approve();
        let i = input(&p, &c, &persona);
        let low = GateDraws { borderline: 0.0, propensity: 0.0 };
        let high = GateDraws { borderline: 0.99, propensity: 0.0 };
        assert_eq!(evaluate(&i, low).reason, "borderline_commit");
        assert_eq!(evaluate(&i, high).reason, "borderline_declined");
    }

    #[test]
    fn test_near_confidence_cannot_carry_negative_ev() {
        let persona = Persona::default();
        let p = plan(persona.min_confidence + 0.01, -0.9, 20);
        let c = approve();
        let d = evaluate(&input(&p, &c, &persona), GateDraws { borderline: 0.1, propensity: 0.1 });
        assert!(!d.should_answer);
        assert_eq!(d.reason, "below_threshold");
    }

    #[test]
    fn test_both_scores_in_band_is_borderline() {
        let persona = Persona::default();
        let p = plan(persona.min_confidence - 0.02, persona.min_expected_value - 0.02, 20);
        let c = approve();
        assert_eq!(evaluate(&input(&p, &c, &persona), ALWAYS).reason, "borderline_commit");
    }

    #[test]
    fn test_propensity_declines() {
        let persona = Persona::default();
        let (p, c) = (plan(0.9, 0.5, 20), approve());
        let d = evaluate(&input(&p, &c, &persona), GateDraws { borderline: 0.0, propensity: 0.999 });
        assert_eq!(d.reason, "propensity_declined");
    }

    #[test]
    fn test_seeded_rng_repeats() {
        let mut a = StdDecisionRng::seeded(7);
        let mut b = StdDecisionRng::seeded(7);
        for _ in 0..10 {
            assert_eq!(a.draws(), b.draws());
        }
    }
}
