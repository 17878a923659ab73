use agora_core::agent::decision::{Critique, Plan, PlanAction};
use agora_core::agent::gate::{self, DecisionRng, GateInput, StdDecisionRng, BORDERLINE_MARGIN};
use agora_core::agent::{Persona, RiskProfile};
use agora_core::market::Vote;
use proptest::prelude::*;

fn plan(confidence: f64, expected_value: f64, bid: u64, abstain: bool) -> Plan {
    Plan {
        action: if abstain { PlanAction::Abstain } else { PlanAction::Answer },
        confidence,
        expected_value,
        bid_amount_cents: bid,
        vote: Vote::Up,
        join_wiki_ids: vec![],
        research_queries: vec![],
        reason: String::new(),
        risk_flags: vec![],
    }
}

fn critique(approve: bool, adj: f64) -> Critique {
    Critique {
        approve,
        adjusted_action: None,
        adjusted_bid_amount_cents: None,
        adjusted_vote: None,
        confidence_adjustment: adj,
        issues: vec![],
    }
}

fn profile() -> impl Strategy<Value = RiskProfile> {
    prop_oneof![
        Just(RiskProfile::Conservative),
        Just(RiskProfile::Balanced),
        Just(RiskProfile::Aggressive),
    ]
}

proptest! {
    #[test]
    fn same_seed_same_decisions(
        seed in any::<u64>(),
        conf in 0.0f64..=1.0,
        ev in -1.0f64..=1.0,
        bid in 0u64..400,
        answers in 0u32..12,
        prior in -1.0f64..=1.0,
        prof in profile(),
    ) {
        let p = plan(conf, ev, bid, false);
        let c = critique(true, 0.0);
        let persona = Persona::preset(prof);
        let input = GateInput {
            plan: &p,
            critique: &c,
            persona: &persona,
            topic_prior: prior,
            domain_alignment: 1.0,
            answer_count: answers,
            required_bid_cents: 0,
            max_bid_per_action_cents: 200,
            remaining_budget_cents: 1_000,
        };
        let mut a = StdDecisionRng::seeded(seed);
        let mut b = StdDecisionRng::seeded(seed);
        for _ in 0..4 {
            prop_assert_eq!(gate::evaluate(&input, a.draws()), gate::evaluate(&input, b.draws()));
        }
    }

    #[test]
    fn committed_bids_respect_caps(
        conf in 0.0f64..=1.0,
        ev in -1.0f64..=1.0,
        bid in 0u64..600,
        required in 0u64..300,
        remaining in 0u64..400,
        approve in any::<bool>(),
        abstain in any::<bool>(),
        seed in any::<u64>(),
    ) {
        let p = plan(conf, ev, bid, abstain);
        let c = critique(approve, 0.0);
        let persona = Persona::default();
        let input = GateInput {
            plan: &p,
            critique: &c,
            persona: &persona,
            topic_prior: 0.0,
            domain_alignment: 1.0,
            answer_count: 0,
            required_bid_cents: required,
            max_bid_per_action_cents: 200,
            remaining_budget_cents: remaining,
        };
        let d = gate::evaluate(&input, StdDecisionRng::seeded(seed).draws());
        prop_assert!((0.0..=1.0).contains(&d.confidence));
        prop_assert!((-1.0..=1.0).contains(&d.expected_value));
        if d.should_answer {
            prop_assert!(approve && !abstain);
            prop_assert!(d.bid_amount_cents <= 200);
            prop_assert!(d.bid_amount_cents <= remaining);
            prop_assert!(d.bid_amount_cents >= required);
        }
        if !approve {
            prop_assert_eq!(d.reason.as_str(), "critic_veto");
            prop_assert_eq!(d.vote, Vote::None);
        }
    }

    #[test]
    fn commits_never_fall_below_the_band(
        conf in 0.0f64..=1.0,
        ev in -1.0f64..=1.0,
        prof in profile(),
        seed in any::<u64>(),
    ) {
        let p = plan(conf, ev, 20, false);
        let c = critique(true, 0.0);
        let persona = Persona::preset(prof);
        let input = GateInput {
            plan: &p,
            critique: &c,
            persona: &persona,
            topic_prior: 0.0,
            domain_alignment: 1.0,
            answer_count: 0,
            required_bid_cents: 0,
            max_bid_per_action_cents: 200,
            remaining_budget_cents: 1_000,
        };
        let d = gate::evaluate(&input, StdDecisionRng::seeded(seed).draws());
        if d.should_answer {
            prop_assert!(d.confidence >= persona.min_confidence - BORDERLINE_MARGIN - 1e-9);
            prop_assert!(d.expected_value >= persona.min_expected_value - BORDERLINE_MARGIN - 1e-9);
        }
    }
}

#[test]
fn test_crowding_lowers_expected_value() {
    let p = plan(0.9, 0.3, 20, false);
    let c = critique(true, 0.0);
    let persona = Persona::default();
    let mk = |answer_count| GateInput {
        plan: &p,
        critique: &c,
        persona: &persona,
        topic_prior: 0.0,
        domain_alignment: 1.0,
        answer_count,
        required_bid_cents: 0,
        max_bid_per_action_cents: 200,
        remaining_budget_cents: 1_000,
    };
    let draws = gate::GateDraws {
        borderline: 0.0,
        propensity: 0.0,
    };
    let quiet = gate::evaluate(&mk(0), draws);
    let crowded = gate::evaluate(&mk(20), draws);
    assert!(quiet.should_answer);
    assert!((crowded.expected_value - (0.3 - 0.45)).abs() < 1e-9);
    assert!(!crowded.should_answer);
    assert_eq!(crowded.reason, "below_threshold");
}
