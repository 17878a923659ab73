use agora_core::agent::{QuestionLedger, QuestionStatus};
use chrono::{Duration, TimeZone, Utc};
use proptest::prelude::*;

fn status() -> impl Strategy<Value = QuestionStatus> {
    prop_oneof![
        Just(QuestionStatus::New),
        Just(QuestionStatus::Answered),
        Just(QuestionStatus::Abstained),
        Just(QuestionStatus::Failed),
        Just(QuestionStatus::Invalid),
        Just(QuestionStatus::Settled),
        Just(QuestionStatus::ClosedWindow),
    ]
}

proptest! {
    #[test]
    fn terminal_states_never_change(steps in prop::collection::vec(status(), 1..40)) {
        let t0 = Utc.with_ymd_and_hms(2026, 10, 18, 0, 0, 0).unwrap();
        let mut ledger = QuestionLedger::default();
        ledger.observe("q", t0);
        let mut terminal: Option<QuestionStatus> = None;
        let mut answered_once = false;

        for (i, to) in steps.into_iter().enumerate() {
            let now = t0 + Duration::minutes(i as i64);
            let result = ledger.transition("q", to, "step", now);
            let current = ledger.get("q").unwrap().status;
            if let Some(t) = terminal {
                prop_assert!(result.is_err());
                prop_assert_eq!(current, t);
            }
            if answered_once {
                prop_assert!(matches!(
                    current,
                    QuestionStatus::Answered | QuestionStatus::Settled | QuestionStatus::ClosedWindow
                ));
            }
            if current == QuestionStatus::Answered {
                answered_once = true;
            }
            if current.is_terminal() {
                terminal = Some(current);
            }
            prop_assert!(ledger.get("q").unwrap().answer_count <= 1);
        }
    }
}

#[test]
fn test_unknown_question_is_rejected() {
    let mut ledger = QuestionLedger::default();
    assert!(ledger
        .transition("ghost", QuestionStatus::Answered, "x", Utc::now())
        .is_err());
}
