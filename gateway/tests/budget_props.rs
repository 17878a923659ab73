use agora_gateway::budget::{BudgetLedger, BudgetLimits};
use chrono::{Duration, TimeZone, Utc};
use proptest::prelude::*;

const LIMITS: BudgetLimits = BudgetLimits {
    max_daily_spend_cents: 1_000,
    max_bid_per_action_cents: 200,
};

proptest! {
    #[test]
    fn spend_never_exceeds_daily_cap(ops in prop::collection::vec((0u64..400, any::<bool>()), 1..80)) {
        let now = Utc.with_ymd_and_hms(2026, 10, 18, 8, 0, 0).unwrap();
        let mut ledger = BudgetLedger::new(now, false);
        let mut expected = 0u64;

        for (bid, succeeds) in ops {
            let before = ledger.daily_spend_cents;
            match ledger.reserve(bid, LIMITS, now) {
                Ok(r) => {
                    prop_assert!(bid <= LIMITS.max_bid_per_action_cents);
                    if succeeds {
                        ledger.commit(r);
                        expected += bid;
                    } else {
                        ledger.release(r);
                    }
                }
                Err(_) => prop_assert_eq!(ledger.daily_spend_cents, before),
            }
            prop_assert!(ledger.daily_spend_cents <= LIMITS.max_daily_spend_cents);
            prop_assert_eq!(ledger.reserved_cents(), 0);
        }
        prop_assert_eq!(ledger.daily_spend_cents, expected);
    }

    #[test]
    fn concurrent_reservations_respect_cap(bids in prop::collection::vec(0u64..=200, 1..30)) {
        let now = Utc.with_ymd_and_hms(2026, 10, 18, 8, 0, 0).unwrap();
        let mut ledger = BudgetLedger::new(now, false);
        let held: Vec<_> = bids
            .iter()
            .filter_map(|b| ledger.reserve(*b, LIMITS, now).ok())
            .collect();
        let total: u64 = held.iter().map(|r| r.amount_cents()).sum();
        prop_assert!(total <= LIMITS.max_daily_spend_cents);
        for r in held {
            ledger.commit(r);
        }
        prop_assert_eq!(ledger.daily_spend_cents, total);

        ledger.roll(now + Duration::days(1));
        prop_assert_eq!(ledger.daily_spend_cents, 0);
    }
}
