//! Daily spend ledger.
//!
//! Spend is keyed by UTC day and never exceeds the daily cap: a bid is first
//! reserved, then committed after the marketplace confirms the write or
//! released if it fails. Reservations live only in memory.

use agora_core::clock::day_key;
use agora_core::market::BudgetStatus;
use agora_core::tools::{ToolError, ToolErrorKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BudgetLimits {
    pub max_daily_spend_cents: u64,
    pub max_bid_per_action_cents: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetLedger {
    pub day_key: String,
    pub daily_spend_cents: u64,
    pub paused: bool,
    #[serde(skip)]
    reserved_cents: u64,
}

/// Held spend for one in-flight write.
#[must_use]
#[derive(Debug, PartialEq, Eq)]
pub struct Reservation {
    day_key: String,
    amount_cents: u64,
}

impl Reservation {
    pub fn amount_cents(&self) -> u64 {
        self.amount_cents
    }
}

impl BudgetLedger {
    pub fn new(now: DateTime<Utc>, paused: bool) -> Self {
        Self {
            day_key: day_key(now),
            daily_spend_cents: 0,
            paused,
            reserved_cents: 0,
        }
    }

    /// Reset spend when the UTC day changes. The pause flag survives.
    pub fn roll(&mut self, now: DateTime<Utc>) -> bool {
        let today = day_key(now);
        if today == self.day_key {
            return false;
        }
        tracing::info!(target: "gateway", from = %self.day_key, to = %today, spent = self.daily_spend_cents, "Budget day rollover");
        self.day_key = today;
        self.daily_spend_cents = 0;
        self.reserved_cents = 0;
        true
    }

    pub fn reserve(
        &mut self,
        bid_cents: u64,
        limits: BudgetLimits,
        now: DateTime<Utc>,
    ) -> Result<Reservation, ToolError> {
        self.roll(now);
        if bid_cents > limits.max_bid_per_action_cents {
            return Err(ToolError::new(
                ToolErrorKind::BudgetExceeded,
                format!(
                    "bid {bid_cents}c exceeds per-action cap {}c",
                    limits.max_bid_per_action_cents
                ),
            ));
        }
        let committed = self.daily_spend_cents.saturating_add(self.reserved_cents);
        if committed.saturating_add(bid_cents) > limits.max_daily_spend_cents {
            return Err(ToolError::new(
                ToolErrorKind::BudgetExceeded,
                format!(
                    "bid {bid_cents}c would exceed daily cap {}c (spent {}c, reserved {}c)",
                    limits.max_daily_spend_cents, self.daily_spend_cents, self.reserved_cents
                ),
            ));
        }
        self.reserved_cents += bid_cents;
        Ok(Reservation {
            day_key: self.day_key.clone(),
            amount_cents: bid_cents,
        })
    }

    /// Turn a reservation into spend.
    ///
    /// The marketplace confirmed the write, so the money is gone either way.
    /// A reservation made before a rollover is charged to the current day;
    /// its hold was already cleared by [`BudgetLedger::roll`].
    pub fn commit(&mut self, reservation: Reservation) {
        if reservation.day_key == self.day_key {
            self.reserved_cents = self.reserved_cents.saturating_sub(reservation.amount_cents);
        } else {
            tracing::warn!(
                target: "gateway",
                reserved_on = %reservation.day_key,
                charged_to = %self.day_key,
                amount_cents = reservation.amount_cents,
                "Spend confirmed after UTC rollover; charging the new day"
            );
        }
        self.daily_spend_cents += reservation.amount_cents;
    }

    pub fn release(&mut self, reservation: Reservation) {
        if reservation.day_key != self.day_key {
            return;
        }
        self.reserved_cents = self.reserved_cents.saturating_sub(reservation.amount_cents);
    }

    pub fn reserved_cents(&self) -> u64 {
        self.reserved_cents
    }

    pub fn status(&self, limits: BudgetLimits) -> BudgetStatus {
        BudgetStatus {
            day_key: self.day_key.clone(),
            daily_spend_cents: self.daily_spend_cents,
            max_daily_spend_cents: limits.max_daily_spend_cents,
            max_bid_per_action_cents: limits.max_bid_per_action_cents,
            paused: self.paused,
        }
    }
}
