use std::collections::BTreeMap;

use chrono::NaiveDate;

use super::error::EngineError;
use super::schedule::schedule_installments;
use super::types::{Expense, FirstMonthPolicy, Fund, MonthKey, SimulationPolicy};

pub type MonthlyAmounts = BTreeMap<MonthKey, f64>;

pub fn amount_in(amounts: &MonthlyAmounts, month: MonthKey) -> f64 {
    amounts.get(&month).copied().unwrap_or(0.0)
}

fn bucket(entries: impl Iterator<Item = (MonthKey, f64)>) -> MonthlyAmounts {
    entries.fold(BTreeMap::new(), |mut acc, (month, amount)| {
        *acc.entry(month).or_insert(0.0) += amount;
        acc
    })
}

/// Consecutive calendar months covered by one simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Horizon {
    start: MonthKey,
    len: u32,
}

impl Horizon {
    /// Starts at the current month and always covers every proposed
    /// installment plus the padding months. Installments of a backdated
    /// purchase are folded into the first month by [`Horizon::clip`].
    pub fn for_purchase(
        as_of: NaiveDate,
        purchase_month: MonthKey,
        total_installments: u32,
        policy: &SimulationPolicy,
    ) -> Self {
        let start = MonthKey::from_date(as_of);
        let offset = u32::try_from(start.months_until(purchase_month)).unwrap_or(0);
        let needed = offset
            .saturating_add(total_installments)
            .saturating_add(policy.horizon_padding_months);
        Self {
            start,
            len: policy.min_horizon_months.max(needed).max(1),
        }
    }

    pub fn start(&self) -> MonthKey {
        self.start
    }

    pub fn end(&self) -> MonthKey {
        self.start.offset(self.len.saturating_sub(1))
    }

    pub fn len(&self) -> u32 {
        self.len
    }

    pub fn months(&self) -> impl Iterator<Item = MonthKey> + '_ {
        (0..self.len).map(move |i| self.start.offset(i))
    }

    /// Restricts amounts to the horizon. Amounts due before the start are
    /// still owed and land in the first month; amounts past the end drop out.
    pub fn clip(&self, amounts: &MonthlyAmounts) -> MonthlyAmounts {
        let end = self.end();
        bucket(
            amounts
                .iter()
                .filter(|(month, _)| **month <= end)
                .map(|(month, amount)| ((*month).max(self.start), *amount)),
        )
    }
}

/// Month-bucketed installment obligations for one simulation.
#[derive(Debug, Clone, PartialEq)]
pub struct Obligations {
    pub existing: MonthlyAmounts,
    pub proposed: MonthlyAmounts,
    pub pending_amount: f64,
    pub pending_installments: u32,
    pub installment_amount: f64,
}

impl Obligations {
    pub fn combined(&self) -> MonthlyAmounts {
        bucket(
            self.existing
                .iter()
                .chain(self.proposed.iter())
                .map(|(month, amount)| (*month, *amount)),
        )
    }

    pub fn clip_to(&self, horizon: &Horizon) -> Self {
        Self {
            existing: horizon.clip(&self.existing),
            proposed: horizon.clip(&self.proposed),
            ..self.clone()
        }
    }
}

pub fn aggregate_obligations(
    expenses: &[Expense],
    amount: f64,
    total_installments: u32,
    purchase_date: NaiveDate,
) -> Result<Obligations, EngineError> {
    let proposed_schedule = schedule_installments(amount, total_installments, purchase_date)?;
    let installment_amount = amount / total_installments as f64;

    let pending = || {
        expenses
            .iter()
            .filter(|e| !e.is_simulation)
            .flat_map(|e| e.pending_installments())
    };

    let existing = bucket(pending().map(|i| (MonthKey::from_date(i.due_date), i.amount)));
    let proposed = bucket(
        proposed_schedule
            .iter()
            .map(|i| (MonthKey::from_date(i.due_date), i.amount)),
    );

    Ok(Obligations {
        existing,
        proposed,
        pending_amount: pending().map(|i| i.amount).sum(),
        pending_installments: pending().count() as u32,
        installment_amount,
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct MonthlyLedger {
    pub available: MonthlyAmounts,
    pub balance_after: MonthlyAmounts,
}

/// Whether the first horizon month gets a contribution on top of the balance.
pub fn credits_first_month(policy: &SimulationPolicy, existing_first_month: f64) -> bool {
    match policy.first_month {
        FirstMonthPolicy::BalanceOnly => false,
        FirstMonthPolicy::ContributeWhenDue => existing_first_month > 0.0,
    }
}

/// Projects available funds before payment for every horizon month. Each month
/// after the first starts from the previous month's balance after payment plus
/// one contribution.
pub fn build_ledger(
    fund: &Fund,
    horizon: &Horizon,
    existing: &MonthlyAmounts,
    total: &MonthlyAmounts,
    policy: &SimulationPolicy,
) -> MonthlyLedger {
    let contribution = fund.monthly_contribution;
    let seed = if credits_first_month(policy, amount_in(existing, horizon.start())) {
        fund.accumulated_amount + contribution
    } else {
        fund.accumulated_amount
    };

    let available: MonthlyAmounts = horizon
        .months()
        .scan(None, |carry: &mut Option<f64>, month| {
            let available = match *carry {
                None => seed,
                Some(previous_balance) => previous_balance + contribution,
            };
            *carry = Some(available - amount_in(total, month));
            Some((month, available))
        })
        .collect();

    let balance_after = available
        .iter()
        .map(|(month, funds)| (*month, funds - amount_in(total, *month)))
        .collect();

    MonthlyLedger {
        available,
        balance_after,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::InstallmentStatus;

    const EPS: f64 = 1e-9;

    fn assert_approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= EPS,
            "expected {expected}, got {actual}"
        );
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    fn month(y: i32, m: u32) -> MonthKey {
        MonthKey { year: y, month: m }
    }

    fn sample_fund() -> Fund {
        Fund {
            user_id: "u1".to_string(),
            monthly_contribution: 1_000.0,
            max_monthly_contribution: None,
            accumulated_amount: 5_000.0,
            last_update_date: date(2026, 10, 1),
        }
    }

    #[test]
    fn month_key_arithmetic_wraps_years() {
        assert_eq!(month(2026, 11).offset(3), month(2027, 2));
        assert_eq!(month(2026, 12).months_until(month(2026, 1)), -11);
        assert_eq!(month(2027, 2).to_string(), "2027-02");
        assert_eq!(month(2027, 2).label(), "February 2027");
        assert!(month(2026, 12) < month(2027, 1));
    }

    #[test]
    fn horizon_is_at_least_twelve_months() {
        let policy = SimulationPolicy::default();
        let horizon = Horizon::for_purchase(date(2026, 10, 18), month(2026, 10), 1, &policy);
        assert_eq!(horizon.start(), month(2026, 10));
        assert_eq!(horizon.len(), 12);
        assert_eq!(horizon.end(), month(2027, 9));
    }

    #[test]
    fn horizon_grows_with_installments_and_future_start() {
        let policy = SimulationPolicy::default();
        let long = Horizon::for_purchase(date(2026, 10, 18), month(2026, 10), 18, &policy);
        assert_eq!(long.len(), 21);

        let deferred = Horizon::for_purchase(date(2026, 10, 18), month(2027, 4), 10, &policy);
        assert_eq!(deferred.start(), month(2026, 10));
        assert_eq!(deferred.len(), 6 + 10 + 3);
    }

    #[test]
    fn horizon_for_backdated_purchase_starts_at_current_month() {
        let policy = SimulationPolicy::default();
        let horizon = Horizon::for_purchase(date(2026, 10, 18), month(2026, 8), 2, &policy);
        assert_eq!(horizon.start(), month(2026, 10));
        assert_eq!(horizon.months().count(), 12);
    }

    #[test]
    fn backdated_purchase_is_owed_in_the_current_month() {
        let policy = SimulationPolicy::default();
        let fund = Fund {
            monthly_contribution: 10_000.0,
            ..sample_fund()
        };
        let horizon = Horizon::for_purchase(date(2026, 10, 18), month(2026, 8), 3, &policy);
        let due_now = Expense::new("u1", 15_000.0, 1, date(2026, 10, 1), false).expect("valid");
        let obligations = aggregate_obligations(&[due_now], 3.0, 3, date(2026, 8, 10))
            .expect("valid proposal")
            .clip_to(&horizon);
        let total = obligations.combined();

        assert_approx(amount_in(&obligations.proposed, month(2026, 10)), 3.0);
        assert_approx(amount_in(&total, month(2026, 10)), 15_003.0);

        let ledger = build_ledger(&fund, &horizon, &obligations.existing, &total, &policy);
        assert_approx(amount_in(&ledger.available, month(2026, 10)), 5_000.0);
        assert_approx(amount_in(&ledger.balance_after, month(2026, 10)), -10_003.0);
        assert!(!ledger.available.contains_key(&month(2026, 8)));
    }

    #[test]
    fn degenerate_horizon_still_covers_one_month() {
        let policy = SimulationPolicy {
            min_horizon_months: 0,
            horizon_padding_months: 0,
            ..SimulationPolicy::default()
        };
        let horizon = Horizon::for_purchase(date(2026, 10, 18), month(2026, 10), 0, &policy);
        assert_eq!(horizon.len(), 1);
        assert_eq!(horizon.end(), month(2026, 10));
        assert_eq!(horizon.months().count(), 1);
    }

    #[test]
    fn clip_moves_overdue_amounts_into_first_month() {
        let policy = SimulationPolicy::default();
        let horizon = Horizon::for_purchase(date(2026, 10, 18), month(2026, 10), 1, &policy);
        let amounts: MonthlyAmounts = [
            (month(2026, 8), 100.0),
            (month(2026, 10), 50.0),
            (month(2027, 9), 7.0),
            (month(2027, 10), 999.0),
        ]
        .into_iter()
        .collect();

        let clipped = horizon.clip(&amounts);
        assert_approx(amount_in(&clipped, month(2026, 10)), 150.0);
        assert_approx(amount_in(&clipped, month(2027, 9)), 7.0);
        assert!(!clipped.contains_key(&month(2027, 10)));
        assert!(!clipped.contains_key(&month(2026, 8)));
    }

    #[test]
    fn aggregator_counts_only_pending_non_simulated_installments() {
        let mut committed = Expense::new("u1", 3_000.0, 3, date(2026, 10, 5), false).expect("valid");
        committed.installments[0].status = InstallmentStatus::Paid;
        let second = Expense::new("u1", 400.0, 2, date(2026, 11, 20), false).expect("valid");
        let simulated = Expense::new("u1", 9_999.0, 1, date(2026, 11, 1), true).expect("valid");

        let obligations =
            aggregate_obligations(&[committed, second, simulated], 600.0, 3, date(2026, 11, 2))
                .expect("valid proposal");

        assert_eq!(obligations.pending_installments, 4);
        assert_approx(obligations.pending_amount, 2_400.0);
        assert!(!obligations.existing.contains_key(&month(2026, 10)));
        assert_approx(amount_in(&obligations.existing, month(2026, 11)), 1_200.0);
        assert_approx(amount_in(&obligations.existing, month(2026, 12)), 1_200.0);

        assert_approx(obligations.installment_amount, 200.0);
        assert_eq!(obligations.proposed.len(), 3);
        assert_approx(amount_in(&obligations.proposed, month(2027, 1)), 200.0);

        let combined = obligations.combined();
        assert_approx(amount_in(&combined, month(2026, 11)), 1_400.0);
        assert_approx(amount_in(&combined, month(2027, 1)), 200.0);
    }

    #[test]
    fn aggregator_rejects_invalid_proposal() {
        assert_eq!(
            aggregate_obligations(&[], 100.0, 0, date(2026, 10, 1)),
            Err(EngineError::InvalidInstallmentCount(0))
        );
    }

    #[test]
    fn ledger_carries_balance_forward_with_contributions() {
        let policy = SimulationPolicy::default();
        let fund = sample_fund();
        let horizon = Horizon::for_purchase(date(2026, 10, 18), month(2026, 10), 1, &policy);
        let existing = MonthlyAmounts::new();
        let total: MonthlyAmounts = [(month(2026, 10), 4_000.0), (month(2026, 11), 3_000.0)]
            .into_iter()
            .collect();

        let ledger = build_ledger(&fund, &horizon, &existing, &total, &policy);
        assert_eq!(ledger.available.len(), 12);
        assert_approx(amount_in(&ledger.available, month(2026, 10)), 5_000.0);
        assert_approx(amount_in(&ledger.balance_after, month(2026, 10)), 1_000.0);
        assert_approx(amount_in(&ledger.available, month(2026, 11)), 2_000.0);
        assert_approx(amount_in(&ledger.balance_after, month(2026, 11)), -1_000.0);
        assert_approx(amount_in(&ledger.available, month(2026, 12)), 0.0);
        assert_approx(amount_in(&ledger.available, month(2027, 9)), 9_000.0);
    }

    #[test]
    fn balance_only_policy_never_credits_first_month() {
        let policy = SimulationPolicy::default();
        let fund = sample_fund();
        let horizon = Horizon::for_purchase(date(2026, 10, 18), month(2026, 10), 1, &policy);
        let existing: MonthlyAmounts = [(month(2026, 10), 500.0)].into_iter().collect();

        let ledger = build_ledger(&fund, &horizon, &existing, &existing, &policy);
        assert_approx(amount_in(&ledger.available, month(2026, 10)), 5_000.0);
    }

    #[test]
    fn contribute_when_due_credits_first_month_only_with_existing_obligations() {
        let policy = SimulationPolicy {
            first_month: FirstMonthPolicy::ContributeWhenDue,
            ..SimulationPolicy::default()
        };
        let fund = sample_fund();
        let horizon = Horizon::for_purchase(date(2026, 10, 18), month(2026, 10), 1, &policy);

        let due_now: MonthlyAmounts = [(month(2026, 10), 500.0)].into_iter().collect();
        let ledger = build_ledger(&fund, &horizon, &due_now, &due_now, &policy);
        assert_approx(amount_in(&ledger.available, month(2026, 10)), 6_000.0);

        let due_later: MonthlyAmounts = [(month(2026, 11), 500.0)].into_iter().collect();
        let ledger = build_ledger(&fund, &horizon, &due_later, &due_later, &policy);
        assert_approx(amount_in(&ledger.available, month(2026, 10)), 5_000.0);
    }
}
