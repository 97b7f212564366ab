use chrono::NaiveDate;
use tracing::debug;

use super::error::EngineError;
use super::ledger::{
    Horizon, MonthlyAmounts, MonthlyLedger, Obligations, aggregate_obligations, amount_in,
    build_ledger,
};
use super::schedule::validate_purchase;
use super::solver::{suggest_contribution, total_deficit};
use super::types::{
    Expense, Fund, MonthKey, MonthStatus, MonthlyProjection, PurchaseProposal, Remediation,
    SimulationPolicy, SimulationResult,
};

/// Decides whether `proposal` can be paid from `fund` without any month of
/// the horizon going negative, given the already scheduled `expenses`.
///
/// The computation only reads its inputs; `as_of` fixes the current month.
pub fn simulate_purchase(
    fund: &Fund,
    expenses: &[Expense],
    proposal: &PurchaseProposal,
    as_of: NaiveDate,
    policy: &SimulationPolicy,
) -> Result<SimulationResult, EngineError> {
    policy.validate()?;
    fund.validate()?;
    validate_purchase(proposal.amount, proposal.total_installments)?;

    let purchase_date = proposal.purchase_date.unwrap_or(as_of);
    let purchase_month = MonthKey::from_date(purchase_date);

    let obligations = aggregate_obligations(
        expenses,
        proposal.amount,
        proposal.total_installments,
        purchase_date,
    )?;
    let horizon = Horizon::for_purchase(as_of, purchase_month, proposal.total_installments, policy);
    let in_horizon = obligations.clip_to(&horizon);
    let total_obligations = in_horizon.combined();
    let ledger = build_ledger(
        fund,
        &horizon,
        &in_horizon.existing,
        &total_obligations,
        policy,
    );

    let projections = project_months(&horizon, &in_horizon, &total_obligations, &ledger);
    let first_due_month = purchase_month.max(horizon.start());
    let start = projections
        .iter()
        .find(|p| p.month == first_due_month)
        .cloned()
        .ok_or(EngineError::DateOutOfRange)?;
    let last = projections
        .last()
        .cloned()
        .ok_or(EngineError::DateOutOfRange)?;

    let can_pay_first_month = start.status == MonthStatus::Sufficient;
    let can_pay_total = projections
        .iter()
        .all(|p| p.status == MonthStatus::Sufficient);
    let can_afford = if proposal.total_installments == 1 {
        can_pay_first_month
    } else {
        can_pay_total
    };

    let deficit = total_deficit(&projections);
    let advice = if can_afford {
        None
    } else {
        Some(suggest_contribution(
            fund,
            deficit,
            obligations.installment_amount,
            policy,
        ))
    };

    debug!(
        can_afford,
        can_pay_first_month,
        can_pay_total,
        deficit,
        months = projections.len(),
        "evaluated purchase of {} in {} installments",
        proposal.amount,
        proposal.total_installments
    );

    Ok(SimulationResult {
        can_afford,
        can_pay_first_month,
        can_pay_total,
        available_funds: fund.accumulated_amount,
        projected_available_funds: start.available_before_payment - start.total_before,
        projected_available_funds_at_start: start.available_before_payment,
        required_funds: start.total_final,
        monthly_required_funds: obligations.installment_amount,
        total_required_funds: proposal.amount,
        projected_balance: start.balance_after_payments,
        total_projected_balance: last.balance_after_payments,
        pending_installments: obligations.pending_installments,
        pending_amount: obligations.pending_amount,
        installment_amount: obligations.installment_amount,
        deficit,
        remediation: advice
            .map(|a| a.remediation())
            .unwrap_or(Remediation::NotNeeded),
        suggested_monthly_contribution: advice.map(|a| a.suggested_monthly_contribution),
        suggested_duration_months: advice.map(|a| a.suggested_duration_months),
        monthly_projections: projections,
    })
}

fn project_months(
    horizon: &Horizon,
    obligations: &Obligations,
    total: &MonthlyAmounts,
    ledger: &MonthlyLedger,
) -> Vec<MonthlyProjection> {
    horizon
        .months()
        .map(|month| {
            let available = amount_in(&ledger.available, month);
            let total_final = amount_in(total, month);
            let margin = available - total_final;
            MonthlyProjection {
                month,
                month_label: month.label(),
                available_before_payment: available,
                total_before: amount_in(&obligations.existing, month),
                new_payment: amount_in(&obligations.proposed, month),
                total_final,
                remaining_margin: margin,
                balance_after_payments: amount_in(&ledger.balance_after, month),
                status: if margin >= 0.0 {
                    MonthStatus::Sufficient
                } else {
                    MonthStatus::Insufficient
                },
            }
        })
        .collect()
}
