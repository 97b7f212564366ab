use super::types::{Fund, MonthStatus, MonthlyProjection, Remediation, SimulationPolicy};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContributionAdvice {
    pub deficit: f64,
    pub max_reasonable_contribution: f64,
    pub reasonable_duration_months: u32,
    pub extra_needed_per_month: f64,
    pub suggested_monthly_contribution: f64,
    /// Zero when no contribution under the ceiling exceeds the current one.
    pub suggested_duration_months: u32,
}

impl ContributionAdvice {
    pub fn remediation(&self) -> Remediation {
        if self.suggested_duration_months == 0 {
            Remediation::Unreachable
        } else {
            Remediation::Suggested
        }
    }
}

/// Sum of the shortfalls of every insufficient month.
pub fn total_deficit(projections: &[MonthlyProjection]) -> f64 {
    projections
        .iter()
        .filter(|p| p.status == MonthStatus::Insufficient)
        .map(|p| p.remaining_margin.abs())
        .sum()
}

pub fn max_reasonable_contribution(
    fund: &Fund,
    installment_amount: f64,
    policy: &SimulationPolicy,
) -> f64 {
    match fund.max_monthly_contribution {
        Some(max) if max > fund.monthly_contribution => max,
        _ => {
            let factor = policy.contribution_ceiling_factor;
            (fund.monthly_contribution * factor).max(installment_amount * factor)
        }
    }
}

pub fn suggest_contribution(
    fund: &Fund,
    deficit: f64,
    installment_amount: f64,
    policy: &SimulationPolicy,
) -> ContributionAdvice {
    let current = fund.monthly_contribution;
    let max_reasonable = max_reasonable_contribution(fund, installment_amount, policy);

    let max_months = policy.max_remediation_months.max(1);
    let affordable_extra = current * policy.remediation_share;
    let reasonable_duration_months = if affordable_extra > 0.0 {
        (deficit / affordable_extra)
            .ceil()
            .clamp(1.0, f64::from(max_months)) as u32
    } else {
        max_months
    };

    let step = policy.contribution_rounding_step;
    let extra_needed_per_month =
        (deficit / f64::from(reasonable_duration_months) / step).ceil() * step;
    let suggested_monthly_contribution = (current + extra_needed_per_month).min(max_reasonable);

    let headroom = suggested_monthly_contribution - current;
    let suggested_duration_months = if headroom > 0.0 {
        ((deficit / headroom).ceil() as u32).max(1)
    } else {
        0
    };

    ContributionAdvice {
        deficit,
        max_reasonable_contribution: max_reasonable,
        reasonable_duration_months,
        extra_needed_per_month,
        suggested_monthly_contribution,
        suggested_duration_months,
    }
}
