use std::fmt;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize, Serializer};

use super::error::EngineError;

/// Calendar month used to bucket obligations and ledger figures.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct MonthKey {
    pub year: i32,
    /// 1-based, January is 1.
    pub month: u32,
}

impl MonthKey {
    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn offset(self, months: u32) -> Self {
        Self::from_index(self.index() + i64::from(months))
    }

    /// Signed number of calendar months from `self` to `later`.
    pub fn months_until(self, later: MonthKey) -> i64 {
        later.index() - self.index()
    }

    pub fn first_day(self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year, self.month, 1)
    }

    pub fn label(self) -> String {
        match self.first_day() {
            Some(day) => day.format("%B %Y").to_string(),
            None => self.to_string(),
        }
    }

    fn index(self) -> i64 {
        i64::from(self.year) * 12 + i64::from(self.month) - 1
    }

    fn from_index(index: i64) -> Self {
        Self {
            year: index.div_euclid(12) as i32,
            month: index.rem_euclid(12) as u32 + 1,
        }
    }
}

impl fmt::Display for MonthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl Serialize for MonthKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Per-user savings pool that pays card installments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fund {
    #[serde(default)]
    pub user_id: String,
    pub monthly_contribution: f64,
    #[serde(default)]
    pub max_monthly_contribution: Option<f64>,
    pub accumulated_amount: f64,
    pub last_update_date: NaiveDate,
}

impl Fund {
    pub fn validate(&self) -> Result<(), EngineError> {
        if !self.monthly_contribution.is_finite() || self.monthly_contribution < 0.0 {
            return Err(EngineError::InvalidFund(
                "monthlyContribution must be >= 0".to_string(),
            ));
        }
        if !self.accumulated_amount.is_finite() || self.accumulated_amount < 0.0 {
            return Err(EngineError::InvalidFund(
                "accumulatedAmount must be >= 0".to_string(),
            ));
        }
        if let Some(max) = self.max_monthly_contribution {
            if !max.is_finite() || max < 0.0 {
                return Err(EngineError::InvalidFund(
                    "maxMonthlyContribution must be >= 0".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Credits one contribution per calendar month elapsed since the last
    /// update. Returns the number of months credited.
    pub fn roll_forward(&mut self, as_of: NaiveDate) -> u32 {
        let elapsed = MonthKey::from_date(self.last_update_date)
            .months_until(MonthKey::from_date(as_of));
        if elapsed <= 0 {
            return 0;
        }
        self.accumulated_amount += self.monthly_contribution * elapsed as f64;
        self.last_update_date = as_of;
        elapsed as u32
    }

    pub fn apply_payment(&mut self, amount: f64) {
        self.accumulated_amount = (self.accumulated_amount - amount.max(0.0)).max(0.0);
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstallmentStatus {
    Pending,
    Paid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Installment {
    pub number: u32,
    pub amount: f64,
    pub due_date: NaiveDate,
    pub status: InstallmentStatus,
}

impl Installment {
    pub fn is_pending(&self) -> bool {
        self.status == InstallmentStatus::Pending
    }

    pub fn mark_paid(&mut self) -> Result<(), EngineError> {
        if self.status == InstallmentStatus::Paid {
            return Err(EngineError::InstallmentAlreadyPaid(self.number));
        }
        self.status = InstallmentStatus::Paid;
        Ok(())
    }
}

/// A card purchase split into monthly installments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Expense {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub description: String,
    pub amount: f64,
    pub total_installments: u32,
    pub purchase_date: NaiveDate,
    pub installments: Vec<Installment>,
    #[serde(default)]
    pub is_simulation: bool,
}

impl Expense {
    pub fn pending_installments(&self) -> impl Iterator<Item = &Installment> {
        self.installments.iter().filter(|i| i.is_pending())
    }

    pub fn pending_amount(&self) -> f64 {
        self.pending_installments().map(|i| i.amount).sum()
    }

    /// Marks one installment paid and takes its amount out of the fund.
    pub fn mark_installment_paid(&mut self, number: u32, fund: &mut Fund) -> Result<f64, EngineError> {
        let installment = self
            .installments
            .iter_mut()
            .find(|i| i.number == number)
            .ok_or(EngineError::InstallmentNotFound(number))?;
        installment.mark_paid()?;
        fund.apply_payment(installment.amount);
        Ok(installment.amount)
    }
}

/// A purchase being evaluated, not yet committed.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseProposal {
    pub amount: f64,
    pub total_installments: u32,
    #[serde(default)]
    pub purchase_date: Option<NaiveDate>,
}

/// How the first horizon month is seeded by the ledger.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FirstMonthPolicy {
    /// The accumulated balance already holds the current month's contribution.
    #[default]
    BalanceOnly,
    /// Add the contribution when existing installments fall due in the first month.
    ContributeWhenDue,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SimulationPolicy {
    pub first_month: FirstMonthPolicy,
    pub min_horizon_months: u32,
    pub horizon_padding_months: u32,
    pub contribution_ceiling_factor: f64,
    pub remediation_share: f64,
    pub max_remediation_months: u32,
    pub contribution_rounding_step: f64,
}

impl Default for SimulationPolicy {
    fn default() -> Self {
        Self {
            first_month: FirstMonthPolicy::BalanceOnly,
            min_horizon_months: 12,
            horizon_padding_months: 3,
            contribution_ceiling_factor: 1.5,
            remediation_share: 0.3,
            max_remediation_months: 6,
            contribution_rounding_step: 100.0,
        }
    }
}

impl SimulationPolicy {
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.min_horizon_months == 0 {
            return Err(EngineError::InvalidPolicy(
                "min_horizon_months must be > 0".to_string(),
            ));
        }
        if !self.contribution_ceiling_factor.is_finite() || self.contribution_ceiling_factor < 1.0 {
            return Err(EngineError::InvalidPolicy(
                "contribution_ceiling_factor must be >= 1".to_string(),
            ));
        }
        if !(self.remediation_share > 0.0 && self.remediation_share <= 1.0) {
            return Err(EngineError::InvalidPolicy(
                "remediation_share must be in (0, 1]".to_string(),
            ));
        }
        if self.max_remediation_months == 0 {
            return Err(EngineError::InvalidPolicy(
                "max_remediation_months must be > 0".to_string(),
            ));
        }
        if !self.contribution_rounding_step.is_finite() || self.contribution_rounding_step <= 0.0 {
            return Err(EngineError::InvalidPolicy(
                "contribution_rounding_step must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MonthStatus {
    Sufficient,
    Insufficient,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Remediation {
    NotNeeded,
    Suggested,
    /// No contribution within the cap closes the deficit.
    Unreachable,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyProjection {
    pub month: MonthKey,
    pub month_label: String,
    pub available_before_payment: f64,
    pub total_before: f64,
    pub new_payment: f64,
    pub total_final: f64,
    pub remaining_margin: f64,
    pub balance_after_payments: f64,
    pub status: MonthStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationResult {
    pub can_afford: bool,
    pub can_pay_first_month: bool,
    pub can_pay_total: bool,
    pub available_funds: f64,
    pub projected_available_funds: f64,
    pub projected_available_funds_at_start: f64,
    pub required_funds: f64,
    pub monthly_required_funds: f64,
    pub total_required_funds: f64,
    pub projected_balance: f64,
    pub total_projected_balance: f64,
    pub pending_installments: u32,
    pub pending_amount: f64,
    pub installment_amount: f64,
    pub deficit: f64,
    pub remediation: Remediation,
    pub suggested_monthly_contribution: Option<f64>,
    pub suggested_duration_months: Option<u32>,
    pub monthly_projections: Vec<MonthlyProjection>,
}
