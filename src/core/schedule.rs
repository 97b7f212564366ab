use chrono::{Months, NaiveDate};

use super::error::EngineError;
use super::types::{Expense, Installment, InstallmentStatus};

pub fn validate_purchase(amount: f64, total_installments: u32) -> Result<(), EngineError> {
    if !amount.is_finite() || amount <= 0.0 {
        return Err(EngineError::InvalidAmount(amount));
    }
    if total_installments < 1 {
        return Err(EngineError::InvalidInstallmentCount(total_installments));
    }
    Ok(())
}

/// Splits `amount` into equal monthly installments, the first due on
/// `start_date`. The last installment does not absorb the rounding remainder.
pub fn schedule_installments(
    amount: f64,
    total_installments: u32,
    start_date: NaiveDate,
) -> Result<Vec<Installment>, EngineError> {
    validate_purchase(amount, total_installments)?;

    let installment_amount = amount / total_installments as f64;
    (1..=total_installments)
        .map(|number| {
            let due_date = start_date
                .checked_add_months(Months::new(number - 1))
                .ok_or(EngineError::DateOutOfRange)?;
            Ok(Installment {
                number,
                amount: installment_amount,
                due_date,
                status: InstallmentStatus::Pending,
            })
        })
        .collect()
}

impl Expense {
    pub fn new(
        user_id: impl Into<String>,
        amount: f64,
        total_installments: u32,
        purchase_date: NaiveDate,
        is_simulation: bool,
    ) -> Result<Self, EngineError> {
        let installments = schedule_installments(amount, total_installments, purchase_date)?;
        Ok(Self {
            id: String::new(),
            user_id: user_id.into(),
            description: String::new(),
            amount,
            total_installments,
            purchase_date,
            installments,
            is_simulation,
        })
    }

    /// Moves the purchase date and replaces the whole schedule.
    pub fn reschedule(&mut self, purchase_date: NaiveDate) -> Result<(), EngineError> {
        let installments =
            schedule_installments(self.amount, self.total_installments, purchase_date)?;
        self.purchase_date = purchase_date;
        self.installments = installments;
        Ok(())
    }
}
