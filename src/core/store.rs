use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{debug, info};

use super::engine::simulate_purchase;
use super::error::EngineError;
use super::types::{Expense, Fund, PurchaseProposal, SimulationPolicy, SimulationResult};

pub trait FundRepository: Send + Sync {
    fn get_fund(&self, user_id: &str) -> Result<Option<Fund>, EngineError>;
    /// Inserts or replaces the user's single fund.
    fn update_fund(&self, fund: Fund) -> Result<(), EngineError>;
}

pub trait ExpenseRepository: Send + Sync {
    fn list_expenses(&self, user_id: &str) -> Result<Vec<Expense>, EngineError>;
    fn insert_expense(&self, expense: Expense) -> Result<Expense, EngineError>;
}

/// Loads the user's snapshot and evaluates `proposal` against it.
pub fn simulate_for_user<R>(
    repo: &R,
    user_id: &str,
    proposal: &PurchaseProposal,
    as_of: NaiveDate,
    policy: &SimulationPolicy,
) -> Result<SimulationResult, EngineError>
where
    R: FundRepository + ExpenseRepository + ?Sized,
{
    let fund = repo.get_fund(user_id)?;
    let expenses = repo.list_expenses(user_id)?;
    simulate_snapshot(user_id, fund, &expenses, proposal, as_of, policy)
}

/// Evaluates `proposal` against a caller-supplied snapshot. The fund is rolled
/// forward to `as_of` on a copy; nothing is persisted.
pub fn simulate_snapshot(
    user_id: &str,
    fund: Option<Fund>,
    expenses: &[Expense],
    proposal: &PurchaseProposal,
    as_of: NaiveDate,
    policy: &SimulationPolicy,
) -> Result<SimulationResult, EngineError> {
    evaluate_snapshot(user_id, fund, expenses, proposal, as_of, policy).map(|(_, result)| result)
}

fn evaluate_snapshot(
    user_id: &str,
    fund: Option<Fund>,
    expenses: &[Expense],
    proposal: &PurchaseProposal,
    as_of: NaiveDate,
    policy: &SimulationPolicy,
) -> Result<(Fund, SimulationResult), EngineError> {
    let mut fund = fund.ok_or_else(|| EngineError::FundNotConfigured {
        user_id: user_id.to_string(),
    })?;
    let credited = fund.roll_forward(as_of);
    if credited > 0 {
        debug!(user_id, credited, "rolled fund forward before simulating");
    }
    let result = simulate_purchase(&fund, expenses, proposal, as_of, policy)?;
    Ok((fund, result))
}

#[derive(Debug, Default)]
struct StoreState {
    funds: HashMap<String, Fund>,
    expenses: Vec<Expense>,
    next_expense_id: u64,
}

impl StoreState {
    fn user_expenses(&self, user_id: &str) -> Vec<Expense> {
        self.expenses
            .iter()
            .filter(|e| e.user_id == user_id)
            .cloned()
            .collect()
    }

    fn insert_expense(&mut self, mut expense: Expense) -> Expense {
        self.next_expense_id += 1;
        expense.id = format!("exp-{}", self.next_expense_id);
        self.expenses.push(expense.clone());
        expense
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitOutcome {
    pub result: SimulationResult,
    /// Present only when the purchase was affordable and stored.
    pub expense: Option<Expense>,
}

/// Process-local store keyed by user id. Holds at most one fund per user.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: RwLock<StoreState>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, StoreState>, EngineError> {
        self.state
            .read()
            .map_err(|_| EngineError::Storage("store lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, StoreState>, EngineError> {
        self.state
            .write()
            .map_err(|_| EngineError::Storage("store lock poisoned".to_string()))
    }

    /// Simulates and, if affordable, stores the purchase and the rolled-forward
    /// fund while holding the write lock, so concurrent commits for the same
    /// balance are serialized.
    pub fn commit_if_affordable(
        &self,
        user_id: &str,
        proposal: &PurchaseProposal,
        description: &str,
        as_of: NaiveDate,
        policy: &SimulationPolicy,
    ) -> Result<CommitOutcome, EngineError> {
        let mut state = self.write()?;
        let fund = state.funds.get(user_id).cloned();
        let expenses = state.user_expenses(user_id);
        let (fund, result) =
            evaluate_snapshot(user_id, fund, &expenses, proposal, as_of, policy)?;

        if !result.can_afford {
            return Ok(CommitOutcome {
                result,
                expense: None,
            });
        }

        let mut expense = Expense::new(
            user_id,
            proposal.amount,
            proposal.total_installments,
            proposal.purchase_date.unwrap_or(as_of),
            false,
        )?;
        expense.description = description.to_string();
        let expense = state.insert_expense(expense);
        state.funds.insert(user_id.to_string(), fund);
        info!(user_id, expense_id = %expense.id, "committed purchase");

        Ok(CommitOutcome {
            result,
            expense: Some(expense),
        })
    }
}

impl FundRepository for InMemoryStore {
    fn get_fund(&self, user_id: &str) -> Result<Option<Fund>, EngineError> {
        Ok(self.read()?.funds.get(user_id).cloned())
    }

    fn update_fund(&self, fund: Fund) -> Result<(), EngineError> {
        if fund.user_id.is_empty() {
            return Err(EngineError::InvalidFund("userId is required".to_string()));
        }
        fund.validate()?;
        self.write()?.funds.insert(fund.user_id.clone(), fund);
        Ok(())
    }
}

impl ExpenseRepository for InMemoryStore {
    fn list_expenses(&self, user_id: &str) -> Result<Vec<Expense>, EngineError> {
        Ok(self.read()?.user_expenses(user_id))
    }

    fn insert_expense(&self, expense: Expense) -> Result<Expense, EngineError> {
        Ok(self.write()?.insert_expense(expense))
    }
}
