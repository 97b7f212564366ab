mod engine;
mod error;
mod ledger;
mod schedule;
mod solver;
mod store;
mod types;

pub use engine::simulate_purchase;
pub use error::EngineError;
pub use ledger::{
    Horizon, MonthlyAmounts, MonthlyLedger, Obligations, aggregate_obligations, build_ledger,
};
pub use schedule::{schedule_installments, validate_purchase};
pub use solver::{ContributionAdvice, suggest_contribution, total_deficit};
pub use store::{
    CommitOutcome, ExpenseRepository, FundRepository, InMemoryStore, simulate_for_user,
    simulate_snapshot,
};
pub use types::{
    Expense, FirstMonthPolicy, Fund, Installment, InstallmentStatus, MonthKey, MonthStatus,
    MonthlyProjection, PurchaseProposal, Remediation, SimulationPolicy, SimulationResult,
};
