use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("fund not configured for user {user_id}")]
    FundNotConfigured { user_id: String },
    #[error("amount must be a positive finite number, got {0}")]
    InvalidAmount(f64),
    #[error("installment count must be >= 1, got {0}")]
    InvalidInstallmentCount(u32),
    #[error("invalid fund: {0}")]
    InvalidFund(String),
    #[error("invalid simulation policy: {0}")]
    InvalidPolicy(String),
    #[error("installment due date falls outside the supported calendar range")]
    DateOutOfRange,
    #[error("installment {0} does not exist")]
    InstallmentNotFound(u32),
    #[error("installment {0} is already paid")]
    InstallmentAlreadyPaid(u32),
    #[error("storage error: {0}")]
    Storage(String),
}

impl EngineError {
    /// True for errors caused by the caller's input rather than by the store.
    pub fn is_input_error(&self) -> bool {
        !matches!(
            self,
            EngineError::FundNotConfigured { .. } | EngineError::Storage(_)
        )
    }
}
