use thiserror::Error;

pub type Result<T> = std::result::Result<T, LedgerError>;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("{0} is required")]
    MissingField(&'static str),
    #[error("Invalid amount")]
    InvalidAmount,
    #[error("Minimum withdrawal amount is ${0}")]
    BelowMinimumWithdrawal(f64),
    #[error("Minimum balance required to withdraw is ${0}")]
    MinimumBalanceRequired(f64),
    #[error("Insufficient balance")]
    InsufficientBalance,
    #[error("Deposit required")]
    DepositRequired,
    #[error("Email already in use")]
    EmailInUse,
    #[error("Invalid email or password")]
    InvalidCredentials,
    #[error("Invalid or expired code")]
    InvalidResetCode,
    #[error("New password cannot be the same as your current password")]
    SamePassword,
    #[error("Cannot move {kind} from {from} to {to}")]
    InvalidTransition {
        kind: &'static str,
        from: String,
        to: String,
    },
    #[error("User not found")]
    UserNotFound,
    #[error("Deposit not found")]
    DepositNotFound,
    #[error("Withdrawal not found")]
    WithdrawalNotFound,
    #[error("Password hashing failed: {0}")]
    PasswordHash(String),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

impl LedgerError {
    /// Rejected input: nothing was written.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            LedgerError::MissingField(_)
                | LedgerError::InvalidAmount
                | LedgerError::BelowMinimumWithdrawal(_)
                | LedgerError::MinimumBalanceRequired(_)
                | LedgerError::InsufficientBalance
                | LedgerError::InvalidResetCode
                | LedgerError::SamePassword
        )
    }
}

pub(crate) fn ensure_positive(amount: f64) -> Result<()> {
    if !amount.is_finite() || amount <= 0.0 {
        return Err(LedgerError::InvalidAmount);
    }
    Ok(())
}

pub(crate) fn require(field: &'static str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(LedgerError::MissingField(field));
    }
    Ok(())
}
