use thiserror::Error;

use crate::domain::{AccountError, AccountId, Cents};

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Account not found: {0}")]
    AccountNotFound(AccountId),

    #[error("Invalid amount: {0} cents (minimum is 0.01)")]
    InvalidAmount(Cents),

    #[error("Insufficient funds: balance {balance}, requested {requested}")]
    InsufficientFunds { balance: Cents, requested: Cents },

    #[error("Wrong PIN for account {account_id} ({attempts_remaining} attempts remaining)")]
    WrongPin {
        account_id: AccountId,
        attempts_remaining: u8,
    },

    #[error("Account {account_id} is locked")]
    AccountLocked { account_id: AccountId },

    #[error("PIN must be exactly 4 digits")]
    InvalidPinFormat,

    #[error("Owner name cannot be empty")]
    InvalidOwnerName,

    #[error("Cannot transfer to the same account")]
    SameAccount,

    #[error("{0}")]
    BusinessRuleViolation(String),

    /// Not a business outcome: a thread panicked while holding an account lock.
    #[error("Internal error: {0}")]
    LockPoisoned(String),

    #[error("Persistence error: {0:#}")]
    Persistence(#[from] anyhow::Error),
}

impl AppError {
    /// PIN failures change the attempt counter and must be persisted.
    pub(crate) fn is_pin_failure(&self) -> bool {
        matches!(
            self,
            AppError::WrongPin { .. } | AppError::AccountLocked { .. }
        )
    }
}

impl From<AccountError> for AppError {
    fn from(err: AccountError) -> Self {
        match err {
            AccountError::InvalidAmount(amount) => AppError::InvalidAmount(amount),
            AccountError::InsufficientFunds { balance, requested } => {
                AppError::InsufficientFunds { balance, requested }
            }
            AccountError::WrongPin {
                account_id,
                attempts_remaining,
            } => AppError::WrongPin {
                account_id,
                attempts_remaining,
            },
            AccountError::AccountLocked { account_id } => AppError::AccountLocked { account_id },
            AccountError::InvalidPinFormat => AppError::InvalidPinFormat,
            AccountError::InvalidOwnerName => AppError::InvalidOwnerName,
            AccountError::SameAccount => AppError::SameAccount,
            AccountError::BalanceNotZero { .. } => AppError::BusinessRuleViolation(
                "Cannot delete account with positive balance. Please withdraw all funds first."
                    .to_string(),
            ),
            AccountError::Closed(id) => AppError::AccountNotFound(id),
            AccountError::Poisoned(id) => {
                AppError::LockPoisoned(format!("lock poisoned for account {}", id))
            }
        }
    }
}
