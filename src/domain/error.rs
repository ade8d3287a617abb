use thiserror::Error;

use super::{AccountId, Cents};

/// Failures raised by account and ledger-entry operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AccountError {
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

    #[error("Account {account_id} holds {balance} cents and cannot be closed")]
    BalanceNotZero { account_id: AccountId, balance: Cents },

    /// The entry was closed for deletion; it no longer accepts operations.
    #[error("Account {0} is closed")]
    Closed(AccountId),

    #[error("Lock poisoned for account {0}")]
    Poisoned(AccountId),
}
