use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{AccountId, Cents, format_cents};

pub type TransactionId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionKind {
    AccountCreated,
    Deposit,
    Withdraw,
    TransferIn,
    TransferOut,
    PinChanged,
    AccountLocked,
    AccountUnlocked,
}

impl TransactionKind {
    pub const ALL: [TransactionKind; 8] = [
        TransactionKind::AccountCreated,
        TransactionKind::Deposit,
        TransactionKind::Withdraw,
        TransactionKind::TransferIn,
        TransactionKind::TransferOut,
        TransactionKind::PinChanged,
        TransactionKind::AccountLocked,
        TransactionKind::AccountUnlocked,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::AccountCreated => "ACCOUNT_CREATED",
            TransactionKind::Deposit => "DEPOSIT",
            TransactionKind::Withdraw => "WITHDRAW",
            TransactionKind::TransferIn => "TRANSFER_IN",
            TransactionKind::TransferOut => "TRANSFER_OUT",
            TransactionKind::PinChanged => "PIN_CHANGED",
            TransactionKind::AccountLocked => "ACCOUNT_LOCKED",
            TransactionKind::AccountUnlocked => "ACCOUNT_UNLOCKED",
        }
    }

    /// Accepts either the stored form (`TRANSFER_IN`) or a CLI-friendly one (`transfer-in`).
    pub fn from_str(s: &str) -> Option<Self> {
        let normalized = s.trim().to_uppercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalized)
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            TransactionKind::AccountCreated => "Account Created",
            TransactionKind::Deposit => "Deposit",
            TransactionKind::Withdraw => "Withdraw",
            TransactionKind::TransferIn => "Transfer In",
            TransactionKind::TransferOut => "Transfer Out",
            TransactionKind::PinChanged => "PIN Changed",
            TransactionKind::AccountLocked => "Account Locked",
            TransactionKind::AccountUnlocked => "Account Unlocked",
        }
    }

    /// Money entering the account.
    pub fn is_credit(&self) -> bool {
        matches!(self, TransactionKind::Deposit | TransactionKind::TransferIn)
    }

    /// Money leaving the account.
    pub fn is_debit(&self) -> bool {
        matches!(self, TransactionKind::Withdraw | TransactionKind::TransferOut)
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// One immutable fact in an account's history.
/// Fields are only readable; corrections are new transactions, never edits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    id: TransactionId,
    kind: TransactionKind,
    /// Amount in cents (zero for non-monetary events)
    amount: Cents,
    timestamp: DateTime<Utc>,
    from_account: AccountId,
    to_account: AccountId,
    description: Option<String>,
}

impl Transaction {
    pub fn new(
        kind: TransactionKind,
        amount: Cents,
        from_account: AccountId,
        to_account: AccountId,
    ) -> Self {
        assert!(amount >= 0, "Transaction amount cannot be negative");
        Self {
            id: Uuid::new_v4(),
            kind,
            amount,
            timestamp: Utc::now(),
            from_account,
            to_account,
            description: None,
        }
    }

    /// Non-monetary event on a single account.
    pub fn event(kind: TransactionKind, account: AccountId) -> Self {
        Self::new(kind, 0, account, account)
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn id(&self) -> TransactionId {
        self.id
    }

    pub fn kind(&self) -> TransactionKind {
        self.kind
    }

    pub fn amount(&self) -> Cents {
        self.amount
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn from_account(&self) -> AccountId {
        self.from_account
    }

    pub fn to_account(&self) -> AccountId {
        self.to_account
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S"),
            self.kind
        )?;
        if self.amount > 0 {
            write!(f, " {}", format_cents(self.amount))?;
        }
        match self.kind {
            TransactionKind::TransferOut => write!(f, " -> Account #{}", self.to_account)?,
            TransactionKind::TransferIn => write!(f, " <- Account #{}", self.from_account)?,
            _ => {}
        }
        if let Some(desc) = self.description.as_deref().filter(|d| !d.is_empty()) {
            write!(f, " ({})", desc)?;
        }
        Ok(())
    }
}
