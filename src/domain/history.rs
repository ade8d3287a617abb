use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use super::{Cents, Transaction, TransactionKind};

/// Maximum number of transactions retained per account.
pub const HISTORY_CAP: usize = 1000;

/// Append-only transaction log, oldest first.
/// Once the cap is exceeded the oldest entry is evicted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct History {
    entries: VecDeque<Transaction>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, transaction: Transaction) {
        self.entries.push_back(transaction);
        while self.entries.len() > HISTORY_CAP {
            self.entries.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn all(&self) -> Vec<Transaction> {
        self.entries.iter().cloned().collect()
    }

    /// The newest `count` transactions, oldest first.
    pub fn last(&self, count: usize) -> Vec<Transaction> {
        let start = self.entries.len().saturating_sub(count);
        self.entries.iter().skip(start).cloned().collect()
    }

    pub fn of_kind(&self, kind: TransactionKind) -> Vec<Transaction> {
        self.entries
            .iter()
            .filter(|tx| tx.kind() == kind)
            .cloned()
            .collect()
    }

    /// Sum of deposits and incoming transfers.
    pub fn total_credited(&self) -> Cents {
        self.entries
            .iter()
            .filter(|tx| tx.kind().is_credit())
            .map(Transaction::amount)
            .sum()
    }

    /// Sum of withdrawals and outgoing transfers.
    pub fn total_debited(&self) -> Cents {
        self.entries
            .iter()
            .filter(|tx| tx.kind().is_debit())
            .map(Transaction::amount)
            .sum()
    }
}

impl From<Vec<Transaction>> for History {
    fn from(transactions: Vec<Transaction>) -> Self {
        let mut history = History::new();
        for tx in transactions {
            history.push(tx);
        }
        history
    }
}
