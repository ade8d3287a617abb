use std::sync::Arc;

use tracing::error;

use crate::domain::{
    AccountId, Cents, EntryRecord, History, LedgerEntry, Transaction, TransactionKind, format_cents,
    is_valid_pin,
};
use crate::storage::{AccountRepository, FileRepository, StorageConfig};

use super::{AppError, AuditLog};

/// Application service providing the ledger's business operations.
/// This is the primary interface for any client (CLI, tests, embedding code).
///
/// Each write loads the entries it needs, applies the change through the
/// entry, saves and flushes the repository, and records one audit line.
pub struct LedgerService<R: AccountRepository = FileRepository> {
    repo: R,
    audit: AuditLog,
}

/// Per-account summary derived from its history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountStatistics {
    pub account_id: AccountId,
    pub owner_name: String,
    pub current_balance: Cents,
    pub total_deposited: Cents,
    pub total_withdrawn: Cents,
    pub transaction_count: usize,
    pub locked: bool,
}

/// Totals across every account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BankStatistics {
    pub total_accounts: usize,
    pub active_accounts: usize,
    pub locked_accounts: usize,
    pub total_balance: Cents,
}

impl LedgerService<FileRepository> {
    /// Open the file-backed ledger described by `config`.
    pub fn open(config: StorageConfig, audit: AuditLog) -> Result<Self, AppError> {
        let repo = FileRepository::open(config)?;
        Ok(Self::new(repo, audit))
    }
}

impl<R: AccountRepository> LedgerService<R> {
    pub fn new(repo: R, audit: AuditLog) -> Self {
        Self { repo, audit }
    }

    fn entry(&self, id: AccountId) -> Result<Arc<LedgerEntry>, AppError> {
        self.repo
            .find_by_id(id)?
            .ok_or(AppError::AccountNotFound(id))
    }

    /// Save the given entries and flush. A failed flush is logged, not
    /// returned: the in-memory state stays authoritative and the next
    /// successful flush catches up.
    fn persist(&self, entries: &[&Arc<LedgerEntry>]) -> Result<(), AppError> {
        for entry in entries {
            self.repo.save(Arc::clone(entry))?;
        }
        self.flush_logged();
        Ok(())
    }

    fn flush_logged(&self) {
        if let Err(err) = self.repo.flush() {
            error!(error = %format!("{err:#}"), "Failed to flush repository");
        }
    }

    /// Pass `result` through, persisting `entry` first if it was a PIN
    /// failure so attempt counters and lockouts survive a restart.
    fn keep_pin_failure<T>(
        &self,
        entry: &Arc<LedgerEntry>,
        result: Result<T, AppError>,
    ) -> Result<T, AppError> {
        if let Err(err) = &result {
            if err.is_pin_failure() {
                self.persist(&[entry])?;
            }
        }
        result
    }

    fn verify_pin(&self, entry: &Arc<LedgerEntry>, pin: &str) -> Result<(), AppError> {
        let result = entry.verify_pin(pin).map_err(AppError::from);
        self.keep_pin_failure(entry, result)
    }

    // ========================
    // Account operations
    // ========================

    /// Open a new account with a zero balance.
    pub fn create_account(&self, owner_name: &str, pin: &str) -> Result<EntryRecord, AppError> {
        // Validate before taking an id so rejected requests leave no gaps.
        if owner_name.trim().is_empty() {
            return Err(AppError::InvalidOwnerName);
        }
        if !is_valid_pin(pin) {
            return Err(AppError::InvalidPinFormat);
        }

        let id = self.repo.next_id()?;
        let entry = Arc::new(LedgerEntry::open(id, owner_name, pin)?);
        self.persist(&[&entry])?;

        let record = entry.snapshot()?;
        self.audit.record(format!(
            "Account created: ID={}, Owner={}",
            id,
            record.account.owner_name()
        ));
        Ok(record)
    }

    /// Read-only copy of an account and its history.
    pub fn get_account(&self, id: AccountId) -> Result<EntryRecord, AppError> {
        Ok(self.entry(id)?.snapshot()?)
    }

    /// Deposit after PIN verification. Returns the new balance.
    pub fn deposit(&self, id: AccountId, amount: Cents, pin: &str) -> Result<Cents, AppError> {
        let entry = self.entry(id)?;
        self.verify_pin(&entry, pin)?;
        entry.deposit(amount)?;
        self.persist(&[&entry])?;

        self.audit.record(format!(
            "Deposit: Account={}, Amount={}",
            id,
            format_cents(amount)
        ));
        Ok(entry.balance()?)
    }

    /// Withdraw after PIN verification. Returns the new balance.
    pub fn withdraw(&self, id: AccountId, amount: Cents, pin: &str) -> Result<Cents, AppError> {
        let entry = self.entry(id)?;
        self.verify_pin(&entry, pin)?;
        entry.withdraw(amount)?;
        self.persist(&[&entry])?;

        self.audit.record(format!(
            "Withdraw: Account={}, Amount={}",
            id,
            format_cents(amount)
        ));
        Ok(entry.balance()?)
    }

    /// Move money between two accounts, authorised by the source PIN.
    /// Both accounts must exist before anything is debited.
    pub fn transfer(
        &self,
        from_id: AccountId,
        to_id: AccountId,
        amount: Cents,
        pin: &str,
    ) -> Result<(), AppError> {
        if from_id == to_id {
            return Err(AppError::SameAccount);
        }

        let source = self.entry(from_id)?;
        let target = self.entry(to_id)?;

        let result = source
            .transfer_to(&target, amount, pin)
            .map_err(AppError::from);
        self.keep_pin_failure(&source, result)?;
        self.persist(&[&source, &target])?;

        self.audit.record(format!(
            "Transfer: From={}, To={}, Amount={}",
            from_id,
            to_id,
            format_cents(amount)
        ));
        Ok(())
    }

    pub fn change_pin(&self, id: AccountId, old_pin: &str, new_pin: &str) -> Result<(), AppError> {
        let entry = self.entry(id)?;
        let result = entry.change_pin(old_pin, new_pin).map_err(AppError::from);
        self.keep_pin_failure(&entry, result)?;
        self.persist(&[&entry])?;

        self.audit.record(format!("PIN changed: Account={}", id));
        Ok(())
    }

    /// Administrative unlock; clears the lockout and the failed-attempt counter.
    pub fn unlock_account(&self, id: AccountId) -> Result<(), AppError> {
        let entry = self.entry(id)?;
        entry.unlock()?;
        self.persist(&[&entry])?;

        self.audit.record(format!("Account unlocked: {}", id));
        Ok(())
    }

    /// Delete an account after PIN verification. Accounts holding money are refused.
    ///
    /// The entry is closed before it leaves the repository: operations that
    /// already hold it fail with `AccountNotFound` and cannot save it back.
    pub fn delete_account(&self, id: AccountId, pin: &str) -> Result<bool, AppError> {
        let entry = self.entry(id)?;
        self.verify_pin(&entry, pin)?;
        entry.close()?;

        let deleted = self.repo.delete_by_id(id)?;
        if deleted {
            self.flush_logged();
            self.audit.record(format!("Account deleted: {}", id));
        }
        Ok(deleted)
    }

    /// Remove every locked account with a zero balance. Returns how many were removed.
    pub fn cleanup_locked_accounts(&self) -> Result<usize, AppError> {
        let mut removed = 0;
        for entry in self.repo.find_all()? {
            if entry.close_if_locked_and_empty()? && self.repo.delete_by_id(entry.id())? {
                removed += 1;
            }
        }

        if removed > 0 {
            self.flush_logged();
            self.audit
                .record(format!("Cleaned up {} locked accounts", removed));
        }
        Ok(removed)
    }

    // ========================
    // Queries
    // ========================

    /// All accounts, ordered by id.
    pub fn list_accounts(&self) -> Result<Vec<EntryRecord>, AppError> {
        snapshots(self.repo.find_all()?)
    }

    pub fn search_by_owner(&self, query: &str) -> Result<Vec<EntryRecord>, AppError> {
        snapshots(self.repo.find_by_owner_name_contains(query)?)
    }

    /// Accounts whose balance is strictly greater than `min_balance`.
    pub fn accounts_with_min_balance(
        &self,
        min_balance: Cents,
    ) -> Result<Vec<EntryRecord>, AppError> {
        snapshots(self.repo.find_by_balance_greater_than(min_balance)?)
    }

    pub fn history(&self, id: AccountId) -> Result<Vec<Transaction>, AppError> {
        Ok(self.entry(id)?.transactions()?)
    }

    /// The newest `count` transactions, oldest first.
    pub fn last_transactions(
        &self,
        id: AccountId,
        count: usize,
    ) -> Result<Vec<Transaction>, AppError> {
        Ok(self.entry(id)?.last_transactions(count)?)
    }

    pub fn transactions_by_kind(
        &self,
        id: AccountId,
        kind: TransactionKind,
    ) -> Result<Vec<Transaction>, AppError> {
        Ok(self.entry(id)?.transactions_by_kind(kind)?)
    }

    pub fn account_statistics(&self, id: AccountId) -> Result<AccountStatistics, AppError> {
        let EntryRecord { account, history } = self.entry(id)?.snapshot()?;
        let history = History::from(history);

        Ok(AccountStatistics {
            account_id: account.id(),
            owner_name: account.owner_name().to_string(),
            current_balance: account.balance(),
            total_deposited: history.total_credited(),
            total_withdrawn: history.total_debited(),
            transaction_count: history.len(),
            locked: account.is_locked(),
        })
    }

    pub fn bank_statistics(&self) -> Result<BankStatistics, AppError> {
        let mut stats = BankStatistics {
            total_accounts: 0,
            active_accounts: 0,
            locked_accounts: 0,
            total_balance: 0,
        };
        for entry in self.repo.find_all()? {
            let account = entry.account()?;
            stats.total_accounts += 1;
            stats.total_balance += account.balance();
            if account.is_locked() {
                stats.locked_accounts += 1;
            } else {
                stats.active_accounts += 1;
            }
        }
        Ok(stats)
    }

    pub fn account_count(&self) -> Result<usize, AppError> {
        Ok(self.repo.count()?)
    }

    /// The newest `count` audit lines, oldest first.
    pub fn recent_logs(&self, count: usize) -> Vec<String> {
        self.audit.recent(count)
    }

    pub fn audit_log(&self) -> &AuditLog {
        &self.audit
    }

    /// Flush and release the repository. Called once by the owning process on exit.
    pub fn close(&self) -> Result<(), AppError> {
        self.repo.close()?;
        Ok(())
    }
}

fn snapshots(entries: Vec<Arc<LedgerEntry>>) -> Result<Vec<EntryRecord>, AppError> {
    entries
        .iter()
        .map(|entry| entry.snapshot().map_err(AppError::from))
        .collect()
}
