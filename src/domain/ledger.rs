use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

use super::{
    Account, AccountError, AccountId, Cents, History, Transaction, TransactionKind,
};

/// Independent copy of an entry: the account plus its history, oldest first.
/// This is both the read view handed to callers and the persisted form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryRecord {
    pub account: Account,
    pub history: Vec<Transaction>,
}

/// An account together with its transaction history.
///
/// All state sits behind one mutex, so a balance change and its history
/// record are always observed together. Entries are shared as
/// `Arc<LedgerEntry>` between the repository and in-flight operations.
#[derive(Debug)]
pub struct LedgerEntry {
    id: AccountId,
    state: Mutex<EntryState>,
}

#[derive(Debug)]
struct EntryState {
    account: Account,
    history: History,
    /// Set once the entry has been taken out of service for deletion.
    closed: bool,
}

impl EntryState {
    /// Check the PIN, recording the transition into the locked state.
    fn check_pin(&mut self, pin: &str) -> Result<(), AccountError> {
        let was_locked = self.account.is_locked();
        let result = self.account.check_pin(pin);
        self.note_lockout(was_locked);
        result
    }

    fn change_pin(&mut self, old_pin: &str, new_pin: &str) -> Result<(), AccountError> {
        let was_locked = self.account.is_locked();
        let result = self.account.change_pin(old_pin, new_pin);
        self.note_lockout(was_locked);
        result?;
        let id = self.account.id();
        self.history
            .push(Transaction::event(TransactionKind::PinChanged, id));
        Ok(())
    }

    fn ensure_open(&self, id: AccountId) -> Result<(), AccountError> {
        if self.closed {
            return Err(AccountError::Closed(id));
        }
        Ok(())
    }

    fn note_lockout(&mut self, was_locked: bool) {
        if !was_locked && self.account.is_locked() {
            let id = self.account.id();
            self.history.push(
                Transaction::event(TransactionKind::AccountLocked, id)
                    .with_description("too many failed PIN attempts"),
            );
        }
    }
}

impl LedgerEntry {
    /// Open a new account and record its creation.
    pub fn open(id: AccountId, owner_name: &str, pin: &str) -> Result<Self, AccountError> {
        let account = Account::new(id, owner_name, pin)?;
        let mut history = History::new();
        history.push(Transaction::event(TransactionKind::AccountCreated, id));
        Ok(Self {
            id,
            state: Mutex::new(EntryState {
                account,
                history,
                closed: false,
            }),
        })
    }

    /// Rebuild an entry from its persisted form.
    pub fn from_record(record: EntryRecord) -> Self {
        Self {
            id: record.account.id(),
            state: Mutex::new(EntryState {
                account: record.account,
                history: History::from(record.history),
                closed: false,
            }),
        }
    }

    pub fn id(&self) -> AccountId {
        self.id
    }

    fn lock(&self) -> Result<MutexGuard<'_, EntryState>, AccountError> {
        self.state
            .lock()
            .map_err(|_| AccountError::Poisoned(self.id))
    }

    /// Lock for a mutation; a closed entry refuses every operation.
    fn lock_open(&self) -> Result<MutexGuard<'_, EntryState>, AccountError> {
        let state = self.lock()?;
        state.ensure_open(self.id)?;
        Ok(state)
    }

    pub fn snapshot(&self) -> Result<EntryRecord, AccountError> {
        let state = self.lock()?;
        Ok(EntryRecord {
            account: state.account.clone(),
            history: state.history.all(),
        })
    }

    pub fn account(&self) -> Result<Account, AccountError> {
        Ok(self.lock()?.account.clone())
    }

    pub fn balance(&self) -> Result<Cents, AccountError> {
        Ok(self.lock()?.account.balance())
    }

    pub fn owner_name(&self) -> Result<String, AccountError> {
        Ok(self.lock()?.account.owner_name().to_string())
    }

    pub fn is_locked(&self) -> Result<bool, AccountError> {
        Ok(self.lock()?.account.is_locked())
    }

    pub fn is_closed(&self) -> Result<bool, AccountError> {
        Ok(self.lock()?.closed)
    }

    // ========================
    // Mutations
    // ========================

    pub fn verify_pin(&self, pin: &str) -> Result<(), AccountError> {
        self.lock_open()?.check_pin(pin)
    }

    pub fn deposit(&self, amount: Cents) -> Result<(), AccountError> {
        let mut state = self.lock_open()?;
        state.account.deposit(amount)?;
        state
            .history
            .push(Transaction::new(TransactionKind::Deposit, amount, self.id, self.id));
        Ok(())
    }

    pub fn withdraw(&self, amount: Cents) -> Result<(), AccountError> {
        let mut state = self.lock_open()?;
        state.account.withdraw(amount)?;
        state
            .history
            .push(Transaction::new(TransactionKind::Withdraw, amount, self.id, self.id));
        Ok(())
    }

    pub fn change_pin(&self, old_pin: &str, new_pin: &str) -> Result<(), AccountError> {
        self.lock_open()?.change_pin(old_pin, new_pin)
    }

    pub fn unlock(&self) -> Result<(), AccountError> {
        let mut state = self.lock_open()?;
        state.account.unlock();
        state
            .history
            .push(Transaction::event(TransactionKind::AccountUnlocked, self.id));
        Ok(())
    }

    /// Move `amount` from this entry to `target`, authorised by this entry's PIN.
    ///
    /// Both entries are locked together, lower id first, for the whole
    /// operation. Nothing is mutated unless the debit and the credit can both
    /// be applied; a PIN failure only updates this entry's attempt counter.
    pub fn transfer_to(
        &self,
        target: &LedgerEntry,
        amount: Cents,
        pin: &str,
    ) -> Result<(), AccountError> {
        if self.id == target.id {
            return Err(AccountError::SameAccount);
        }

        let (mut source, mut dest) = lock_pair(self, target)?;
        source.ensure_open(self.id)?;
        dest.ensure_open(target.id)?;

        // PIN is checked under the pair lock so it cannot change before the debit.
        source.check_pin(pin)?;

        source.account.ensure_can_withdraw(amount)?;
        dest.account.ensure_can_deposit(amount)?;

        source.account.withdraw(amount)?;
        dest.account.deposit(amount)?;

        source.history.push(Transaction::new(
            TransactionKind::TransferOut,
            amount,
            self.id,
            target.id,
        ));
        dest.history.push(Transaction::new(
            TransactionKind::TransferIn,
            amount,
            self.id,
            target.id,
        ));
        Ok(())
    }

    /// Take the entry out of service if it holds no money.
    ///
    /// The balance check and the closure happen under one lock, so no deposit
    /// or incoming transfer can land in between. After this succeeds every
    /// mutation fails with [`AccountError::Closed`].
    pub fn close(&self) -> Result<(), AccountError> {
        let mut state = self.lock_open()?;
        let balance = state.account.balance();
        if balance > 0 {
            return Err(AccountError::BalanceNotZero {
                account_id: self.id,
                balance,
            });
        }
        state.closed = true;
        Ok(())
    }

    /// Close the entry only if it is locked and empty. Returns whether it was closed.
    pub fn close_if_locked_and_empty(&self) -> Result<bool, AccountError> {
        let mut state = self.lock()?;
        if state.closed || !state.account.is_locked() || state.account.balance() != 0 {
            return Ok(false);
        }
        state.closed = true;
        Ok(true)
    }

    // ========================
    // History queries
    // ========================

    pub fn transactions(&self) -> Result<Vec<Transaction>, AccountError> {
        Ok(self.lock()?.history.all())
    }

    pub fn last_transactions(&self, count: usize) -> Result<Vec<Transaction>, AccountError> {
        Ok(self.lock()?.history.last(count))
    }

    pub fn transactions_by_kind(
        &self,
        kind: TransactionKind,
    ) -> Result<Vec<Transaction>, AccountError> {
        Ok(self.lock()?.history.of_kind(kind))
    }

    pub fn transaction_count(&self) -> Result<usize, AccountError> {
        Ok(self.lock()?.history.len())
    }

    pub fn total_deposited(&self) -> Result<Cents, AccountError> {
        Ok(self.lock()?.history.total_credited())
    }

    pub fn total_withdrawn(&self) -> Result<Cents, AccountError> {
        Ok(self.lock()?.history.total_debited())
    }
}

/// Lock two distinct entries in ascending id order.
///
/// Guards come back in argument order regardless of acquisition order. Every
/// code path that holds two entry locks goes through here.
fn lock_pair<'a>(
    source: &'a LedgerEntry,
    target: &'a LedgerEntry,
) -> Result<(MutexGuard<'a, EntryState>, MutexGuard<'a, EntryState>), AccountError> {
    if source.id == target.id {
        return Err(AccountError::SameAccount);
    }
    if source.id < target.id {
        let first = source.lock()?;
        let second = target.lock()?;
        Ok((first, second))
    } else {
        let first = target.lock()?;
        let second = source.lock()?;
        Ok((second, first))
    }
}
