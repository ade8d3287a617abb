use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{AccountError, Cents, MIN_AMOUNT, PinHash, is_valid_pin};

pub type AccountId = u32;

/// Consecutive wrong PINs that lock an account.
pub const MAX_PIN_ATTEMPTS: u8 = 3;

/// Balance, PIN and lock state of a single account.
///
/// Fields are private so the balance can only move through [`Account::deposit`]
/// and [`Account::withdraw`], which keep it non-negative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    id: AccountId,
    owner_name: String,
    balance: Cents,
    pin_hash: PinHash,
    locked: bool,
    failed_attempts: u8,
    created_at: DateTime<Utc>,
    last_modified: DateTime<Utc>,
}

impl Account {
    pub fn new(id: AccountId, owner_name: &str, pin: &str) -> Result<Self, AccountError> {
        let owner_name = owner_name.trim();
        if owner_name.is_empty() {
            return Err(AccountError::InvalidOwnerName);
        }
        if !is_valid_pin(pin) {
            return Err(AccountError::InvalidPinFormat);
        }

        let now = Utc::now();
        Ok(Self {
            id,
            owner_name: owner_name.to_string(),
            balance: 0,
            pin_hash: PinHash::of(pin),
            locked: false,
            failed_attempts: 0,
            created_at: now,
            last_modified: now,
        })
    }

    pub fn id(&self) -> AccountId {
        self.id
    }

    pub fn owner_name(&self) -> &str {
        &self.owner_name
    }

    pub fn balance(&self) -> Cents {
        self.balance
    }

    pub fn pin_hash(&self) -> &PinHash {
        &self.pin_hash
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn failed_attempts(&self) -> u8 {
        self.failed_attempts
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn last_modified(&self) -> DateTime<Utc> {
        self.last_modified
    }

    /// Verify a PIN, counting failures towards the lockout.
    ///
    /// A locked account rejects every input, right or wrong, until [`Account::unlock`].
    pub fn check_pin(&mut self, input: &str) -> Result<(), AccountError> {
        if self.locked {
            return Err(AccountError::AccountLocked {
                account_id: self.id,
            });
        }
        if !is_valid_pin(input) {
            return Err(AccountError::InvalidPinFormat);
        }

        if !self.pin_hash.matches(input) {
            self.failed_attempts += 1;
            self.last_modified = Utc::now();
            if self.failed_attempts >= MAX_PIN_ATTEMPTS {
                self.locked = true;
                return Err(AccountError::AccountLocked {
                    account_id: self.id,
                });
            }
            return Err(AccountError::WrongPin {
                account_id: self.id,
                attempts_remaining: MAX_PIN_ATTEMPTS - self.failed_attempts,
            });
        }

        self.failed_attempts = 0;
        Ok(())
    }

    pub fn deposit(&mut self, amount: Cents) -> Result<(), AccountError> {
        validate_amount(amount)?;
        self.balance = self
            .balance
            .checked_add(amount)
            .ok_or(AccountError::InvalidAmount(amount))?;
        self.last_modified = Utc::now();
        Ok(())
    }

    pub fn withdraw(&mut self, amount: Cents) -> Result<(), AccountError> {
        self.ensure_can_withdraw(amount)?;
        self.balance -= amount;
        self.last_modified = Utc::now();
        Ok(())
    }

    /// Check a withdrawal without applying it.
    pub fn ensure_can_withdraw(&self, amount: Cents) -> Result<(), AccountError> {
        validate_amount(amount)?;
        if amount > self.balance {
            return Err(AccountError::InsufficientFunds {
                balance: self.balance,
                requested: amount,
            });
        }
        Ok(())
    }

    /// Check a deposit without applying it.
    pub fn ensure_can_deposit(&self, amount: Cents) -> Result<(), AccountError> {
        validate_amount(amount)?;
        self.balance
            .checked_add(amount)
            .map(|_| ())
            .ok_or(AccountError::InvalidAmount(amount))
    }

    pub fn change_pin(&mut self, old_pin: &str, new_pin: &str) -> Result<(), AccountError> {
        self.check_pin(old_pin)?;
        if !is_valid_pin(new_pin) {
            return Err(AccountError::InvalidPinFormat);
        }
        self.pin_hash = PinHash::of(new_pin);
        self.last_modified = Utc::now();
        Ok(())
    }

    /// Administrative reset; no PIN required.
    pub fn unlock(&mut self) {
        self.locked = false;
        self.failed_attempts = 0;
        self.last_modified = Utc::now();
    }
}

/// Reject amounts below 0.01.
pub fn validate_amount(amount: Cents) -> Result<(), AccountError> {
    if amount < MIN_AMOUNT {
        return Err(AccountError::InvalidAmount(amount));
    }
    Ok(())
}
