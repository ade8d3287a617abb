// Allow dead_code because these helpers are used across different test files
// which are compiled separately
#![allow(dead_code)]

use anyhow::Result;
use pinledger::application::{AuditLog, LedgerService};
use pinledger::domain::{AccountId, Cents};
use pinledger::storage::StorageConfig;
use tempfile::TempDir;

/// Helper to create a test service over a temporary data directory
pub fn test_service() -> Result<(LedgerService, TempDir)> {
    let temp_dir = TempDir::new()?;
    let service = open_service(&temp_dir)?;
    Ok((service, temp_dir))
}

/// Open (or reopen) the ledger stored in `dir`, simulating a process restart
pub fn open_service(dir: &TempDir) -> Result<LedgerService> {
    let service = LedgerService::open(StorageConfig::in_dir(dir.path()), AuditLog::in_memory())?;
    Ok(service)
}

/// Test fixture: two funded accounts
pub struct StandardAccounts {
    pub alice: AccountId,
    pub bob: AccountId,
}

impl StandardAccounts {
    pub const ALICE_PIN: &'static str = "1234";
    pub const BOB_PIN: &'static str = "4321";

    /// Create Alice and Bob, each funded with `amount`
    pub fn create_funded(service: &LedgerService, amount: Cents) -> Result<Self> {
        let alice = service.create_account("Alice", Self::ALICE_PIN)?.account.id();
        let bob = service.create_account("Bob", Self::BOB_PIN)?.account.id();
        if amount > 0 {
            service.deposit(alice, amount, Self::ALICE_PIN)?;
            service.deposit(bob, amount, Self::BOB_PIN)?;
        }
        Ok(Self { alice, bob })
    }
}
