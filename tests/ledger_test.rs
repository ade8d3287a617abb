mod common;

use std::thread;

use anyhow::Result;
use common::{StandardAccounts, open_service, test_service};
use pinledger::application::AppError;
use pinledger::domain::TransactionKind;

#[test]
fn test_deposit_withdraw_transfer_scenario() -> Result<()> {
    let (service, temp) = test_service()?;

    let asel = service.create_account("Asel", "1234")?.account.id();
    service.deposit(asel, 10000, "1234")?;

    // Overdraft is refused and changes nothing
    let err = service.withdraw(asel, 15000, "1234").unwrap_err();
    assert!(matches!(
        err,
        AppError::InsufficientFunds {
            balance: 10000,
            requested: 15000
        }
    ));

    service.withdraw(asel, 5000, "1234")?;
    let berik = service.create_account("Berik", "4321")?.account.id();
    service.transfer(asel, berik, 2000, "1234")?;

    assert_eq!(service.get_account(asel)?.account.balance(), 3000);
    assert_eq!(service.get_account(berik)?.account.balance(), 2000);
    drop(service);

    // Everything survives a restart
    let service = open_service(&temp)?;
    assert_eq!(service.get_account(asel)?.account.balance(), 3000);
    assert_eq!(service.get_account(berik)?.account.balance(), 2000);
    assert_eq!(service.account_count()?, 2);

    Ok(())
}

#[test]
fn test_transfer_records_both_sides() -> Result<()> {
    let (service, _temp) = test_service()?;
    let accounts = StandardAccounts::create_funded(&service, 5000)?;

    service.transfer(
        accounts.alice,
        accounts.bob,
        1250,
        StandardAccounts::ALICE_PIN,
    )?;

    let out = service.transactions_by_kind(accounts.alice, TransactionKind::TransferOut)?;
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].amount(), 1250);
    assert_eq!(out[0].from_account(), accounts.alice);
    assert_eq!(out[0].to_account(), accounts.bob);

    let incoming = service.transactions_by_kind(accounts.bob, TransactionKind::TransferIn)?;
    assert_eq!(incoming.len(), 1);
    assert_eq!(incoming[0].amount(), 1250);
    assert_eq!(incoming[0].from_account(), accounts.alice);

    Ok(())
}

#[test]
fn test_failed_transfers_change_nothing() -> Result<()> {
    let (service, _temp) = test_service()?;
    let accounts = StandardAccounts::create_funded(&service, 5000)?;
    let alice_history = service.history(accounts.alice)?.len();
    let bob_history = service.history(accounts.bob)?.len();

    // Missing destination: the source is never debited
    let err = service
        .transfer(accounts.alice, 999, 1000, StandardAccounts::ALICE_PIN)
        .unwrap_err();
    assert!(matches!(err, AppError::AccountNotFound(999)));

    // Not enough money
    let err = service
        .transfer(accounts.alice, accounts.bob, 5001, StandardAccounts::ALICE_PIN)
        .unwrap_err();
    assert!(matches!(err, AppError::InsufficientFunds { .. }));

    // Invalid amount
    let err = service
        .transfer(accounts.alice, accounts.bob, 0, StandardAccounts::ALICE_PIN)
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidAmount(0)));

    // Same account
    let err = service
        .transfer(accounts.alice, accounts.alice, 10, StandardAccounts::ALICE_PIN)
        .unwrap_err();
    assert!(matches!(err, AppError::SameAccount));

    assert_eq!(service.get_account(accounts.alice)?.account.balance(), 5000);
    assert_eq!(service.get_account(accounts.bob)?.account.balance(), 5000);
    assert_eq!(service.history(accounts.alice)?.len(), alice_history);
    assert_eq!(service.history(accounts.bob)?.len(), bob_history);

    Ok(())
}

#[test]
fn test_lockout_survives_restart() -> Result<()> {
    let (service, temp) = test_service()?;
    let accounts = StandardAccounts::create_funded(&service, 1000)?;

    let err = service.withdraw(accounts.alice, 100, "0000").unwrap_err();
    assert!(matches!(
        err,
        AppError::WrongPin {
            attempts_remaining: 2,
            ..
        }
    ));
    drop(service);

    // The failed attempt was persisted
    let service = open_service(&temp)?;
    let err = service
        .transfer(accounts.alice, accounts.bob, 100, "0000")
        .unwrap_err();
    assert!(matches!(
        err,
        AppError::WrongPin {
            attempts_remaining: 1,
            ..
        }
    ));
    let err = service.deposit(accounts.alice, 100, "0000").unwrap_err();
    assert!(matches!(err, AppError::AccountLocked { .. }));
    drop(service);

    let service = open_service(&temp)?;
    assert!(service.get_account(accounts.alice)?.account.is_locked());
    let err = service
        .deposit(accounts.alice, 100, StandardAccounts::ALICE_PIN)
        .unwrap_err();
    assert!(matches!(err, AppError::AccountLocked { .. }));

    service.unlock_account(accounts.alice)?;
    assert_eq!(
        service.deposit(accounts.alice, 100, StandardAccounts::ALICE_PIN)?,
        1100
    );

    let locked = service.transactions_by_kind(accounts.alice, TransactionKind::AccountLocked)?;
    let unlocked =
        service.transactions_by_kind(accounts.alice, TransactionKind::AccountUnlocked)?;
    assert_eq!(locked.len(), 1);
    assert_eq!(unlocked.len(), 1);

    Ok(())
}

#[test]
fn test_change_pin_persists() -> Result<()> {
    let (service, temp) = test_service()?;
    let accounts = StandardAccounts::create_funded(&service, 0)?;

    service.change_pin(accounts.bob, StandardAccounts::BOB_PIN, "9090")?;
    drop(service);

    let service = open_service(&temp)?;
    assert!(matches!(
        service.deposit(accounts.bob, 100, StandardAccounts::BOB_PIN),
        Err(AppError::WrongPin { .. })
    ));
    assert_eq!(service.deposit(accounts.bob, 100, "9090")?, 100);

    Ok(())
}

#[test]
fn test_delete_and_cleanup() -> Result<()> {
    let (service, temp) = test_service()?;
    let accounts = StandardAccounts::create_funded(&service, 500)?;
    let carol = service.create_account("Carol", "1111")?.account.id();

    // Positive balance blocks deletion
    let err = service
        .delete_account(accounts.alice, StandardAccounts::ALICE_PIN)
        .unwrap_err();
    assert!(matches!(err, AppError::BusinessRuleViolation(_)));

    service.withdraw(accounts.alice, 500, StandardAccounts::ALICE_PIN)?;
    assert!(service.delete_account(accounts.alice, StandardAccounts::ALICE_PIN)?);

    // Lock Carol (empty) and Bob (funded); only Carol is cleaned up
    for _ in 0..3 {
        let _ = service.deposit(carol, 100, "0000");
        let _ = service.deposit(accounts.bob, 100, "0000");
    }
    assert_eq!(service.cleanup_locked_accounts()?, 1);
    drop(service);

    let service = open_service(&temp)?;
    let ids: Vec<_> = service
        .list_accounts()?
        .iter()
        .map(|r| r.account.id())
        .collect();
    assert_eq!(ids, vec![accounts.bob]);

    // Ids are never reused
    let dave = service.create_account("Dave", "2222")?.account.id();
    assert_eq!(dave, carol + 1);

    Ok(())
}

#[test]
fn test_statistics() -> Result<()> {
    let (service, _temp) = test_service()?;
    let accounts = StandardAccounts::create_funded(&service, 10000)?;
    service.withdraw(accounts.alice, 2000, StandardAccounts::ALICE_PIN)?;
    service.transfer(accounts.bob, accounts.alice, 3000, StandardAccounts::BOB_PIN)?;

    let alice = service.account_statistics(accounts.alice)?;
    assert_eq!(alice.owner_name, "Alice");
    assert_eq!(alice.current_balance, 11000);
    assert_eq!(alice.total_deposited, 13000);
    assert_eq!(alice.total_withdrawn, 2000);
    // created, deposit, withdraw, transfer in
    assert_eq!(alice.transaction_count, 4);

    let bank = service.bank_statistics()?;
    assert_eq!(bank.total_accounts, 2);
    assert_eq!(bank.active_accounts, 2);
    assert_eq!(bank.locked_accounts, 0);
    assert_eq!(bank.total_balance, 20000);

    Ok(())
}

#[test]
fn test_concurrent_transfers_conserve_money() -> Result<()> {
    let (service, _temp) = test_service()?;
    let accounts = StandardAccounts::create_funded(&service, 10000)?;
    let carol = service.create_account("Carol", "1111")?.account.id();
    service.deposit(carol, 10000, "1111")?;

    let routes = [
        (accounts.alice, accounts.bob, StandardAccounts::ALICE_PIN),
        (accounts.bob, accounts.alice, StandardAccounts::BOB_PIN),
        (accounts.bob, carol, StandardAccounts::BOB_PIN),
        (carol, accounts.alice, "1111"),
        (accounts.alice, carol, StandardAccounts::ALICE_PIN),
        (carol, accounts.bob, "1111"),
    ];

    thread::scope(|s| {
        for (from, to, pin) in routes {
            let service = &service;
            s.spawn(move || {
                for i in 0..50 {
                    match service.transfer(from, to, 10 + i, pin) {
                        Ok(()) | Err(AppError::InsufficientFunds { .. }) => {}
                        Err(err) => panic!("unexpected transfer error: {err}"),
                    }
                }
            });
        }
    });

    let total: i64 = service
        .list_accounts()?
        .iter()
        .map(|r| r.account.balance())
        .sum();
    assert_eq!(total, 30000);
    assert_eq!(service.bank_statistics()?.total_balance, 30000);

    Ok(())
}
