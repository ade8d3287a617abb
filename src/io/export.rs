use anyhow::Result;
use std::io::Write;

use crate::application::LedgerService;
use crate::domain::{AccountId, format_cents};
use crate::storage::AccountRepository;

/// Exporter for writing ledger data as CSV
pub struct Exporter<'a, R: AccountRepository> {
    service: &'a LedgerService<R>,
}

impl<'a, R: AccountRepository> Exporter<'a, R> {
    pub fn new(service: &'a LedgerService<R>) -> Self {
        Self { service }
    }

    /// Export one account's transaction history, oldest first
    pub fn export_history_csv<W: Write>(&self, id: AccountId, writer: W) -> Result<usize> {
        let history = self.service.history(id)?;
        let mut csv_writer = csv::Writer::from_writer(writer);

        csv_writer.write_record([
            "id",
            "timestamp",
            "kind",
            "amount",
            "from_account",
            "to_account",
            "description",
        ])?;

        let mut count = 0;
        for tx in &history {
            csv_writer.write_record(&[
                tx.id().to_string(),
                tx.timestamp().to_rfc3339(),
                tx.kind().as_str().to_string(),
                format_cents(tx.amount()),
                tx.from_account().to_string(),
                tx.to_account().to_string(),
                tx.description().unwrap_or_default().to_string(),
            ])?;
            count += 1;
        }

        csv_writer.flush()?;
        Ok(count)
    }

    /// Export every account with its current balance
    pub fn export_accounts_csv<W: Write>(&self, writer: W) -> Result<usize> {
        let accounts = self.service.list_accounts()?;
        let mut csv_writer = csv::Writer::from_writer(writer);

        csv_writer.write_record(["id", "owner", "balance", "locked", "created_at"])?;

        let mut count = 0;
        for record in &accounts {
            let account = &record.account;
            csv_writer.write_record(&[
                account.id().to_string(),
                account.owner_name().to_string(),
                format_cents(account.balance()),
                account.is_locked().to_string(),
                account.created_at().to_rfc3339(),
            ])?;
            count += 1;
        }

        csv_writer.flush()?;
        Ok(count)
    }
}
