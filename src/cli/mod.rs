use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use crate::application::{AuditLog, LedgerService};
use crate::domain::{AccountId, Cents, EntryRecord, TransactionKind, format_cents, parse_cents};
use crate::storage::{DEFAULT_MAX_BACKUPS, FileRepository, StorageConfig};

const AUDIT_LOG_FILE: &str = "transactions.log";

/// Pinledger - PIN-protected bank account ledger
#[derive(Parser)]
#[command(name = "pinledger")]
#[command(about = "A file-backed ledger of PIN-protected bank accounts")]
#[command(version)]
pub struct Cli {
    /// Directory holding the snapshot, backups and audit log
    #[arg(short, long, global = true, default_value = "data")]
    pub data_dir: PathBuf,

    /// Number of snapshot backups to keep
    #[arg(long, global = true, default_value_t = DEFAULT_MAX_BACKUPS)]
    pub max_backups: usize,

    /// Keep the audit log in memory only
    #[arg(long, global = true)]
    pub no_audit_file: bool,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Open a new account
    Create {
        /// Owner name
        owner: String,

        /// Four-digit PIN
        #[arg(long)]
        pin: String,
    },

    /// Deposit money into an account
    Deposit {
        id: AccountId,

        /// Amount (e.g., "50.00" or "50")
        amount: String,

        #[arg(long)]
        pin: String,
    },

    /// Withdraw money from an account
    Withdraw {
        id: AccountId,

        /// Amount (e.g., "50.00" or "50")
        amount: String,

        #[arg(long)]
        pin: String,
    },

    /// Transfer money between accounts
    Transfer {
        /// Amount to transfer (e.g., "50.00" or "50")
        amount: String,

        /// Source account id
        #[arg(long)]
        from: AccountId,

        /// Destination account id
        #[arg(long)]
        to: AccountId,

        /// PIN of the source account
        #[arg(long)]
        pin: String,
    },

    /// Change an account's PIN
    ChangePin {
        id: AccountId,

        #[arg(long)]
        old: String,

        #[arg(long)]
        new: String,
    },

    /// Unlock a locked account
    Unlock { id: AccountId },

    /// Delete an account with a zero balance
    Delete {
        id: AccountId,

        #[arg(long)]
        pin: String,
    },

    /// Delete every locked account with a zero balance
    Cleanup,

    /// Show account details
    Show { id: AccountId },

    /// List all accounts
    List,

    /// Find accounts by owner name (case-insensitive substring)
    Search { query: String },

    /// List accounts with a balance above the given amount
    Rich {
        /// Minimum balance (exclusive)
        min: String,
    },

    /// Show an account's transaction history
    History {
        id: AccountId,

        /// Only the newest N transactions
        #[arg(short, long)]
        last: Option<usize>,

        /// Filter by kind (deposit, withdraw, transfer_in, transfer_out, ...)
        #[arg(short, long)]
        kind: Option<String>,
    },

    /// Show statistics for one account or the whole bank
    Stats { id: Option<AccountId> },

    /// Export an account's history as CSV
    Export {
        id: AccountId,

        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show the newest audit log lines
    Logs {
        #[arg(short = 'n', long, default_value = "20")]
        count: usize,
    },
}

impl Cli {
    fn storage_config(&self) -> StorageConfig {
        StorageConfig::in_dir(&self.data_dir).with_max_backups(self.max_backups)
    }

    fn audit_log(&self) -> AuditLog {
        if self.no_audit_file {
            AuditLog::in_memory()
        } else {
            AuditLog::with_file(self.data_dir.join("logs").join(AUDIT_LOG_FILE))
        }
    }

    pub fn run(self) -> Result<()> {
        let service = LedgerService::open(self.storage_config(), self.audit_log())
            .context("Failed to open ledger")?;

        let result = run_command(&service, self.command);
        service.close().context("Failed to close ledger")?;
        result
    }
}

fn run_command(service: &LedgerService<FileRepository>, command: Commands) -> Result<()> {
    match command {
        Commands::Create { owner, pin } => {
            let record = service.create_account(&owner, &pin)?;
            println!(
                "Created account #{} for {}",
                record.account.id(),
                record.account.owner_name()
            );
        }

        Commands::Deposit { id, amount, pin } => {
            let amount = parse_amount(&amount)?;
            let balance = service.deposit(id, amount, &pin)?;
            println!(
                "Deposited {} into #{}. New balance: {}",
                format_cents(amount),
                id,
                format_cents(balance)
            );
        }

        Commands::Withdraw { id, amount, pin } => {
            let amount = parse_amount(&amount)?;
            let balance = service.withdraw(id, amount, &pin)?;
            println!(
                "Withdrew {} from #{}. New balance: {}",
                format_cents(amount),
                id,
                format_cents(balance)
            );
        }

        Commands::Transfer {
            amount,
            from,
            to,
            pin,
        } => {
            let amount = parse_amount(&amount)?;
            service.transfer(from, to, amount, &pin)?;
            println!("Transferred {}: #{} -> #{}", format_cents(amount), from, to);
        }

        Commands::ChangePin { id, old, new } => {
            service.change_pin(id, &old, &new)?;
            println!("PIN changed for #{}", id);
        }

        Commands::Unlock { id } => {
            service.unlock_account(id)?;
            println!("Unlocked account #{}", id);
        }

        Commands::Delete { id, pin } => {
            if service.delete_account(id, &pin)? {
                println!("Deleted account #{}", id);
            } else {
                println!("Account #{} was already gone", id);
            }
        }

        Commands::Cleanup => {
            let removed = service.cleanup_locked_accounts()?;
            println!("Removed {} locked account(s) with zero balance", removed);
        }

        Commands::Show { id } => {
            let record = service.get_account(id)?;
            print_account(&record);
        }

        Commands::List => print_account_table(&service.list_accounts()?),

        Commands::Search { query } => print_account_table(&service.search_by_owner(&query)?),

        Commands::Rich { min } => {
            let min = parse_cents(&min).context("Invalid amount format. Use '50.00' or '50'")?;
            print_account_table(&service.accounts_with_min_balance(min)?);
        }

        Commands::History { id, last, kind } => {
            let transactions = match (kind, last) {
                (Some(kind), _) => {
                    let kind = TransactionKind::from_str(&kind).with_context(|| {
                        format!(
                            "Invalid transaction kind '{}'. Valid kinds: {}",
                            kind,
                            TransactionKind::ALL
                                .iter()
                                .map(|k| k.as_str().to_lowercase())
                                .collect::<Vec<_>>()
                                .join(", ")
                        )
                    })?;
                    service.transactions_by_kind(id, kind)?
                }
                (None, Some(count)) => service.last_transactions(id, count)?,
                (None, None) => service.history(id)?,
            };

            if transactions.is_empty() {
                println!("No transactions found.");
            }
            for tx in transactions {
                println!("{}", tx);
            }
        }

        Commands::Stats { id: Some(id) } => {
            let stats = service.account_statistics(id)?;
            println!("Account #{} ({})", stats.account_id, stats.owner_name);
            println!("  Balance:         {}", format_cents(stats.current_balance));
            println!("  Total deposited: {}", format_cents(stats.total_deposited));
            println!("  Total withdrawn: {}", format_cents(stats.total_withdrawn));
            println!("  Transactions:    {}", stats.transaction_count);
            println!(
                "  Status:          {}",
                if stats.locked { "LOCKED" } else { "active" }
            );
        }

        Commands::Stats { id: None } => {
            let stats = service.bank_statistics()?;
            println!("Accounts:      {}", stats.total_accounts);
            println!("  Active:      {}", stats.active_accounts);
            println!("  Locked:      {}", stats.locked_accounts);
            println!("Total balance: {}", format_cents(stats.total_balance));
        }

        Commands::Export { id, output } => run_export_command(service, id, output)?,

        Commands::Logs { count } => {
            let lines = match service.audit_log().read_file_tail(count) {
                Ok(lines) if !lines.is_empty() => lines,
                _ => service.recent_logs(count),
            };
            for line in lines {
                println!("{}", line);
            }
        }
    }

    Ok(())
}

fn parse_amount(input: &str) -> Result<Cents> {
    parse_cents(input).context("Invalid amount format. Use '50.00' or '50'")
}

fn print_account(record: &EntryRecord) {
    let account = &record.account;
    println!("Account #{}", account.id());
    println!("  Owner:    {}", account.owner_name());
    println!("  Balance:  {}", format_cents(account.balance()));
    println!(
        "  Status:   {}",
        if account.is_locked() { "LOCKED" } else { "active" }
    );
    println!(
        "  Created:  {}",
        account.created_at().format("%Y-%m-%d %H:%M:%S")
    );
    println!(
        "  Modified: {}",
        account.last_modified().format("%Y-%m-%d %H:%M:%S")
    );
    println!("  History:  {} transaction(s)", record.history.len());
}

fn print_account_table(records: &[EntryRecord]) {
    if records.is_empty() {
        println!("No accounts found.");
        return;
    }
    println!("{:<6} {:<24} {:>14} {:<8}", "ID", "OWNER", "BALANCE", "STATUS");
    println!("{}", "-".repeat(55));
    for record in records {
        let account = &record.account;
        println!(
            "{:<6} {:<24} {:>14} {:<8}",
            account.id(),
            account.owner_name(),
            format_cents(account.balance()),
            if account.is_locked() { "LOCKED" } else { "active" }
        );
    }
}

fn run_export_command(
    service: &LedgerService<FileRepository>,
    id: AccountId,
    output: Option<PathBuf>,
) -> Result<()> {
    use crate::io::Exporter;
    use std::fs::File;
    use std::io::{Write, stdout};

    let exporter = Exporter::new(service);

    let writer: Box<dyn Write> = match &output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create output file: {}", path.display()))?;
            Box::new(file)
        }
        None => Box::new(stdout()),
    };

    let count = exporter.export_history_csv(id, writer)?;
    if output.is_some() {
        eprintln!("Exported {} transactions", count);
    }
    Ok(())
}
