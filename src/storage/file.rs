use std::fs;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info, warn};

use crate::domain::{AccountId, Cents, LedgerEntry};

use super::repository::{EntryStore, SharedStore};
use super::{AccountRepository, Snapshot, StorageConfig, create_backup, list_backups, prune_backups};

/// Repository backed by a JSON snapshot file with rotated backups.
///
/// The in-memory store is authoritative while the process runs; `flush`
/// writes it out atomically after backing up the previous snapshot. A flush
/// with no save, delete or id allocation since the last write touches no
/// files, so read-only sessions never rotate backups.
#[derive(Debug)]
pub struct FileRepository {
    config: StorageConfig,
    store: SharedStore,
    dirty: AtomicBool,
}

impl FileRepository {
    /// Open the repository described by `config`, creating its directories.
    ///
    /// An unreadable snapshot is replaced by the newest backup and loaded
    /// once more; if that fails too the repository starts empty.
    pub fn open(config: StorageConfig) -> Result<Self> {
        fs::create_dir_all(&config.data_dir)
            .with_context(|| format!("Failed to create {}", config.data_dir.display()))?;
        fs::create_dir_all(&config.backup_dir)
            .with_context(|| format!("Failed to create {}", config.backup_dir.display()))?;

        let store = Self::load(&config);
        Ok(Self {
            config,
            store: SharedStore::new(store),
            dirty: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::SeqCst);
    }

    fn load(config: &StorageConfig) -> EntryStore {
        let path = config.snapshot_path();
        if !path.exists() {
            info!(path = %path.display(), "No snapshot found, starting fresh");
            return EntryStore::default();
        }

        match Snapshot::read_from(&path) {
            Ok(snapshot) => {
                info!(
                    accounts = snapshot.accounts.len(),
                    path = %path.display(),
                    "Loaded snapshot"
                );
                EntryStore::from_snapshot(snapshot)
            }
            Err(err) => {
                warn!(error = %format!("{err:#}"), "Snapshot unreadable, restoring from backup");
                match Self::restore_from_backup(config) {
                    Ok(snapshot) => {
                        info!(accounts = snapshot.accounts.len(), "Restored snapshot from backup");
                        EntryStore::from_snapshot(snapshot)
                    }
                    Err(err) => {
                        warn!(error = %format!("{err:#}"), "Backup recovery failed, starting empty");
                        EntryStore::default()
                    }
                }
            }
        }
    }

    /// Copy the newest backup over the primary snapshot and load it.
    fn restore_from_backup(config: &StorageConfig) -> Result<Snapshot> {
        let backups = list_backups(&config.backup_dir)?;
        let newest = backups
            .first()
            .ok_or_else(|| anyhow!("No backups in {}", config.backup_dir.display()))?;

        let path = config.snapshot_path();
        fs::copy(newest, &path).with_context(|| {
            format!("Failed to restore {} from {}", path.display(), newest.display())
        })?;
        debug!(backup = %newest.display(), "Copied backup over snapshot");

        Snapshot::read_from(&path)
    }
}

impl AccountRepository for FileRepository {
    fn save(&self, entry: Arc<LedgerEntry>) -> Result<()> {
        if self.store.save(entry)? {
            self.mark_dirty();
        }
        Ok(())
    }

    fn find_by_id(&self, id: AccountId) -> Result<Option<Arc<LedgerEntry>>> {
        self.store.find_by_id(id)
    }

    fn find_all(&self) -> Result<Vec<Arc<LedgerEntry>>> {
        self.store.find_all()
    }

    fn delete_by_id(&self, id: AccountId) -> Result<bool> {
        let deleted = self.store.delete_by_id(id)?;
        if deleted {
            self.mark_dirty();
        }
        Ok(deleted)
    }

    fn find_by_owner_name_contains(&self, query: &str) -> Result<Vec<Arc<LedgerEntry>>> {
        self.store.find_by_owner_name_contains(query)
    }

    fn find_by_balance_greater_than(&self, min_balance: Cents) -> Result<Vec<Arc<LedgerEntry>>> {
        self.store.find_by_balance_greater_than(min_balance)
    }

    fn exists_by_id(&self, id: AccountId) -> Result<bool> {
        self.store.exists_by_id(id)
    }

    fn count(&self) -> Result<usize> {
        self.store.count()
    }

    fn next_id(&self) -> Result<AccountId> {
        let id = self.store.next_id()?;
        self.mark_dirty();
        Ok(id)
    }

    fn flush(&self) -> Result<()> {
        // Held for the whole flush so no save, delete or id grab interleaves.
        let store = self.store.write()?;
        // Writers mark the flag after their change lands, so a change missed
        // here stays marked for the next flush.
        if !self.dirty.swap(false, Ordering::SeqCst) {
            debug!("Nothing changed since last flush");
            return Ok(());
        }
        match self.write_snapshot(&store) {
            Ok(()) => Ok(()),
            Err(err) => {
                self.mark_dirty();
                Err(err)
            }
        }
    }
}

impl FileRepository {
    fn write_snapshot(&self, store: &EntryStore) -> Result<()> {
        let snapshot = store.to_snapshot()?;
        let path = self.config.snapshot_path();

        if path.exists() {
            if let Err(err) = create_backup(&path, &self.config.backup_dir) {
                warn!(error = %format!("{err:#}"), "Failed to back up snapshot");
            }
        }

        snapshot.write_atomic(&path)?;

        match prune_backups(&self.config.backup_dir, self.config.max_backups) {
            Ok(0) => {}
            Ok(removed) => debug!(removed, "Pruned old backups"),
            Err(err) => warn!(error = %format!("{err:#}"), "Failed to prune backups"),
        }

        debug!(
            accounts = snapshot.accounts.len(),
            next_id = store.next_id_value(),
            "Flushed snapshot"
        );
        Ok(())
    }
}
