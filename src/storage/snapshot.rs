use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{AccountId, EntryRecord};

pub const SNAPSHOT_VERSION: u32 = 1;

const BACKUP_PREFIX: &str = "accounts_backup_";
const BACKUP_SUFFIX: &str = ".json";

/// Full durable form of the repository: every entry and the id counter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: u32,
    pub saved_at: DateTime<Utc>,
    pub next_id: AccountId,
    pub accounts: Vec<EntryRecord>,
}

impl Snapshot {
    pub fn new(next_id: AccountId, accounts: Vec<EntryRecord>) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            saved_at: Utc::now(),
            next_id,
            accounts,
        }
    }

    /// Read and validate a snapshot. Truncated or inconsistent files are errors.
    pub fn read_from(path: &Path) -> Result<Self> {
        let bytes = fs::read(path)
            .with_context(|| format!("Failed to read snapshot {}", path.display()))?;
        let snapshot: Snapshot = serde_json::from_slice(&bytes)
            .with_context(|| format!("Corrupt snapshot {}", path.display()))?;
        snapshot.validate()?;
        Ok(snapshot)
    }

    fn validate(&self) -> Result<()> {
        if self.version != SNAPSHOT_VERSION {
            bail!("Unsupported snapshot version {}", self.version);
        }
        let mut seen = HashSet::new();
        for record in &self.accounts {
            if !seen.insert(record.account.id()) {
                bail!("Duplicate account id {} in snapshot", record.account.id());
            }
        }
        Ok(())
    }

    /// Write to a temporary file beside `path`, then rename over it.
    /// Readers see either the old snapshot or the new one, never a partial file.
    pub fn write_atomic(&self, path: &Path) -> Result<()> {
        let tmp_path = temp_path(path);

        let file = File::create(&tmp_path)
            .with_context(|| format!("Failed to create {}", tmp_path.display()))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, self).context("Failed to serialize snapshot")?;
        writer.flush().context("Failed to write snapshot")?;
        writer
            .get_ref()
            .sync_all()
            .context("Failed to sync snapshot")?;
        drop(writer);

        fs::rename(&tmp_path, path).with_context(|| {
            format!(
                "Failed to replace {} with {}",
                path.display(),
                tmp_path.display()
            )
        })?;
        Ok(())
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

// ========================
// Backup rotation
// ========================

/// Backup file name for the given instant, e.g. `accounts_backup_20240115T093000123456.json`.
pub fn backup_file_name(at: DateTime<Utc>) -> String {
    format!(
        "{}{}{}",
        BACKUP_PREFIX,
        at.format("%Y%m%dT%H%M%S%6f"),
        BACKUP_SUFFIX
    )
}

fn is_backup_name(name: &str) -> bool {
    name.starts_with(BACKUP_PREFIX) && name.ends_with(BACKUP_SUFFIX)
}

/// Copy the current snapshot into the backup directory.
pub fn create_backup(snapshot_path: &Path, backup_dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(backup_dir)
        .with_context(|| format!("Failed to create {}", backup_dir.display()))?;
    let backup_path = backup_dir.join(backup_file_name(Utc::now()));
    fs::copy(snapshot_path, &backup_path).with_context(|| {
        format!(
            "Failed to back up {} to {}",
            snapshot_path.display(),
            backup_path.display()
        )
    })?;
    Ok(backup_path)
}

/// Backups in `backup_dir`, newest first (by modification time, then name).
pub fn list_backups(backup_dir: &Path) -> Result<Vec<PathBuf>> {
    if !backup_dir.exists() {
        return Ok(Vec::new());
    }

    let mut backups: Vec<(SystemTime, PathBuf)> = Vec::new();
    for entry in fs::read_dir(backup_dir)
        .with_context(|| format!("Failed to list {}", backup_dir.display()))?
    {
        let entry = entry?;
        let path = entry.path();
        let is_backup = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(is_backup_name);
        if !is_backup || !path.is_file() {
            continue;
        }
        let modified = entry
            .metadata()
            .and_then(|m| m.modified())
            .unwrap_or(SystemTime::UNIX_EPOCH);
        backups.push((modified, path));
    }

    backups.sort_by(|a, b| b.cmp(a));
    Ok(backups.into_iter().map(|(_, path)| path).collect())
}

/// Delete all but the `keep` newest backups. Returns how many were removed.
pub fn prune_backups(backup_dir: &Path, keep: usize) -> Result<usize> {
    let mut removed = 0;
    for stale in list_backups(backup_dir)?.into_iter().skip(keep) {
        fs::remove_file(&stale)
            .with_context(|| format!("Failed to remove backup {}", stale.display()))?;
        removed += 1;
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use tempfile::TempDir;

    use super::*;
    use crate::domain::LedgerEntry;

    fn sample() -> Snapshot {
        let entry = LedgerEntry::open(1, "Aruzhan", "1234").unwrap();
        entry.deposit(2500).unwrap();
        Snapshot::new(2, vec![entry.snapshot().unwrap()])
    }

    #[test]
    fn test_write_then_read() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("accounts.json");

        let snapshot = sample();
        snapshot.write_atomic(&path).unwrap();

        assert_eq!(Snapshot::read_from(&path).unwrap(), snapshot);
        assert!(!temp_path(&path).exists());
    }

    #[test]
    fn test_truncated_snapshot_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("accounts.json");
        sample().write_atomic(&path).unwrap();

        let bytes = fs::read(&path).unwrap();
        fs::write(&path, &bytes[..bytes.len() / 2]).unwrap();

        assert!(Snapshot::read_from(&path).is_err());
    }

    #[test]
    fn test_duplicate_ids_are_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("accounts.json");
        let mut snapshot = sample();
        snapshot.accounts.push(snapshot.accounts[0].clone());
        snapshot.write_atomic(&path).unwrap();

        let err = Snapshot::read_from(&path).unwrap_err();
        assert!(err.to_string().contains("Duplicate account id 1"));
    }

    #[test]
    fn test_backup_file_name() {
        let at = Utc.with_ymd_and_hms(2024, 1, 15, 9, 30, 0).unwrap();
        assert_eq!(
            backup_file_name(at),
            "accounts_backup_20240115T093000000000.json"
        );
        assert!(is_backup_name(&backup_file_name(at)));
        assert!(!is_backup_name("accounts.json"));
    }

    #[test]
    fn test_prune_keeps_newest() {
        let dir = TempDir::new().unwrap();
        for i in 0..7 {
            let at = Utc.with_ymd_and_hms(2024, 1, 15, 9, 30, i).unwrap();
            fs::write(dir.path().join(backup_file_name(at)), "{}").unwrap();
        }
        fs::write(dir.path().join("notes.txt"), "keep me").unwrap();

        assert_eq!(prune_backups(dir.path(), 5).unwrap(), 2);

        let remaining = list_backups(dir.path()).unwrap();
        assert_eq!(remaining.len(), 5);
        assert!(dir.path().join("notes.txt").exists());
        let newest = remaining[0].file_name().unwrap().to_str().unwrap();
        assert_eq!(newest, "accounts_backup_20240115T093006000000.json");
    }

    #[test]
    fn test_list_backups_missing_dir() {
        let dir = TempDir::new().unwrap();
        assert!(list_backups(&dir.path().join("nope")).unwrap().is_empty());
    }
}
