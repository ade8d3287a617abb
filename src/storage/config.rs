use std::path::{Path, PathBuf};

pub const DEFAULT_DATA_DIR: &str = "data";
pub const DEFAULT_SNAPSHOT_FILE: &str = "accounts.json";
pub const DEFAULT_MAX_BACKUPS: usize = 5;

/// Where the file repository keeps its snapshot and backups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
    pub file_name: String,
    pub backup_dir: PathBuf,
    /// Number of rotated backups to retain
    pub max_backups: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::in_dir(DEFAULT_DATA_DIR)
    }
}

impl StorageConfig {
    /// Snapshot at `<dir>/accounts.json`, backups under `<dir>/backups`.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let data_dir = dir.as_ref().to_path_buf();
        Self {
            backup_dir: data_dir.join("backups"),
            data_dir,
            file_name: DEFAULT_SNAPSHOT_FILE.to_string(),
            max_backups: DEFAULT_MAX_BACKUPS,
        }
    }

    pub fn with_max_backups(mut self, max_backups: usize) -> Self {
        self.max_backups = max_backups;
        self
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.data_dir.join(&self.file_name)
    }
}
