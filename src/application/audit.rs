use std::collections::VecDeque;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Local;
use tracing::{info, warn};

/// Lines kept in memory regardless of the file sink.
pub const MAX_MEMORY_LOGS: usize = 100;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One human-readable line per completed operation.
///
/// Lines go to an in-memory ring of the latest [`MAX_MEMORY_LOGS`], to an
/// optional append-only file, and to `tracing`. Writing the file is best
/// effort: failures are reported and the line is still kept in memory.
#[derive(Debug)]
pub struct AuditLog {
    inner: Mutex<AuditState>,
    path: Option<PathBuf>,
}

#[derive(Debug, Default)]
struct AuditState {
    recent: VecDeque<String>,
    writer: Option<BufWriter<File>>,
}

impl AuditLog {
    /// Memory-only log.
    pub fn in_memory() -> Self {
        Self {
            inner: Mutex::new(AuditState::default()),
            path: None,
        }
    }

    /// Log that also appends to `path`. The file is opened on first use.
    pub fn with_file(path: impl AsRef<Path>) -> Self {
        Self {
            inner: Mutex::new(AuditState::default()),
            path: Some(path.as_ref().to_path_buf()),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn record(&self, message: impl AsRef<str>) {
        let message = message.as_ref();
        let line = format!("[{}] {}", Local::now().format(TIMESTAMP_FORMAT), message);
        info!(target: "audit", "{}", message);

        let Ok(mut state) = self.inner.lock() else {
            warn!("Audit log lock poisoned, dropping line");
            return;
        };

        state.recent.push_back(line.clone());
        while state.recent.len() > MAX_MEMORY_LOGS {
            state.recent.pop_front();
        }

        if let Some(path) = &self.path {
            if let Err(err) = state.append(path, &line) {
                warn!(path = %path.display(), error = %err, "Failed to write audit log");
                state.writer = None;
            }
        }
    }

    /// The newest `count` lines, oldest first.
    pub fn recent(&self, count: usize) -> Vec<String> {
        match self.inner.lock() {
            Ok(state) => {
                let start = state.recent.len().saturating_sub(count);
                state.recent.iter().skip(start).cloned().collect()
            }
            Err(_) => Vec::new(),
        }
    }

    /// Read the last `max_lines` lines back from the log file.
    pub fn read_file_tail(&self, max_lines: usize) -> std::io::Result<Vec<String>> {
        let Some(path) = &self.path else {
            return Ok(Vec::new());
        };
        if !path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(path)?;
        let lines: Vec<&str> = content.lines().collect();
        let start = lines.len().saturating_sub(max_lines);
        Ok(lines[start..].iter().map(|l| l.to_string()).collect())
    }
}

impl AuditState {
    fn append(&mut self, path: &Path, line: &str) -> std::io::Result<()> {
        if self.writer.is_none() {
            self.writer = Some(open_log_file(path)?);
        }
        if let Some(writer) = self.writer.as_mut() {
            writeln!(writer, "{}", line)?;
            writer.flush()?;
        }
        Ok(())
    }
}

fn open_log_file(path: &Path) -> std::io::Result<BufWriter<File>> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let is_new = file.metadata()?.len() == 0;
    let mut writer = BufWriter::new(file);
    if is_new {
        writeln!(
            writer,
            "=== Transaction Log Started: {} ===",
            Local::now().format(TIMESTAMP_FORMAT)
        )?;
        writer.flush()?;
    }
    Ok(writer)
}
