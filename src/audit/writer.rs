//! JSONL audit log writer with daily file rotation.

use std::{
    fs::{self, OpenOptions},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
    sync::Mutex,
};

use chrono::{NaiveDate, Utc};
use tracing::warn;

use super::{AuditEntry, AuditLogger};
use crate::{AppError, Result};

struct WriterState {
    current_date: NaiveDate,
    writer: BufWriter<fs::File>,
}

/// A daily-rotating JSONL audit log writer.
///
/// Appends one JSON object per line to `<log_dir>/<prefix>-YYYY-MM-DD.jsonl`
/// and opens a new file when the calendar date changes between writes.
pub struct JsonlAuditWriter {
    log_dir: PathBuf,
    prefix: String,
    state: Mutex<Option<WriterState>>,
}

impl JsonlAuditWriter {
    /// Construct a writer that stores `<prefix>-*.jsonl` files in `log_dir`.
    ///
    /// Creates `log_dir` and all parent directories if they do not exist.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Io`] if the directory cannot be created.
    pub fn new(log_dir: PathBuf, prefix: &str) -> Result<Self> {
        fs::create_dir_all(&log_dir).map_err(|e| {
            AppError::Io(format!(
                "failed to create audit log directory {}: {e}",
                log_dir.display()
            ))
        })?;
        Ok(Self {
            log_dir,
            prefix: prefix.to_owned(),
            state: Mutex::new(None),
        })
    }

    /// Path of the file entries written today land in.
    #[must_use]
    pub fn current_path(&self) -> PathBuf {
        Self::path_for(&self.log_dir, &self.prefix, Utc::now().date_naive())
    }

    fn path_for(log_dir: &Path, prefix: &str, date: NaiveDate) -> PathBuf {
        log_dir.join(format!("{prefix}-{date}.jsonl"))
    }

    fn open_for_date(&self, date: NaiveDate) -> Result<BufWriter<fs::File>> {
        let path = Self::path_for(&self.log_dir, &self.prefix, date);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| AppError::Io(format!("failed to open audit log {}: {e}", path.display())))?;
        Ok(BufWriter::new(file))
    }
}

impl AuditLogger for JsonlAuditWriter {
    fn log_entry(&self, entry: AuditEntry) -> Result<()> {
        let today = Utc::now().date_naive();

        let mut guard = self
            .state
            .lock()
            .map_err(|_| AppError::Io("audit writer mutex poisoned".to_owned()))?;

        if guard.as_ref().is_none_or(|s| s.current_date != today) {
            let writer = self.open_for_date(today)?;
            *guard = Some(WriterState {
                current_date: today,
                writer,
            });
        }

        if let Some(state) = guard.as_mut() {
            let line = serde_json::to_string(&entry)
                .map_err(|e| AppError::Io(format!("failed to serialize audit entry: {e}")))?;
            if let Err(e) = writeln!(state.writer, "{line}") {
                warn!("failed to write audit log entry: {e}");
                return Err(AppError::Io(format!("audit write failed: {e}")));
            }
            if let Err(e) = state.writer.flush() {
                warn!("failed to flush audit log: {e}");
                return Err(AppError::Io(format!("audit flush failed: {e}")));
            }
        }

        Ok(())
    }
}
