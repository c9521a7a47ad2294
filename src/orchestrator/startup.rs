//! Startup sequencing: session defaults and a best-effort hygiene pass.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use tracing::{debug, error, info, info_span};
use walkdir::WalkDir;

use crate::config::GlobalConfig;
use crate::context::SessionContext;
use crate::speech::Conversation;
use crate::{AppError, Result};

const SECONDS_PER_DAY: u64 = 86_400;

/// Locations and limits used by the hygiene pass.
#[derive(Debug, Clone)]
pub struct Hygiene {
    /// Directory holding log files subject to retention.
    pub logs_dir: PathBuf,
    /// Log files more than this many whole days old are deleted.
    pub retention_days: u32,
    /// Tree searched for cache directories.
    pub working_dir: PathBuf,
    /// Reserved cache directory name.
    pub cache_dir_name: String,
    /// Directory whose files get the owner-execute bit.
    pub data_dir: PathBuf,
    /// Extension left untouched by the permission pass.
    pub exempt_extension: String,
}

impl Hygiene {
    /// Hygiene settings from configuration.
    #[must_use]
    pub fn from_config(config: &GlobalConfig) -> Self {
        Self {
            logs_dir: config.logs_dir(),
            retention_days: config.log_retention_days,
            working_dir: config.working_dir.clone(),
            cache_dir_name: config.hygiene.cache_dir_name.clone(),
            data_dir: config.data_dir(),
            exempt_extension: config.hygiene.exempt_extension.clone(),
        }
    }

    /// Run all three steps, stopping at the first error.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` from the first step that fails.
    pub fn run(&self) -> Result<()> {
        let purged = purge_logs(&self.logs_dir, self.retention_days)?;
        let caches = purge_caches(&self.working_dir, &self.cache_dir_name)?;
        let normalized = normalize_permissions(&self.data_dir, &self.exempt_extension)?;
        info!(purged, caches, normalized, "hygiene pass complete");
        Ok(())
    }
}

/// Applies session defaults, then runs the hygiene pass. Never fails.
pub struct StartupSequencer {
    ctx: Arc<SessionContext>,
    conversation: Arc<dyn Conversation>,
    volume: u8,
    hygiene: Hygiene,
}

impl StartupSequencer {
    /// Create a sequencer.
    #[must_use]
    pub fn new(
        ctx: Arc<SessionContext>,
        conversation: Arc<dyn Conversation>,
        volume: u8,
        hygiene: Hygiene,
    ) -> Self {
        Self {
            ctx,
            conversation,
            volume,
            hygiene,
        }
    }

    /// Create a sequencer from configuration.
    #[must_use]
    pub fn from_config(
        config: &GlobalConfig,
        ctx: Arc<SessionContext>,
        conversation: Arc<dyn Conversation>,
    ) -> Self {
        Self::new(ctx, conversation, config.volume, Hygiene::from_config(config))
    }

    /// Run startup. Hygiene failures are logged and otherwise ignored.
    pub fn run(&self) {
        let span = info_span!("startup", name = self.ctx.name(), pid = self.ctx.pid());
        let _guard = span.enter();

        self.ctx.set_listening(true);
        self.ctx.set_volume(self.volume);
        self.conversation.set_volume(self.volume);
        self.conversation.default_voice();

        if let Err(err) = self.hygiene.run() {
            error!(%err, "hygiene pass aborted");
        }
    }
}

/// Delete files under `dir` whose status-change time is more than
/// `retention_days` whole days ago.
///
/// A missing directory is treated as empty. Returns the number of files deleted.
///
/// # Errors
///
/// Returns `AppError::Io` on the first file that cannot be inspected or removed.
pub fn purge_logs(dir: &Path, retention_days: u32) -> Result<usize> {
    purge_logs_at(dir, retention_days, SystemTime::now())
}

/// [`purge_logs`] measured against `now` instead of the wall clock.
///
/// # Errors
///
/// Returns `AppError::Io` on the first file that cannot be inspected or removed.
pub fn purge_logs_at(dir: &Path, retention_days: u32, now: SystemTime) -> Result<usize> {
    if !dir.is_dir() {
        return Ok(0);
    }

    let mut purged = 0;
    for entry in WalkDir::new(dir).min_depth(1).follow_links(false) {
        let entry = entry.map_err(|err| AppError::Io(format!("log scan failed: {err}")))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let metadata = entry
            .metadata()
            .map_err(|err| AppError::Io(format!("log scan failed: {err}")))?;
        let age = now
            .duration_since(changed_at(&metadata)?)
            .unwrap_or_default();
        if age.as_secs() / SECONDS_PER_DAY > u64::from(retention_days) {
            fs::remove_file(entry.path())?;
            debug!(path = %entry.path().display(), "expired log removed");
            purged += 1;
        }
    }
    Ok(purged)
}

#[cfg(unix)]
fn changed_at(metadata: &fs::Metadata) -> Result<SystemTime> {
    use std::os::unix::fs::MetadataExt;

    let secs = u64::try_from(metadata.ctime()).unwrap_or_default();
    let nanos = u32::try_from(metadata.ctime_nsec()).unwrap_or_default();
    Ok(SystemTime::UNIX_EPOCH + std::time::Duration::new(secs, nanos))
}

#[cfg(not(unix))]
fn changed_at(metadata: &fs::Metadata) -> Result<SystemTime> {
    Ok(metadata.modified()?)
}

/// Recursively remove every directory named `name` under `root`.
///
/// Returns the number of directories removed.
///
/// # Errors
///
/// Returns `AppError::Io` if the walk or a removal fails.
pub fn purge_caches(root: &Path, name: &str) -> Result<usize> {
    let mut removed = 0;
    let mut walker = WalkDir::new(root).follow_links(false).into_iter();
    while let Some(entry) = walker.next() {
        let entry = entry.map_err(|err| AppError::Io(format!("cache scan failed: {err}")))?;
        if entry.depth() > 0 && entry.file_type().is_dir() && entry.file_name() == name {
            fs::remove_dir_all(entry.path())?;
            debug!(path = %entry.path().display(), "cache directory removed");
            removed += 1;
            walker.skip_current_dir();
        }
    }
    Ok(removed)
}

/// Add the owner-execute bit to every file in `dir` except `*.{exempt_ext}`.
///
/// Returns the number of files visited. No-op on non-unix hosts.
///
/// # Errors
///
/// Returns `AppError::Io` if a file cannot be inspected or updated.
pub fn normalize_permissions(dir: &Path, exempt_ext: &str) -> Result<usize> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(err) => return Err(err.into()),
    };

    let mut touched = 0;
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        let metadata = entry.metadata()?;
        if !metadata.is_file() || path.extension().is_some_and(|ext| ext == exempt_ext) {
            continue;
        }
        add_owner_execute(&path, &metadata)?;
        touched += 1;
    }
    Ok(touched)
}

#[cfg(unix)]
fn add_owner_execute(path: &Path, metadata: &fs::Metadata) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mut perms = metadata.permissions();
    perms.set_mode(perms.mode() | 0o100);
    fs::set_permissions(path, perms)?;
    Ok(())
}

#[cfg(not(unix))]
fn add_owner_execute(_path: &Path, _metadata: &fs::Metadata) -> Result<()> {
    Ok(())
}
