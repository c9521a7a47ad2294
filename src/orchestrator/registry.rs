//! Registry of named background processes.
//!
//! The registry is a JSON state file mapping each background process name
//! to its pid and the argv used to respawn it. Every read intersects the
//! file with a fresh OS snapshot, so a dead pid never surfaces as a live
//! entry. Writes go through a temp file and an atomic rename.

use std::collections::{BTreeMap, HashSet};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::phrase;
use crate::supervisor::{ProcessEntry, ProcessSupervisor};
use crate::{AppError, Result};

/// One row of the registry state file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RegisteredProcess {
    /// Pid of the most recent incarnation.
    pub pid: u32,
    /// Argv used to respawn the process.
    #[serde(default)]
    pub command: Vec<String>,
}

type RegistryMap = BTreeMap<String, RegisteredProcess>;

/// File-backed registry of background processes.
pub struct ProcessRegistry {
    path: PathBuf,
    own_name: String,
    supervisor: Arc<dyn ProcessSupervisor>,
    lock: Mutex<()>,
}

impl ProcessRegistry {
    /// Create a registry stored at `path`.
    ///
    /// `own_name` is the controller's name; it is never offered as a match
    /// candidate and can not be stopped through the registry.
    #[must_use]
    pub fn new(
        path: PathBuf,
        own_name: impl Into<String>,
        supervisor: Arc<dyn ProcessSupervisor>,
    ) -> Self {
        Self {
            path,
            own_name: own_name.into(),
            supervisor,
            lock: Mutex::new(()),
        }
    }

    /// Location of the state file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record (or replace) a background process.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the state file cannot be read or written.
    pub fn register(&self, name: &str, pid: u32, command: Vec<String>) -> Result<()> {
        let _guard = self.guard()?;
        let mut map = self.read_map()?;
        map.insert(name.to_owned(), RegisteredProcess { pid, command });
        self.write_map(&map)?;
        info!(name, pid, "background process registered");
        Ok(())
    }

    /// Replace the pid recorded for `name` after a respawn.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if `name` is not registered, or
    /// `AppError::Io` on file errors.
    pub fn update_pid(&self, name: &str, pid: u32) -> Result<()> {
        let _guard = self.guard()?;
        let mut map = self.read_map()?;
        let entry = map
            .get_mut(name)
            .ok_or_else(|| AppError::NotFound(format!("background process '{name}'")))?;
        entry.pid = pid;
        self.write_map(&map)?;
        debug!(name, pid, "registry pid updated");
        Ok(())
    }

    /// Drop `name` from the registry. Returns the removed row, if any.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the state file cannot be read or written.
    pub fn remove(&self, name: &str) -> Result<Option<RegisteredProcess>> {
        let _guard = self.guard()?;
        let mut map = self.read_map()?;
        let removed = map.remove(name);
        if removed.is_some() {
            self.write_map(&map)?;
        }
        Ok(removed)
    }

    /// Registered processes whose pid is alive right now, ordered by name.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the state file cannot be read.
    pub fn snapshot(&self) -> Result<Vec<ProcessEntry>> {
        let map = {
            let _guard = self.guard()?;
            self.read_map()?
        };
        let live: HashSet<u32> = self
            .supervisor
            .list_processes()
            .into_iter()
            .map(|entry| entry.pid)
            .collect();

        Ok(map
            .into_iter()
            .filter(|(_, row)| live.contains(&row.pid))
            .map(|(name, row)| ProcessEntry { name, pid: row.pid })
            .collect())
    }

    /// Names of live background processes, excluding the controller.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the state file cannot be read.
    pub fn names(&self) -> Result<Vec<String>> {
        Ok(self
            .snapshot()?
            .into_iter()
            .map(|entry| entry.name)
            .filter(|name| name != &self.own_name)
            .collect())
    }

    /// Every registered name whether or not its pid is alive.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the state file cannot be read.
    pub fn registered_names(&self) -> Result<Vec<String>> {
        let _guard = self.guard()?;
        Ok(self.read_map()?.into_keys().collect())
    }

    /// Registered names eligible for a restart, never the controller itself.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the state file cannot be read.
    pub fn fanout_names(&self) -> Result<Vec<String>> {
        Ok(self
            .registered_names()?
            .into_iter()
            .filter(|name| name != &self.own_name)
            .collect())
    }

    /// Stored row for `name`, alive or not.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the state file cannot be read.
    pub fn lookup(&self, name: &str) -> Result<Option<RegisteredProcess>> {
        let _guard = self.guard()?;
        Ok(self.read_map()?.remove(name))
    }

    /// Signal the live process registered as `name`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ProcessControl` for the controller's own name,
    /// `AppError::NotFound` if `name` is not live, or the supervisor's error.
    pub fn stop(&self, name: &str) -> Result<()> {
        if name == self.own_name {
            return Err(AppError::ProcessControl(format!(
                "refusing to stop the controller '{name}' through the registry"
            )));
        }
        let entry = self
            .snapshot()?
            .into_iter()
            .find(|entry| entry.name == name)
            .ok_or_else(|| AppError::NotFound(format!("live background process '{name}'")))?;
        self.supervisor.stop_process(entry.pid)?;
        info!(name, pid = entry.pid, "background process stopped");
        Ok(())
    }

    /// Delete the state file. Missing file is not an error.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the file exists but can not be removed.
    pub fn clear(&self) -> Result<()> {
        let _guard = self.guard()?;
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    /// First candidate matching `phrase`, never the controller itself.
    #[must_use]
    pub fn match_name(&self, phrase: &str, candidates: &[String], strict: bool) -> Option<String> {
        let filtered: Vec<&str> = candidates
            .iter()
            .map(String::as_str)
            .filter(|name| *name != self.own_name)
            .collect();
        phrase::word_match(phrase, &filtered, strict).map(str::to_owned)
    }

    fn guard(&self) -> Result<MutexGuard<'_, ()>> {
        self.lock
            .lock()
            .map_err(|_| AppError::Io("registry mutex poisoned".into()))
    }

    fn read_map(&self) -> Result<RegistryMap> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(RegistryMap::new())
            }
            Err(err) => return Err(err.into()),
        };
        if raw.trim().is_empty() {
            return Ok(RegistryMap::new());
        }
        serde_json::from_str(&raw).map_err(|err| {
            AppError::Io(format!(
                "corrupt registry file {}: {err}",
                self.path.display()
            ))
        })
    }

    fn write_map(&self, map: &RegistryMap) -> Result<()> {
        let parent = self
            .path
            .parent()
            .ok_or_else(|| AppError::Io("registry path has no parent directory".into()))?;
        std::fs::create_dir_all(parent)?;

        let body = serde_json::to_string_pretty(map)
            .map_err(|err| AppError::Io(format!("failed to serialize registry: {err}")))?;

        let mut tmp = NamedTempFile::new_in(parent)?;
        tmp.write_all(body.as_bytes())?;
        tmp.persist(&self.path).map_err(|err| {
            AppError::Io(format!(
                "failed to persist registry to {}: {err}",
                self.path.display()
            ))
        })?;
        Ok(())
    }
}
