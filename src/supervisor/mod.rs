//! Operating-system capabilities used by the lifecycle components.
//!
//! [`ProcessSupervisor`] is the seam between the controller and the host:
//! process enumeration, port ownership, signalling, diagnostics and host
//! power actions. [`system::SystemSupervisor`] is the production
//! implementation; tests substitute their own.

pub mod container;
pub mod system;

use serde::{Deserialize, Serialize};

use crate::{AppError, Result};

/// A live process as seen in one OS snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProcessEntry {
    /// Process or registry name.
    pub name: String,
    /// Operating-system process id.
    pub pid: u32,
}

/// Point-in-time diagnostic snapshot of a single process.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProcessDiagnostics {
    /// Process id.
    pub pid: u32,
    /// Executable name.
    pub name: String,
    /// Executable path, when readable.
    pub exe: Option<String>,
    /// Command line.
    pub cmd: Vec<String>,
    /// Working directory, when readable.
    pub cwd: Option<String>,
    /// Resident memory in bytes.
    pub memory_bytes: u64,
    /// Seconds since the process started.
    pub run_time_seconds: u64,
    /// Environment as `KEY=value` pairs; `None` once redacted.
    pub environ: Option<Vec<String>>,
}

impl ProcessDiagnostics {
    /// Drop the environment so secrets never reach log files.
    #[must_use]
    pub fn redacted(mut self) -> Self {
        self.environ = None;
        self
    }
}

/// Host process-table and power capability.
pub trait ProcessSupervisor: Send + Sync {
    /// Enumerate live processes.
    fn list_processes(&self) -> Vec<ProcessEntry>;

    /// Whether `host:port` already has a listener.
    fn is_port_bound(&self, host: &str, port: u16) -> bool;

    /// Pid of the process listening on `port`, if it can be determined.
    fn pid_on_port(&self, port: u16) -> Option<u32>;

    /// Send a termination signal to `pid`.
    ///
    /// Acting on a pid that no longer exists is not an error.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ProcessControl` when the signal cannot be delivered.
    fn stop_process(&self, pid: u32) -> Result<()>;

    /// Capture diagnostics for `pid`, environment included.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` when the process is not running.
    fn snapshot(&self, pid: u32) -> Result<ProcessDiagnostics>;

    /// Reboot the host.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ProcessControl` when the platform command fails.
    fn reboot_host(&self) -> Result<()>;

    /// Power off the host.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ProcessControl` when the platform command fails.
    fn shutdown_host(&self) -> Result<()>;

    /// Lock the host screen.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ProcessControl` when the platform command fails.
    fn lock_host(&self) -> Result<()>;

    /// Whether `pid` is currently alive.
    fn is_alive(&self, pid: u32) -> bool {
        self.list_processes().iter().any(|entry| entry.pid == pid)
    }

    /// Kill whichever process listens on `port`. One attempt, no retry.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ProcessControl` when no owner is found or the
    /// signal fails.
    fn kill_port_owner(&self, port: u16) -> Result<()> {
        let pid = self.pid_on_port(port).ok_or_else(|| {
            AppError::ProcessControl(format!("no process found listening on port {port}"))
        })?;
        self.stop_process(pid)
    }
}
