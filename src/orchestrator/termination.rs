//! The irreversible shutdown path.
//!
//! [`TerminationSequencer::run`] reports, tears down the auxiliary
//! container, clears the registry, logs a redacted diagnostic snapshot,
//! signals the controller's own pid and force-exits. Nothing before the
//! final two steps can stop them from running.

use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, info_span, warn};

use crate::audit::{AuditEntry, AuditEventType, AuditLogger, JsonlAuditWriter};
use crate::config::GlobalConfig;
use crate::context::SessionContext;
use crate::orchestrator::registry::ProcessRegistry;
use crate::phrase;
use crate::speech::Conversation;
use crate::supervisor::container::{ContainerRuntime, DockerCli};
use crate::supervisor::ProcessSupervisor;
use crate::Result;

/// Exit status used by the termination path.
pub const EXIT_STATUS: i32 = 1;

/// Pending reminders and alarms shown in the farewell.
pub trait Agenda: Send + Sync {
    /// Pending reminders, human readable.
    fn reminders(&self) -> Vec<String>;
    /// Pending alarms, human readable.
    fn alarms(&self) -> Vec<String>;
}

/// Reads `reminders.json` and `alarms.json` (JSON string lists) from a directory.
#[derive(Debug, Clone)]
pub struct FileAgenda {
    dir: PathBuf,
}

impl FileAgenda {
    /// Agenda backed by files in `dir`.
    #[must_use]
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn read_list(&self, file: &str) -> Vec<String> {
        let path = self.dir.join(file);
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
            Err(err) => {
                warn!(%err, path = %path.display(), "failed to read agenda file");
                return Vec::new();
            }
        };
        serde_json::from_str(&raw).unwrap_or_else(|err| {
            warn!(%err, path = %path.display(), "agenda file is not a JSON string list");
            Vec::new()
        })
    }
}

impl Agenda for FileAgenda {
    fn reminders(&self) -> Vec<String> {
        self.read_list("reminders.json")
    }

    fn alarms(&self) -> Vec<String> {
        self.read_list("alarms.json")
    }
}

struct NoAgenda;

impl Agenda for NoAgenda {
    fn reminders(&self) -> Vec<String> {
        Vec::new()
    }

    fn alarms(&self) -> Vec<String> {
        Vec::new()
    }
}

/// How the process finally leaves.
pub trait ExitStrategy: Send + Sync {
    /// Terminate the process with `code`. Never returns.
    fn exit(&self, code: i32) -> !;
}

/// Immediate process exit that skips destructors, buffered writers and
/// atexit handlers.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessExit;

impl ExitStrategy for ProcessExit {
    #[cfg(unix)]
    #[allow(unsafe_code)]
    fn exit(&self, code: i32) -> ! {
        // SAFETY: `_exit(2)` takes a plain integer and never returns. It is
        // async-signal-safe and touches no Rust-owned state, so skipping
        // destructors and stdio flushing here is the intended effect.
        unsafe { nix::libc::_exit(code) }
    }

    #[cfg(not(unix))]
    fn exit(&self, code: i32) -> ! {
        std::process::exit(code)
    }
}

/// Summary spoken and logged on the way out. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerminationReport {
    /// Reminders that will not fire while the controller is down.
    pub pending_reminders: Vec<String>,
    /// Alarms that will not fire while the controller is down.
    pub pending_alarms: Vec<String>,
    /// Resident memory of the controller, in bytes.
    pub memory_consumed: u64,
    /// Time since the controller started.
    pub uptime: Duration,
}

impl TerminationReport {
    /// Lines spoken before shutting down, in order.
    #[must_use]
    pub fn farewell(&self, title: &str) -> Vec<String> {
        let mut lines = Vec::new();
        match self.pending_reminders.len() {
            0 => {}
            1 => lines.push(format!("You have a pending reminder {title}!")),
            n => lines.push(format!("You have {n} pending reminders {title}!")),
        }
        if !self.pending_reminders.is_empty() {
            lines.push(phrase::comma_separated(&self.pending_reminders));
        }
        match self.pending_alarms.len() {
            0 => {}
            1 => lines.push(format!("You have a pending alarm {title}!")),
            n => lines.push(format!("You have {n} pending alarms {title}!")),
        }
        if !self.pending_alarms.is_empty() {
            lines.push(phrase::comma_separated(&self.pending_alarms));
        }
        if !self.pending_reminders.is_empty() || !self.pending_alarms.is_empty() {
            lines.push("This will not be executed while I'm deactivated!".to_owned());
        }
        lines.push(format!("Shutting down now {title}!"));
        lines
    }
}

/// Render a byte count with a binary unit.
#[must_use]
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut unit = 0;
    let mut whole = bytes;
    let mut rem = 0;
    while whole >= 1024 && unit < UNITS.len() - 1 {
        rem = whole % 1024;
        whole /= 1024;
        unit += 1;
    }
    if unit == 0 {
        format!("{whole} {}", UNITS[0])
    } else {
        format!("{whole}.{:02} {}", rem * 100 / 1024, UNITS[unit])
    }
}

/// Render a duration as `1h 2m 3s`.
#[must_use]
pub fn format_uptime(uptime: Duration) -> String {
    let total = uptime.as_secs();
    let (hours, minutes, seconds) = (total / 3600, (total % 3600) / 60, total % 60);
    if hours > 0 {
        format!("{hours}h {minutes}m {seconds}s")
    } else if minutes > 0 {
        format!("{minutes}m {seconds}s")
    } else {
        format!("{seconds}s")
    }
}

/// Ordered, irreversible shutdown.
pub struct TerminationSequencer {
    ctx: Arc<SessionContext>,
    conversation: Arc<dyn Conversation>,
    supervisor: Arc<dyn ProcessSupervisor>,
    registry: Arc<ProcessRegistry>,
    containers: Arc<dyn ContainerRuntime>,
    audit: Option<Arc<dyn AuditLogger>>,
    agenda: Arc<dyn Agenda>,
    container_marker: Option<PathBuf>,
    exit: Box<dyn ExitStrategy>,
}

impl TerminationSequencer {
    /// Sequencer with docker teardown disabled, an empty agenda and
    /// [`ProcessExit`].
    #[must_use]
    pub fn new(
        ctx: Arc<SessionContext>,
        conversation: Arc<dyn Conversation>,
        supervisor: Arc<dyn ProcessSupervisor>,
        registry: Arc<ProcessRegistry>,
    ) -> Self {
        Self {
            ctx,
            conversation,
            supervisor,
            registry,
            containers: Arc::new(DockerCli::new()),
            audit: None,
            agenda: Arc::new(NoAgenda),
            container_marker: None,
            exit: Box::new(ProcessExit),
        }
    }

    /// Production sequencer wired from configuration.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the container audit log directory cannot
    /// be created.
    pub fn from_config(
        config: &GlobalConfig,
        ctx: Arc<SessionContext>,
        conversation: Arc<dyn Conversation>,
        supervisor: Arc<dyn ProcessSupervisor>,
        registry: Arc<ProcessRegistry>,
    ) -> Result<Self> {
        let audit = JsonlAuditWriter::new(config.logs_dir(), "container")?;
        Ok(Self::new(ctx, conversation, supervisor, registry)
            .with_agenda(Arc::new(FileAgenda::new(config.data_dir())))
            .with_container(config.container_id_path(), Arc::new(DockerCli::new()))
            .with_audit(Arc::new(audit)))
    }

    /// Tear down the container whose id is recorded in `marker`.
    #[must_use]
    pub fn with_container(mut self, marker: PathBuf, runtime: Arc<dyn ContainerRuntime>) -> Self {
        self.container_marker = Some(marker);
        self.containers = runtime;
        self
    }

    /// Audit log for container teardown.
    #[must_use]
    pub fn with_audit(mut self, audit: Arc<dyn AuditLogger>) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Source of pending reminders and alarms.
    #[must_use]
    pub fn with_agenda(mut self, agenda: Arc<dyn Agenda>) -> Self {
        self.agenda = agenda;
        self
    }

    /// Replace the final exit.
    #[must_use]
    pub fn with_exit(mut self, exit: Box<dyn ExitStrategy>) -> Self {
        self.exit = exit;
        self
    }

    /// Build the report from the agenda and a snapshot of the controller.
    #[must_use]
    pub fn report(&self) -> TerminationReport {
        let memory_consumed = self
            .supervisor
            .snapshot(self.ctx.pid())
            .map(|diag| diag.memory_bytes)
            .unwrap_or_default();
        TerminationReport {
            pending_reminders: self.agenda.reminders(),
            pending_alarms: self.agenda.alarms(),
            memory_consumed,
            uptime: self.ctx.uptime(),
        }
    }

    /// Run the shutdown sequence. Never returns.
    pub fn run(self) -> ! {
        let span = info_span!("terminate", pid = self.ctx.pid());
        let _guard = span.enter();
        info!("termination sequence started");

        best_effort("farewell", || self.farewell());
        best_effort("container teardown", || self.teardown_container());
        best_effort("registry clear", || {
            if let Err(err) = self.registry.clear() {
                error!(%err, "failed to clear the process registry");
            }
        });
        best_effort("diagnostics", || self.log_diagnostics());

        if let Err(err) = self.supervisor.stop_process(self.ctx.pid()) {
            error!(%err, "failed to signal the controller pid");
        }
        self.exit.exit(EXIT_STATUS)
    }

    fn farewell(&self) {
        let report = self.report();
        for line in report.farewell(self.ctx.title()) {
            if let Err(err) = self.conversation.speak(&line) {
                error!(%err, "ATTENTION: conversation failed while terminating");
                break;
            }
        }
        info!(
            memory = %format_bytes(report.memory_consumed),
            uptime = %format_uptime(report.uptime),
            "final report"
        );
    }

    fn teardown_container(&self) {
        let Some(marker) = self.container_marker.as_deref() else {
            return;
        };
        let container_id = match std::fs::read_to_string(marker) {
            Ok(raw) => raw.trim().to_owned(),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return,
            Err(err) => {
                self.audit_failure(None, "read container marker", &err.to_string());
                return;
            }
        };

        if !container_id.is_empty() {
            let killed = self.containers.kill(&container_id);
            self.record_step(AuditEventType::ContainerKill, "docker kill", &container_id, killed);
            let removed = self.containers.remove(&container_id);
            self.record_step(AuditEventType::ContainerRemove, "docker rm", &container_id, removed);
        }

        self.remove_marker(marker, &container_id);
    }

    fn record_step(
        &self,
        event: AuditEventType,
        command: &str,
        container_id: &str,
        outcome: Result<()>,
    ) {
        let command = format!("{command} {container_id}");
        match outcome {
            Ok(()) => self.audit(
                AuditEntry::new(event)
                    .with_container(container_id.to_owned())
                    .with_command(command)
                    .with_result("ok".to_owned()),
            ),
            Err(err) => self.audit_failure(Some(container_id), &command, &err.to_string()),
        }
    }

    fn remove_marker(&self, marker: &Path, container_id: &str) {
        match std::fs::remove_file(marker) {
            Ok(()) => self.audit(
                AuditEntry::new(AuditEventType::MarkerRemoved)
                    .with_container(container_id.to_owned())
                    .with_result(marker.display().to_string()),
            ),
            Err(err) => self.audit_failure(
                Some(container_id),
                "remove container marker",
                &err.to_string(),
            ),
        }
    }

    fn audit_failure(&self, container_id: Option<&str>, command: &str, reason: &str) {
        let mut entry = AuditEntry::new(AuditEventType::Failure)
            .with_command(command.to_owned())
            .with_reason(reason.to_owned());
        if let Some(id) = container_id {
            entry = entry.with_container(id.to_owned());
        }
        self.audit(entry);
    }

    fn audit(&self, entry: AuditEntry) {
        let Some(audit) = &self.audit else {
            debug!(?entry, "container teardown");
            return;
        };
        if let Err(err) = audit.log_entry(entry) {
            warn!(%err, "failed to write container audit entry");
        }
    }

    fn log_diagnostics(&self) {
        match self.supervisor.snapshot(self.ctx.pid()) {
            Ok(diagnostics) => {
                let redacted = diagnostics.redacted();
                match serde_json::to_string(&redacted) {
                    Ok(json) => debug!(snapshot = %json, "controller diagnostics"),
                    Err(_) => debug!(snapshot = ?redacted, "controller diagnostics"),
                }
            }
            Err(err) => warn!(%err, "failed to capture controller diagnostics"),
        }
    }
}

/// Run one cleanup step, containing any panic so later steps still run.
fn best_effort(step: &str, f: impl FnOnce()) {
    if panic::catch_unwind(AssertUnwindSafe(f)).is_err() {
        error!(step, "termination step panicked; continuing");
    }
}
