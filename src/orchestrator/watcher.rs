//! Supervision cycle that consumes restart records.
//!
//! Every poll interval the watcher takes (reads and clears) the record for
//! each registered background process and the `ALL` record, then restarts
//! the flagged processes: stop the old pid, respawn the stored command and
//! update the registry with the new pid. The controller's own row is never
//! restarted.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::orchestrator::registry::ProcessRegistry;
use crate::orchestrator::restart::ALL_CALLER;
use crate::orchestrator::spawner::{self, ActiveChildren};
use crate::persistence::restart_repo::RestartRepo;
use crate::supervisor::ProcessSupervisor;
use crate::{AppError, Result};

/// Restarts background processes whose restart record is set.
pub struct RestartWatcher {
    repo: RestartRepo,
    registry: Arc<ProcessRegistry>,
    supervisor: Arc<dyn ProcessSupervisor>,
    children: ActiveChildren,
    working_dir: PathBuf,
}

impl RestartWatcher {
    /// Create a watcher.
    #[must_use]
    pub fn new(
        repo: RestartRepo,
        registry: Arc<ProcessRegistry>,
        supervisor: Arc<dyn ProcessSupervisor>,
        children: ActiveChildren,
        working_dir: PathBuf,
    ) -> Self {
        Self {
            repo,
            registry,
            supervisor,
            children,
            working_dir,
        }
    }

    /// Run [`Self::cycle`] every `interval` until `cancel` fires.
    #[must_use]
    pub fn spawn(self, interval: Duration, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    () = cancel.cancelled() => {
                        info!("restart watcher shutting down");
                        break;
                    }
                    _ = ticker.tick() => {
                        if let Err(err) = self.cycle().await {
                            error!(%err, "restart cycle failed");
                        }
                    }
                }
            }
        })
    }

    /// One supervision cycle. Returns the names that were restarted.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Persistence` or `AppError::Io` when the store or
    /// the registry cannot be read. Individual restart failures are logged.
    pub async fn cycle(&self) -> Result<Vec<String>> {
        let restart_all = self.repo.take(ALL_CALLER).await?;
        let mut restarted = Vec::new();

        for name in self.registry.fanout_names()? {
            let flagged = self.repo.take(&name).await?;
            if !(restart_all || flagged) {
                continue;
            }
            match self.restart(&name).await {
                Ok(pid) => {
                    info!(name, pid, "background process restarted");
                    restarted.push(name);
                }
                Err(err) => error!(%err, name, "background process restart failed"),
            }
        }
        Ok(restarted)
    }

    /// Restart `name` from its registry row. Returns the new pid.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if `name` is not registered, or the
    /// spawn/registry error.
    pub async fn restart(&self, name: &str) -> Result<u32> {
        let row = self
            .registry
            .lookup(name)?
            .ok_or_else(|| AppError::NotFound(format!("background process '{name}'")))?;

        // Detach the old child first so the monitor does not unregister the name.
        let previous = self.children.lock().await.remove(name);
        if self.supervisor.is_alive(row.pid) {
            if let Err(err) = self.supervisor.stop_process(row.pid) {
                warn!(%err, name, pid = row.pid, "failed to stop previous incarnation");
            }
        }
        drop(previous);

        let child = spawner::spawn_background(name, &row.command, &self.working_dir)?;
        let pid = child
            .id()
            .ok_or_else(|| AppError::ProcessControl(format!("'{name}' exited at spawn")))?;
        self.registry.update_pid(name, pid)?;
        self.children.lock().await.insert(name.to_owned(), child);
        Ok(pid)
    }
}
