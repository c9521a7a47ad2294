//! Child process monitor: detects background process exits.
//!
//! Periodically polls every child in [`ActiveChildren`]. An exited child is
//! dropped from the map and its row removed from the process registry, so
//! it no longer shows up as a match candidate.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::orchestrator::registry::ProcessRegistry;
use crate::orchestrator::spawner::ActiveChildren;

/// Interval between polls for child process exits.
pub const POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Spawn a background task that watches spawned children for exits.
///
/// The task polls every `interval` until the `CancellationToken` fires.
#[must_use]
pub fn spawn_child_monitor(
    children: ActiveChildren,
    registry: Arc<ProcessRegistry>,
    interval: Duration,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    info!("child process monitor shutting down");
                    break;
                }
                () = tokio::time::sleep(interval) => {}
            }

            poll_children(&children, &registry).await;
        }
    })
}

/// Check all tracked children once. Returns the names that exited.
pub async fn poll_children(children: &ActiveChildren, registry: &ProcessRegistry) -> Vec<String> {
    let mut guard = children.lock().await;
    let mut exited: Vec<(String, Option<std::process::ExitStatus>)> = Vec::new();

    for (name, child) in guard.iter_mut() {
        match child.try_wait() {
            Ok(Some(status)) => exited.push((name.clone(), Some(status))),
            Ok(None) => {}
            Err(err) => {
                warn!(name, %err, "failed to poll child process status");
                exited.push((name.clone(), None));
            }
        }
    }

    for (name, _) in &exited {
        guard.remove(name);
    }
    drop(guard);

    let mut names = Vec::with_capacity(exited.len());
    for (name, exit_status) in exited {
        let status_text = exit_status.map_or_else(
            || "status unknown".to_owned(),
            |s| {
                if s.success() {
                    "exited normally (code 0)".to_owned()
                } else {
                    s.code().map_or_else(
                        || "terminated by signal".to_owned(),
                        |c| format!("exited with code {c}"),
                    )
                }
            },
        );
        info!(name, status = %status_text, "background process exited");

        if let Err(err) = registry.remove(&name) {
            warn!(%err, name, "failed to drop exited process from the registry");
        }
        names.push(name);
    }
    names
}
