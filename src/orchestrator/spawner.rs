//! Background process launcher.
//!
//! Spawns the configured `[[background]]` commands, records each one in the
//! process registry and keeps the child handle in [`ActiveChildren`] so the
//! child monitor can notice exits.

use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;

use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{error, info, info_span};

use crate::config::{BackgroundProcess, GlobalConfig};
use crate::orchestrator::registry::ProcessRegistry;
use crate::{AppError, Result};

/// Live children keyed by background process name.
pub type ActiveChildren = Arc<Mutex<HashMap<String, Child>>>;

/// Spawn `command` for the background process `name`.
///
/// # Errors
///
/// Returns `AppError::ProcessControl` if the command is empty or fails to spawn.
pub fn spawn_background(name: &str, command: &[String], working_dir: &Path) -> Result<Child> {
    let span = info_span!("spawn_background", name);
    let _guard = span.enter();

    let (program, args) = command.split_first().ok_or_else(|| {
        AppError::ProcessControl(format!("background process '{name}' has an empty command"))
    })?;

    let child = Command::new(program)
        .args(args)
        .current_dir(working_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .map_err(|err| AppError::ProcessControl(format!("failed to spawn '{name}': {err}")))?;

    info!(pid = child.id().unwrap_or(0), program, "background process spawned");
    Ok(child)
}

/// Spawn one configured process, register it and track its child handle.
///
/// Returns the new pid.
///
/// # Errors
///
/// Returns `AppError::ProcessControl` if spawning fails or `AppError::Io`
/// if the registry cannot be written.
pub async fn launch(
    process: &BackgroundProcess,
    working_dir: &Path,
    registry: &ProcessRegistry,
    children: &ActiveChildren,
) -> Result<u32> {
    let child = spawn_background(&process.name, &process.command, working_dir)?;
    let pid = child
        .id()
        .ok_or_else(|| AppError::ProcessControl(format!("'{}' exited at spawn", process.name)))?;
    registry.register(&process.name, pid, process.command.clone())?;
    children.lock().await.insert(process.name.clone(), child);
    Ok(pid)
}

/// Launch every configured background process. Failures are logged and skipped.
///
/// Returns the number of processes started.
pub async fn launch_all(
    config: &GlobalConfig,
    registry: &ProcessRegistry,
    children: &ActiveChildren,
) -> usize {
    let mut started = 0;
    for process in &config.background {
        match launch(process, &config.working_dir, registry, children).await {
            Ok(_) => started += 1,
            Err(err) => error!(%err, name = process.name, "failed to launch background process"),
        }
    }
    started
}
