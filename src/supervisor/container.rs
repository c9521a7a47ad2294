//! Container runtime used to tear down the auxiliary speech-synthesis container.
//!
//! All docker interactions go through [`DockerCli`], which shells out to the
//! `docker` binary with a bounded timeout. A missing container is treated as
//! already removed.

use std::io::Read;
use std::process::{Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use crate::{AppError, Result};

/// Upper bound for a single docker invocation during shutdown.
const DOCKER_TIMEOUT: Duration = Duration::from_secs(10);

/// Kill/remove operations against a container id.
pub trait ContainerRuntime: Send + Sync {
    /// Kill a running container.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Container` when the runtime rejects the request.
    fn kill(&self, container_id: &str) -> Result<()>;

    /// Remove a container.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Container` when the runtime rejects the request.
    fn remove(&self, container_id: &str) -> Result<()>;
}

/// Docker CLI client.
#[derive(Debug, Clone, Default)]
pub struct DockerCli;

impl DockerCli {
    /// Create a client.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn run_tolerating_missing(args: &[&str]) -> Result<()> {
        let (status, stderr) = run_bounded("docker", args, DOCKER_TIMEOUT)?;
        if status.success() {
            return Ok(());
        }
        if is_missing_container(&stderr) {
            return Ok(());
        }
        Err(AppError::Container(format!(
            "'docker {}' returned non-zero exit status {}: {}",
            args.join(" "),
            status.code().unwrap_or(-1),
            stderr.trim()
        )))
    }
}

/// Run `program` and return its exit status with captured stderr, killing
/// it after `timeout`. Stdout is discarded and stderr is drained on its own
/// thread while waiting.
fn run_bounded(program: &str, args: &[&str], timeout: Duration) -> Result<(ExitStatus, String)> {
    let cmd_str = format!("{program} {}", args.join(" "));
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|err| AppError::Container(format!("{cmd_str}: {err}")))?;

    let stderr_reader = child.stderr.take().map(|mut pipe| {
        thread::spawn(move || {
            let mut buf = String::new();
            let _ = pipe.read_to_string(&mut buf);
            buf
        })
    });

    let started = Instant::now();
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) if started.elapsed() >= timeout => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(AppError::Container(format!(
                    "{cmd_str}: timed out after {}s",
                    timeout.as_secs()
                )));
            }
            Ok(None) => thread::sleep(Duration::from_millis(50)),
            Err(err) => return Err(AppError::Container(format!("{cmd_str}: {err}"))),
        }
    };

    let stderr = stderr_reader
        .and_then(|reader| reader.join().ok())
        .unwrap_or_default();
    Ok((status, stderr))
}

/// Docker reports an already-removed container on stderr.
fn is_missing_container(stderr: &str) -> bool {
    stderr.contains("No such container")
}

impl ContainerRuntime for DockerCli {
    fn kill(&self, container_id: &str) -> Result<()> {
        Self::run_tolerating_missing(&["kill", container_id])
    }

    fn remove(&self, container_id: &str) -> Result<()> {
        Self::run_tolerating_missing(&["rm", container_id])
    }
}
