//! Production [`ProcessSupervisor`] backed by `sysinfo`, `nix` and platform tools.

use std::io::{ErrorKind, Write};
use std::net::TcpListener;
use std::process::{Command, Stdio};

use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System, UpdateKind};
use tracing::{debug, info, warn};

use super::{ProcessDiagnostics, ProcessEntry, ProcessSupervisor};
use crate::{AppError, Result};

/// Process supervisor for the platform the binary was built for.
#[derive(Debug, Default, Clone)]
pub struct SystemSupervisor {
    root_password: Option<String>,
}

impl SystemSupervisor {
    /// Create a supervisor. `root_password` feeds `sudo -S` on Linux.
    #[must_use]
    pub fn new(root_password: Option<String>) -> Self {
        Self { root_password }
    }

    fn run_power_command(&self, program: &str, args: &[&str], action: &str) -> Result<()> {
        let mut cmd = Command::new(program);
        cmd.args(args).stdout(Stdio::null()).stderr(Stdio::piped());
        if program == "sudo" {
            cmd.stdin(Stdio::piped());
        }
        let mut child = cmd
            .spawn()
            .map_err(|err| AppError::ProcessControl(format!("failed to {action}: {err}")))?;

        if program == "sudo" {
            if let (Some(stdin), Some(password)) = (child.stdin.as_mut(), &self.root_password) {
                writeln!(stdin, "{password}").map_err(|err| {
                    AppError::ProcessControl(format!("failed to pass sudo credentials: {err}"))
                })?;
            }
        }

        let output = child
            .wait_with_output()
            .map_err(|err| AppError::ProcessControl(format!("failed to {action}: {err}")))?;
        if output.status.success() {
            info!(action, "host power action issued");
            Ok(())
        } else {
            Err(AppError::ProcessControl(format!(
                "{action} exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )))
        }
    }
}

impl ProcessSupervisor for SystemSupervisor {
    fn list_processes(&self) -> Vec<ProcessEntry> {
        let mut system = System::new();
        system.refresh_processes_specifics(ProcessesToUpdate::All, true, ProcessRefreshKind::new());
        system
            .processes()
            .iter()
            .map(|(pid, process)| ProcessEntry {
                name: process.name().to_string_lossy().to_string(),
                pid: pid.as_u32(),
            })
            .collect()
    }

    fn is_alive(&self, pid: u32) -> bool {
        let target = Pid::from_u32(pid);
        let mut system = System::new();
        system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[target]),
            true,
            ProcessRefreshKind::new(),
        );
        system.process(target).is_some()
    }

    fn is_port_bound(&self, host: &str, port: u16) -> bool {
        match TcpListener::bind((host, port)) {
            Ok(_) => false,
            Err(err) if err.kind() == ErrorKind::AddrInUse => true,
            Err(err) => {
                debug!(%err, host, port, "port probe bind failed for another reason");
                false
            }
        }
    }

    fn pid_on_port(&self, port: u16) -> Option<u32> {
        find_listener_pid(port)
    }

    fn stop_process(&self, pid: u32) -> Result<()> {
        terminate(pid)
    }

    fn snapshot(&self, pid: u32) -> Result<ProcessDiagnostics> {
        let target = Pid::from_u32(pid);
        let mut system = System::new();
        system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[target]),
            true,
            ProcessRefreshKind::new()
                .with_memory()
                .with_cmd(UpdateKind::Always)
                .with_cwd(UpdateKind::Always)
                .with_exe(UpdateKind::Always)
                .with_environ(UpdateKind::Always),
        );
        let process = system
            .process(target)
            .ok_or_else(|| AppError::NotFound(format!("process {pid} is not running")))?;

        Ok(ProcessDiagnostics {
            pid,
            name: process.name().to_string_lossy().to_string(),
            exe: process.exe().map(|p| p.display().to_string()),
            cmd: process
                .cmd()
                .iter()
                .map(|arg| arg.to_string_lossy().to_string())
                .collect(),
            cwd: process.cwd().map(|p| p.display().to_string()),
            memory_bytes: process.memory(),
            run_time_seconds: process.run_time(),
            environ: Some(
                process
                    .environ()
                    .iter()
                    .map(|var| var.to_string_lossy().to_string())
                    .collect(),
            ),
        })
    }

    fn reboot_host(&self) -> Result<()> {
        if cfg!(target_os = "macos") {
            self.run_power_command(
                "osascript",
                &["-e", "tell app \"System Events\" to restart"],
                "reboot host",
            )
        } else if cfg!(windows) {
            self.run_power_command("shutdown", &["/r", "/t", "1"], "reboot host")
        } else {
            self.run_power_command("sudo", &["-S", "reboot"], "reboot host")
        }
    }

    fn shutdown_host(&self) -> Result<()> {
        if cfg!(target_os = "macos") {
            self.run_power_command(
                "osascript",
                &["-e", "tell app \"System Events\" to shut down"],
                "shut down host",
            )
        } else if cfg!(windows) {
            self.run_power_command("shutdown", &["/s", "/t", "1"], "shut down host")
        } else {
            self.run_power_command("sudo", &["-S", "shutdown", "-P", "now"], "shut down host")
        }
    }

    fn lock_host(&self) -> Result<()> {
        if cfg!(target_os = "macos") {
            self.run_power_command("pmset", &["displaysleepnow"], "lock host")
        } else if cfg!(windows) {
            self.run_power_command("rundll32.exe", &["user32.dll,LockWorkStation"], "lock host")
        } else {
            self.run_power_command("loginctl", &["lock-session"], "lock host")
        }
    }
}

#[cfg(unix)]
fn terminate(pid: u32) -> Result<()> {
    use nix::errno::Errno;
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid as NixPid;

    let raw = i32::try_from(pid)
        .map_err(|_| AppError::ProcessControl(format!("pid {pid} out of range")))?;
    match kill(NixPid::from_raw(raw), Signal::SIGTERM) {
        Ok(()) => {
            debug!(pid, "SIGTERM sent");
            Ok(())
        }
        Err(Errno::ESRCH) => {
            debug!(pid, "process already gone");
            Ok(())
        }
        Err(err) => Err(AppError::ProcessControl(format!(
            "failed to signal pid {pid}: {err}"
        ))),
    }
}

#[cfg(not(unix))]
fn terminate(pid: u32) -> Result<()> {
    let target = Pid::from_u32(pid);
    let mut system = System::new();
    system.refresh_processes_specifics(
        ProcessesToUpdate::Some(&[target]),
        true,
        ProcessRefreshKind::new(),
    );
    match system.process(target) {
        None => Ok(()),
        Some(process) if process.kill() => Ok(()),
        Some(_) => Err(AppError::ProcessControl(format!("failed to kill pid {pid}"))),
    }
}

/// Resolve the pid listening on a TCP port via `lsof` (unix) or `netstat` (windows).
fn find_listener_pid(port: u16) -> Option<u32> {
    let output = if cfg!(windows) {
        Command::new("netstat").args(["-ano", "-p", "tcp"]).output()
    } else {
        Command::new("lsof")
            .args(["-t", "-n", "-P", &format!("-iTCP:{port}"), "-sTCP:LISTEN"])
            .output()
    };

    let output = match output {
        Ok(o) => o,
        Err(err) => {
            warn!(%err, port, "failed to run port lookup tool");
            return None;
        }
    };

    let stdout = String::from_utf8_lossy(&output.stdout);
    if cfg!(windows) {
        parse_netstat(&stdout, port)
    } else {
        stdout.lines().find_map(|line| line.trim().parse::<u32>().ok())
    }
}

fn parse_netstat(stdout: &str, port: u16) -> Option<u32> {
    let suffix = format!(":{port}");
    stdout.lines().find_map(|line| {
        let fields: Vec<&str> = line.split_whitespace().collect();
        match fields.as_slice() {
            [_, local, _, state, pid] if local.ends_with(&suffix) && *state == "LISTENING" => {
                pid.parse().ok()
            }
            _ => None,
        }
    })
}
