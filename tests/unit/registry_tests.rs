//! Unit tests for the file-backed process registry.

use std::sync::{Arc, Mutex};

use procwarden::orchestrator::registry::ProcessRegistry;
use procwarden::supervisor::{ProcessDiagnostics, ProcessEntry, ProcessSupervisor};
use procwarden::{AppError, Result};

/// Process table with a fixed set of live pids.
#[derive(Default)]
struct LivePids {
    live: Mutex<Vec<u32>>,
    signalled: Mutex<Vec<u32>>,
}

impl LivePids {
    fn with(pids: &[u32]) -> Arc<Self> {
        Arc::new(Self {
            live: Mutex::new(pids.to_vec()),
            signalled: Mutex::new(Vec::new()),
        })
    }
}

impl ProcessSupervisor for LivePids {
    fn list_processes(&self) -> Vec<ProcessEntry> {
        self.live
            .lock()
            .unwrap()
            .iter()
            .map(|pid| ProcessEntry {
                name: format!("proc-{pid}"),
                pid: *pid,
            })
            .collect()
    }

    fn is_port_bound(&self, _host: &str, _port: u16) -> bool {
        false
    }

    fn pid_on_port(&self, _port: u16) -> Option<u32> {
        None
    }

    fn stop_process(&self, pid: u32) -> Result<()> {
        self.signalled.lock().unwrap().push(pid);
        self.live.lock().unwrap().retain(|p| *p != pid);
        Ok(())
    }

    fn snapshot(&self, pid: u32) -> Result<ProcessDiagnostics> {
        Err(AppError::NotFound(format!("process {pid}")))
    }

    fn reboot_host(&self) -> Result<()> {
        Ok(())
    }

    fn shutdown_host(&self) -> Result<()> {
        Ok(())
    }

    fn lock_host(&self) -> Result<()> {
        Ok(())
    }
}

fn registry(dir: &tempfile::TempDir, supervisor: Arc<LivePids>) -> ProcessRegistry {
    ProcessRegistry::new(dir.path().join("state").join("processes.json"), "procwarden", supervisor)
}

#[test]
fn missing_file_is_an_empty_registry() {
    let dir = tempfile::tempdir().expect("tempdir");
    let registry = registry(&dir, LivePids::with(&[]));

    assert!(registry.snapshot().expect("snapshot").is_empty());
    assert!(registry.registered_names().expect("names").is_empty());
}

#[test]
fn snapshot_only_reports_live_pids() {
    let dir = tempfile::tempdir().expect("tempdir");
    let registry = registry(&dir, LivePids::with(&[10, 30]));
    registry.register("mirror", 10, vec!["mirror".into()]).expect("register");
    registry.register("stale", 20, vec!["stale".into()]).expect("register");
    registry.register("bot", 30, vec!["bot".into()]).expect("register");

    let snapshot = registry.snapshot().expect("snapshot");

    assert_eq!(
        snapshot,
        vec![
            ProcessEntry { name: "bot".into(), pid: 30 },
            ProcessEntry { name: "mirror".into(), pid: 10 },
        ]
    );
    assert_eq!(
        registry.registered_names().expect("names"),
        vec!["bot".to_owned(), "mirror".to_owned(), "stale".to_owned()]
    );
}

#[test]
fn own_name_is_excluded_from_candidates() {
    let dir = tempfile::tempdir().expect("tempdir");
    let registry = registry(&dir, LivePids::with(&[1, 2]));
    registry.register("procwarden", 1, vec![]).expect("register");
    registry.register("mirror", 2, vec![]).expect("register");

    assert_eq!(registry.names().expect("names"), vec!["mirror".to_owned()]);

    let candidates = vec!["procwarden".to_owned(), "mirror".to_owned()];
    assert_eq!(registry.match_name("restart procwarden", &candidates, true), None);
    assert_eq!(
        registry.match_name("restart procwarden mirror", &candidates, true),
        Some("mirror".to_owned())
    );
}

#[test]
fn update_pid_replaces_the_pid_and_keeps_the_command() {
    let dir = tempfile::tempdir().expect("tempdir");
    let registry = registry(&dir, LivePids::with(&[]));
    registry
        .register("mirror", 10, vec!["python".into(), "mirror.py".into()])
        .expect("register");

    registry.update_pid("mirror", 11).expect("update");

    let row = registry.lookup("mirror").expect("lookup").expect("row");
    assert_eq!(row.pid, 11);
    assert_eq!(row.command, vec!["python".to_owned(), "mirror.py".to_owned()]);
}

#[test]
fn update_pid_of_unknown_name_is_not_found() {
    let dir = tempfile::tempdir().expect("tempdir");
    let registry = registry(&dir, LivePids::with(&[]));

    let err = registry.update_pid("ghost", 1).expect_err("unknown name");
    assert!(matches!(err, AppError::NotFound(_)));
}

#[test]
fn remove_returns_the_dropped_row() {
    let dir = tempfile::tempdir().expect("tempdir");
    let registry = registry(&dir, LivePids::with(&[]));
    registry.register("mirror", 10, vec![]).expect("register");

    let removed = registry.remove("mirror").expect("remove").expect("row");
    assert_eq!(removed.pid, 10);
    assert!(registry.remove("mirror").expect("remove").is_none());
}

#[test]
fn stop_signals_live_processes_only() {
    let dir = tempfile::tempdir().expect("tempdir");
    let supervisor = LivePids::with(&[10]);
    let registry = registry(&dir, Arc::clone(&supervisor));
    registry.register("mirror", 10, vec![]).expect("register");
    registry.register("stale", 20, vec![]).expect("register");

    registry.stop("mirror").expect("stop");
    assert_eq!(*supervisor.signalled.lock().unwrap(), vec![10]);

    let err = registry.stop("stale").expect_err("dead pid");
    assert!(matches!(err, AppError::NotFound(_)));
}

#[test]
fn stop_refuses_the_controller() {
    let dir = tempfile::tempdir().expect("tempdir");
    let supervisor = LivePids::with(&[1]);
    let registry = registry(&dir, Arc::clone(&supervisor));
    registry.register("procwarden", 1, vec![]).expect("register");

    let err = registry.stop("procwarden").expect_err("own name");
    assert!(matches!(err, AppError::ProcessControl(_)));
    assert!(supervisor.signalled.lock().unwrap().is_empty());
}

#[test]
fn clear_deletes_the_state_file_and_tolerates_absence() {
    let dir = tempfile::tempdir().expect("tempdir");
    let registry = registry(&dir, LivePids::with(&[]));
    registry.register("mirror", 10, vec![]).expect("register");
    assert!(registry.path().exists());

    registry.clear().expect("clear");
    assert!(!registry.path().exists());
    registry.clear().expect("second clear");
}

#[test]
fn corrupt_state_file_is_an_io_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let registry = registry(&dir, LivePids::with(&[]));
    std::fs::create_dir_all(registry.path().parent().expect("parent")).expect("mkdir");
    std::fs::write(registry.path(), "{ not json").expect("write");

    let err = registry.snapshot().expect_err("corrupt");
    assert!(matches!(err, AppError::Io(_)));
}

#[test]
fn fanout_names_include_dead_rows_but_never_the_controller() {
    let dir = tempfile::tempdir().expect("tempdir");
    let registry = registry(&dir, LivePids::with(&[1, 2]));
    registry.register("procwarden", 1, vec![]).expect("register");
    registry.register("mirror", 2, vec![]).expect("register");
    registry.register("stale", 3, vec![]).expect("register");

    assert_eq!(
        registry.fanout_names().expect("names"),
        vec!["mirror".to_owned(), "stale".to_owned()]
    );
}
