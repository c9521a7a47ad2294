//! Integration tests for the restart watcher and the child monitor.
//!
//! These spawn real short-lived unix processes (`sleep`, `true`).

#![cfg(unix)]

use std::sync::Arc;
use std::time::Duration;

use procwarden::orchestrator::child_monitor::poll_children;
use procwarden::orchestrator::registry::ProcessRegistry;
use procwarden::orchestrator::restart::ALL_CALLER;
use procwarden::orchestrator::spawner::{self, ActiveChildren};
use procwarden::orchestrator::watcher::RestartWatcher;
use procwarden::persistence::db;
use procwarden::persistence::restart_repo::RestartRepo;
use procwarden::supervisor::system::SystemSupervisor;
use procwarden::supervisor::ProcessSupervisor;

struct Fixture {
    dir: tempfile::TempDir,
    repo: RestartRepo,
    registry: Arc<ProcessRegistry>,
    children: ActiveChildren,
    watcher: RestartWatcher,
}

async fn fixture() -> Fixture {
    let dir = tempfile::tempdir().expect("tempdir");
    let supervisor: Arc<dyn ProcessSupervisor> = Arc::new(SystemSupervisor::new(None));
    let registry = Arc::new(ProcessRegistry::new(
        dir.path().join("processes.json"),
        "procwarden",
        Arc::clone(&supervisor),
    ));
    let repo = RestartRepo::new(Arc::new(db::connect_memory().await.expect("db")));
    let children = ActiveChildren::default();
    let watcher = RestartWatcher::new(
        repo.clone(),
        Arc::clone(&registry),
        supervisor,
        Arc::clone(&children),
        dir.path().to_path_buf(),
    );
    Fixture {
        dir,
        repo,
        registry,
        children,
        watcher,
    }
}

async fn launch_sleeper(fx: &Fixture, name: &str) -> u32 {
    let child = spawner::spawn_background(
        name,
        &["sleep".to_owned(), "30".to_owned()],
        fx.dir.path(),
    )
    .expect("spawn sleep");
    let pid = child.id().expect("pid");
    fx.registry
        .register(name, pid, vec!["sleep".into(), "30".into()])
        .expect("register");
    fx.children.lock().await.insert(name.to_owned(), child);
    pid
}

async fn pid_of(fx: &Fixture, name: &str) -> u32 {
    fx.registry
        .lookup(name)
        .expect("lookup")
        .expect("registered")
        .pid
}

#[tokio::test]
async fn flagged_process_is_restarted_with_a_new_pid() {
    let fx = fixture().await;
    let mirror = launch_sleeper(&fx, "mirror").await;
    let bot = launch_sleeper(&fx, "telegram-bot").await;

    fx.repo.upsert("mirror").await.expect("upsert");
    let restarted = fx.watcher.cycle().await.expect("cycle");

    assert_eq!(restarted, vec!["mirror".to_owned()]);
    assert_ne!(pid_of(&fx, "mirror").await, mirror);
    assert_eq!(pid_of(&fx, "telegram-bot").await, bot);
    assert!(fx.repo.list().await.expect("list").is_empty(), "record is consumed");
    assert_eq!(fx.children.lock().await.len(), 2);
}

#[tokio::test]
async fn all_record_restarts_every_registered_process() {
    let fx = fixture().await;
    let mirror = launch_sleeper(&fx, "mirror").await;
    let bot = launch_sleeper(&fx, "telegram-bot").await;

    fx.repo.upsert(ALL_CALLER).await.expect("upsert");
    let mut restarted = fx.watcher.cycle().await.expect("cycle");
    restarted.sort();

    assert_eq!(restarted, vec!["mirror".to_owned(), "telegram-bot".to_owned()]);
    assert_ne!(pid_of(&fx, "mirror").await, mirror);
    assert_ne!(pid_of(&fx, "telegram-bot").await, bot);
    assert!(fx.repo.list().await.expect("list").is_empty());
}

#[tokio::test]
async fn all_record_never_restarts_the_controller_row() {
    let fx = fixture().await;
    let own = launch_sleeper(&fx, "procwarden").await;
    launch_sleeper(&fx, "mirror").await;

    fx.repo.upsert(ALL_CALLER).await.expect("upsert");
    let restarted = fx.watcher.cycle().await.expect("cycle");

    assert_eq!(restarted, vec!["mirror".to_owned()]);
    assert_eq!(pid_of(&fx, "procwarden").await, own);
}

#[tokio::test]
async fn idle_cycle_changes_nothing() {
    let fx = fixture().await;
    let mirror = launch_sleeper(&fx, "mirror").await;

    let restarted = fx.watcher.cycle().await.expect("cycle");

    assert!(restarted.is_empty());
    assert_eq!(pid_of(&fx, "mirror").await, mirror);
}

#[tokio::test]
async fn record_for_unregistered_caller_stays_pending() {
    let fx = fixture().await;
    launch_sleeper(&fx, "mirror").await;

    fx.repo.upsert("weather-station").await.expect("upsert");
    let restarted = fx.watcher.cycle().await.expect("cycle");

    assert!(restarted.is_empty());
    let pending = fx.repo.list().await.expect("list");
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].caller, "weather-station");
}

#[tokio::test]
async fn exited_child_is_dropped_from_registry() {
    let fx = fixture().await;
    let child = spawner::spawn_background("oneshot", &["true".to_owned()], fx.dir.path())
        .expect("spawn true");
    let pid = child.id().expect("pid");
    fx.registry
        .register("oneshot", pid, vec!["true".into()])
        .expect("register");
    fx.children.lock().await.insert("oneshot".to_owned(), child);
    launch_sleeper(&fx, "mirror").await;

    let mut exited = Vec::new();
    for _ in 0..50 {
        exited = poll_children(&fx.children, &fx.registry).await;
        if !exited.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    assert_eq!(exited, vec!["oneshot".to_owned()]);
    assert!(fx.registry.lookup("oneshot").expect("lookup").is_none());
    assert!(fx.registry.lookup("mirror").expect("lookup").is_some());
    assert!(fx.children.lock().await.contains_key("mirror"));
}
