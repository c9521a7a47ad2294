//! Integration tests for the startup sequence and the hygiene pass.

use std::fs;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use procwarden::orchestrator::startup::{
    normalize_permissions, purge_caches, purge_logs, purge_logs_at, Hygiene, StartupSequencer,
};
use procwarden::speech::ScriptedConversation;

use super::test_helpers::{test_config, test_context};

const DAY: u64 = 86_400;

#[test]
fn fresh_logs_survive_a_long_retention() {
    let dir = tempfile::tempdir().expect("tempdir");
    fs::write(dir.path().join("today.log"), "x").expect("write");

    let purged = purge_logs(dir.path(), 10).expect("purge");

    assert_eq!(purged, 0);
    assert!(dir.path().join("today.log").exists());
}

#[test]
fn expired_logs_are_removed_recursively() {
    let dir = tempfile::tempdir().expect("tempdir");
    fs::create_dir_all(dir.path().join("archive")).expect("mkdir");
    fs::write(dir.path().join("a.log"), "x").expect("write");
    fs::write(dir.path().join("archive").join("b.log"), "x").expect("write");
    let later = SystemTime::now() + Duration::from_secs(11 * DAY);

    let purged = purge_logs_at(dir.path(), 10, later).expect("purge");

    assert_eq!(purged, 2);
    assert!(!dir.path().join("a.log").exists());
    assert!(!dir.path().join("archive").join("b.log").exists());
    assert!(dir.path().join("archive").is_dir(), "directories are left alone");
}

#[test]
fn logs_are_kept_until_a_whole_extra_day_has_passed() {
    let dir = tempfile::tempdir().expect("tempdir");
    fs::write(dir.path().join("edge.log"), "x").expect("write");
    let almost = SystemTime::now() + Duration::from_secs(10 * DAY + 23 * 3600);

    let purged = purge_logs_at(dir.path(), 10, almost).expect("purge");

    assert_eq!(purged, 0);
    assert!(dir.path().join("edge.log").exists());
}

#[test]
fn missing_log_directory_is_not_an_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let purged = purge_logs(&dir.path().join("nope"), 0).expect("purge");
    assert_eq!(purged, 0);
}

#[test]
fn cache_directories_are_purged_at_any_depth() {
    let dir = tempfile::tempdir().expect("tempdir");
    let root = dir.path();
    fs::create_dir_all(root.join("__cache__")).expect("mkdir");
    fs::create_dir_all(root.join("pkg").join("sub").join("__cache__").join("deeper")).expect("mkdir");
    fs::write(root.join("pkg").join("sub").join("__cache__").join("x.bin"), "x").expect("write");
    fs::write(root.join("pkg").join("keep.txt"), "x").expect("write");

    let removed = purge_caches(root, "__cache__").expect("purge");

    assert_eq!(removed, 2);
    assert!(!root.join("__cache__").exists());
    assert!(!root.join("pkg").join("sub").join("__cache__").exists());
    assert!(root.join("pkg").join("keep.txt").exists());
}

#[cfg(unix)]
#[test]
fn permissions_gain_owner_execute_except_exempt_files() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().expect("tempdir");
    let script = dir.path().join("helper.sh");
    let marker = dir.path().join("speech_synthesis.cid");
    for path in [&script, &marker] {
        fs::write(path, "x").expect("write");
        fs::set_permissions(path, fs::Permissions::from_mode(0o644)).expect("chmod");
    }

    let touched = normalize_permissions(dir.path(), "cid").expect("normalize");

    assert_eq!(touched, 1);
    let mode = |p: &std::path::Path| fs::metadata(p).expect("stat").permissions().mode() & 0o777;
    assert_eq!(mode(&script), 0o744);
    assert_eq!(mode(&marker), 0o644);
}

#[test]
fn startup_applies_session_defaults_and_runs_hygiene() {
    let dir = tempfile::tempdir().expect("tempdir");
    let root = dir.path();
    fs::create_dir_all(root.join("logs")).expect("mkdir");
    fs::create_dir_all(root.join("src").join("__cache__")).expect("mkdir");
    fs::write(root.join("logs").join("today.log"), "x").expect("write");

    let ctx = test_context();
    let conversation = Arc::new(ScriptedConversation::with_replies(Vec::<String>::new()));
    let hygiene = Hygiene {
        logs_dir: root.join("logs"),
        retention_days: 0,
        working_dir: root.to_path_buf(),
        cache_dir_name: "__cache__".to_owned(),
        data_dir: root.join("fileio"),
        exempt_extension: "cid".to_owned(),
    };

    assert!(!ctx.is_listening());
    StartupSequencer::new(ctx.clone(), conversation.clone(), 50, hygiene).run();

    assert!(ctx.is_listening());
    assert_eq!(ctx.volume(), 50);
    assert!(conversation.spoken().is_empty(), "startup is silent");
    assert!(
        root.join("logs").join("today.log").exists(),
        "logs younger than a day are kept even with zero retention"
    );
    assert!(!root.join("src").join("__cache__").exists());
}

#[test]
fn hygiene_failure_never_aborts_startup() {
    let dir = tempfile::tempdir().expect("tempdir");
    // Missing working tree: the cache walk fails.
    let hygiene = Hygiene {
        logs_dir: dir.path().join("logs"),
        retention_days: 0,
        working_dir: dir.path().join("does-not-exist"),
        cache_dir_name: "__cache__".to_owned(),
        data_dir: dir.path().join("fileio"),
        exempt_extension: "cid".to_owned(),
    };
    assert!(hygiene.run().is_err());

    let ctx = test_context();
    StartupSequencer::new(
        ctx.clone(),
        Arc::new(ScriptedConversation::with_replies(Vec::<String>::new())),
        30,
        hygiene,
    )
    .run();

    assert!(ctx.is_listening());
    assert_eq!(ctx.volume(), 30);
}

#[test]
fn hygiene_paths_follow_configuration() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = test_config(dir.path());

    let hygiene = Hygiene::from_config(&config);

    assert_eq!(hygiene.logs_dir, config.working_dir.join("logs"));
    assert_eq!(hygiene.data_dir, config.working_dir.join("fileio"));
    assert_eq!(hygiene.retention_days, 10);
    assert_eq!(hygiene.cache_dir_name, "__cache__");
    assert_eq!(hygiene.exempt_extension, "cid");
}
