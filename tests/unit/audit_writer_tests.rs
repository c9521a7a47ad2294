//! Unit tests for `JsonlAuditWriter`.

use std::fs;
use std::sync::Arc;

use procwarden::audit::{AuditEntry, AuditEventType, AuditLogger, JsonlAuditWriter};

#[test]
fn new_creates_directory_if_missing() {
    let temp = tempfile::tempdir().expect("tempdir");
    let log_dir = temp.path().join("nested").join("logs");

    let writer = JsonlAuditWriter::new(log_dir.clone(), "container").expect("writer");

    assert!(log_dir.is_dir());
    assert!(writer.current_path().starts_with(&log_dir));
}

#[test]
fn file_name_carries_prefix_and_date() {
    let temp = tempfile::tempdir().expect("tempdir");
    let writer = JsonlAuditWriter::new(temp.path().to_path_buf(), "container").expect("writer");

    let name = writer
        .current_path()
        .file_name()
        .and_then(|n| n.to_str())
        .map(str::to_owned)
        .expect("file name");
    let today = chrono::Utc::now().date_naive().to_string();

    assert_eq!(name, format!("container-{today}.jsonl"));
}

#[test]
fn entries_are_appended_as_json_lines() {
    let temp = tempfile::tempdir().expect("tempdir");
    let writer = JsonlAuditWriter::new(temp.path().to_path_buf(), "container").expect("writer");

    writer
        .log_entry(
            AuditEntry::new(AuditEventType::ContainerKill)
                .with_container("abc".into())
                .with_command("docker kill abc".into())
                .with_result("ok".into()),
        )
        .expect("kill entry");
    writer
        .log_entry(
            AuditEntry::new(AuditEventType::Failure)
                .with_container("abc".into())
                .with_command("docker rm abc".into())
                .with_reason("No such daemon".into()),
        )
        .expect("failure entry");

    let body = fs::read_to_string(writer.current_path()).expect("read");
    let lines: Vec<serde_json::Value> = body
        .lines()
        .map(|l| serde_json::from_str(l).expect("valid json"))
        .collect();

    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0]["event_type"], "container_kill");
    assert_eq!(lines[0]["result_summary"], "ok");
    assert_eq!(lines[1]["event_type"], "failure");
    assert_eq!(lines[1]["reason"], "No such daemon");
    assert!(lines[1]["timestamp"].is_string());
}

#[test]
fn concurrent_writes_produce_valid_jsonl() {
    let temp = tempfile::tempdir().expect("tempdir");
    let writer = Arc::new(JsonlAuditWriter::new(temp.path().to_path_buf(), "container").expect("writer"));

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let writer = Arc::clone(&writer);
            std::thread::spawn(move || {
                for j in 0..10 {
                    writer
                        .log_entry(
                            AuditEntry::new(AuditEventType::MarkerRemoved)
                                .with_container(format!("c{i}-{j}")),
                        )
                        .expect("write");
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("join");
    }

    let body = fs::read_to_string(writer.current_path()).expect("read");
    assert_eq!(body.lines().count(), 80);
    for line in body.lines() {
        let _: serde_json::Value = serde_json::from_str(line).expect("valid json");
    }
}
