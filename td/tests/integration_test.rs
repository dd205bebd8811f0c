//! End-to-end tests across the CLI, config loader, broker, and state index -
//! the pieces that don't require a live tracker API or Docker daemon.

use std::path::PathBuf;

use agentd::broker::{Envelope, Queue};
use agentd::config::Config;
use agentd::domain::{TaskKey, TaskRecord, TaskStatus};
use agentd::state::{StateManager, TaskQuery};
use assert_cmd::Command;
use predicates::str::contains;
use tempfile::TempDir;

fn sample_key(number: u64) -> TaskKey {
    TaskKey::GithubIssue {
        owner: "acme".to_string(),
        repo: "widgets".to_string(),
        number,
    }
}

// =============================================================================
// CLI surface
// =============================================================================

#[test]
fn cli_requires_a_mode_for_run() {
    Command::cargo_bin("agentd")
        .unwrap()
        .args(["run"])
        .assert()
        .failure()
        .stderr(contains("--mode"));
}

#[test]
fn cli_rejects_unknown_mode() {
    Command::cargo_bin("agentd")
        .unwrap()
        .args(["run", "--mode", "bogus"])
        .assert()
        .failure();
}

#[test]
fn cli_fails_with_exit_code_one_on_missing_config_file() {
    Command::cargo_bin("agentd")
        .unwrap()
        .args(["--config", "/nonexistent/path/config.yaml", "run", "--mode", "producer"])
        .assert()
        .code(1);
}

#[test]
fn cli_show_reports_missing_task_without_crashing() {
    let dir = TempDir::new().unwrap();
    let config_path = dir.path().join("config.yaml");
    std::fs::write(&config_path, format!("context_storage:\n  base_dir: {:?}\n", dir.path())).unwrap();

    Command::cargo_bin("agentd")
        .unwrap()
        .args(["--config", config_path.to_str().unwrap(), "show", "nonexistent-uuid"])
        .assert()
        .success()
        .stdout(contains("no task found"));
}

// =============================================================================
// Config fallback chain
// =============================================================================

#[test]
fn config_load_falls_back_to_defaults_when_no_file_given() {
    let config = Config::load(None).expect("defaults should always load");
    assert_eq!(config.broker.db_file, "tasks.db");
    assert_eq!(config.continuous.producer.interval_minutes, 5);
}

#[test]
fn config_load_rejects_an_explicit_missing_path() {
    let result = Config::load(Some(&PathBuf::from("/nonexistent/path/config.yaml")));
    assert!(result.is_err());
}

// =============================================================================
// Broker: enqueue, deliver, ack
// =============================================================================

#[tokio::test]
async fn broker_delivers_enqueued_envelope_exactly_once() {
    let dir = TempDir::new().unwrap();
    let queue = Queue::open(dir.path().join("tasks.db")).unwrap();

    let envelope = Envelope {
        task_key: sample_key(1),
        uuid: "t-1".to_string(),
        requester: "alice".to_string(),
        is_resumed: false,
    };
    queue.enqueue(&envelope).unwrap();

    let stop = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
    let delivered = queue
        .get_with_signal_check(std::time::Duration::from_secs(1), &stop, std::time::Duration::from_millis(50))
        .await
        .unwrap();
    assert_eq!(delivered.map(|e| e.uuid), Some("t-1".to_string()));

    // Not yet acked: a second get should not redeliver within the lease window.
    let second = queue
        .get_with_signal_check(std::time::Duration::from_millis(200), &stop, std::time::Duration::from_millis(50))
        .await
        .unwrap();
    assert!(second.is_none());

    queue.ack("t-1").unwrap();
}

#[tokio::test]
async fn broker_enqueue_is_idempotent_per_uuid() {
    let dir = TempDir::new().unwrap();
    let queue = Queue::open(dir.path().join("tasks.db")).unwrap();

    let envelope = Envelope {
        task_key: sample_key(2),
        uuid: "dup-uuid".to_string(),
        requester: "bob".to_string(),
        is_resumed: false,
    };
    queue.enqueue(&envelope).unwrap();
    queue.enqueue(&envelope).unwrap(); // must not error or duplicate the row

    let stop = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
    let first = queue
        .get_with_signal_check(std::time::Duration::from_secs(1), &stop, std::time::Duration::from_millis(50))
        .await
        .unwrap();
    assert!(first.is_some());
    queue.ack("dup-uuid").unwrap();

    let second = queue
        .get_with_signal_check(std::time::Duration::from_millis(200), &stop, std::time::Duration::from_millis(50))
        .await
        .unwrap();
    assert!(second.is_none(), "acked envelope must not redeliver");
}

// =============================================================================
// State index
// =============================================================================

#[tokio::test]
async fn state_manager_round_trips_a_task_record() {
    let dir = TempDir::new().unwrap();
    let state = StateManager::spawn(dir.path().join("index")).unwrap();

    let mut record = TaskRecord::new("u-1".to_string(), &sample_key(3), "alice".to_string(), "anthropic".to_string(), "claude".to_string(), 200_000);
    state.create(record.clone()).await.unwrap();

    let fetched = state.get("u-1").await.unwrap();
    assert_eq!(fetched.status, TaskStatus::Running);

    record.status = TaskStatus::Completed;
    state.update(record).await.unwrap();

    let results = state
        .query(TaskQuery {
            status: Some("completed".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].uuid, "u-1");
}

#[tokio::test]
async fn state_manager_rebuilds_index_from_jsonl_on_restart() {
    let dir = TempDir::new().unwrap();
    let index_path = dir.path().join("index");

    {
        let state = StateManager::spawn(&index_path).unwrap();
        let record = TaskRecord::new("u-2".to_string(), &sample_key(4), "carol".to_string(), "anthropic".to_string(), "claude".to_string(), 200_000);
        state.create(record).await.unwrap();
    }

    // A fresh actor over the same path should see the previously created row.
    let state = StateManager::spawn(&index_path).unwrap();
    let fetched = state.get("u-2").await.unwrap();
    assert_eq!(fetched.requester, "carol");
}
