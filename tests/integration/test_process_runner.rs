//! Integration Tests for Bounded Command Execution
//!
//! Real `/bin/sh` commands run inside temporary project roots.

#[path = "../test_utils/mod.rs"]
mod test_utils;

use projectjail::audit::{AuditCategory, AuditOutcome, MemoryAuditSink};
use projectjail::{ErrorKind, ProcessRunner};
use std::sync::Arc;
use std::time::{Duration, Instant};
use test_utils::{temp_project, test_config, write_file};

#[tokio::test]
async fn test_captures_stdout_stderr_and_exit_code() {
    let (_dir, root) = temp_project();
    let runner = ProcessRunner::new(&test_config());

    let result = runner
        .execute(&root, "echo out; echo err >&2; exit 3", Some(10), None)
        .await
        .unwrap();
    assert_eq!(result.exit_code, Some(3));
    assert_eq!(result.stdout, "out\n");
    assert_eq!(result.stderr, "err\n");
    assert!(!result.timed_out);
    assert!(!result.success());
}

#[tokio::test]
async fn test_runs_in_confined_working_directory() {
    let (dir, root) = temp_project();
    write_file(dir.path(), "sub/marker.txt", "here");
    let runner = ProcessRunner::new(&test_config());

    let result = runner
        .execute(&root, "cat marker.txt && pwd", Some(10), Some("sub"))
        .await
        .unwrap();
    assert!(result.success());
    assert!(result.stdout.starts_with("here"));
    assert!(result
        .stdout
        .trim_end()
        .ends_with(&root.path().join("sub").display().to_string()));
}

#[tokio::test]
async fn test_timeout_kills_and_reports() {
    let (_dir, root) = temp_project();
    let runner = ProcessRunner::new(&test_config());

    let started = Instant::now();
    let result = runner.execute(&root, "sleep 5", Some(1), None).await.unwrap();
    let elapsed = started.elapsed();

    assert!(result.timed_out);
    assert_eq!(result.exit_code, None);
    assert!(elapsed < Duration::from_secs(4), "took {:?}", elapsed);
    assert!(result.duration >= Duration::from_millis(900));

    let err = result.into_completed().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Timeout);
}

#[tokio::test]
async fn test_timeout_kills_whole_process_group() {
    let (dir, root) = temp_project();
    let runner = ProcessRunner::new(&test_config());

    // The background child would create the file after the deadline
    let result = runner
        .execute(&root, "(sleep 2; touch late.txt) & sleep 10", Some(1), None)
        .await
        .unwrap();
    assert!(result.timed_out);

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(!dir.path().join("late.txt").exists());
}

#[tokio::test]
async fn test_large_output_is_truncated_without_deadlock() {
    let (_dir, root) = temp_project();
    let mut config = test_config();
    config.exec.max_output_bytes = 1024;
    let runner = ProcessRunner::new(&config);

    // Far more than a pipe buffer; the child must still run to completion
    let result = runner
        .execute(&root, "head -c 1000000 /dev/zero; echo done >&2", Some(10), None)
        .await
        .unwrap();
    assert_eq!(result.exit_code, Some(0));
    assert_eq!(result.stdout.len(), 1024);
    assert!(result.stdout_truncated);
    assert_eq!(result.stderr, "done\n");
    assert!(!result.stderr_truncated);
}

#[tokio::test]
async fn test_stdin_is_closed() {
    let (_dir, root) = temp_project();
    let runner = ProcessRunner::new(&test_config());

    let result = runner.execute(&root, "cat; echo eof", Some(5), None).await.unwrap();
    assert!(!result.timed_out);
    assert_eq!(result.stdout, "eof\n");
}

#[tokio::test]
async fn test_executions_are_audited() {
    let (_dir, root) = temp_project();
    let sink = Arc::new(MemoryAuditSink::new());
    let runner = ProcessRunner::new(&test_config()).with_audit_sink(sink.clone());

    runner.execute(&root, "true", Some(5), None).await.unwrap();
    runner.execute(&root, "false", Some(5), None).await.unwrap();

    let outcomes: Vec<AuditOutcome> = sink
        .of_category(AuditCategory::CommandExecution)
        .into_iter()
        .map(|e| e.outcome)
        .collect();
    assert_eq!(outcomes, vec![AuditOutcome::Succeeded, AuditOutcome::Failed]);
}
