//! Integration Tests for Terminal I/O
//!
//! Bytes typed into an attached session reach the shell, and the shell's
//! output comes back on the attachment.

#[path = "../test_utils/mod.rs"]
mod test_utils;

use projectjail::session::{Attachment, ClientMessage, DetachReason};
use projectjail::SessionRegistry;
use std::time::Duration;
use test_utils::{temp_project, test_config, write_file};
use tokio::sync::mpsc;

/// Read output until `needle` shows up or five seconds pass
async fn read_until(attachment: &mut Attachment, needle: &str) -> String {
    let mut seen = String::new();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !seen.contains(needle) {
        match tokio::time::timeout_at(deadline, attachment.output.recv()).await {
            Ok(Some(bytes)) => seen.push_str(&String::from_utf8_lossy(&bytes)),
            _ => break,
        }
    }
    seen
}

#[tokio::test]
async fn test_echo_round_trip() {
    let (_dir, root) = temp_project();
    let registry = SessionRegistry::new(&test_config());
    let id = registry.start(&root).await.unwrap();

    let (tx, rx) = mpsc::channel(8);
    let mut attachment = registry.attach(&id, rx).await.unwrap();
    tx.send(ClientMessage::Input(b"echo pj-$((40 + 2))\n".to_vec()))
        .await
        .unwrap();

    let output = read_until(&mut attachment, "pj-42").await;
    assert!(output.contains("pj-42"), "output was {:?}", output);

    registry.cleanup(&id).await;
}

#[tokio::test]
async fn test_shell_starts_in_project_root() {
    let (dir, root) = temp_project();
    write_file(dir.path(), "marker-file.txt", "");
    let registry = SessionRegistry::new(&test_config());
    let id = registry.start(&root).await.unwrap();

    let (tx, rx) = mpsc::channel(8);
    let mut attachment = registry.attach(&id, rx).await.unwrap();
    tx.send(ClientMessage::Input(b"ls; echo END-$((1 + 1))\n".to_vec()))
        .await
        .unwrap();

    let output = read_until(&mut attachment, "END-2").await;
    assert!(output.contains("marker-file.txt"), "output was {:?}", output);

    registry.cleanup(&id).await;
}

#[tokio::test]
async fn test_resize_message_changes_window_size() {
    let (_dir, root) = temp_project();
    let registry = SessionRegistry::new(&test_config());
    let id = registry.start(&root).await.unwrap();

    let (tx, rx) = mpsc::channel(8);
    let mut attachment = registry.attach(&id, rx).await.unwrap();
    tx.send(ClientMessage::Resize { cols: 132, rows: 43 })
        .await
        .unwrap();
    tx.send(ClientMessage::Input(b"stty size; echo SIZE-$((6 * 7))\n".to_vec()))
        .await
        .unwrap();

    let output = read_until(&mut attachment, "SIZE-42").await;
    assert!(output.contains("43 132"), "output was {:?}", output);

    registry.resize(&id, 100, 30).await.unwrap();
    registry.cleanup(&id).await;
}

#[tokio::test]
async fn test_activity_updates_last_activity() {
    let (_dir, root) = temp_project();
    let registry = SessionRegistry::new(&test_config());
    let id = registry.start(&root).await.unwrap();
    let before = registry.info(&id).await.unwrap().last_activity;

    tokio::time::sleep(Duration::from_millis(20)).await;
    let (tx, rx) = mpsc::channel(8);
    let mut attachment = registry.attach(&id, rx).await.unwrap();
    tx.send(ClientMessage::Input(b"echo ping\n".to_vec()))
        .await
        .unwrap();
    read_until(&mut attachment, "ping").await;

    let after = registry.info(&id).await.unwrap().last_activity;
    assert!(after > before);

    registry.cleanup(&id).await;
}

#[tokio::test]
async fn test_output_before_exit_reaches_slow_client() {
    let (_dir, root) = temp_project();
    let registry = SessionRegistry::new(&test_config());
    let id = registry.start(&root).await.unwrap();

    let (tx, rx) = mpsc::channel(8);
    let mut attachment = registry.attach(&id, rx).await.unwrap();
    tx.send(ClientMessage::Input(
        b"i=0; while [ $i -lt 5000 ]; do echo line$i; i=$((i + 1)); done; echo DONE-$((2 * 3)); exit\n"
            .to_vec(),
    ))
    .await
    .unwrap();

    // Consume until the attachment closes, a little slower than the shell writes
    let mut seen = String::new();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(30);
    while let Ok(Some(bytes)) = tokio::time::timeout_at(deadline, attachment.output.recv()).await {
        seen.push_str(&String::from_utf8_lossy(&bytes));
        tokio::time::sleep(Duration::from_micros(200)).await;
    }

    let tail: Vec<&str> = seen.lines().rev().take(5).collect();
    assert!(seen.contains("line4999"), "tail was {:?}", tail);
    assert!(seen.contains("DONE-6"), "tail was {:?}", tail);
    let reason = attachment.task.await.unwrap();
    assert_eq!(reason, DetachReason::ChildExited);
    assert!(registry.is_empty().await);
}
