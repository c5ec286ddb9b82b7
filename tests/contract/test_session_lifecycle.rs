//! Contract Tests for Terminal Session Lifecycle
//!
//! start / list / attach / cleanup semantics of the session registry,
//! including idempotent release and single-consumer attach.

#[path = "../test_utils/mod.rs"]
mod test_utils;

use projectjail::session::{ClientMessage, DetachReason};
use projectjail::signals::process_group_alive;
use projectjail::{ErrorKind, SessionRegistry, SessionState};
use std::time::Duration;
use test_utils::{temp_project, test_config};
use tokio::sync::mpsc;

/// Poll `check` until it holds or two seconds pass
async fn eventually<F: Fn() -> bool>(check: F) -> bool {
    for _ in 0..40 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    check()
}

#[tokio::test]
async fn test_start_list_cleanup() {
    let (_dir, root) = temp_project();
    let registry = SessionRegistry::new(&test_config());

    let id = registry.start(&root).await.unwrap();
    assert_eq!(registry.list(&root).await, vec![id.clone()]);

    let infos = registry.sessions(&root).await;
    assert_eq!(infos.len(), 1);
    assert_eq!(infos[0].state, SessionState::Running);

    registry.cleanup(&id).await;
    assert!(registry.list(&root).await.is_empty());
}

#[tokio::test]
async fn test_cleanup_is_idempotent() {
    let (_dir, root) = temp_project();
    let registry = SessionRegistry::new(&test_config());
    let id = registry.start(&root).await.unwrap();

    registry.cleanup(&id).await;
    registry.cleanup(&id).await;
    registry.cleanup("never-existed").await;
    assert!(registry.is_empty().await);
}

#[tokio::test]
async fn test_concurrent_cleanup_releases_once() {
    let (_dir, root) = temp_project();
    let registry = SessionRegistry::new(&test_config());
    let id = registry.start(&root).await.unwrap();

    tokio::join!(
        registry.cleanup(&id),
        registry.cleanup(&id),
        registry.cleanup(&id)
    );
    assert!(registry.is_empty().await);
}

#[tokio::test]
async fn test_cleanup_of_one_session_leaves_other_untouched() {
    let (_dir, root) = temp_project();
    let registry = SessionRegistry::new(&test_config());

    let (s1, s2) = tokio::join!(registry.start(&root), registry.start(&root));
    let (s1, s2) = (s1.unwrap(), s2.unwrap());
    let pid1 = registry.info(&s1).await.unwrap().pid.unwrap();
    let pid2 = registry.info(&s2).await.unwrap().pid.unwrap();

    registry.cleanup(&s1).await;

    assert_eq!(registry.list(&root).await, vec![s2.clone()]);
    assert!(eventually(|| !process_group_alive(pid1)).await);
    assert!(process_group_alive(pid2));
    assert_eq!(registry.info(&s2).await.unwrap().state, SessionState::Running);

    registry.cleanup(&s2).await;
}

#[tokio::test]
async fn test_list_is_scoped_to_root() {
    let (_dir_a, root_a) = temp_project();
    let (_dir_b, root_b) = temp_project();
    let registry = SessionRegistry::new(&test_config());

    let a = registry.start(&root_a).await.unwrap();
    let b = registry.start(&root_b).await.unwrap();

    assert_eq!(registry.list(&root_a).await, vec![a.clone()]);
    assert_eq!(registry.list(&root_b).await, vec![b.clone()]);

    registry.shutdown_all().await;
    assert!(registry.is_empty().await);
}

#[tokio::test]
async fn test_session_limit() {
    let (_dir, root) = temp_project();
    let mut config = test_config();
    config.terminal.max_sessions = 2;
    let registry = SessionRegistry::new(&config);

    let first = registry.start(&root).await.unwrap();
    registry.start(&root).await.unwrap();
    let err = registry.start(&root).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ResourceExhausted);

    registry.cleanup(&first).await;
    registry.start(&root).await.unwrap();
    registry.shutdown_all().await;
}

#[tokio::test]
async fn test_second_attach_is_busy() {
    let (_dir, root) = temp_project();
    let registry = SessionRegistry::new(&test_config());
    let id = registry.start(&root).await.unwrap();

    let (_tx1, rx1) = mpsc::channel(4);
    let _attachment = registry.attach(&id, rx1).await.unwrap();
    assert!(registry.info(&id).await.unwrap().attached);

    let (_tx2, rx2) = mpsc::channel(4);
    let err = registry.attach(&id, rx2).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SessionBusy);

    registry.cleanup(&id).await;
}

#[tokio::test]
async fn test_attach_after_cleanup_is_not_found() {
    let (_dir, root) = temp_project();
    let registry = SessionRegistry::new(&test_config());
    let id = registry.start(&root).await.unwrap();
    registry.cleanup(&id).await;

    let (_tx, rx) = mpsc::channel::<ClientMessage>(4);
    let err = registry.attach(&id, rx).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_client_disconnect_triggers_cleanup() {
    let (_dir, root) = temp_project();
    let registry = SessionRegistry::new(&test_config());
    let id = registry.start(&root).await.unwrap();

    let (tx, rx) = mpsc::channel(4);
    let attachment = registry.attach(&id, rx).await.unwrap();
    drop(tx);

    let reason = tokio::time::timeout(Duration::from_secs(5), attachment.task)
        .await
        .expect("pump finished")
        .unwrap();
    assert_eq!(reason, DetachReason::ClientClosed);
    assert!(registry.list(&root).await.is_empty());
}

#[tokio::test]
async fn test_explicit_cleanup_detaches_client() {
    let (_dir, root) = temp_project();
    let registry = SessionRegistry::new(&test_config());
    let id = registry.start(&root).await.unwrap();

    let (_tx, rx) = mpsc::channel(4);
    let attachment = registry.attach(&id, rx).await.unwrap();
    registry.cleanup(&id).await;

    let reason = tokio::time::timeout(Duration::from_secs(5), attachment.task)
        .await
        .expect("pump finished")
        .unwrap();
    assert_ne!(reason, DetachReason::ClientClosed);
}

#[tokio::test]
async fn test_child_exit_releases_session() {
    let (_dir, root) = temp_project();
    let registry = SessionRegistry::new(&test_config());
    let id = registry.start(&root).await.unwrap();

    let (tx, rx) = mpsc::channel(4);
    let attachment = registry.attach(&id, rx).await.unwrap();
    tx.send(ClientMessage::Input(b"exit\n".to_vec())).await.unwrap();

    let reason = tokio::time::timeout(Duration::from_secs(5), attachment.task)
        .await
        .expect("pump finished")
        .unwrap();
    assert_eq!(reason, DetachReason::ChildExited);
    assert!(registry.is_empty().await);
}
