//! Contract Tests for the File Operation Engine
//!
//! List, read, create and delete inside a project root, including the
//! read ceilings and the directory/file kind checks.

#[path = "../test_utils/mod.rs"]
mod test_utils;

use projectjail::models::EntryKind;
use projectjail::{CoreConfig, Error, ErrorKind, FileOperationEngine};
use std::fs;
use test_utils::{temp_project, test_config, write_file};

fn engine() -> FileOperationEngine {
    FileOperationEngine::new(&test_config())
}

#[tokio::test]
async fn test_create_then_read_round_trip() {
    let (dir, root) = temp_project();
    let files = engine();

    let created = files.create_file(&root, "a/b.txt", "hi", false).await.unwrap();
    assert!(created.created);
    assert_eq!(created.size_bytes, 2);
    assert!(dir.path().join("a").is_dir());

    let read = files.read(&root, "a/b.txt", None, false).await.unwrap();
    assert_eq!(read.content_text(), "hi");
    assert_eq!(read.size_bytes, 2);
    assert!(!read.truncated);
}

#[tokio::test]
async fn test_create_existing_requires_overwrite() {
    let (dir, root) = temp_project();
    let files = engine();
    write_file(dir.path(), "f.txt", "old");

    let err = files.create_file(&root, "f.txt", "new", false).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AlreadyExists);

    let outcome = files.create_file(&root, "f.txt", "newer", true).await.unwrap();
    assert!(!outcome.created);
    assert_eq!(fs::read_to_string(dir.path().join("f.txt")).unwrap(), "newer");
}

#[tokio::test]
async fn test_read_exactly_at_ceiling() {
    let (dir, root) = temp_project();
    let mut config = CoreConfig::default();
    config.files.max_read_bytes = 64;
    config.files.max_preview_bytes = 16;
    let files = FileOperationEngine::new(&config);

    write_file(dir.path(), "exact.bin", vec![b'x'; 64]);
    write_file(dir.path(), "over.bin", vec![b'x'; 65]);

    let exact = files.read(&root, "exact.bin", None, false).await.unwrap();
    assert_eq!(exact.bytes.len(), 64);
    assert!(!exact.truncated);

    let err = files.read(&root, "over.bin", None, false).await.unwrap_err();
    assert!(matches!(
        err,
        Error::FileTooLarge {
            size: 65,
            limit: 64,
            ..
        }
    ));

    let preview = files.read(&root, "over.bin", None, true).await.unwrap();
    assert!(preview.preview);
    assert!(preview.truncated);
    assert_eq!(preview.bytes.len(), 16);
    assert_eq!(preview.size_bytes, 65);
}

#[tokio::test]
async fn test_read_kind_errors() {
    let (dir, root) = temp_project();
    let files = engine();
    fs::create_dir(dir.path().join("d")).unwrap();

    let err = files.read(&root, "d", None, false).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotAFile);

    let err = files.read(&root, "missing.txt", None, false).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_list_flat_and_recursive() {
    let (dir, root) = temp_project();
    let files = engine();
    write_file(dir.path(), "README.md", "# readme");
    write_file(dir.path(), "src/lib.rs", "");
    write_file(dir.path(), "src/util/mod.rs", "");
    fs::create_dir(dir.path().join("Docs")).unwrap();

    let flat = files.list(&root, ".", false).await.unwrap();
    let names: Vec<&str> = flat.iter().map(|e| e.path.as_str()).collect();
    assert_eq!(names, vec!["Docs", "src", "README.md"]);
    assert_eq!(flat[2].size_bytes, 8);
    assert_eq!(flat[2].kind, EntryKind::File);

    let deep = files.list(&root, "src", true).await.unwrap();
    let names: Vec<&str> = deep.iter().map(|e| e.path.as_str()).collect();
    assert_eq!(names, vec!["src/util", "src/lib.rs", "src/util/mod.rs"]);
}

#[tokio::test]
async fn test_list_kind_errors() {
    let (dir, root) = temp_project();
    let files = engine();
    write_file(dir.path(), "f.txt", "x");

    let err = files.list(&root, "f.txt", false).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotADirectory);
    let err = files.list(&root, "nope", false).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_create_directory_semantics() {
    let (dir, root) = temp_project();
    let files = engine();
    write_file(dir.path(), "file", "x");

    let made = files.create_directory(&root, "x/y/z", true).await.unwrap();
    assert!(made.created);
    let again = files.create_directory(&root, "x/y/z", true).await.unwrap();
    assert!(!again.created);

    let err = files.create_directory(&root, "p/q", false).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let err = files.create_directory(&root, "file", true).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AlreadyExists);
}

#[tokio::test]
async fn test_delete_semantics() {
    let (dir, root) = temp_project();
    let files = engine();
    write_file(dir.path(), "full/a.txt", "x");
    fs::create_dir(dir.path().join("empty")).unwrap();
    write_file(dir.path(), "single.txt", "x");

    let err = files.delete(&root, "full", false).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotEmpty);
    assert!(dir.path().join("full/a.txt").exists());

    let removed = files.delete(&root, "full", true).await.unwrap();
    assert_eq!(removed.kind, EntryKind::Directory);
    assert!(!dir.path().join("full").exists());

    files.delete(&root, "empty", false).await.unwrap();
    files.delete(&root, "single.txt", false).await.unwrap();

    let err = files.delete(&root, "single.txt", false).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_delete_root_is_refused() {
    let (dir, root) = temp_project();
    let files = engine();
    write_file(dir.path(), "keep.txt", "x");

    for path in [".", "./"] {
        let err = files.delete(&root, path, true).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PathTraversal);
    }
    assert!(dir.path().join("keep.txt").exists());
}

#[tokio::test]
async fn test_traversal_propagates_unchanged() {
    let (_dir, root) = temp_project();
    let files = engine();

    let err = files.create_file(&root, "../evil.txt", "x", true).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PathTraversal);
    let err = files.create_directory(&root, "/tmp/evil", true).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PathTraversal);
    let err = files.list(&root, "a/../..", false).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PathTraversal);
}
