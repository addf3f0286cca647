use std::fs;

use relay_engine::{ensure_dir, remove_quietly, session_dir, AtomicFileWriter};
use tempfile::TempDir;

#[test]
fn creates_missing_work_dir() {
    let temp = TempDir::new().unwrap();
    let dir = session_dir(&temp.path().join("downloads"), 7);
    assert!(dir.ends_with("session-7"));
    assert!(!dir.exists());
    ensure_dir(&dir).unwrap();
    assert!(dir.is_dir());
}

#[test]
fn file_in_place_of_dir_is_rejected() {
    let temp = TempDir::new().unwrap();
    let file_path = temp.path().join("taken");
    fs::write(&file_path, "x").unwrap();
    assert!(ensure_dir(&file_path).is_err());
}

#[test]
fn atomic_write_replaces_existing() {
    let temp = TempDir::new().unwrap();
    let writer = AtomicFileWriter::new(temp.path().to_path_buf());

    let first = writer.write("destination.ron", b"one").unwrap();
    assert_eq!(first.file_name().unwrap(), "destination.ron");
    assert_eq!(fs::read(&first).unwrap(), b"one");

    let second = writer.write("destination.ron", b"two").unwrap();
    assert_eq!(first, second);
    assert_eq!(fs::read_to_string(&second).unwrap(), "two");
}

#[test]
fn no_partial_file_on_error() {
    let temp = TempDir::new().unwrap();
    let file_path = temp.path().join("not_a_dir");
    fs::write(&file_path, "x").unwrap();

    let writer = AtomicFileWriter::new(file_path.clone());
    assert!(writer.write("state.ron", b"data").is_err());
    assert!(!file_path.with_file_name("state.ron").exists());
}

#[tokio::test]
async fn quiet_removal_tolerates_missing_files() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("clip.mp4");
    fs::write(&path, "x").unwrap();
    remove_quietly(&path).await;
    assert!(!path.exists());
    remove_quietly(&path).await;
}
