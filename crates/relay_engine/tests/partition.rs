mod common;

use std::fs;
use std::sync::Arc;

use common::{init_logging, FakeToolchain};
use pretty_assertions::assert_eq;
use relay_engine::{discover_parts, Partitioner};
use tempfile::TempDir;

fn names(paths: &[std::path::PathBuf]) -> Vec<String> {
    paths
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect()
}

#[tokio::test]
async fn small_artifact_is_returned_unchanged() {
    init_logging();
    let temp = TempDir::new().unwrap();
    let original = temp.path().join("clip.mp4");
    fs::write(&original, vec![0u8; 100]).unwrap();
    let toolchain = Arc::new(FakeToolchain::default());

    let parts = Partitioner::with_ceiling_bytes(toolchain.clone(), 100)
        .partition_if_needed(&original)
        .await
        .unwrap();

    assert_eq!(parts, vec![original.clone()]);
    assert!(original.exists());
    assert!(toolchain.cuts.lock().unwrap().is_empty());
}

#[tokio::test]
async fn oversized_video_is_cut_into_equal_time_slices() {
    init_logging();
    let temp = TempDir::new().unwrap();
    let original = temp.path().join("clip.mp4");
    fs::write(&original, vec![0u8; 250]).unwrap();
    let toolchain = Arc::new(FakeToolchain::default());

    let parts = Partitioner::with_ceiling_bytes(toolchain.clone(), 100)
        .partition_if_needed(&original)
        .await
        .unwrap();

    assert_eq!(
        names(&parts),
        vec![
            "clip_part001_of_003.mp4",
            "clip_part002_of_003.mp4",
            "clip_part003_of_003.mp4",
        ]
    );
    // 30 s probe duration, three contiguous 10 s slices covering the whole file.
    let cuts = toolchain.cuts.lock().unwrap().clone();
    assert_eq!(cuts, vec![(0.0, 10.0), (10.0, 10.0), (20.0, 10.0)]);
    let covered: f64 = cuts.iter().map(|(_, len)| len).sum();
    assert_eq!(covered, 30.0);
    assert!(!original.exists());
    assert_eq!(discover_parts(&parts[1]).await, parts);
}

#[tokio::test]
async fn missing_duration_keeps_original() {
    init_logging();
    let temp = TempDir::new().unwrap();
    let original = temp.path().join("clip.mp4");
    fs::write(&original, vec![0u8; 250]).unwrap();
    let toolchain = Arc::new(FakeToolchain {
        probe: None,
        ..FakeToolchain::default()
    });

    let parts = Partitioner::with_ceiling_bytes(toolchain.clone(), 100)
        .partition_if_needed(&original)
        .await
        .unwrap();

    assert_eq!(parts, vec![original.clone()]);
    assert!(original.exists());
    assert!(toolchain.cuts.lock().unwrap().is_empty());
}

#[tokio::test]
async fn failed_part_is_skipped() {
    init_logging();
    let temp = TempDir::new().unwrap();
    let original = temp.path().join("clip.mp4");
    fs::write(&original, vec![0u8; 250]).unwrap();
    let toolchain = Arc::new(FakeToolchain {
        failing_cuts: vec![2],
        ..FakeToolchain::default()
    });

    let parts = Partitioner::with_ceiling_bytes(toolchain, 100)
        .partition_if_needed(&original)
        .await
        .unwrap();

    assert_eq!(
        names(&parts),
        vec!["clip_part001_of_003.mp4", "clip_part003_of_003.mp4"]
    );
    assert!(!original.exists());
}

#[tokio::test]
async fn no_parts_falls_back_to_original() {
    init_logging();
    let temp = TempDir::new().unwrap();
    let original = temp.path().join("clip.mp4");
    fs::write(&original, vec![0u8; 250]).unwrap();
    let toolchain = Arc::new(FakeToolchain {
        failing_cuts: vec![1, 2, 3],
        ..FakeToolchain::default()
    });

    let parts = Partitioner::with_ceiling_bytes(toolchain, 100)
        .partition_if_needed(&original)
        .await
        .unwrap();

    assert_eq!(parts, vec![original.clone()]);
    assert!(original.exists());
}

#[tokio::test]
async fn documents_split_into_contiguous_byte_ranges() {
    init_logging();
    let temp = TempDir::new().unwrap();
    let original = temp.path().join("manual.pdf");
    let content: Vec<u8> = (0..250u32).map(|i| (i % 251) as u8).collect();
    fs::write(&original, &content).unwrap();

    let parts = Partitioner::with_ceiling_bytes(Arc::new(FakeToolchain::default()), 100)
        .partition_bytes_if_needed(&original)
        .await
        .unwrap();

    assert_eq!(parts.len(), 3);
    let rebuilt: Vec<u8> = parts.iter().flat_map(|p| fs::read(p).unwrap()).collect();
    assert_eq!(rebuilt, content);
    assert_eq!(fs::metadata(&parts[2]).unwrap().len(), 50);
    assert!(!original.exists());
}

#[tokio::test]
async fn non_part_discovers_itself() {
    let temp = TempDir::new().unwrap();
    let file = temp.path().join("plain.mp4");
    assert_eq!(discover_parts(&file).await, vec![file.clone()]);
}
