//! Size-bounded splitting of artifacts into `_partNNN_of_MMM` siblings.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use relay_core::{ceiling_bytes, parse_part_name, part_count, part_file_name, split_extension};
use relay_logging::{relay_info, relay_warn};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

use crate::persist::{file_size, remove_quietly};
use crate::toolchain::MediaToolchain;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionSettings {
    pub ceiling_mb: u64,
}

impl Default for PartitionSettings {
    fn default() -> Self {
        Self { ceiling_mb: 1900 }
    }
}

pub struct Partitioner {
    toolchain: Arc<dyn MediaToolchain>,
    ceiling: u64,
}

impl Partitioner {
    pub fn new(toolchain: Arc<dyn MediaToolchain>, settings: &PartitionSettings) -> Self {
        Self {
            toolchain,
            ceiling: ceiling_bytes(settings.ceiling_mb),
        }
    }

    pub fn with_ceiling_bytes(toolchain: Arc<dyn MediaToolchain>, ceiling: u64) -> Self {
        Self { toolchain, ceiling }
    }

    /// Split a video by time into equal slices when it exceeds the ceiling.
    ///
    /// Returns `[path]` when no split is needed or possible.
    pub async fn partition_if_needed(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        let size = file_size(path).await?;
        if size <= self.ceiling {
            return Ok(vec![path.to_path_buf()]);
        }

        let duration = match self.toolchain.probe(path).await {
            Ok(info) => info.duration.filter(|d| *d > 0.0),
            Err(err) => {
                relay_warn!("Probe failed for {}: {err}", path.display());
                None
            }
        };
        let Some(duration) = duration else {
            relay_warn!(
                "No duration for oversized {}, delivering unsplit",
                path.display()
            );
            return Ok(vec![path.to_path_buf()]);
        };

        let total = part_count(size, self.ceiling);
        let slice = duration / total as f64;
        relay_info!(
            "Splitting {} ({size} bytes) into {total} parts of {slice:.1}s",
            path.display()
        );

        let mut parts = Vec::with_capacity(total);
        for index in 1..=total {
            let output = part_path(path, index, total);
            let start = slice * (index - 1) as f64;
            match self.toolchain.cut(path, &output, start, slice).await {
                Ok(()) if output.exists() => parts.push(output),
                Ok(()) => relay_warn!("Part {index}/{total} was not written, skipping"),
                Err(err) => {
                    relay_warn!("Part {index}/{total} failed, skipping: {err}");
                    remove_quietly(&output).await;
                }
            }
        }
        finish_split(path, parts).await
    }

    /// Split any file into byte-contiguous parts when it exceeds the ceiling.
    pub async fn partition_bytes_if_needed(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        let size = file_size(path).await?;
        if size <= self.ceiling {
            return Ok(vec![path.to_path_buf()]);
        }
        let total = part_count(size, self.ceiling);
        relay_info!("Splitting {} into {total} byte ranges", path.display());

        let mut parts = Vec::with_capacity(total);
        for index in 1..=total {
            let output = part_path(path, index, total);
            let offset = self.ceiling * (index - 1) as u64;
            match copy_range(path, &output, offset, self.ceiling).await {
                Ok(_) => parts.push(output),
                Err(err) => {
                    relay_warn!("Part {index}/{total} failed, skipping: {err}");
                    remove_quietly(&output).await;
                }
            }
        }
        finish_split(path, parts).await
    }
}

async fn finish_split(original: &Path, parts: Vec<PathBuf>) -> io::Result<Vec<PathBuf>> {
    if parts.is_empty() {
        relay_warn!("No parts produced, delivering {} unsplit", original.display());
        return Ok(vec![original.to_path_buf()]);
    }
    remove_quietly(original).await;
    Ok(parts)
}

async fn copy_range(input: &Path, output: &Path, offset: u64, len: u64) -> io::Result<u64> {
    let mut source = File::open(input).await?;
    source.seek(io::SeekFrom::Start(offset)).await?;
    let mut target = File::create(output).await?;
    let copied = tokio::io::copy(&mut (&mut source).take(len), &mut target).await?;
    target.flush().await?;
    Ok(copied)
}

fn part_path(original: &Path, index: usize, total: usize) -> PathBuf {
    let name = original
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let (stem, extension) = split_extension(&name);
    original.with_file_name(part_file_name(stem, extension, index, total))
}

/// Ordered set of existing parts that `path` belongs to, or `[path]` if it is not a part.
pub async fn discover_parts(path: &Path) -> Vec<PathBuf> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let Some(part) = parse_part_name(&name) else {
        return vec![path.to_path_buf()];
    };
    let mut found = Vec::with_capacity(part.total);
    for sibling in part.siblings() {
        let candidate = path.with_file_name(sibling);
        if tokio::fs::try_exists(&candidate).await.unwrap_or(false) {
            found.push(candidate);
        }
    }
    found
}
