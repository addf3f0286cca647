use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use relay_core::{
    is_single_site_video, lowercase_extension, FormatSelector, MediaKind, QualityPreset,
    Reference, WorkerBudget, WorkerBudgetSettings,
};
use relay_logging::{relay_info, relay_warn};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::fetch::{FetchError, Fetcher};
use crate::filename::{artifact_extension, artifact_stem};
use crate::persist::remove_quietly;
use crate::toolchain::{Flow, MediaToolchain, SegmentObserver, SegmentedRequest, ToolError};
use crate::{FailureKind, TransferObserver};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcquireSettings {
    /// Video artifacts smaller than this count as an empty result.
    pub min_video_bytes: u64,
    /// Same threshold for images and documents.
    pub min_file_bytes: u64,
}

impl Default for AcquireSettings {
    fn default() -> Self {
        Self {
            min_video_bytes: 10 * 1024,
            min_file_bytes: 1024,
        }
    }
}

impl AcquireSettings {
    fn threshold(&self, kind: MediaKind) -> u64 {
        match kind {
            MediaKind::Video => self.min_video_bytes,
            MediaKind::Image | MediaKind::Document => self.min_file_bytes,
        }
    }
}

#[derive(Debug, Error)]
pub enum AcquisitionError {
    #[error("acquisition cancelled")]
    Cancelled,
    #[error("unsupported source: {0}")]
    Unsupported(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("no file of at least {min_bytes} bytes was produced")]
    EmptyResult { min_bytes: u64 },
    #[error("media tool error: {0}")]
    Tool(String),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

impl AcquisitionError {
    /// `None` for cancellation, which is not a failure.
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            AcquisitionError::Cancelled => None,
            AcquisitionError::Unsupported(_) => Some(FailureKind::Unsupported),
            AcquisitionError::Network(_) => Some(FailureKind::Network),
            AcquisitionError::EmptyResult { .. } => Some(FailureKind::EmptyResult),
            AcquisitionError::Tool(_) => Some(FailureKind::InternalTool),
            AcquisitionError::Io(_) => Some(FailureKind::Io),
        }
    }
}

impl From<FetchError> for AcquisitionError {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::Cancelled => AcquisitionError::Cancelled,
            FetchError::Io(err) => AcquisitionError::Io(err),
            other => AcquisitionError::Network(other.to_string()),
        }
    }
}

impl From<ToolError> for AcquisitionError {
    fn from(err: ToolError) -> Self {
        match err {
            ToolError::Cancelled => AcquisitionError::Cancelled,
            ToolError::Unsupported(message) => AcquisitionError::Unsupported(message),
            ToolError::Failed { .. } => AcquisitionError::Network(err.to_string()),
            other => AcquisitionError::Tool(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// One addressable byte stream.
    Direct,
    /// A manifest or page describing remote segments.
    Segmented,
}

/// Manifests and single-site video pages go to the segmented downloader; everything
/// else is tried as a plain byte stream first.
pub fn select_strategy(reference: &Reference) -> Strategy {
    if reference.kind != MediaKind::Video {
        return Strategy::Direct;
    }
    let manifest = matches!(lowercase_extension(&reference.url).as_deref(), Some(".m3u8" | ".mpd"))
        || reference.url.to_ascii_lowercase().contains("/manifest.");
    if manifest || is_single_site_video(&reference.url) {
        Strategy::Segmented
    } else {
        Strategy::Direct
    }
}

pub struct AcquisitionController {
    fetcher: Arc<dyn Fetcher>,
    toolchain: Arc<dyn MediaToolchain>,
    settings: AcquireSettings,
    budget: WorkerBudgetSettings,
}

impl AcquisitionController {
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        toolchain: Arc<dyn MediaToolchain>,
        settings: AcquireSettings,
        budget: WorkerBudgetSettings,
    ) -> Self {
        Self {
            fetcher,
            toolchain,
            settings,
            budget,
        }
    }

    /// Fetch `reference` into `work_dir` and return the local artifact path.
    pub async fn acquire(
        &self,
        reference: &Reference,
        quality: &QualityPreset,
        work_dir: &Path,
        cancel: &CancellationToken,
        observer: &dyn TransferObserver,
    ) -> Result<PathBuf, AcquisitionError> {
        if cancel.is_cancelled() {
            return Err(AcquisitionError::Cancelled);
        }
        tokio::fs::create_dir_all(work_dir).await?;

        let strategy = select_strategy(reference);
        relay_info!(
            "Acquiring #{} ({}) via {strategy:?}",
            reference.ordinal,
            reference.kind
        );
        match strategy {
            Strategy::Segmented => {
                self.acquire_segmented(reference, quality, work_dir, cancel, observer)
                    .await
            }
            Strategy::Direct => {
                match self.acquire_direct(reference, work_dir, cancel, observer).await {
                    Ok(path) => Ok(path),
                    Err(AcquisitionError::Cancelled) => Err(AcquisitionError::Cancelled),
                    Err(err) if reference.kind == MediaKind::Video => {
                        relay_warn!(
                            "Direct download of #{} failed ({err}), trying segmented",
                            reference.ordinal
                        );
                        self.acquire_segmented(reference, quality, work_dir, cancel, observer)
                            .await
                    }
                    Err(err) => Err(err),
                }
            }
        }
    }

    async fn acquire_direct(
        &self,
        reference: &Reference,
        work_dir: &Path,
        cancel: &CancellationToken,
        observer: &dyn TransferObserver,
    ) -> Result<PathBuf, AcquisitionError> {
        let dest = work_dir.join(format!(
            "{}{}",
            artifact_stem(reference),
            artifact_extension(reference)
        ));
        let fetched = self
            .fetcher
            .fetch_to_file(&reference.url, &dest, cancel, observer)
            .await?;

        let min_bytes = self.settings.threshold(reference.kind);
        if fetched.bytes < min_bytes {
            relay_warn!(
                "Direct download of #{} too small ({} bytes)",
                reference.ordinal,
                fetched.bytes
            );
            remove_quietly(&fetched.path).await;
            return Err(AcquisitionError::EmptyResult { min_bytes });
        }
        Ok(fetched.path)
    }

    async fn acquire_segmented(
        &self,
        reference: &Reference,
        quality: &QualityPreset,
        work_dir: &Path,
        cancel: &CancellationToken,
        observer: &dyn TransferObserver,
    ) -> Result<PathBuf, AcquisitionError> {
        let stem = format!("{}-seg", artifact_stem(reference));
        let budget = WorkerBudget::new(self.budget.clone(), Instant::now());
        let workers = Arc::new(AtomicUsize::new(budget.current()));
        observer.on_workers(budget.current());

        let request = SegmentedRequest {
            url: reference.url.clone(),
            selector: FormatSelector::for_max_height(quality.height),
            output_dir: work_dir.to_path_buf(),
            file_stem: stem.clone(),
            workers: workers.clone(),
        };
        let progress = SegmentProgress {
            budget: Mutex::new(budget),
            workers,
            cancel,
            observer,
        };

        let result = self.toolchain.fetch_segmented(&request, &progress).await;
        if let Err(err) = result {
            remove_outputs(work_dir, &stem).await;
            return Err(err.into());
        }
        if cancel.is_cancelled() {
            remove_outputs(work_dir, &stem).await;
            return Err(AcquisitionError::Cancelled);
        }

        let min_bytes = self.settings.min_video_bytes;
        match largest_output(work_dir, &stem).await? {
            Some((path, size)) if size >= min_bytes => {
                relay_info!("Segmented download of #{} produced {size} bytes", reference.ordinal);
                Ok(path)
            }
            _ => {
                remove_outputs(work_dir, &stem).await;
                Err(AcquisitionError::EmptyResult { min_bytes })
            }
        }
    }
}

/// Feeds throughput samples into the worker budget and relays progress.
struct SegmentProgress<'a> {
    budget: Mutex<WorkerBudget>,
    workers: Arc<AtomicUsize>,
    cancel: &'a CancellationToken,
    observer: &'a dyn TransferObserver,
}

impl SegmentObserver for SegmentProgress<'_> {
    fn on_progress(&self, downloaded: u64, total: Option<u64>, bytes_per_sec: Option<f64>) -> Flow {
        if self.cancel.is_cancelled() {
            return Flow::Stop;
        }
        if let Some(speed) = bytes_per_sec {
            let mut budget = self.budget.lock().unwrap_or_else(|e| e.into_inner());
            let next = budget.observe(speed, Instant::now());
            if self.workers.swap(next, Ordering::Relaxed) != next {
                self.observer.on_workers(next);
            }
        }
        self.observer.on_progress(downloaded, total);
        Flow::Continue
    }

    fn should_stop(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

async fn outputs(work_dir: &Path, stem: &str) -> io::Result<Vec<(PathBuf, u64)>> {
    let mut found = Vec::new();
    let mut entries = tokio::fs::read_dir(work_dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        if !name.to_string_lossy().starts_with(stem) {
            continue;
        }
        let meta = entry.metadata().await?;
        if meta.is_file() {
            found.push((entry.path(), meta.len()));
        }
    }
    Ok(found)
}

async fn largest_output(work_dir: &Path, stem: &str) -> io::Result<Option<(PathBuf, u64)>> {
    let found = outputs(work_dir, stem).await?;
    Ok(found.into_iter().max_by_key(|(_, size)| *size))
}

async fn remove_outputs(work_dir: &Path, stem: &str) {
    if let Ok(found) = outputs(work_dir, stem).await {
        for (path, _) in found {
            remove_quietly(&path).await;
        }
    }
}
