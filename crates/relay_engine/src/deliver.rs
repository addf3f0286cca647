use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use relay_core::{parse_part_name, part_caption, MediaKind, ProgressThrottle};
use relay_logging::{relay_info, relay_warn};
use thiserror::Error;

use crate::partition::discover_parts;
use crate::persist::{file_size, remove_quietly};
use crate::retry::{retry_with_backoff, RetryPolicy, RetryVerdict};
use crate::toolchain::{MediaInfo, MediaToolchain};
use crate::TransferObserver;

#[derive(Debug, Clone, PartialEq)]
pub struct DeliverySettings {
    pub max_attempts: u32,
    pub hard_error_backoff: Duration,
    pub max_rate_limit_waits: u32,
    pub progress_interval: Duration,
    pub progress_min_percent_delta: f64,
    /// Pause between two parts of a multi-part delivery.
    pub inter_part_pause: Duration,
}

impl Default for DeliverySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            hard_error_backoff: Duration::from_secs(5),
            max_rate_limit_waits: 10,
            progress_interval: Duration::from_secs(2),
            progress_min_percent_delta: 2.0,
            inter_part_pause: Duration::from_millis(500),
        }
    }
}

impl DeliverySettings {
    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            hard_error_backoff: self.hard_error_backoff,
            max_rate_limit_waits: self.max_rate_limit_waits,
        }
    }
}

/// Metadata sent along with a video so the sink can render it without probing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SendMetadata {
    pub duration: u32,
    pub width: u32,
    pub height: u32,
}

impl SendMetadata {
    fn from_probe(info: Option<MediaInfo>) -> Self {
        let info = info.unwrap_or_default();
        Self {
            duration: info.duration.map(|d| d.round() as u32).unwrap_or(0).max(1),
            width: info.width.unwrap_or(1280),
            height: info.height.unwrap_or(720),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SendRequest<'a> {
    pub kind: MediaKind,
    pub path: &'a Path,
    pub caption: &'a str,
    pub metadata: Option<SendMetadata>,
    pub thumbnail: Option<&'a Path>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// An item could not be processed; a human has to handle the link.
    FailedLink {
        ordinal: usize,
        title: String,
        url: String,
        kind: MediaKind,
        reason: String,
    },
    /// The link points at a platform that is never processed automatically.
    ManualAction {
        ordinal: usize,
        title: String,
        url: String,
        platform: String,
    },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SendError {
    #[error("rate limited for {0:?}")]
    RateLimited(Duration),
    #[error("send failed: {0}")]
    Failed(String),
}

#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    async fn send(
        &self,
        request: SendRequest<'_>,
        progress: &dyn TransferObserver,
    ) -> Result<(), SendError>;

    async fn send_notice(&self, notice: &Notice) -> Result<(), SendError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryOutcome {
    pub uploaded: usize,
    pub total: usize,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("nothing to deliver")]
    NoParts,
    #[error("delivery failed: {0}")]
    Failed(String),
    #[error("delivered {uploaded} of {total} parts")]
    PartialDelivery { uploaded: usize, total: usize },
}

pub struct DeliveryRequest<'a> {
    pub kind: MediaKind,
    pub parts: &'a [PathBuf],
    pub caption: &'a str,
    /// Probe result of the unsplit artifact.
    pub info: Option<MediaInfo>,
    pub watermark: Option<&'a str>,
}

pub struct DeliveryPipeline {
    transport: Arc<dyn Transport>,
    toolchain: Arc<dyn MediaToolchain>,
    settings: DeliverySettings,
}

impl DeliveryPipeline {
    pub fn new(
        transport: Arc<dyn Transport>,
        toolchain: Arc<dyn MediaToolchain>,
        settings: DeliverySettings,
    ) -> Self {
        Self {
            transport,
            toolchain,
            settings,
        }
    }

    /// Transmit every part; local files are removed whatever the outcome.
    pub async fn deliver(
        &self,
        request: DeliveryRequest<'_>,
        progress: &dyn TransferObserver,
    ) -> Result<DeliveryOutcome, DeliveryError> {
        let Some(first) = request.parts.first() else {
            return Err(DeliveryError::NoParts);
        };
        let is_part = first
            .file_name()
            .and_then(|name| parse_part_name(&name.to_string_lossy()))
            .is_some();
        if request.parts.len() == 1 && !is_part {
            let part = first.as_path();
            let result = self
                .send_part(&request, part, request.caption, request.info, progress)
                .await;
            remove_quietly(part).await;
            return match result {
                Ok(()) => Ok(DeliveryOutcome {
                    uploaded: 1,
                    total: 1,
                }),
                Err(err) => Err(DeliveryError::Failed(err.to_string())),
            };
        }

        let mut parts = discover_parts(first).await;
        for given in request.parts {
            if !parts.contains(given) {
                parts.push(given.clone());
            }
        }
        let total = parts.len();
        let mut uploaded = 0;
        for (i, part) in parts.iter().enumerate() {
            let index = i + 1;
            let size = file_size(part).await.unwrap_or(0);
            let caption = part_caption(request.caption, index, total, size);
            let info = match request.kind {
                MediaKind::Video => self.toolchain.probe(part).await.ok(),
                _ => None,
            };
            relay_info!("Delivering part {index}/{total}: {}", part.display());
            match self.send_part(&request, part, &caption, info, progress).await {
                Ok(()) => uploaded += 1,
                Err(err) => relay_warn!("Part {index}/{total} not delivered: {err}"),
            }
            remove_quietly(part).await;
            if index < total {
                tokio::time::sleep(self.settings.inter_part_pause).await;
            }
        }

        if uploaded == total {
            Ok(DeliveryOutcome { uploaded, total })
        } else {
            Err(DeliveryError::PartialDelivery { uploaded, total })
        }
    }

    async fn send_part(
        &self,
        request: &DeliveryRequest<'_>,
        part: &Path,
        caption: &str,
        info: Option<MediaInfo>,
        progress: &dyn TransferObserver,
    ) -> Result<(), SendError> {
        let is_video = request.kind == MediaKind::Video;
        let thumbnail = if is_video {
            self.thumbnail(part, request.watermark).await
        } else {
            None
        };
        let metadata = is_video.then(|| SendMetadata::from_probe(info));
        let throttled = ThrottledProgress {
            inner: progress,
            throttle: std::sync::Mutex::new(ProgressThrottle::new(
                self.settings.progress_interval,
                self.settings.progress_min_percent_delta,
            )),
        };

        let result = retry_with_backoff(
            &self.settings.retry_policy(),
            |attempt| {
                if attempt > 1 {
                    relay_info!("Retrying {} (call {attempt})", part.display());
                }
                throttled.restart();
                let send = SendRequest {
                    kind: request.kind,
                    path: part,
                    caption,
                    metadata,
                    thumbnail: thumbnail.as_deref(),
                };
                self.transport.send(send, &throttled)
            },
            |err| match err {
                SendError::RateLimited(wait) => RetryVerdict::RateLimited(*wait),
                SendError::Failed(_) => RetryVerdict::Hard,
            },
        )
        .await;

        if let Some(thumb) = &thumbnail {
            remove_quietly(thumb).await;
        }
        result
    }

    /// Frame near the start, retried at 0s; `None` if both fail.
    async fn thumbnail(&self, video: &Path, watermark: Option<&str>) -> Option<PathBuf> {
        let name = video.file_name()?.to_string_lossy().into_owned();
        let output = video.with_file_name(format!("{name}.thumb.jpg"));
        for at in [1.0, 0.0] {
            match self
                .toolchain
                .extract_frame(video, &output, at, watermark)
                .await
            {
                Ok(()) => return Some(output),
                Err(err) => relay_warn!("Thumbnail at {at}s failed: {err}"),
            }
        }
        remove_quietly(&output).await;
        None
    }
}

struct ThrottledProgress<'a> {
    inner: &'a dyn TransferObserver,
    throttle: std::sync::Mutex<ProgressThrottle>,
}

impl ThrottledProgress<'_> {
    /// Each attempt reports from zero again.
    fn restart(&self) {
        self.throttle
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .reset();
    }
}

impl TransferObserver for ThrottledProgress<'_> {
    fn on_progress(&self, transferred: u64, total: Option<u64>) {
        let Some(total) = total else {
            return;
        };
        let emit = self
            .throttle
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .should_emit(transferred, total, std::time::Instant::now())
            .is_some();
        if emit {
            self.inner.on_progress(transferred, Some(total));
        }
    }
}
