#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::Ordering;
use std::sync::{Mutex, Once};
use std::time::Duration;

use relay_core::QualityPreset;
use relay_engine::{
    DeliverySettings, EngineEvent, Flow, MediaInfo, MediaToolchain, Notice, ProgressSink,
    SegmentObserver, SegmentedRequest, SendError, SendMetadata, SendRequest, ToolError,
    TransferObserver, Transport,
};

static INIT: Once = Once::new();

pub fn init_logging() {
    INIT.call_once(relay_logging::initialize_for_tests);
}

pub fn fast_delivery() -> DeliverySettings {
    DeliverySettings {
        hard_error_backoff: Duration::ZERO,
        inter_part_pause: Duration::ZERO,
        progress_interval: Duration::ZERO,
        ..DeliverySettings::default()
    }
}

pub fn hd_info() -> MediaInfo {
    MediaInfo {
        duration: Some(30.0),
        width: Some(1280),
        height: Some(720),
    }
}

pub enum SegmentedScript {
    Write { bytes: usize, speeds: Vec<f64> },
    Unsupported,
}

/// Scripted stand-in for ffmpeg/ffprobe/yt-dlp.
pub struct FakeToolchain {
    /// `None` makes every probe fail.
    pub probe: Option<MediaInfo>,
    /// 1-based cut calls that fail.
    pub failing_cuts: Vec<usize>,
    pub frames_ok: bool,
    pub segmented: SegmentedScript,
    pub cuts: Mutex<Vec<(f64, f64)>>,
    pub transcodes: Mutex<usize>,
    pub frames: Mutex<Vec<(f64, Option<String>)>>,
    pub worker_launches: Mutex<Vec<usize>>,
}

impl Default for FakeToolchain {
    fn default() -> Self {
        Self {
            probe: Some(hd_info()),
            failing_cuts: Vec::new(),
            frames_ok: true,
            segmented: SegmentedScript::Write {
                bytes: 20_000,
                speeds: Vec::new(),
            },
            cuts: Mutex::new(Vec::new()),
            transcodes: Mutex::new(0),
            frames: Mutex::new(Vec::new()),
            worker_launches: Mutex::new(Vec::new()),
        }
    }
}

fn tool_failure(message: &str) -> ToolError {
    ToolError::Failed {
        tool: "fake".to_string(),
        status: Some(1),
        stderr: message.to_string(),
    }
}

#[async_trait::async_trait]
impl MediaToolchain for FakeToolchain {
    async fn probe(&self, _path: &Path) -> Result<MediaInfo, ToolError> {
        self.probe.ok_or_else(|| tool_failure("probe failed"))
    }

    async fn transcode(
        &self,
        input: &Path,
        output: &Path,
        _preset: &QualityPreset,
    ) -> Result<(), ToolError> {
        *self.transcodes.lock().unwrap() += 1;
        std::fs::copy(input, output).map_err(|e| tool_failure(&e.to_string()))?;
        Ok(())
    }

    async fn cut(
        &self,
        _input: &Path,
        output: &Path,
        start: f64,
        length: f64,
    ) -> Result<(), ToolError> {
        let call = {
            let mut cuts = self.cuts.lock().unwrap();
            cuts.push((start, length));
            cuts.len()
        };
        if self.failing_cuts.contains(&call) {
            return Err(tool_failure("cut failed"));
        }
        std::fs::write(output, format!("{start}+{length}")).map_err(|e| tool_failure(&e.to_string()))
    }

    async fn extract_frame(
        &self,
        _input: &Path,
        output: &Path,
        at: f64,
        overlay: Option<&str>,
    ) -> Result<(), ToolError> {
        self.frames
            .lock()
            .unwrap()
            .push((at, overlay.map(str::to_string)));
        if !self.frames_ok {
            return Err(tool_failure("no frame"));
        }
        std::fs::write(output, b"jpg").map_err(|e| tool_failure(&e.to_string()))
    }

    async fn fetch_segmented(
        &self,
        request: &SegmentedRequest,
        observer: &dyn SegmentObserver,
    ) -> Result<(), ToolError> {
        self.worker_launches
            .lock()
            .unwrap()
            .push(request.workers.load(Ordering::Relaxed));
        match &self.segmented {
            SegmentedScript::Unsupported => {
                Err(ToolError::Unsupported("ERROR: Unsupported URL".to_string()))
            }
            SegmentedScript::Write { bytes, speeds } => {
                let total = *bytes as u64;
                for (i, speed) in speeds.iter().enumerate() {
                    let done = total * (i as u64 + 1) / (speeds.len() as u64 + 1);
                    if observer.on_progress(done, Some(total), Some(*speed)) == Flow::Stop {
                        return Err(ToolError::Cancelled);
                    }
                }
                let out = request.output_dir.join(format!("{}.mp4", request.file_stem));
                std::fs::write(out, vec![0u8; *bytes]).map_err(|e| tool_failure(&e.to_string()))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SentItem {
    pub file_name: String,
    pub caption: String,
    pub existed: bool,
    pub thumbnail_existed: Option<bool>,
    pub metadata: Option<SendMetadata>,
}

/// Transport that records what it was asked to send.
#[derive(Default)]
pub struct RecordingTransport {
    /// File names containing this text always fail.
    pub fail_matching: Option<String>,
    /// Rate-limit signals returned for each file before it goes through.
    pub rate_limits_per_file: usize,
    /// Attempts per file that report full progress and then fail.
    pub failures_after_progress: usize,
    pub rate_limit_wait: Duration,
    pub sent: Mutex<Vec<SentItem>>,
    pub notices: Mutex<Vec<Notice>>,
    pub attempts: Mutex<HashMap<String, usize>>,
}

impl RecordingTransport {
    pub fn attempts_for(&self, fragment: &str) -> usize {
        self.attempts
            .lock()
            .unwrap()
            .iter()
            .filter(|(name, _)| name.contains(fragment))
            .map(|(_, n)| *n)
            .sum()
    }
}

#[async_trait::async_trait]
impl Transport for RecordingTransport {
    async fn send(
        &self,
        request: SendRequest<'_>,
        progress: &dyn TransferObserver,
    ) -> Result<(), SendError> {
        let file_name = request
            .path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .into_owned();
        let attempt = {
            let mut attempts = self.attempts.lock().unwrap();
            let entry = attempts.entry(file_name.clone()).or_insert(0);
            *entry += 1;
            *entry
        };
        if let Some(fragment) = &self.fail_matching {
            if file_name.contains(fragment.as_str()) {
                return Err(SendError::Failed("sink refused".to_string()));
            }
        }
        if attempt <= self.rate_limits_per_file {
            return Err(SendError::RateLimited(self.rate_limit_wait));
        }

        let size = std::fs::metadata(request.path).map(|m| m.len()).unwrap_or(0);
        progress.on_progress(size / 4, Some(size));
        progress.on_progress(size / 2, Some(size));
        progress.on_progress(size, Some(size));
        if attempt <= self.rate_limits_per_file + self.failures_after_progress {
            return Err(SendError::Failed("connection reset".to_string()));
        }
        self.sent.lock().unwrap().push(SentItem {
            file_name,
            caption: request.caption.to_string(),
            existed: request.path.exists(),
            thumbnail_existed: request.thumbnail.map(|t| t.exists()),
            metadata: request.metadata,
        });
        Ok(())
    }

    async fn send_notice(&self, notice: &Notice) -> Result<(), SendError> {
        self.notices.lock().unwrap().push(notice.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct CollectingSink {
    pub events: Mutex<Vec<EngineEvent>>,
}

impl CollectingSink {
    pub fn take(&self) -> Vec<EngineEvent> {
        self.events.lock().unwrap().drain(..).collect()
    }
}

impl ProgressSink for CollectingSink {
    fn emit(&self, event: EngineEvent) {
        self.events.lock().unwrap().push(event);
    }
}

/// Records raw transfer callbacks.
#[derive(Default)]
pub struct RecordingObserver {
    pub progress: Mutex<Vec<(u64, Option<u64>)>>,
    pub workers: Mutex<Vec<usize>>,
}

impl TransferObserver for RecordingObserver {
    fn on_progress(&self, transferred: u64, total: Option<u64>) {
        self.progress.lock().unwrap().push((transferred, total));
    }

    fn on_workers(&self, workers: usize) {
        self.workers.lock().unwrap().push(workers);
    }
}
