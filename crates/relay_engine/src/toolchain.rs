//! Media toolchain capability: probing, transcoding, cutting, frame extraction and
//! segmented-stream acquisition.
//!
//! [`FfmpegToolchain`] drives the `ffprobe`, `ffmpeg` and `yt-dlp` executables. Short-lived
//! invocations run on the blocking pool so cancellation checks and progress reporting on the
//! async side keep running.

use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use relay_core::{FormatSelector, QualityPreset};
use relay_logging::{relay_debug, relay_info, relay_warn};
use serde::Deserialize;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::time::MissedTickBehavior;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MediaInfo {
    /// Seconds.
    pub duration: Option<f64>,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("failed to launch {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: io::Error,
    },
    #[error("{tool} exited with status {status:?}: {stderr}")]
    Failed {
        tool: String,
        status: Option<i32>,
        stderr: String,
    },
    #[error("unreadable {tool} output: {message}")]
    Parse { tool: String, message: String },
    #[error("unsupported source: {0}")]
    Unsupported(String),
    #[error("cancelled")]
    Cancelled,
    #[error("background task failed: {0}")]
    Join(String),
}

/// What the caller wants after a progress report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Stop,
}

/// Progress callback for segmented acquisition. Returning [`Flow::Stop`] aborts the
/// download and makes it end with [`ToolError::Cancelled`].
pub trait SegmentObserver: Send + Sync {
    fn on_progress(&self, downloaded: u64, total: Option<u64>, bytes_per_sec: Option<f64>) -> Flow;

    /// Polled while the downloader is silent.
    fn should_stop(&self) -> bool {
        false
    }
}

#[derive(Debug, Clone)]
pub struct SegmentedRequest {
    pub url: String,
    pub selector: FormatSelector,
    pub output_dir: PathBuf,
    /// Output file stem; the tool chooses the extension.
    pub file_stem: String,
    /// Current worker budget. [`FfmpegToolchain`] reads it once, at launch; later changes
    /// only reach toolchains that can resize a running download.
    pub workers: Arc<AtomicUsize>,
}

#[async_trait::async_trait]
pub trait MediaToolchain: Send + Sync {
    async fn probe(&self, path: &Path) -> Result<MediaInfo, ToolError>;

    /// Re-encode `input` so its height does not exceed the preset's.
    async fn transcode(
        &self,
        input: &Path,
        output: &Path,
        preset: &QualityPreset,
    ) -> Result<(), ToolError>;

    /// Stream-copy `length` seconds starting at `start`.
    async fn cut(&self, input: &Path, output: &Path, start: f64, length: f64)
        -> Result<(), ToolError>;

    async fn extract_frame(
        &self,
        input: &Path,
        output: &Path,
        at: f64,
        overlay: Option<&str>,
    ) -> Result<(), ToolError>;

    async fn fetch_segmented(
        &self,
        request: &SegmentedRequest,
        observer: &dyn SegmentObserver,
    ) -> Result<(), ToolError>;
}

#[derive(Debug, Clone)]
pub struct FfmpegToolchain {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
    pub downloader: PathBuf,
}

impl Default for FfmpegToolchain {
    fn default() -> Self {
        Self {
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
            downloader: PathBuf::from("yt-dlp"),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ProbeReport {
    #[serde(default)]
    format: Option<ProbeFormat>,
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    duration: Option<String>,
}

/// How often a silent downloader is checked for a stop request.
const STOP_POLL: Duration = Duration::from_millis(250);

/// Progress line printed by the downloader: `relay <downloaded> <total> <speed>`.
const PROGRESS_TEMPLATE: &str =
    "download:relay %(progress.downloaded_bytes)s %(progress.total_bytes,progress.total_bytes_estimate)s %(progress.speed)s";

impl FfmpegToolchain {
    async fn run(&self, program: &Path, args: Vec<String>) -> Result<Output, ToolError> {
        let tool = program.display().to_string();
        let program = program.to_path_buf();
        relay_debug!("{tool} {}", args.join(" "));
        let spawned_tool = tool.clone();
        let output = tokio::task::spawn_blocking(move || {
            Command::new(&program)
                .args(&args)
                .stdin(Stdio::null())
                .output()
        })
        .await
        .map_err(|e| ToolError::Join(e.to_string()))?
        .map_err(|source| ToolError::Spawn {
            tool: spawned_tool,
            source,
        })?;

        if !output.status.success() {
            return Err(ToolError::Failed {
                tool,
                status: output.status.code(),
                stderr: tail(&String::from_utf8_lossy(&output.stderr)),
            });
        }
        Ok(output)
    }

    async fn ffmpeg(&self, args: Vec<String>, output: &Path) -> Result<(), ToolError> {
        self.run(&self.ffmpeg, args).await?;
        match tokio::fs::metadata(output).await {
            Ok(meta) if meta.len() > 0 => Ok(()),
            _ => Err(ToolError::Failed {
                tool: self.ffmpeg.display().to_string(),
                status: Some(0),
                stderr: format!("no output written to {}", output.display()),
            }),
        }
    }
}

#[async_trait::async_trait]
impl MediaToolchain for FfmpegToolchain {
    async fn probe(&self, path: &Path) -> Result<MediaInfo, ToolError> {
        let args = vec![
            "-v".to_string(),
            "error".to_string(),
            "-print_format".to_string(),
            "json".to_string(),
            "-show_format".to_string(),
            "-show_streams".to_string(),
            path.display().to_string(),
        ];
        let output = self.run(&self.ffprobe, args).await?;
        parse_probe(&output.stdout).map_err(|message| ToolError::Parse {
            tool: self.ffprobe.display().to_string(),
            message,
        })
    }

    async fn transcode(
        &self,
        input: &Path,
        output: &Path,
        preset: &QualityPreset,
    ) -> Result<(), ToolError> {
        let args = strings(&[
            "-y",
            "-i",
            &input.display().to_string(),
            "-vf",
            &format!("scale=-2:{}", preset.height),
            "-c:v",
            "libx264",
            "-preset",
            "fast",
            "-b:v",
            &preset.video_bitrate,
            "-c:a",
            "aac",
            "-b:a",
            &preset.audio_bitrate,
            "-movflags",
            "+faststart",
            &output.display().to_string(),
        ]);
        self.ffmpeg(args, output).await
    }

    async fn cut(
        &self,
        input: &Path,
        output: &Path,
        start: f64,
        length: f64,
    ) -> Result<(), ToolError> {
        let args = strings(&[
            "-y",
            "-ss",
            &format!("{start:.3}"),
            "-i",
            &input.display().to_string(),
            "-t",
            &format!("{length:.3}"),
            "-c",
            "copy",
            "-avoid_negative_ts",
            "make_zero",
            "-fflags",
            "+genpts",
            &output.display().to_string(),
        ]);
        self.ffmpeg(args, output).await
    }

    async fn extract_frame(
        &self,
        input: &Path,
        output: &Path,
        at: f64,
        overlay: Option<&str>,
    ) -> Result<(), ToolError> {
        let mut filter = "scale=320:180".to_string();
        if let Some(text) = overlay.filter(|t| !t.trim().is_empty()) {
            filter.push_str(&format!(
                ",drawtext=text='{}':fontcolor=white:fontsize=20:box=1:boxcolor=black@0.5:x=(w-text_w)/2:y=h-th-10",
                escape_drawtext(text)
            ));
        }
        let args = strings(&[
            "-y",
            "-ss",
            &format!("{at:.3}"),
            "-i",
            &input.display().to_string(),
            "-vframes",
            "1",
            "-vf",
            &filter,
            "-q:v",
            "2",
            &output.display().to_string(),
        ]);
        self.ffmpeg(args, output).await
    }

    async fn fetch_segmented(
        &self,
        request: &SegmentedRequest,
        observer: &dyn SegmentObserver,
    ) -> Result<(), ToolError> {
        let tool = self.downloader.display().to_string();
        let workers = request.workers.load(Ordering::Relaxed).max(1);
        let template = request
            .output_dir
            .join(format!("{}.%(ext)s", request.file_stem));
        relay_info!("Segmented download of {} with {workers} workers", request.url);

        let mut child = tokio::process::Command::new(&self.downloader)
            .arg("-f")
            .arg(request.selector.to_selector_string())
            .arg("--concurrent-fragments")
            .arg(workers.to_string())
            .arg("--merge-output-format")
            .arg("mp4")
            .arg("--no-playlist")
            .arg("--newline")
            .arg("--progress-template")
            .arg(PROGRESS_TEMPLATE)
            .arg("-o")
            .arg(&template)
            .arg(&request.url)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ToolError::Spawn {
                tool: tool.clone(),
                source,
            })?;

        let stderr_task = child.stderr.take().map(|mut stderr| {
            tokio::spawn(async move {
                let mut text = String::new();
                let _ = stderr.read_to_string(&mut text).await;
                text
            })
        });

        let mut stopped = false;
        if let Some(stdout) = child.stdout.take() {
            let mut lines = BufReader::new(stdout).lines();
            let mut poll = tokio::time::interval(STOP_POLL);
            poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    line = lines.next_line() => {
                        let Ok(Some(line)) = line else {
                            break;
                        };
                        let Some((downloaded, total, speed)) = parse_progress_line(&line) else {
                            continue;
                        };
                        if observer.on_progress(downloaded, total, speed) == Flow::Stop {
                            stopped = true;
                            break;
                        }
                    }
                    _ = poll.tick() => {
                        if observer.should_stop() {
                            stopped = true;
                            break;
                        }
                    }
                }
            }
        }

        if stopped {
            relay_info!("Stopping segmented download of {}", request.url);
            let _ = child.kill().await;
            return Err(ToolError::Cancelled);
        }

        let status = child.wait().await.map_err(|source| ToolError::Spawn {
            tool: tool.clone(),
            source,
        })?;
        let stderr = match stderr_task {
            Some(task) => task.await.unwrap_or_default(),
            None => String::new(),
        };
        if status.success() {
            return Ok(());
        }
        if is_unsupported_message(&stderr) {
            relay_warn!("Downloader reports unsupported source: {}", request.url);
            return Err(ToolError::Unsupported(tail(&stderr)));
        }
        Err(ToolError::Failed {
            tool,
            status: status.code(),
            stderr: tail(&stderr),
        })
    }
}

fn strings(args: &[&str]) -> Vec<String> {
    args.iter().map(|a| (*a).to_string()).collect()
}

fn escape_drawtext(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace('\'', "\\'")
        .replace(':', "\\:")
        .replace('%', "\\%")
}

/// Last few lines of tool output, enough for a log line.
fn tail(text: &str) -> String {
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(3);
    lines[start..].join(" | ")
}

fn is_unsupported_message(stderr: &str) -> bool {
    stderr.lines().any(|line| {
        let lower = line.to_ascii_lowercase();
        lower.contains("error") && lower.contains("unsupported")
    })
}

pub(crate) fn parse_probe(json: &[u8]) -> Result<MediaInfo, String> {
    let report: ProbeReport = serde_json::from_slice(json).map_err(|e| e.to_string())?;
    let video = report
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"));
    let duration = report
        .format
        .as_ref()
        .and_then(|f| f.duration.as_deref())
        .or_else(|| video.and_then(|s| s.duration.as_deref()))
        .and_then(|d| d.trim().parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d > 0.0);
    Ok(MediaInfo {
        duration,
        width: video.and_then(|s| s.width),
        height: video.and_then(|s| s.height),
    })
}

pub(crate) fn parse_progress_line(line: &str) -> Option<(u64, Option<u64>, Option<f64>)> {
    let mut fields = line.trim().strip_prefix("relay ")?.split_whitespace();
    let downloaded = parse_number(fields.next()?)? as u64;
    let total = fields.next().and_then(parse_number).map(|t| t as u64);
    let speed = fields.next().and_then(parse_number);
    Some((downloaded, total, speed))
}

fn parse_number(field: &str) -> Option<f64> {
    field.parse::<f64>().ok().filter(|n| n.is_finite() && *n >= 0.0)
}
