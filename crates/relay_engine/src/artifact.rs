use std::path::{Path, PathBuf};
use std::sync::Arc;

use relay_core::{split_extension, MediaKind, QualityPreset};
use relay_logging::{relay_info, relay_warn};

use crate::persist::remove_quietly;
use crate::toolchain::{MediaInfo, MediaToolchain, ToolError};

#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedArtifact {
    pub path: PathBuf,
    /// Probe result, videos only.
    pub info: Option<MediaInfo>,
    /// Set when the source is below the requested quality.
    pub warning: Option<String>,
}

/// Brings an acquired video down to the requested quality. Other kinds pass through.
pub struct ArtifactNormalizer {
    toolchain: Arc<dyn MediaToolchain>,
}

impl ArtifactNormalizer {
    pub fn new(toolchain: Arc<dyn MediaToolchain>) -> Self {
        Self { toolchain }
    }

    pub async fn normalize(
        &self,
        path: &Path,
        kind: MediaKind,
        quality: &QualityPreset,
    ) -> Result<NormalizedArtifact, ToolError> {
        if kind != MediaKind::Video {
            return Ok(NormalizedArtifact {
                path: path.to_path_buf(),
                info: None,
                warning: None,
            });
        }

        let info = self.toolchain.probe(path).await?;
        let Some(height) = info.height else {
            return Ok(NormalizedArtifact {
                path: path.to_path_buf(),
                info: Some(info),
                warning: None,
            });
        };

        if height < quality.height {
            let warning = format!(
                "source is {height}p, below the requested {}",
                quality.label
            );
            relay_warn!("{}: {warning}", path.display());
            return Ok(NormalizedArtifact {
                path: path.to_path_buf(),
                info: Some(info),
                warning: Some(warning),
            });
        }
        if height == quality.height {
            return Ok(NormalizedArtifact {
                path: path.to_path_buf(),
                info: Some(info),
                warning: None,
            });
        }

        let output = transcoded_path(path);
        relay_info!("Transcoding {} from {height}p to {}", path.display(), quality.label);
        match self.toolchain.transcode(path, &output, quality).await {
            Ok(()) => {
                let info = match self.toolchain.probe(&output).await {
                    Ok(info) => info,
                    Err(_) => MediaInfo {
                        height: Some(quality.height),
                        ..info
                    },
                };
                remove_quietly(path).await;
                Ok(NormalizedArtifact {
                    path: output,
                    info: Some(info),
                    warning: None,
                })
            }
            Err(err) => {
                relay_warn!("Transcode failed, keeping original: {err}");
                remove_quietly(&output).await;
                Ok(NormalizedArtifact {
                    path: path.to_path_buf(),
                    info: Some(info),
                    warning: None,
                })
            }
        }
    }
}

fn transcoded_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let (stem, _) = split_extension(&name);
    path.with_file_name(format!("{stem}-q.mp4"))
}
