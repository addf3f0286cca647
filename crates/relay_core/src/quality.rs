use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualityPreset {
    pub label: String,
    /// Maximum output height in pixels.
    pub height: u32,
    pub video_bitrate: String,
    pub audio_bitrate: String,
}

impl fmt::Display for QualityPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualityTable {
    presets: Vec<QualityPreset>,
    default_label: String,
}

impl QualityTable {
    pub fn new(presets: Vec<QualityPreset>, default_label: impl Into<String>) -> Self {
        Self {
            presets,
            default_label: default_label.into(),
        }
    }

    /// Case-insensitive lookup; `"720"` and `"720p"` are equivalent.
    pub fn get(&self, label: &str) -> Option<&QualityPreset> {
        let wanted = label.trim().to_ascii_lowercase();
        let wanted = wanted.strip_suffix('p').unwrap_or(&wanted);
        self.presets
            .iter()
            .find(|p| p.label.trim_end_matches('p') == wanted)
    }

    pub fn default_preset(&self) -> Option<&QualityPreset> {
        self.get(&self.default_label)
            .or_else(|| self.presets.first())
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.presets.iter().map(|p| p.label.as_str())
    }
}

impl Default for QualityTable {
    fn default() -> Self {
        let preset = |height: u32, video: &str, audio: &str| QualityPreset {
            label: format!("{height}p"),
            height,
            video_bitrate: video.to_string(),
            audio_bitrate: audio.to_string(),
        };
        Self::new(
            vec![
                preset(360, "500k", "96k"),
                preset(480, "1000k", "128k"),
                preset(720, "2500k", "192k"),
                preset(1080, "5000k", "256k"),
            ],
            "720p",
        )
    }
}

/// One step of the stream-selection fallback chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatChoice {
    /// Separate video and audio streams merged, video no taller than the limit.
    MergedAtMost(u32),
    /// A single combined stream no taller than the limit.
    CombinedAtMost(u32),
    Best,
    BestMerged,
    BestVideoOnly,
}

impl FormatChoice {
    fn selector(self) -> String {
        match self {
            FormatChoice::MergedAtMost(h) => format!("bestvideo[height<={h}]+bestaudio"),
            FormatChoice::CombinedAtMost(h) => format!("best[height<={h}]"),
            FormatChoice::Best => "best".to_string(),
            FormatChoice::BestMerged => "bestvideo+bestaudio".to_string(),
            FormatChoice::BestVideoOnly => "bestvideo".to_string(),
        }
    }
}

/// Ordered stream preferences ending in an unconditional choice, so selection never fails
/// only because the height limit cannot be met.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatSelector {
    choices: Vec<FormatChoice>,
}

impl FormatSelector {
    pub fn for_max_height(height: u32) -> Self {
        Self {
            choices: vec![
                FormatChoice::MergedAtMost(height),
                FormatChoice::CombinedAtMost(height),
                FormatChoice::Best,
                FormatChoice::BestMerged,
                FormatChoice::BestVideoOnly,
            ],
        }
    }

    pub fn choices(&self) -> &[FormatChoice] {
        &self.choices
    }

    /// `/`-separated selector string understood by the segmented downloader.
    pub fn to_selector_string(&self) -> String {
        self.choices
            .iter()
            .map(|c| c.selector())
            .collect::<Vec<_>>()
            .join("/")
    }
}
