//! Optional RON config file overlaid onto the engine defaults.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context};
use relay_engine::{EngineConfig, FfmpegToolchain};
use serde::Deserialize;

/// Every field is optional; unset fields keep the built-in default.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub work_dir: Option<PathBuf>,
    /// Where the destination preferences are stored.
    pub destinations_file: Option<PathBuf>,
    pub default_quality: Option<String>,
    pub connect_timeout_secs: Option<u64>,
    pub read_timeout_secs: Option<u64>,
    /// `0` disables the whole-transfer timeout.
    pub total_timeout_secs: Option<u64>,
    pub chunk_size: Option<usize>,
    pub min_workers: Option<usize>,
    pub max_workers: Option<usize>,
    pub default_workers: Option<usize>,
    pub adjust_interval_secs: Option<u64>,
    pub ceiling_mb: Option<u64>,
    pub max_attempts: Option<u32>,
    pub hard_error_backoff_secs: Option<u64>,
    pub max_rate_limit_waits: Option<u32>,
    pub unsupported_hosts: Option<Vec<String>>,
    pub skip_single_site: Option<bool>,
    pub ffmpeg: Option<PathBuf>,
    pub ffprobe: Option<PathBuf>,
    pub downloader: Option<PathBuf>,
}

impl AppConfig {
    /// Read `path`, or return the empty overlay when no file was given.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn parse(text: &str) -> anyhow::Result<Self> {
        let config: Self = ron::from_str(text)?;
        if let (Some(min), Some(max)) = (config.min_workers, config.max_workers) {
            if min > max {
                bail!("min_workers ({min}) exceeds max_workers ({max})");
            }
        }
        Ok(config)
    }

    pub fn engine_config(&self) -> EngineConfig {
        let mut config = EngineConfig::default();
        if let Some(dir) = &self.work_dir {
            config.work_dir = dir.clone();
        }

        let fetch = &mut config.fetch;
        if let Some(secs) = self.connect_timeout_secs {
            fetch.connect_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = self.read_timeout_secs {
            fetch.read_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = self.total_timeout_secs {
            fetch.total_timeout = (secs > 0).then(|| Duration::from_secs(secs));
        }
        if let Some(size) = self.chunk_size {
            fetch.chunk_size = size.max(1);
        }

        let budget = &mut config.budget;
        if let Some(n) = self.min_workers {
            budget.min_workers = n;
        }
        if let Some(n) = self.max_workers {
            budget.max_workers = n;
        }
        if let Some(n) = self.default_workers {
            budget.default_workers = n;
        }
        if let Some(secs) = self.adjust_interval_secs {
            budget.adjust_interval = Duration::from_secs(secs);
        }

        if let Some(mb) = self.ceiling_mb {
            config.partition.ceiling_mb = mb;
        }

        let delivery = &mut config.delivery;
        if let Some(n) = self.max_attempts {
            delivery.max_attempts = n.max(1);
        }
        if let Some(secs) = self.hard_error_backoff_secs {
            delivery.hard_error_backoff = Duration::from_secs(secs);
        }
        if let Some(n) = self.max_rate_limit_waits {
            delivery.max_rate_limit_waits = n;
        }

        if let Some(hosts) = &self.unsupported_hosts {
            config.platforms.unsupported_hosts = hosts.clone();
        }
        if let Some(skip) = self.skip_single_site {
            config.platforms.skip_single_site = skip;
        }
        config
    }

    pub fn toolchain(&self) -> FfmpegToolchain {
        let mut toolchain = FfmpegToolchain::default();
        if let Some(path) = &self.ffmpeg {
            toolchain.ffmpeg = path.clone();
        }
        if let Some(path) = &self.ffprobe {
            toolchain.ffprobe = path.clone();
        }
        if let Some(path) = &self.downloader {
            toolchain.downloader = path.clone();
        }
        toolchain
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_overlay_keeps_defaults() {
        let config = AppConfig::parse("()").unwrap();
        assert_eq!(config, AppConfig::default());
        let engine = config.engine_config();
        assert_eq!(engine.work_dir, PathBuf::from("./downloads"));
        assert_eq!(engine.partition.ceiling_mb, 1900);
        assert_eq!(engine.budget.default_workers, 16);
    }

    #[test]
    fn fields_override_defaults() {
        let config = AppConfig::parse(
            r#"(
                work_dir: Some("/tmp/relay"),
                total_timeout_secs: Some(0),
                max_workers: Some(12),
                ceiling_mb: Some(49),
                unsupported_hosts: Some(["example.org"]),
                ffmpeg: Some("/opt/ffmpeg"),
            )"#,
        )
        .unwrap();
        let engine = config.engine_config();
        assert_eq!(engine.work_dir, PathBuf::from("/tmp/relay"));
        assert_eq!(engine.fetch.total_timeout, None);
        assert_eq!(engine.budget.max_workers, 12);
        assert_eq!(engine.partition.ceiling_mb, 49);
        assert_eq!(engine.platforms.unsupported_hosts, vec!["example.org".to_string()]);
        assert_eq!(config.toolchain().ffmpeg, PathBuf::from("/opt/ffmpeg"));
    }

    #[test]
    fn unknown_fields_and_inverted_bounds_are_rejected() {
        assert!(AppConfig::parse("(colour: Some(1))").is_err());
        assert!(AppConfig::parse("(min_workers: Some(9), max_workers: Some(4))").is_err());
    }
}
