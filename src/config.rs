// Configuration management for Gusto

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::convert::{ConversionSettings, EncoderTuning, ImageCodec};

/// Persisted user defaults
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Directory images are written to
    #[serde(default = "get_default_output_dir")]
    pub output_dir: PathBuf,

    /// File name prefix for written images
    #[serde(default = "default_filename_prefix")]
    pub filename_prefix: String,

    /// Output image format
    #[serde(default = "default_codec")]
    pub codec: ImageCodec,

    /// JPEG quality (0-100)
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,

    /// PNG compression level (0-9)
    #[serde(default = "default_png_compression_level")]
    pub png_compression_level: u8,

    /// Timeout of a single discovery probe in seconds
    #[serde(default = "default_discovery_timeout_secs")]
    pub discovery_timeout_secs: u64,

    /// How often a timed out discovery is retried
    #[serde(default = "default_discovery_timeout_retries")]
    pub discovery_timeout_retries: u32,

    /// Progress refresh interval in milliseconds
    #[serde(default = "default_progress_interval_ms")]
    pub progress_interval_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output_dir: get_default_output_dir(),
            filename_prefix: default_filename_prefix(),
            codec: default_codec(),
            jpeg_quality: default_jpeg_quality(),
            png_compression_level: default_png_compression_level(),
            discovery_timeout_secs: default_discovery_timeout_secs(),
            discovery_timeout_retries: default_discovery_timeout_retries(),
            progress_interval_ms: default_progress_interval_ms(),
        }
    }
}

impl Config {
    /// Load config from disk or return default
    pub fn load_or_default(config_path: &Path) -> Self {
        if config_path.exists() {
            match std::fs::read_to_string(config_path) {
                Ok(contents) => {
                    match toml::from_str(&contents) {
                        Ok(config) => return config,
                        Err(e) => {
                            log::warn!("Failed to parse config: {}", e);
                        }
                    }
                }
                Err(e) => {
                    log::warn!("Failed to read config file: {}", e);
                }
            }
        }

        Self::default()
    }

    /// Save config to disk
    pub fn save(&self, config_path: &Path) -> anyhow::Result<()> {
        // Ensure parent directory exists
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(config_path, contents)?;

        Ok(())
    }

    pub fn tuning(&self) -> EncoderTuning {
        EncoderTuning {
            jpeg_quality: self.jpeg_quality,
            png_compression_level: self.png_compression_level,
        }
    }

    pub fn discovery_timeout(&self) -> Duration {
        Duration::from_secs(self.discovery_timeout_secs.max(1))
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms.max(10))
    }

    /// Conversion settings pre-filled from these defaults
    pub fn settings(&self) -> ConversionSettings {
        ConversionSettings {
            output_dir: Some(self.output_dir.clone()),
            filename_prefix: Some(self.filename_prefix.clone()),
            codec: Some(self.codec),
            tuning: self.tuning(),
            ..Default::default()
        }
    }
}

/// Get the config file path
pub fn get_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("gusto")
        .join("config.toml")
}

/// Get the default output directory for images
fn get_default_output_dir() -> PathBuf {
    dirs::picture_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join("Pictures")))
        .unwrap_or_else(|| PathBuf::from("."))
        .join("Gusto")
}

fn default_filename_prefix() -> String {
    "frame_".into()
}

fn default_codec() -> ImageCodec {
    ImageCodec::Jpg
}

fn default_jpeg_quality() -> u8 {
    EncoderTuning::default().jpeg_quality
}

fn default_png_compression_level() -> u8 {
    EncoderTuning::default().png_compression_level
}

fn default_discovery_timeout_secs() -> u64 {
    crate::discovery::prober::DEFAULT_PROBE_TIMEOUT.as_secs()
}

fn default_discovery_timeout_retries() -> u32 {
    crate::discovery::DEFAULT_TIMEOUT_RETRIES
}

fn default_progress_interval_ms() -> u64 {
    crate::convert::progress::DEFAULT_POLL_INTERVAL.as_millis() as u64
}
