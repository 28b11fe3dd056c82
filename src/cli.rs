// Command line surface

use std::path::PathBuf;

use clap::Parser;

use crate::config::Config;
use crate::convert::{ConversionSettings, ImageCodec, ModeChoice};

/// Convert the frames of a video into numbered image files
#[derive(Debug, Parser)]
#[command(name = "gusto", version, about)]
pub struct Cli {
    /// Video file to convert; asked for when omitted
    pub input: Option<PathBuf>,

    /// Directory the images are written to
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Image file name prefix
    #[arg(short, long)]
    pub prefix: Option<String>,

    /// Image format
    #[arg(short, long, value_enum)]
    pub codec: Option<ImageCodec>,

    /// Which frames to convert
    #[arg(short, long, value_enum, default_value_t = ModeChoice::All)]
    pub mode: ModeChoice,

    /// Convert one frame out of every N (mode nth)
    #[arg(short, long)]
    pub interval: Option<u32>,

    /// Start of the period, in seconds or minutes (modes seconds, minutes)
    #[arg(short, long)]
    pub start: Option<u64>,

    /// Length of the period, 0 converts to the end (modes seconds, minutes)
    #[arg(short, long)]
    pub duration: Option<u64>,

    /// Convert the remainder when the period runs past the end of the video
    #[arg(short, long)]
    pub yes: bool,

    /// Config file to use instead of the default location
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Store output directory, prefix and format as new defaults
    #[arg(long)]
    pub save_config: bool,

    /// Debug logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    /// Config with this invocation's overrides applied
    pub fn apply_to(&self, config: &Config) -> Config {
        let mut effective = config.clone();
        if let Some(dir) = &self.output_dir {
            effective.output_dir = dir.clone();
        }
        if let Some(prefix) = &self.prefix {
            effective.filename_prefix = prefix.clone();
        }
        if let Some(codec) = self.codec {
            effective.codec = codec;
        }
        effective
    }

    /// Settings for one conversion, starting from `config`'s defaults
    pub fn settings(&self, config: &Config, input: PathBuf) -> ConversionSettings {
        ConversionSettings {
            input: Some(input),
            mode: self.mode,
            interval: self.interval,
            start: self.start,
            duration: self.duration,
            ..config.settings()
        }
    }
}
