// Conversion request: what the user asked for, validated and frozen
//
// ConversionSettings carries the raw values collected from the front end
// (any of them may be missing). ConversionRequest is only ever produced by
// validating those settings and never changes afterwards.

use std::fmt;
use std::path::{Path, PathBuf};

use gstreamer as gst;
use serde::{Deserialize, Serialize};

use super::{ConvertError, Result};

/// Zero-padding width of the frame index in output file names
pub const INDEX_WIDTH: usize = 10;

/// Output image formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ImageCodec {
    Jpg,
    Png,
    /// No GStreamer encoder exists, frames are pulled raw and written with `image`
    Bmp,
}

impl ImageCodec {
    /// File extension for written images
    pub fn extension(&self) -> &'static str {
        match self {
            ImageCodec::Jpg => "jpg",
            ImageCodec::Png => "png",
            ImageCodec::Bmp => "bmp",
        }
    }

    /// GStreamer encoder element, or None when frames bypass the encoder
    pub fn encoder_factory(&self) -> Option<&'static str> {
        match self {
            ImageCodec::Jpg => Some("jpegenc"),
            ImageCodec::Png => Some("pngenc"),
            ImageCodec::Bmp => None,
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            ImageCodec::Jpg => "JPG",
            ImageCodec::Png => "PNG",
            ImageCodec::Bmp => "BMP",
        }
    }
}

impl fmt::Display for ImageCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Unit of the start offset and duration in time-window mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    Seconds,
    Minutes,
}

impl TimeUnit {
    /// Saturates at the largest representable clock time
    pub fn to_clock_time(&self, amount: u64) -> gst::ClockTime {
        let seconds = match self {
            TimeUnit::Seconds => amount,
            TimeUnit::Minutes => amount.saturating_mul(60),
        };
        let nanos = seconds
            .saturating_mul(gst::ClockTime::SECOND.nseconds())
            .min(gst::ClockTime::MAX.nseconds());
        gst::ClockTime::from_nseconds(nanos)
    }
}

/// Which frames of the video become images
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionMode {
    AllFrames,
    /// One image per N input frames (N >= 1)
    EveryNth(u32),
    /// Frames between `start` and `start + duration`; a zero duration runs to the end
    TimeWindow {
        unit: TimeUnit,
        start: u64,
        duration: u64,
    },
}

impl ExtractionMode {
    pub fn is_time_window(&self) -> bool {
        matches!(self, ExtractionMode::TimeWindow { .. })
    }

    /// Interval that requires a rate changer in the pipeline
    pub fn rate_interval(&self) -> Option<u32> {
        match self {
            ExtractionMode::EveryNth(n) if *n > 1 => Some(*n),
            _ => None,
        }
    }
}

/// Extraction mode as picked by the user, before its parameters are attached
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ModeChoice {
    #[default]
    All,
    Nth,
    Seconds,
    Minutes,
}

/// Codec specific encoder settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncoderTuning {
    /// jpegenc quality, 0-100
    pub jpeg_quality: u8,
    /// pngenc compression level, 0-9
    pub png_compression_level: u8,
}

impl Default for EncoderTuning {
    fn default() -> Self {
        Self {
            jpeg_quality: 85,
            png_compression_level: 6,
        }
    }
}

impl EncoderTuning {
    fn validate(&self) -> Result<()> {
        if self.jpeg_quality > 100 {
            return Err(ConvertError::InvalidValue {
                field: "JPEG quality",
                reason: format!("{} is outside 0-100", self.jpeg_quality),
            });
        }
        if self.png_compression_level > 9 {
            return Err(ConvertError::InvalidValue {
                field: "PNG compression level",
                reason: format!("{} is outside 0-9", self.png_compression_level),
            });
        }
        Ok(())
    }
}

/// Raw values collected from the front end
#[derive(Debug, Clone, Default)]
pub struct ConversionSettings {
    pub input: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
    pub filename_prefix: Option<String>,
    pub codec: Option<ImageCodec>,
    pub mode: ModeChoice,
    pub interval: Option<u32>,
    pub start: Option<u64>,
    pub duration: Option<u64>,
    pub tuning: EncoderTuning,
}

/// Output file naming: `<dir>/<prefix><index:010>.<ext>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameTemplate {
    dir: PathBuf,
    prefix: String,
    extension: &'static str,
}

impl FrameTemplate {
    pub fn new(dir: impl Into<PathBuf>, prefix: impl Into<String>, codec: ImageCodec) -> Self {
        Self {
            dir: dir.into(),
            prefix: prefix.into(),
            extension: codec.extension(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn file_name(&self, index: u64) -> String {
        format!(
            "{}{:0width$}.{}",
            self.prefix,
            index,
            self.extension,
            width = INDEX_WIDTH
        )
    }

    pub fn path_for(&self, index: u64) -> PathBuf {
        self.dir.join(self.file_name(index))
    }

    /// printf-style location for multifilesink
    ///
    /// Literal '%' in the directory or prefix is doubled so the sink only
    /// substitutes the frame index.
    pub fn sink_location(&self) -> String {
        let stem = self.dir.join(&self.prefix).to_string_lossy().replace('%', "%%");
        format!("{}%0{}d.{}", stem, INDEX_WIDTH, self.extension)
    }
}

/// A validated conversion request
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionRequest {
    input: PathBuf,
    codec: ImageCodec,
    mode: ExtractionMode,
    template: FrameTemplate,
    tuning: EncoderTuning,
}

impl ConversionRequest {
    /// Validate settings and capture them as a request
    ///
    /// Creates the output directory when it does not exist yet. That is the
    /// only side effect and it happens after every other check passed.
    pub fn from_settings(settings: &ConversionSettings) -> Result<Self> {
        let input = match &settings.input {
            Some(p) if !p.as_os_str().is_empty() => p.clone(),
            _ => return Err(ConvertError::MissingField("Video file")),
        };
        if !input.is_file() {
            return Err(ConvertError::InvalidValue {
                field: "Video file",
                reason: format!("{} does not exist or cannot be read", input.display()),
            });
        }

        let output_dir = match &settings.output_dir {
            Some(p) if !p.as_os_str().is_empty() => p.clone(),
            _ => return Err(ConvertError::MissingField("Output Location")),
        };

        let prefix = match settings.filename_prefix.as_deref().map(str::trim) {
            Some(p) if !p.is_empty() => p.to_string(),
            _ => return Err(ConvertError::MissingField("Image Prefix")),
        };
        if prefix.contains(['/', '\\']) {
            return Err(ConvertError::InvalidValue {
                field: "Image Prefix",
                reason: "must not contain path separators".into(),
            });
        }

        let codec = settings.codec.ok_or(ConvertError::MissingField("Image Type"))?;

        let mode = match settings.mode {
            ModeChoice::All => ExtractionMode::AllFrames,
            ModeChoice::Nth => match settings.interval {
                None => return Err(ConvertError::MissingField("Frame Interval")),
                Some(0) => {
                    return Err(ConvertError::InvalidValue {
                        field: "Frame Interval",
                        reason: "must be at least 1".into(),
                    })
                }
                Some(n) => ExtractionMode::EveryNth(n),
            },
            ModeChoice::Seconds | ModeChoice::Minutes => ExtractionMode::TimeWindow {
                unit: if settings.mode == ModeChoice::Minutes {
                    TimeUnit::Minutes
                } else {
                    TimeUnit::Seconds
                },
                start: settings.start.unwrap_or(0),
                duration: settings.duration.unwrap_or(0),
            },
        };

        settings.tuning.validate()?;
        ensure_output_dir(&output_dir)?;

        Ok(Self {
            input,
            codec,
            mode,
            template: FrameTemplate::new(output_dir, prefix, codec),
            tuning: settings.tuning,
        })
    }

    pub fn input(&self) -> &Path {
        &self.input
    }

    pub fn codec(&self) -> ImageCodec {
        self.codec
    }

    pub fn mode(&self) -> ExtractionMode {
        self.mode
    }

    pub fn template(&self) -> &FrameTemplate {
        &self.template
    }

    pub fn output_dir(&self) -> &Path {
        self.template.dir()
    }

    pub fn tuning(&self) -> EncoderTuning {
        self.tuning
    }

    /// Same request with the time window running to the end of the video
    pub fn with_duration_to_end(&self) -> Self {
        let mut truncated = self.clone();
        if let ExtractionMode::TimeWindow { unit, start, .. } = self.mode {
            truncated.mode = ExtractionMode::TimeWindow {
                unit,
                start,
                duration: 0,
            };
        }
        truncated
    }
}

fn ensure_output_dir(dir: &Path) -> Result<()> {
    if dir.exists() {
        if !dir.is_dir() {
            return Err(ConvertError::InvalidValue {
                field: "Output Location",
                reason: format!("{} is not a directory", dir.display()),
            });
        }
        return Ok(());
    }

    log::info!("Creating output directory {}", dir.display());
    std::fs::create_dir_all(dir).map_err(|source| ConvertError::OutputDir {
        path: dir.to_path_buf(),
        source,
    })
}
