// Video to image conversion
//
// This module owns everything between a validated request and the image
// files on disk: the stage plan, stage creation, the GStreamer graph, the
// state machine that drives it and the bus dispatcher that reacts to it.
//
// Pipeline (every frame):   filesrc → decodebin ⇢ videoconvert → jpegenc|pngenc → multifilesink
// Pipeline (every Nth):     filesrc → decodebin ⇢ videorate → capsfilter → videoconvert → ...
// Pipeline (BMP):           filesrc → decodebin ⇢ [videorate → capsfilter] → videoconvert → appsink
//
// ⇢ marks the dynamic link made when decodebin exposes its video pad.

pub mod dispatch;
pub mod factory;
pub mod linker;
pub mod pipeline;
pub mod plan;
pub mod progress;
pub mod request;
pub mod run;
pub mod seek;
pub mod state;
pub mod surface;

pub use dispatch::{Action, BusEvent, Dispatcher};
pub use factory::{GstStageFactory, StageFactory, StageSet};
pub use pipeline::{ConversionPipeline, RunSummary};
pub use plan::{CapsSpec, PipelinePlan, PropertyValue, StageRole, StageSpec};
pub use progress::{FrameCounter, ProgressMonitor};
pub use request::{
    ConversionRequest, ConversionSettings, EncoderTuning, ExtractionMode, FrameTemplate,
    ImageCodec, ModeChoice, TimeUnit,
};
pub use run::{expected_frames, ConversionRun, RunState};
pub use seek::{SeekWindow, WindowCheck};
pub use state::{PipelinePhase, Transition};

use std::path::PathBuf;

use gstreamer as gst;

/// Broad category of a conversion failure
///
/// Configuration and validation problems are caught before any pipeline
/// exists and can be corrected and retried. Everything else ends the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Configuration,
    Construction,
    Transition,
    Validation,
    Runtime,
}

impl ErrorClass {
    pub fn is_recoverable(&self) -> bool {
        matches!(self, ErrorClass::Configuration | ErrorClass::Validation)
    }
}

/// Error type for conversion operations
#[derive(Debug, thiserror::Error)]
pub enum ConvertError {
    #[error("Error: Please enter a value for {0}")]
    MissingField(&'static str),

    #[error("Error: {field} has an invalid value ({reason})")]
    InvalidValue { field: &'static str, reason: String },

    #[error("Failed to create directory: {path} ({source})")]
    OutputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("No video details are available for {0}, select the video again")]
    MetadataMissing(PathBuf),

    #[error("Not all GST elements could be created: {factory} ({name})")]
    ElementCreation { factory: String, name: String },

    #[error("Not all GST elements could be created, missing: {}", .0.join(", "))]
    MissingElements(Vec<String>),

    #[error("Error: {element} property '{property}' has an invalid value ({reason})")]
    Property {
        element: String,
        property: String,
        reason: String,
    },

    #[error("Unable to create the conversion pipeline: {0}")]
    PipelineCreation(String),

    #[error("GST Pipeline elements could not be linked: {0}")]
    Link(String),

    #[error("Unable to set the pipeline to the {0} state")]
    StateChange(PipelinePhase),

    #[error("Unable to set the pipeline to the {requested} state (pipeline reports {confirmed})")]
    StateMismatch {
        requested: PipelinePhase,
        confirmed: String,
    },

    #[error("'Video' file - {0} - does not support seeking")]
    NotSeekable(PathBuf),

    #[error("Start time {start} is beyond the end of the video ({duration})")]
    StartBeyondDuration {
        start: gst::ClockTime,
        duration: gst::ClockTime,
    },

    #[error("Conversion cancelled: the requested period runs past the end of the video")]
    WindowDeclined,

    #[error("Video duration is unknown, a time period cannot be converted")]
    UnknownDuration,

    #[error("Video frame rate is unknown, every Nth frame cannot be converted")]
    UnknownFrameRate,

    #[error("Seek failed: {0}")]
    Seek(String),

    #[error("Error received from element {element}: {message}")]
    Runtime { element: String, message: String },

    #[error("Failed to create image: {path} ({reason})")]
    Surface { path: PathBuf, reason: String },

    #[error("GStreamer error: {0}")]
    Gst(String),
}

impl ConvertError {
    pub fn class(&self) -> ErrorClass {
        match self {
            ConvertError::MissingField(_)
            | ConvertError::InvalidValue { .. }
            | ConvertError::OutputDir { .. }
            | ConvertError::MetadataMissing(_) => ErrorClass::Configuration,

            ConvertError::ElementCreation { .. }
            | ConvertError::MissingElements(_)
            | ConvertError::Property { .. }
            | ConvertError::PipelineCreation(_)
            | ConvertError::Link(_)
            | ConvertError::Gst(_) => ErrorClass::Construction,

            ConvertError::StateChange(_) | ConvertError::StateMismatch { .. } => {
                ErrorClass::Transition
            }

            ConvertError::NotSeekable(_)
            | ConvertError::StartBeyondDuration { .. }
            | ConvertError::WindowDeclined
            | ConvertError::UnknownDuration
            | ConvertError::UnknownFrameRate => ErrorClass::Validation,

            ConvertError::Seek(_) | ConvertError::Runtime { .. } | ConvertError::Surface { .. } => {
                ErrorClass::Runtime
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, ConvertError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_configuration_and_validation_are_recoverable() {
        assert!(ConvertError::MissingField("Video file").class().is_recoverable());
        assert!(ConvertError::WindowDeclined.class().is_recoverable());
        assert!(!ConvertError::Link("decoder".into()).class().is_recoverable());
        assert!(!ConvertError::StateChange(PipelinePhase::Playing)
            .class()
            .is_recoverable());
        assert!(!ConvertError::Runtime {
            element: "decoder".into(),
            message: "boom".into()
        }
        .class()
        .is_recoverable());
    }

    #[test]
    fn state_change_message_names_the_target_state() {
        let err = ConvertError::StateChange(PipelinePhase::Paused);
        assert_eq!(err.to_string(), "Unable to set the pipeline to the PAUSED state");
    }
}
