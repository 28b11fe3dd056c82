// Per-run context
//
// One ConversionRun is created for every conversion and dropped when it
// ends. It holds what the dispatcher and the progress monitor share: the
// request, the frame counter and the lifecycle flags.

use std::path::Path;

use super::progress::FrameCounter;
use super::request::{ConversionRequest, ExtractionMode};
use super::seek::SeekWindow;
use super::state::PipelinePhase;
use crate::discovery::VideoMetadata;

/// Lifecycle flags of one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunState {
    /// Last pipeline phase confirmed by a state query or the bus
    pub phase: PipelinePhase,
    /// Seek sent, waiting for its async-done before PLAYING
    pub seek_pending: bool,
    /// Seek already sent once; it is never repeated
    pub seek_issued: bool,
    /// Pipeline has reached PAUSED
    pub paused_seen: bool,
    /// Preroll finished (async-done seen before the seek)
    pub prerolled: bool,
    pub monitor_started: bool,
    pub finished: bool,
    pub expected_frames: Option<u64>,
}

impl RunState {
    pub fn new(expected_frames: Option<u64>) -> Self {
        Self {
            phase: PipelinePhase::Null,
            seek_pending: false,
            seek_issued: false,
            paused_seen: false,
            prerolled: false,
            monitor_started: false,
            finished: false,
            expected_frames,
        }
    }
}

/// Context shared by everything that takes part in one run
#[derive(Debug)]
pub struct ConversionRun {
    request: ConversionRequest,
    counter: FrameCounter,
    window: Option<SeekWindow>,
    state: RunState,
}

impl ConversionRun {
    pub fn new(request: ConversionRequest, metadata: &VideoMetadata) -> Self {
        let expected = expected_frames(&request, metadata);
        let window = SeekWindow::for_mode(request.mode());
        Self {
            request,
            counter: FrameCounter::new(),
            window,
            state: RunState::new(expected),
        }
    }

    pub fn request(&self) -> &ConversionRequest {
        &self.request
    }

    pub fn counter(&self) -> &FrameCounter {
        &self.counter
    }

    pub fn window(&self) -> Option<SeekWindow> {
        self.window
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut RunState {
        &mut self.state
    }

    pub fn output_dir(&self) -> &Path {
        self.request.output_dir()
    }

    pub fn frames_written(&self) -> u64 {
        self.counter.get()
    }
}

/// Approximate number of images a request will produce
pub fn expected_frames(request: &ConversionRequest, metadata: &VideoMetadata) -> Option<u64> {
    match request.mode() {
        ExtractionMode::AllFrames => metadata.approx_frames(),
        ExtractionMode::EveryNth(n) => Some(metadata.approx_frames()? / u64::from(n.max(1))),
        ExtractionMode::TimeWindow { .. } => {
            let window = SeekWindow::for_mode(request.mode())?;
            let length = window.length(metadata.duration)?;
            Some(metadata.frame_rate?.frames_in(length))
        }
    }
}
