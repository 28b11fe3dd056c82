// Pipeline state machine
//
// NULL → READY → PAUSED → PLAYING, and back to NULL on teardown. A state
// request has three possible outcomes: reached synchronously (confirmed by
// querying the pipeline), accepted but still in progress (completion arrives
// on the bus), or failed.

use std::fmt;

use gstreamer as gst;
use gstreamer::prelude::*;

use super::request::ExtractionMode;
use super::{ConvertError, Result};

/// Pipeline lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelinePhase {
    Null,
    Ready,
    Paused,
    Playing,
}

impl PipelinePhase {
    pub fn from_gst(state: gst::State) -> Option<Self> {
        match state {
            gst::State::Null => Some(PipelinePhase::Null),
            gst::State::Ready => Some(PipelinePhase::Ready),
            gst::State::Paused => Some(PipelinePhase::Paused),
            gst::State::Playing => Some(PipelinePhase::Playing),
            _ => None,
        }
    }

    /// First state requested for a run
    ///
    /// Time windows start PAUSED so the seek happens before the clock runs.
    pub fn initial_target(mode: ExtractionMode) -> Self {
        if mode.is_time_window() {
            PipelinePhase::Paused
        } else {
            PipelinePhase::Playing
        }
    }
}

impl From<PipelinePhase> for gst::State {
    fn from(phase: PipelinePhase) -> Self {
        match phase {
            PipelinePhase::Null => gst::State::Null,
            PipelinePhase::Ready => gst::State::Ready,
            PipelinePhase::Paused => gst::State::Paused,
            PipelinePhase::Playing => gst::State::Playing,
        }
    }
}

impl fmt::Display for PipelinePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PipelinePhase::Null => "NULL",
            PipelinePhase::Ready => "READY",
            PipelinePhase::Paused => "PAUSED",
            PipelinePhase::Playing => "PLAYING",
        })
    }
}

/// Successful outcome of a state request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Target state confirmed
    Reached(PipelinePhase),
    /// Accepted, completion will show up on the bus
    Pending(PipelinePhase),
}

/// Interpret the result of a state request
///
/// `confirm` is only called for synchronous successes and must return the
/// state the pipeline reports right now.
pub fn classify<F>(
    target: PipelinePhase,
    result: std::result::Result<gst::StateChangeSuccess, gst::StateChangeError>,
    confirm: F,
) -> Result<Transition>
where
    F: FnOnce() -> gst::State,
{
    match result {
        Ok(gst::StateChangeSuccess::Async) => Ok(Transition::Pending(target)),
        Ok(_) => {
            let confirmed = confirm();
            if PipelinePhase::from_gst(confirmed) == Some(target) {
                Ok(Transition::Reached(target))
            } else {
                Err(ConvertError::StateMismatch {
                    requested: target,
                    confirmed: format!("{:?}", confirmed),
                })
            }
        }
        Err(_) => Err(ConvertError::StateChange(target)),
    }
}

/// Request `target` on `pipeline`
pub fn set_state(pipeline: &gst::Pipeline, target: PipelinePhase) -> Result<Transition> {
    log::debug!("Requesting pipeline state {}", target);
    let result = pipeline.set_state(target.into());
    let transition = classify(target, result, || {
        let (_, current, _) = pipeline.state(gst::ClockTime::ZERO);
        current
    })?;
    log::debug!("Pipeline state request: {:?}", transition);
    Ok(transition)
}
