// Bus event dispatcher
//
// Every message from the pipeline bus is translated into a BusEvent and fed
// through Dispatcher::handle, which updates the run state and answers with
// the actions the GStreamer side has to carry out. Nothing in here touches
// GStreamer objects.
//
// Time-window sequencing:
//
//   PAUSED seen + preroll done ──► IssueSeek   (seek_pending = true)
//   async-done while seek_pending ──► RequestState(PLAYING)   (seek_pending = false)
//   PLAYING seen ──► StartMonitor
//
// PAUSED and the preroll async-done may arrive in either order; the seek is
// sent once both have been seen.

use std::path::PathBuf;

use super::run::ConversionRun;
use super::seek::SeekWindow;
use super::state::{PipelinePhase, Transition};
use super::ConvertError;
use crate::frontend::Severity;

/// Bus message reduced to what the dispatcher cares about
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusEvent {
    Error {
        element: String,
        message: String,
        debug: Option<String>,
    },
    Warning {
        element: String,
        message: String,
    },
    /// The image sink wrote one file
    FrameWritten,
    /// The surface sink delivered one raw frame
    RawFrame,
    StateChanged {
        /// False for state changes of child elements
        pipeline_scoped: bool,
        current: PipelinePhase,
    },
    AsyncDone,
    Eos,
    Other,
}

/// Work requested by the dispatcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Report(Severity, String),
    RequestState(PipelinePhase),
    IssueSeek(SeekWindow),
    StartMonitor,
    StopMonitor,
    /// Write the current raw frame to this path
    SaveSurface(PathBuf),
    Status(String),
    /// Release the pipeline and stop reading the bus
    Teardown,
}

pub struct Dispatcher {
    run: ConversionRun,
    error: Option<ConvertError>,
}

impl Dispatcher {
    pub fn new(run: ConversionRun) -> Self {
        Self { run, error: None }
    }

    pub fn run(&self) -> &ConversionRun {
        &self.run
    }

    pub fn is_finished(&self) -> bool {
        self.run.state().finished
    }

    /// Status line shown when the pipeline is started
    pub fn starting_status(&self) -> String {
        format!(
            "Converting video to {} images ...",
            self.run.request().codec()
        )
    }

    pub fn handle(&mut self, event: BusEvent) -> Vec<Action> {
        if self.is_finished() {
            log::debug!("Ignoring {:?} after the run finished", event);
            return Vec::new();
        }

        match event {
            BusEvent::Error {
                element,
                message,
                debug,
            } => {
                log::error!(
                    "Error from {}: {} ({})",
                    element,
                    message,
                    debug.as_deref().unwrap_or("no debug info")
                );
                self.fail(ConvertError::Runtime { element, message })
            }
            BusEvent::Warning { element, message } => {
                log::warn!("Warning from {}: {}", element, message);
                vec![Action::Report(
                    Severity::Warning,
                    format!("Warning received from element {}: {}", element, message),
                )]
            }
            BusEvent::FrameWritten => {
                let index = self.run.counter().increment();
                log::trace!("Frame {} written", index);
                Vec::new()
            }
            BusEvent::RawFrame => {
                let index = self.run.counter().increment();
                let path = self.run.request().template().path_for(index);
                log::debug!("Saving raw frame {} to {}", index, path.display());
                vec![Action::SaveSurface(path)]
            }
            BusEvent::StateChanged {
                pipeline_scoped: false,
                ..
            } => Vec::new(),
            BusEvent::StateChanged { current, .. } => self.phase_reached(current),
            BusEvent::AsyncDone => self.async_done(),
            BusEvent::Eos => self.finish(),
            BusEvent::Other => Vec::new(),
        }
    }

    /// Feed back a state request that completed synchronously
    pub fn transition_confirmed(&mut self, transition: Transition) -> Vec<Action> {
        if self.is_finished() {
            return Vec::new();
        }
        match transition {
            Transition::Reached(phase) => {
                if phase == PipelinePhase::Paused {
                    // A synchronous PAUSED has already prerolled
                    self.run.state_mut().prerolled = true;
                }
                self.phase_reached(phase)
            }
            Transition::Pending(_) => Vec::new(),
        }
    }

    /// End the run with `err`
    pub fn fail(&mut self, err: ConvertError) -> Vec<Action> {
        if self.is_finished() {
            log::debug!("Run already finished, dropping error: {}", err);
            return Vec::new();
        }
        log::error!("Conversion failed: {}", err);

        let mut actions = vec![Action::Report(Severity::Error, err.to_string())];
        actions.extend(self.wind_down());
        actions.push(Action::Status("Conversion failed".into()));
        self.error = Some(err);
        actions
    }

    /// Error that ended the run, if any
    pub fn take_error(&mut self) -> Option<ConvertError> {
        self.error.take()
    }

    fn phase_reached(&mut self, phase: PipelinePhase) -> Vec<Action> {
        let state = self.run.state_mut();
        if state.phase != phase {
            log::debug!("Pipeline state {} -> {}", state.phase, phase);
        }
        state.phase = phase;
        if phase == PipelinePhase::Paused {
            state.paused_seen = true;
        }
        self.advance()
    }

    fn async_done(&mut self) -> Vec<Action> {
        let state = self.run.state_mut();
        if state.seek_pending {
            log::debug!("Seek completed, starting playback");
            state.seek_pending = false;
            return vec![Action::RequestState(PipelinePhase::Playing)];
        }
        state.prerolled = true;
        self.advance()
    }

    fn advance(&mut self) -> Vec<Action> {
        let window = self.run.window();
        let state = self.run.state_mut();

        if let Some(window) = window {
            if !state.seek_issued && state.paused_seen && state.prerolled {
                state.seek_issued = true;
                state.seek_pending = true;
                return vec![Action::IssueSeek(window)];
            }
        }

        if state.phase == PipelinePhase::Playing && !state.monitor_started {
            state.monitor_started = true;
            return vec![Action::StartMonitor];
        }
        Vec::new()
    }

    fn finish(&mut self) -> Vec<Action> {
        let written = self.run.frames_written();
        log::info!(
            "End of stream, {} images written to {}",
            written,
            self.run.output_dir().display()
        );
        let mut actions = self.wind_down();
        actions.push(Action::Status(format!(
            "Conversion finished: {} images written to {}",
            written,
            self.run.output_dir().display()
        )));
        actions
    }

    fn wind_down(&mut self) -> Vec<Action> {
        let state = self.run.state_mut();
        state.finished = true;
        state.seek_pending = false;

        let mut actions = Vec::with_capacity(3);
        if state.monitor_started {
            state.monitor_started = false;
            actions.push(Action::StopMonitor);
        }
        actions.push(Action::RequestState(PipelinePhase::Null));
        actions.push(Action::Teardown);
        actions
    }
}
