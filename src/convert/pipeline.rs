// GStreamer side of a conversion run
//
// ConversionPipeline owns the gst::Pipeline built from a prepared plan and
// drives it: bus messages are turned into BusEvents, handed to the
// dispatcher, and the returned actions are carried out here. The bus is
// read on the calling thread until the dispatcher asks for teardown.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app as gst_app;

use super::dispatch::{Action, BusEvent, Dispatcher};
use super::plan::StageRole;
use super::progress::ProgressMonitor;
use super::state::{self, PipelinePhase};
use super::surface::{self, FrameAck, FrameWait};
use super::{linker, seek, ConvertError, Result};
use crate::app::PreparedConversion;
use crate::frontend::{MessageSink, StatusSink};

/// Name of the element message carrying one raw frame from the surface sink
const RAW_FRAME_MESSAGE: &str = "gusto-raw-frame";

/// Structure name of multifilesink's per-file message
const FILE_WRITTEN_MESSAGE: &str = "GstMultiFileSink";

/// Outcome of a finished run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub frames_written: u64,
    pub expected_frames: Option<u64>,
    pub output_dir: PathBuf,
}

pub struct ConversionPipeline {
    pipeline: gst::Pipeline,
    bus: gst::Bus,
    dispatcher: Dispatcher,
    frame_ack: Option<FrameAck>,
    status: Arc<dyn StatusSink>,
    messages: Arc<dyn MessageSink>,
    monitor: Option<ProgressMonitor>,
    progress_interval: Duration,
    torn_down: bool,
}

impl ConversionPipeline {
    /// Add the prepared stages to a new pipeline and link them
    pub fn assemble(
        prepared: PreparedConversion<gst::Element>,
        status: Arc<dyn StatusSink>,
        messages: Arc<dyn MessageSink>,
        progress_interval: Duration,
    ) -> Result<Self> {
        let PreparedConversion { run, plan, stages } = prepared;
        let stage = |role: StageRole| {
            stages.get(role).cloned().ok_or_else(|| {
                ConvertError::PipelineCreation(format!("no {} stage", role.instance_name()))
            })
        };

        let pipeline = gst::Pipeline::with_name("video_convert");
        pipeline
            .add_many(stages.in_plan_order(&plan))
            .map_err(|e| ConvertError::PipelineCreation(e.to_string()))?;

        let source = stage(StageRole::Source)?;
        let decoder = stage(StageRole::Decoder)?;
        source
            .link(&decoder)
            .map_err(|e| ConvertError::Link(format!("source to decoder ({})", e)))?;

        let chain = plan
            .downstream_chain()
            .into_iter()
            .map(stage)
            .collect::<Result<Vec<_>>>()?;
        if chain.len() > 1 {
            gst::Element::link_many(&chain)
                .map_err(|e| ConvertError::Link(format!("downstream chain ({})", e)))?;
        }

        let consumer = stage(plan.first_consumer())?;
        linker::connect_decoder(&decoder, &consumer);

        let bus = pipeline
            .bus()
            .ok_or_else(|| ConvertError::PipelineCreation("pipeline has no bus".into()))?;

        let mut frame_ack = None;
        if plan.uses_surface_sink() {
            let sink = stage(StageRole::SurfaceSink)?
                .downcast::<gst_app::AppSink>()
                .map_err(|_| ConvertError::PipelineCreation("surface sink is not an appsink".into()))?;
            let (ack, wait) = surface::frame_handoff();
            forward_raw_frames(&sink, wait);
            frame_ack = Some(ack);
        }

        log::info!(
            "Pipeline assembled: {}",
            plan.factories().join(" ! ")
        );

        Ok(Self {
            pipeline,
            bus,
            dispatcher: Dispatcher::new(run),
            frame_ack,
            status,
            messages,
            monitor: None,
            progress_interval,
            torn_down: false,
        })
    }

    /// Start the pipeline and process its bus until the run ends
    ///
    /// Every error returned here has already been reported by the dispatcher.
    pub fn run(mut self) -> Result<RunSummary> {
        self.start();

        while !self.torn_down {
            let Some(msg) = self.bus.timed_pop(gst::ClockTime::NONE) else {
                break;
            };
            let (event, sample) = translate(&self.pipeline, &msg);
            let raw_frame = event == BusEvent::RawFrame;
            let actions = self.dispatcher.handle(event);
            self.execute(actions, sample.as_ref());
            if raw_frame {
                self.release_frame();
            }
        }

        self.shutdown();

        if let Some(e) = self.dispatcher.take_error() {
            return Err(e);
        }
        let run = self.dispatcher.run();
        Ok(RunSummary {
            frames_written: run.frames_written(),
            expected_frames: run.state().expected_frames,
            output_dir: run.output_dir().to_path_buf(),
        })
    }

    fn start(&mut self) {
        self.status.set_status(&self.dispatcher.starting_status());
        let target = PipelinePhase::initial_target(self.dispatcher.run().request().mode());
        let actions = match state::set_state(&self.pipeline, target) {
            Ok(transition) => self.dispatcher.transition_confirmed(transition),
            Err(e) => self.dispatcher.fail(e),
        };
        self.execute(actions, None);
    }

    fn execute(&mut self, actions: Vec<Action>, sample: Option<&gst::Sample>) {
        let mut queue: VecDeque<Action> = actions.into();
        while let Some(action) = queue.pop_front() {
            match action {
                Action::Report(severity, text) => self.messages.report(severity, &text),
                Action::Status(text) => self.status.set_status(&text),
                Action::RequestState(phase) => {
                    if phase == PipelinePhase::Null {
                        self.close_frames();
                    }
                    match state::set_state(&self.pipeline, phase) {
                        Ok(transition) => {
                            queue.extend(self.dispatcher.transition_confirmed(transition))
                        }
                        Err(e) => queue.extend(self.dispatcher.fail(e)),
                    }
                }
                Action::IssueSeek(window) => {
                    if let Err(e) = seek::issue_seek(&self.pipeline, &window) {
                        queue.extend(self.dispatcher.fail(e));
                    }
                }
                Action::StartMonitor => self.start_monitor(),
                Action::StopMonitor => self.stop_monitor(),
                Action::SaveSurface(path) => {
                    let saved = match sample {
                        Some(sample) => surface::save_bmp(sample, &path),
                        None => Err(ConvertError::Surface {
                            path,
                            reason: "raw frame message carried no sample".into(),
                        }),
                    };
                    if let Err(e) = saved {
                        queue.extend(self.dispatcher.fail(e));
                    }
                }
                Action::Teardown => self.torn_down = true,
            }
        }
    }

    fn start_monitor(&mut self) {
        let run = self.dispatcher.run();
        match ProgressMonitor::start(
            run.counter().clone(),
            run.state().expected_frames,
            self.progress_interval,
            Arc::clone(&self.status),
        ) {
            Ok(monitor) => self.monitor = Some(monitor),
            Err(e) => log::warn!("Failed to start progress monitor: {}", e),
        }
    }

    fn stop_monitor(&mut self) {
        if let Some(mut monitor) = self.monitor.take() {
            monitor.stop();
        }
    }

    fn release_frame(&self) {
        if let Some(ack) = &self.frame_ack {
            ack.release();
        }
    }

    /// Unblock the streaming thread before the pipeline stops
    fn close_frames(&mut self) {
        if let Some(ack) = self.frame_ack.as_mut() {
            ack.close();
        }
    }

    fn shutdown(&mut self) {
        self.stop_monitor();
        self.close_frames();
        if let Err(e) = self.pipeline.set_state(gst::State::Null) {
            log::warn!("Failed to set pipeline to NULL: {:?}", e);
        }
    }
}

impl Drop for ConversionPipeline {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Post every frame the appsink receives to the bus as an element message
///
/// The streaming thread then waits until the bus thread has handled that
/// frame.
fn forward_raw_frames(sink: &gst_app::AppSink, wait: FrameWait) {
    sink.set_callbacks(
        gst_app::AppSinkCallbacks::builder()
            .new_sample(move |appsink| {
                let sample = appsink.pull_sample().map_err(|_| gst::FlowError::Eos)?;
                let structure = gst::Structure::builder(RAW_FRAME_MESSAGE)
                    .field("sample", sample)
                    .build();
                let msg = gst::message::Element::builder(structure)
                    .src(appsink)
                    .build();
                appsink.post_message(msg).map_err(|_| gst::FlowError::Flushing)?;
                if !wait.wait() {
                    return Err(gst::FlowError::Flushing);
                }
                Ok(gst::FlowSuccess::Ok)
            })
            .build(),
    );
}

/// Reduce a bus message to the event the dispatcher reacts to
fn translate(pipeline: &gst::Pipeline, msg: &gst::Message) -> (BusEvent, Option<gst::Sample>) {
    let source_name = || {
        msg.src()
            .map(|s| s.name().to_string())
            .unwrap_or_else(|| "unknown".into())
    };
    let from_pipeline = msg
        .src()
        .map(|s| s == pipeline.upcast_ref::<gst::Object>())
        .unwrap_or(false);

    let event = match msg.view() {
        gst::MessageView::Error(err) => BusEvent::Error {
            element: source_name(),
            message: err.error().to_string(),
            debug: err.debug().map(|d| d.to_string()),
        },
        gst::MessageView::Warning(warn) => BusEvent::Warning {
            element: source_name(),
            message: warn.error().to_string(),
        },
        gst::MessageView::Element(element) => match element.structure() {
            Some(s) if s.has_name(FILE_WRITTEN_MESSAGE) => BusEvent::FrameWritten,
            Some(s) if s.has_name(RAW_FRAME_MESSAGE) => {
                return (BusEvent::RawFrame, s.get::<gst::Sample>("sample").ok());
            }
            _ => BusEvent::Other,
        },
        gst::MessageView::StateChanged(sc) => match PipelinePhase::from_gst(sc.current()) {
            Some(current) => BusEvent::StateChanged {
                pipeline_scoped: from_pipeline,
                current,
            },
            None => BusEvent::Other,
        },
        gst::MessageView::AsyncDone(_) if from_pipeline => BusEvent::AsyncDone,
        gst::MessageView::Eos(_) => BusEvent::Eos,
        _ => BusEvent::Other,
    };
    (event, None)
}
