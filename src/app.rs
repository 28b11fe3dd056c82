// Top-level controller
//
// Owns the discovery coordinator for the currently selected video and
// creates one ConversionRun per conversion. Errors found before the pipeline
// runs are reported here; errors raised while it runs are reported by the
// bus dispatcher.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::Config;
use crate::convert::{
    seek, ConversionPipeline, ConversionRequest, ConversionRun, ConversionSettings, ConvertError,
    GstStageFactory, PipelinePlan, RunSummary, StageFactory, StageSet,
};
use crate::discovery::{DiscoveryCoordinator, DiscoveryError, GstProber, Prober, VideoMetadata};
use crate::frontend::{Chooser, MessageSink, Severity, StatusSink};

/// Everything a run needs, created and configured but not yet in a pipeline
#[derive(Debug)]
pub struct PreparedConversion<S> {
    pub run: ConversionRun,
    pub plan: PipelinePlan,
    pub stages: StageSet<S>,
}

pub struct Controller<P: Prober> {
    config: Config,
    discovery: DiscoveryCoordinator<P>,
    messages: Arc<dyn MessageSink>,
    status: Arc<dyn StatusSink>,
    chooser: Arc<dyn Chooser>,
}

impl Controller<GstProber> {
    /// Controller probing with the GStreamer discoverer
    pub fn with_gstreamer(
        config: Config,
        messages: Arc<dyn MessageSink>,
        status: Arc<dyn StatusSink>,
        chooser: Arc<dyn Chooser>,
    ) -> Self {
        let prober = GstProber::new(config.discovery_timeout());
        Self::new(config, prober, messages, status, chooser)
    }
}

impl<P: Prober> Controller<P> {
    pub fn new(
        config: Config,
        prober: P,
        messages: Arc<dyn MessageSink>,
        status: Arc<dyn StatusSink>,
        chooser: Arc<dyn Chooser>,
    ) -> Self {
        let discovery = DiscoveryCoordinator::new(prober, config.discovery_timeout_retries);
        Self {
            config,
            discovery,
            messages,
            status,
            chooser,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Metadata of the selected video, if discovery succeeded
    pub fn current_video(&self) -> Option<&VideoMetadata> {
        self.discovery.current()
    }

    /// Select the video to convert and discover it
    ///
    /// Without a path the user is asked to pick one. Returns None when the
    /// picker was cancelled.
    pub fn select_video(
        &mut self,
        path: Option<PathBuf>,
    ) -> Result<Option<VideoMetadata>, DiscoveryError> {
        let Some(path) = path.or_else(|| self.chooser.choose_file("Select a video file")) else {
            log::info!("No video selected");
            return Ok(None);
        };

        self.status.set_status(&format!("Selected {}", path.display()));
        let metadata = self
            .discovery
            .discover(&path, self.status.as_ref(), self.messages.as_ref())?;
        Ok(Some(metadata.clone()))
    }

    /// Ask for an output folder when the settings have none
    pub fn fill_output_dir(&self, settings: &mut ConversionSettings) {
        if settings.output_dir.is_none() {
            settings.output_dir = self.chooser.choose_folder("Select the output folder");
        }
    }

    /// Validate settings and create every stage the run needs
    ///
    /// Nothing is created unless the request is valid for the discovered
    /// video, including the time-window checks.
    pub fn prepare<F: StageFactory>(
        &self,
        settings: &ConversionSettings,
        factory: &F,
    ) -> Result<PreparedConversion<F::Stage>, ConvertError> {
        let request = ConversionRequest::from_settings(settings)?;
        let metadata = self.metadata_for(request.input())?;
        let request = seek::resolve_window(request, metadata, self.chooser.as_ref())?;

        let plan = PipelinePlan::for_request(&request, metadata)?;
        let stages = StageSet::materialize(&plan, factory)?;
        let run = ConversionRun::new(request, metadata);
        log::debug!(
            "Prepared {} stages, expecting about {:?} images",
            stages.len(),
            run.state().expected_frames
        );

        Ok(PreparedConversion { run, plan, stages })
    }

    /// Run a conversion to completion
    pub fn convert(&self, settings: &ConversionSettings) -> Result<RunSummary, ConvertError> {
        let prepared = self
            .prepare(settings, &GstStageFactory)
            .map_err(|e| self.not_started(e))?;
        let pipeline = ConversionPipeline::assemble(
            prepared,
            Arc::clone(&self.status),
            Arc::clone(&self.messages),
            self.config.progress_interval(),
        )
        .map_err(|e| self.not_started(e))?;

        let summary = pipeline.run()?;
        log::info!(
            "Wrote {} images (expected about {:?}) to {}",
            summary.frames_written,
            summary.expected_frames,
            summary.output_dir.display()
        );
        Ok(summary)
    }

    fn metadata_for(&self, input: &Path) -> Result<&VideoMetadata, ConvertError> {
        self.discovery
            .metadata_for(input)
            .ok_or_else(|| ConvertError::MetadataMissing(input.to_path_buf()))
    }

    fn not_started(&self, err: ConvertError) -> ConvertError {
        log::error!("Conversion not started ({:?}): {}", err.class(), err);
        self.messages.report(Severity::Error, &err.to_string());
        self.status.set_status("Conversion not started");
        err
    }
}
