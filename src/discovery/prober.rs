// GStreamer Discoverer backed prober
//
// The discoverer runs asynchronously on a private main context. probe()
// pushes that context as thread default, starts the discovery and spins the
// loop until the "finished" signal quits it, so callers see a plain
// blocking call bounded by the discoverer timeout.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use gstreamer as gst;
use gstreamer::glib;
use gstreamer_pbutils as gst_pbutils;
use gst_pbutils::DiscovererResult;
use parking_lot::Mutex;

use super::{DiscoveryError, FrameRate, ProbeOutcome, Prober, VideoMetadata};

/// Default per-probe timeout
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

pub struct GstProber {
    timeout: gst::ClockTime,
}

impl GstProber {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout: gst::ClockTime::from_nseconds(timeout.as_nanos() as u64),
        }
    }

    fn run_discoverer(&self, path: &Path) -> Result<ProbeOutcome, DiscoveryError> {
        let absolute = path
            .canonicalize()
            .map_err(|source| DiscoveryError::NotReadable {
                path: path.to_path_buf(),
                source,
            })?;
        let uri = glib::filename_to_uri(&absolute, None)
            .map_err(|e| DiscoveryError::InvalidUri(format!("{} ({})", absolute.display(), e)))?;

        let context = glib::MainContext::new();
        context
            .with_thread_default(|| self.discover_on(&context, uri.as_str(), path))
            .map_err(|e| DiscoveryError::Setup(e.to_string()))?
    }

    fn discover_on(
        &self,
        context: &glib::MainContext,
        uri: &str,
        path: &Path,
    ) -> Result<ProbeOutcome, DiscoveryError> {
        let discoverer = gst_pbutils::Discoverer::new(self.timeout)
            .map_err(|e| DiscoveryError::Setup(e.to_string()))?;
        let main_loop = glib::MainLoop::new(Some(context), false);
        let outcome: Arc<Mutex<Option<ProbeOutcome>>> = Arc::new(Mutex::new(None));

        discoverer.connect_starting(|_| {
            log::debug!("Discoverer started");
        });

        let slot = Arc::clone(&outcome);
        let source = path.to_path_buf();
        discoverer.connect_discovered(move |_, info, error| {
            *slot.lock() = Some(outcome_from_info(&source, info, error));
        });

        let finished_loop = main_loop.clone();
        discoverer.connect_finished(move |_| {
            log::debug!("Discoverer finished");
            finished_loop.quit();
        });

        discoverer.start();
        if let Err(e) = discoverer.discover_uri_async(uri) {
            discoverer.stop();
            return Err(DiscoveryError::Setup(format!(
                "Failed to video discoverer for: {} ({})",
                uri, e
            )));
        }

        main_loop.run();
        discoverer.stop();

        let result = outcome.lock().take();
        Ok(result.unwrap_or_else(|| {
            ProbeOutcome::Failed(DiscoveryError::Prober(
                "discovery finished without a result".into(),
            ))
        }))
    }
}

impl Default for GstProber {
    fn default() -> Self {
        Self::new(DEFAULT_PROBE_TIMEOUT)
    }
}

impl Prober for GstProber {
    fn probe(&mut self, path: &Path) -> ProbeOutcome {
        log::debug!("Probing {}", path.display());
        match self.run_discoverer(path) {
            Ok(outcome) => outcome,
            Err(e) => ProbeOutcome::Failed(e),
        }
    }
}

fn outcome_from_info(
    path: &Path,
    info: &gst_pbutils::DiscovererInfo,
    error: Option<&glib::Error>,
) -> ProbeOutcome {
    match info.result() {
        DiscovererResult::Ok => {}
        DiscovererResult::UriInvalid => {
            return ProbeOutcome::Failed(DiscoveryError::InvalidUri(info.uri().to_string()))
        }
        DiscovererResult::Error => {
            let message = error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "unknown error".into());
            return ProbeOutcome::Failed(DiscoveryError::Prober(message));
        }
        DiscovererResult::Timeout => return ProbeOutcome::TimedOut,
        DiscovererResult::Busy => return ProbeOutcome::Failed(DiscoveryError::Busy),
        DiscovererResult::MissingPlugins => {
            let details = info
                .missing_elements_installer_details()
                .iter()
                .map(|d| d.to_string())
                .collect();
            return ProbeOutcome::Failed(DiscoveryError::MissingPlugins {
                path: path.to_path_buf(),
                details,
            });
        }
        other => {
            return ProbeOutcome::Failed(DiscoveryError::Prober(format!(
                "unexpected discoverer result {:?}",
                other
            )))
        }
    }

    let streams = info.video_streams();
    let Some(first) = streams.first() else {
        return ProbeOutcome::Failed(DiscoveryError::NoVideoStream(path.to_path_buf()));
    };

    // Frame rate and duration are only trusted for single video stream files
    let single = streams.len() == 1;
    if !single {
        log::warn!(
            "{} has {} video streams, frame rate and duration left unknown",
            path.display(),
            streams.len()
        );
    }

    ProbeOutcome::Discovered(VideoMetadata {
        path: path.to_path_buf(),
        duration: if single { info.duration() } else { None },
        frame_rate: if single {
            FrameRate::from_fraction(first.framerate())
        } else {
            None
        },
        seekable: info.is_seekable(),
        width: first.width(),
        height: first.height(),
    })
}
