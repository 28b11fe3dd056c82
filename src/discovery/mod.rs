//! Video discovery
//!
//! Before a conversion can start the selected file is probed for its
//! duration, frame rate and seekability. The probe itself sits behind the
//! [`Prober`] trait; [`DiscoveryCoordinator`] owns the policy around it:
//! skipping re-probes of an unchanged path, retrying timeouts a bounded
//! number of times and reporting the outcome to the front end.

pub mod prober;

pub use prober::GstProber;

use std::fmt;
use std::path::{Path, PathBuf};

use gstreamer as gst;

use crate::frontend::{MessageSink, Severity, StatusSink};

/// Timeout retries attempted after the first probe
pub const DEFAULT_TIMEOUT_RETRIES: u32 = 3;

/// Error type for discovery
#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("File {path} does not exist or cannot be read ({source})")]
    NotReadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Discoverer info result error: invalid URI {0}")]
    InvalidUri(String),

    #[error("Discoverer info result error: {0}")]
    Prober(String),

    #[error("Discoverer info result error: the discoverer is busy")]
    Busy,

    #[error("'Video' file - {path} - cannot be played, missing plugins: {}", .details.join(", "))]
    MissingPlugins { path: PathBuf, details: Vec<String> },

    #[error("'Video' file - {0} - cannot be played, it has no video stream")]
    NoVideoStream(PathBuf),

    #[error("Failed to discover video: timed out after {attempts} attempts")]
    TimedOut { attempts: u32 },

    #[error("Error creating video discoverer: {0}")]
    Setup(String),
}

/// Exact frame rate as a fraction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameRate {
    numer: u32,
    denom: u32,
}

impl FrameRate {
    /// None for zero or variable (0/1) rates, and for rates a GStreamer
    /// fraction cannot hold once reduced
    pub fn new(numer: u32, denom: u32) -> Option<Self> {
        Self::reduced(u64::from(numer), u64::from(denom))
    }

    fn reduced(numer: u64, denom: u64) -> Option<Self> {
        if numer == 0 || denom == 0 {
            return None;
        }
        let divisor = gcd(numer, denom);
        let limit = i32::MAX as u64;
        let (numer, denom) = (numer / divisor, denom / divisor);
        if numer > limit || denom > limit {
            return None;
        }
        Some(Self {
            numer: numer as u32,
            denom: denom as u32,
        })
    }

    pub fn from_fraction(fraction: gst::Fraction) -> Option<Self> {
        let numer = u32::try_from(fraction.numer()).ok()?;
        let denom = u32::try_from(fraction.denom()).ok()?;
        Self::new(numer, denom)
    }

    pub fn numer(&self) -> u32 {
        self.numer
    }

    pub fn denom(&self) -> u32 {
        self.denom
    }

    pub fn as_f64(&self) -> f64 {
        self.numer as f64 / self.denom as f64
    }

    /// Whole frames that fit in `duration` at this rate
    pub fn frames_in(&self, duration: gst::ClockTime) -> u64 {
        let frames = duration.nseconds() as u128 * self.numer as u128
            / (self.denom as u128 * gst::ClockTime::SECOND.nseconds() as u128);
        frames as u64
    }

    /// Rate keeping one frame out of every `interval`, None when the result
    /// is out of range
    pub fn divided_by(&self, interval: u32) -> Option<FrameRate> {
        Self::reduced(
            u64::from(self.numer),
            u64::from(self.denom) * u64::from(interval.max(1)),
        )
    }

    pub fn fraction(&self) -> gst::Fraction {
        // Both parts are at most i32::MAX
        gst::Fraction::new(self.numer as i32, self.denom as i32)
    }
}

impl fmt::Display for FrameRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.numer, self.denom)
    }
}

fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a.max(1)
}

/// What discovery learned about a video file
#[derive(Debug, Clone, PartialEq)]
pub struct VideoMetadata {
    pub path: PathBuf,
    /// Total duration, None when the container does not say
    pub duration: Option<gst::ClockTime>,
    /// Only known when the file holds exactly one video stream
    pub frame_rate: Option<FrameRate>,
    pub seekable: bool,
    pub width: u32,
    pub height: u32,
}

impl VideoMetadata {
    /// Approximate number of frames in the whole video
    pub fn approx_frames(&self) -> Option<u64> {
        Some(self.frame_rate?.frames_in(self.duration?))
    }

    /// One line description for the status display
    pub fn summary(&self) -> String {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string());
        let duration = self
            .duration
            .map(|d| d.to_string())
            .unwrap_or_else(|| "unknown".into());
        let fps = self
            .frame_rate
            .map(|r| format!("{:.2} fps", r.as_f64()))
            .unwrap_or_else(|| "unknown fps".into());
        format!(
            "{} - {}x{}, {}, {}{}",
            name,
            self.width,
            self.height,
            duration,
            fps,
            if self.seekable { "" } else { ", not seekable" }
        )
    }
}

/// Result of one probe attempt
#[derive(Debug)]
pub enum ProbeOutcome {
    Discovered(VideoMetadata),
    TimedOut,
    Failed(DiscoveryError),
}

/// Something that can inspect a video file
pub trait Prober {
    fn probe(&mut self, path: &Path) -> ProbeOutcome;
}

/// Runs discovery for the currently selected file and remembers the result
pub struct DiscoveryCoordinator<P: Prober> {
    prober: P,
    timeout_retries: u32,
    current: Option<VideoMetadata>,
}

impl<P: Prober> DiscoveryCoordinator<P> {
    pub fn new(prober: P, timeout_retries: u32) -> Self {
        Self {
            prober,
            timeout_retries,
            current: None,
        }
    }

    /// Metadata of the last successfully discovered file
    pub fn current(&self) -> Option<&VideoMetadata> {
        self.current.as_ref()
    }

    /// Metadata for `path`, only if it is the file that was discovered
    pub fn metadata_for(&self, path: &Path) -> Option<&VideoMetadata> {
        self.current.as_ref().filter(|m| m.path == path)
    }

    /// Discover `path`, reusing the previous result when the path is unchanged
    pub fn discover(
        &mut self,
        path: &Path,
        status: &dyn StatusSink,
        messages: &dyn MessageSink,
    ) -> Result<&VideoMetadata, DiscoveryError> {
        if self.metadata_for(path).is_some() {
            log::debug!("{} already discovered, skipping probe", path.display());
            return self
                .current
                .as_ref()
                .ok_or_else(|| DiscoveryError::Prober("discovery result vanished".into()));
        }

        self.current = None;
        status.set_conversion_enabled(false);
        status.set_status(&format!("Reading video details for {} ...", path.display()));

        match self.probe_with_retry(path, status) {
            Ok(metadata) => {
                log::info!("Discovered {}", metadata.summary());
                status.set_status(&metadata.summary());
                status.set_conversion_enabled(true);
                Ok(&*self.current.insert(metadata))
            }
            Err(e) => {
                log::error!("Discovery failed for {}: {}", path.display(), e);
                messages.report(Severity::Error, &e.to_string());
                status.set_status("Video details could not be read");
                Err(e)
            }
        }
    }

    fn probe_with_retry(
        &mut self,
        path: &Path,
        status: &dyn StatusSink,
    ) -> Result<VideoMetadata, DiscoveryError> {
        std::fs::File::open(path).map_err(|source| DiscoveryError::NotReadable {
            path: path.to_path_buf(),
            source,
        })?;

        let mut retries = 0;
        loop {
            match self.prober.probe(path) {
                ProbeOutcome::Discovered(metadata) => return Ok(metadata),
                ProbeOutcome::Failed(e) => return Err(e),
                ProbeOutcome::TimedOut if retries < self.timeout_retries => {
                    retries += 1;
                    log::warn!(
                        "Discovery of {} timed out, retry {}/{}",
                        path.display(),
                        retries,
                        self.timeout_retries
                    );
                    status.set_status(&format!(
                        "Reading video details timed out, retrying ({}/{}) ...",
                        retries, self.timeout_retries
                    ));
                }
                ProbeOutcome::TimedOut => {
                    return Err(DiscoveryError::TimedOut {
                        attempts: retries + 1,
                    })
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    struct ScriptedProber {
        script: VecDeque<ProbeOutcome>,
        calls: u32,
    }

    impl ScriptedProber {
        fn new(script: Vec<ProbeOutcome>) -> Self {
            Self {
                script: script.into(),
                calls: 0,
            }
        }
    }

    impl Prober for ScriptedProber {
        fn probe(&mut self, _path: &Path) -> ProbeOutcome {
            self.calls += 1;
            self.script.pop_front().unwrap_or(ProbeOutcome::TimedOut)
        }
    }

    #[derive(Default)]
    struct Recorder {
        enabled: Mutex<Vec<bool>>,
        errors: Mutex<Vec<String>>,
    }

    impl StatusSink for Recorder {
        fn set_status(&self, _text: &str) {}

        fn set_conversion_enabled(&self, enabled: bool) {
            self.enabled.lock().push(enabled);
        }
    }

    impl MessageSink for Recorder {
        fn report(&self, _severity: Severity, text: &str) {
            self.errors.lock().push(text.to_string());
        }
    }

    fn video_file() -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.mkv");
        std::fs::write(&path, b"data").unwrap();
        (dir, path)
    }

    fn metadata(path: &Path) -> VideoMetadata {
        VideoMetadata {
            path: path.to_path_buf(),
            duration: Some(gst::ClockTime::from_seconds(10)),
            frame_rate: FrameRate::new(30, 1),
            seekable: true,
            width: 640,
            height: 480,
        }
    }

    #[test]
    fn approx_frames_for_ten_seconds_at_thirty() {
        let meta = metadata(Path::new("clip.mkv"));
        assert_eq!(meta.approx_frames(), Some(300));
    }

    #[test]
    fn frame_rate_denominator_is_honoured() {
        let ntsc = FrameRate::new(30000, 1001).unwrap();
        assert_eq!(ntsc.frames_in(gst::ClockTime::from_seconds(10)), 299);
        assert_eq!(FrameRate::new(60, 2).unwrap(), FrameRate::new(30, 1).unwrap());
        assert_eq!(FrameRate::new(30, 1).unwrap().divided_by(4).unwrap().to_string(), "15/2");
        assert!(FrameRate::new(0, 1).is_none());
    }

    #[test]
    fn divided_rate_must_fit_a_fraction() {
        let pal = FrameRate::new(25, 1).unwrap();
        assert!(pal.divided_by(2_147_483_649).is_none());
        assert!(pal.divided_by(u32::MAX).is_none());
        assert_eq!(pal.divided_by(2).unwrap().fraction(), gst::Fraction::new(25, 2));
        assert!(FrameRate::new(u32::MAX, 1).is_none());
    }

    #[test]
    fn three_timeout_retries_then_failure() {
        let (_dir, path) = video_file();
        let recorder = Recorder::default();
        let mut coordinator = DiscoveryCoordinator::new(ScriptedProber::new(vec![]), 3);

        let err = coordinator.discover(&path, &recorder, &recorder).unwrap_err();
        assert!(matches!(err, DiscoveryError::TimedOut { attempts: 4 }));
        assert_eq!(coordinator.prober.calls, 4);
        assert!(coordinator.current().is_none());
        assert_eq!(recorder.errors.lock().len(), 1);
    }

    #[test]
    fn success_short_circuits_remaining_retries() {
        let (_dir, path) = video_file();
        let recorder = Recorder::default();
        let script = vec![
            ProbeOutcome::TimedOut,
            ProbeOutcome::Discovered(metadata(&path)),
        ];
        let mut coordinator = DiscoveryCoordinator::new(ScriptedProber::new(script), 3);

        let meta = coordinator.discover(&path, &recorder, &recorder).unwrap();
        assert_eq!(meta.approx_frames(), Some(300));
        assert_eq!(coordinator.prober.calls, 2);
        assert_eq!(*recorder.enabled.lock(), vec![false, true]);
    }

    #[test]
    fn non_timeout_failures_are_not_retried() {
        let (_dir, path) = video_file();
        let recorder = Recorder::default();
        let script = vec![ProbeOutcome::Failed(DiscoveryError::Busy)];
        let mut coordinator = DiscoveryCoordinator::new(ScriptedProber::new(script), 3);

        assert!(matches!(
            coordinator.discover(&path, &recorder, &recorder),
            Err(DiscoveryError::Busy)
        ));
        assert_eq!(coordinator.prober.calls, 1);
    }

    #[test]
    fn unchanged_path_is_not_probed_again() {
        let (_dir, path) = video_file();
        let recorder = Recorder::default();
        let script = vec![ProbeOutcome::Discovered(metadata(&path))];
        let mut coordinator = DiscoveryCoordinator::new(ScriptedProber::new(script), 3);

        coordinator.discover(&path, &recorder, &recorder).unwrap();
        coordinator.discover(&path, &recorder, &recorder).unwrap();
        assert_eq!(coordinator.prober.calls, 1);
    }

    #[test]
    fn unreadable_file_fails_before_probing() {
        let recorder = Recorder::default();
        let mut coordinator = DiscoveryCoordinator::new(ScriptedProber::new(vec![]), 3);

        let err = coordinator
            .discover(Path::new("/nonexistent/clip.mp4"), &recorder, &recorder)
            .unwrap_err();
        assert!(matches!(err, DiscoveryError::NotReadable { .. }));
        assert_eq!(coordinator.prober.calls, 0);
    }
}
