// End-to-end checks of the conversion flow without media files or plugins:
// discovery runs against a scripted prober and stages come from a fake
// factory, so everything up to the GStreamer graph itself is exercised.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use gstreamer as gst;
use parking_lot::Mutex;

use gusto_lib::app::Controller;
use gusto_lib::config::Config;
use gusto_lib::convert::{
    Action, BusEvent, ConversionSettings, ConvertError, Dispatcher, ImageCodec, ModeChoice,
    PipelinePhase, PropertyValue, StageFactory, StageRole,
};
use gusto_lib::discovery::{DiscoveryError, FrameRate, ProbeOutcome, Prober, VideoMetadata};
use gusto_lib::frontend::{Chooser, MessageSink, Severity, StatusSink};

/// Answers with a fixed outcome and counts the probes
struct FakeProber {
    seekable: bool,
    time_out: bool,
    calls: Arc<AtomicU32>,
}

impl Prober for FakeProber {
    fn probe(&mut self, path: &Path) -> ProbeOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.time_out {
            return ProbeOutcome::TimedOut;
        }
        ProbeOutcome::Discovered(VideoMetadata {
            path: path.to_path_buf(),
            duration: Some(gst::ClockTime::from_nseconds(10_000_000_000)),
            frame_rate: FrameRate::new(30, 1),
            seekable: self.seekable,
            width: 640,
            height: 360,
        })
    }
}

#[derive(Default)]
struct FakeFactory {
    made: Mutex<Vec<(String, String)>>,
    properties: Mutex<Vec<(String, String, String)>>,
    unavailable: Vec<String>,
}

impl StageFactory for FakeFactory {
    type Stage = String;

    fn make(&self, factory: &str, name: &str) -> Result<String, ConvertError> {
        self.made.lock().push((factory.to_string(), name.to_string()));
        Ok(name.to_string())
    }

    fn configure(
        &self,
        stage: &String,
        property: &str,
        value: &PropertyValue,
    ) -> Result<(), ConvertError> {
        self.properties
            .lock()
            .push((stage.clone(), property.to_string(), value.to_string()));
        Ok(())
    }

    fn missing(&self, wanted: &[&str]) -> Vec<String> {
        wanted
            .iter()
            .filter(|w| self.unavailable.iter().any(|u| u == *w))
            .map(|w| w.to_string())
            .collect()
    }
}

impl FakeFactory {
    fn factories(&self) -> Vec<String> {
        self.made.lock().iter().map(|(f, _)| f.clone()).collect()
    }

    fn property(&self, stage: &str, property: &str) -> Option<String> {
        self.properties
            .lock()
            .iter()
            .find(|(s, p, _)| s == stage && p == property)
            .map(|(_, _, v)| v.clone())
    }
}

/// Records everything the core tells the user
struct Frontend {
    reports: Mutex<Vec<(Severity, String)>>,
    statuses: Mutex<Vec<String>>,
    questions: Mutex<Vec<String>>,
    answer: bool,
}

impl Frontend {
    fn new(answer: bool) -> Arc<Self> {
        Arc::new(Self {
            reports: Mutex::new(Vec::new()),
            statuses: Mutex::new(Vec::new()),
            questions: Mutex::new(Vec::new()),
            answer,
        })
    }

    fn errors(&self) -> Vec<String> {
        self.reports
            .lock()
            .iter()
            .filter(|(s, _)| *s == Severity::Error)
            .map(|(_, t)| t.clone())
            .collect()
    }
}

impl MessageSink for Frontend {
    fn report(&self, severity: Severity, text: &str) {
        self.reports.lock().push((severity, text.to_string()));
    }
}

impl StatusSink for Frontend {
    fn set_status(&self, text: &str) {
        self.statuses.lock().push(text.to_string());
    }
}

impl Chooser for Frontend {
    fn choose_file(&self, _title: &str) -> Option<PathBuf> {
        None
    }

    fn choose_folder(&self, _title: &str) -> Option<PathBuf> {
        None
    }

    fn confirm(&self, question: &str) -> bool {
        self.questions.lock().push(question.to_string());
        self.answer
    }
}

struct Setup {
    dir: tempfile::TempDir,
    video: PathBuf,
    frontend: Arc<Frontend>,
    calls: Arc<AtomicU32>,
    controller: Controller<FakeProber>,
}

fn setup(seekable: bool, time_out: bool, answer: bool) -> Setup {
    let dir = tempfile::tempdir().unwrap();
    let video = dir.path().join("clip.mp4");
    std::fs::write(&video, b"not decoded in these tests").unwrap();

    let frontend = Frontend::new(answer);
    let calls = Arc::new(AtomicU32::new(0));
    let prober = FakeProber {
        seekable,
        time_out,
        calls: calls.clone(),
    };
    let config = Config {
        output_dir: dir.path().join("frames"),
        filename_prefix: "prefix".into(),
        ..Default::default()
    };
    let controller = Controller::new(
        config,
        prober,
        frontend.clone(),
        frontend.clone(),
        frontend.clone(),
    );
    Setup {
        dir,
        video,
        frontend,
        calls,
        controller,
    }
}

fn settings(s: &Setup, mode: ModeChoice) -> ConversionSettings {
    ConversionSettings {
        input: Some(s.video.clone()),
        mode,
        ..s.controller.config().settings()
    }
}

#[test]
fn all_frames_jpg_builds_the_plain_chain() {
    let mut s = setup(true, false, true);
    let metadata = s.controller.select_video(Some(s.video.clone())).unwrap().unwrap();
    assert_eq!(metadata.approx_frames(), Some(300));

    let factory = FakeFactory::default();
    let prepared = s
        .controller
        .prepare(&settings(&s, ModeChoice::All), &factory)
        .unwrap();

    assert_eq!(
        factory.factories(),
        vec!["filesrc", "decodebin", "videoconvert", "jpegenc", "multifilesink"]
    );
    assert_eq!(prepared.stages.len(), 5);
    assert_eq!(prepared.plan.first_consumer(), StageRole::Converter);
    assert_eq!(factory.property("file_sink", "post-messages").as_deref(), Some("true"));
    assert_eq!(factory.property("encoder", "quality").as_deref(), Some("85"));
    assert!(factory
        .property("file_sink", "location")
        .unwrap()
        .ends_with("prefix%010d.jpg"));
    assert_eq!(prepared.run.state().expected_frames, Some(300));
    assert!(s.dir.path().join("frames").is_dir());
}

#[test]
fn simulated_run_names_frames_contiguously() {
    let mut s = setup(true, false, true);
    s.controller.select_video(Some(s.video.clone())).unwrap();
    let prepared = s
        .controller
        .prepare(&settings(&s, ModeChoice::All), &FakeFactory::default())
        .unwrap();

    let template = prepared.run.request().template().clone();
    let mut dispatcher = Dispatcher::new(prepared.run);
    dispatcher.handle(BusEvent::StateChanged {
        pipeline_scoped: true,
        current: PipelinePhase::Playing,
    });
    for _ in 0..300 {
        dispatcher.handle(BusEvent::FrameWritten);
    }
    let actions = dispatcher.handle(BusEvent::Eos);

    assert!(actions.contains(&Action::Teardown));
    assert_eq!(dispatcher.run().frames_written(), 300);
    assert_eq!(template.file_name(0), "prefix0000000000.jpg");
    assert_eq!(template.file_name(299), "prefix0000000299.jpg");
}

#[test]
fn every_nth_inserts_the_rate_changer() {
    let mut s = setup(true, false, true);
    s.controller.select_video(Some(s.video.clone())).unwrap();
    let factory = FakeFactory::default();
    let mut request = settings(&s, ModeChoice::Nth);
    request.interval = Some(10);

    let prepared = s.controller.prepare(&request, &factory).unwrap();
    assert_eq!(prepared.plan.first_consumer(), StageRole::RateChanger);
    assert_eq!(
        factory.property("v_rate_caps", "caps").as_deref(),
        Some("video/x-raw,framerate=3/1")
    );
    assert_eq!(prepared.run.state().expected_frames, Some(30));
}

#[test]
fn bmp_uses_the_surface_sink() {
    let mut s = setup(true, false, true);
    s.controller.select_video(Some(s.video.clone())).unwrap();
    let factory = FakeFactory::default();
    let mut request = settings(&s, ModeChoice::All);
    request.codec = Some(ImageCodec::Bmp);

    let prepared = s.controller.prepare(&request, &factory).unwrap();
    assert!(prepared.plan.uses_surface_sink());
    assert!(!factory.factories().iter().any(|f| f.ends_with("enc")));
    assert!(factory.factories().contains(&"appsink".to_string()));
}

#[test]
fn conversion_needs_discovered_metadata() {
    let s = setup(true, false, true);
    let factory = FakeFactory::default();

    let err = s
        .controller
        .prepare(&settings(&s, ModeChoice::All), &factory)
        .unwrap_err();
    assert!(matches!(err, ConvertError::MetadataMissing(_)));
    assert!(factory.factories().is_empty());
}

#[test]
fn start_beyond_duration_creates_nothing() {
    let mut s = setup(true, false, true);
    s.controller.select_video(Some(s.video.clone())).unwrap();
    let factory = FakeFactory::default();
    let mut request = settings(&s, ModeChoice::Seconds);
    request.start = Some(11);

    let err = s.controller.prepare(&request, &factory).unwrap_err();
    assert!(matches!(err, ConvertError::StartBeyondDuration { .. }));
    assert!(err.class().is_recoverable());
    assert!(factory.factories().is_empty());
}

#[test]
fn unseekable_video_rejects_time_windows() {
    let mut s = setup(false, false, true);
    s.controller.select_video(Some(s.video.clone())).unwrap();
    let mut request = settings(&s, ModeChoice::Minutes);
    request.start = Some(0);
    request.duration = Some(1);

    let err = s
        .controller
        .prepare(&request, &FakeFactory::default())
        .unwrap_err();
    assert!(matches!(err, ConvertError::NotSeekable(_)));
}

#[test]
fn overrun_asks_and_truncates() {
    let mut s = setup(true, false, true);
    s.controller.select_video(Some(s.video.clone())).unwrap();
    let mut request = settings(&s, ModeChoice::Seconds);
    request.start = Some(8);
    request.duration = Some(5);

    let prepared = s
        .controller
        .prepare(&request, &FakeFactory::default())
        .unwrap();
    assert_eq!(s.frontend.questions.lock().len(), 1);
    let window = prepared.run.window().unwrap();
    assert_eq!(window.start, gst::ClockTime::from_seconds(8));
    assert_eq!(window.stop, None);
    assert_eq!(prepared.run.state().expected_frames, Some(60));
}

#[test]
fn declined_overrun_aborts_before_building() {
    let mut s = setup(true, false, false);
    s.controller.select_video(Some(s.video.clone())).unwrap();
    let factory = FakeFactory::default();
    let mut request = settings(&s, ModeChoice::Seconds);
    request.start = Some(8);
    request.duration = Some(5);

    let err = s.controller.prepare(&request, &factory).unwrap_err();
    assert!(matches!(err, ConvertError::WindowDeclined));
    assert!(factory.factories().is_empty());
}

#[test]
fn missing_elements_are_listed_up_front() {
    let mut s = setup(true, false, true);
    s.controller.select_video(Some(s.video.clone())).unwrap();
    let factory = FakeFactory {
        unavailable: vec!["jpegenc".into()],
        ..Default::default()
    };

    let err = s
        .controller
        .prepare(&settings(&s, ModeChoice::All), &factory)
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "Not all GST elements could be created, missing: jpegenc"
    );
    assert!(factory.factories().is_empty());
}

#[test]
fn discovery_gives_up_after_three_retries() {
    let mut s = setup(true, true, true);

    let err = s.controller.select_video(Some(s.video.clone())).unwrap_err();
    assert!(matches!(err, DiscoveryError::TimedOut { attempts: 4 }));
    assert_eq!(s.calls.load(Ordering::SeqCst), 4);
    assert_eq!(s.frontend.errors().len(), 1);
    assert!(s.controller.current_video().is_none());
}

#[test]
fn reselecting_the_same_video_does_not_probe_again() {
    let mut s = setup(true, false, true);
    s.controller.select_video(Some(s.video.clone())).unwrap();
    s.controller.select_video(Some(s.video.clone())).unwrap();
    assert_eq!(s.calls.load(Ordering::SeqCst), 1);
}

#[test]
fn cancelled_picker_selects_nothing() {
    let mut s = setup(true, false, true);
    assert!(s.controller.select_video(None).unwrap().is_none());
    assert_eq!(s.calls.load(Ordering::SeqCst), 0);
}
