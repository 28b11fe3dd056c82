// Pipeline builder
//
// Turns a request into an ordered list of stages with their properties. The
// plan is plain data; creating and linking the elements happens later, so
// the shape of the graph for every codec and mode can be checked without
// touching GStreamer.

use std::fmt;

use super::request::{ConversionRequest, ImageCodec};
use super::{ConvertError, Result};
use crate::discovery::{FrameRate, VideoMetadata};

/// Raw video caps, described without touching GStreamer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapsSpec {
    pub media_type: &'static str,
    pub format: Option<&'static str>,
    pub framerate: Option<FrameRate>,
}

impl CapsSpec {
    /// Caps for frames handed to the raw surface sink
    pub const SURFACE: CapsSpec = CapsSpec {
        media_type: "video/x-raw",
        format: Some("RGB"),
        framerate: None,
    };

    pub fn with_framerate(rate: FrameRate) -> Self {
        Self {
            media_type: "video/x-raw",
            format: None,
            framerate: Some(rate),
        }
    }
}

impl fmt::Display for CapsSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.media_type)?;
        if let Some(format) = self.format {
            write!(f, ",format={}", format)?;
        }
        if let Some(rate) = self.framerate {
            write!(f, ",framerate={}", rate)?;
        }
        Ok(())
    }
}

/// Typed property value; converted to the element's own property type when set
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyValue {
    Str(String),
    Bool(bool),
    Int(i64),
    Caps(CapsSpec),
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Str(s) => f.write_str(s),
            PropertyValue::Bool(b) => write!(f, "{}", b),
            PropertyValue::Int(n) => write!(f, "{}", n),
            PropertyValue::Caps(caps) => write!(f, "{}", caps),
        }
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        PropertyValue::Str(value)
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        PropertyValue::Bool(value)
    }
}

impl From<u8> for PropertyValue {
    fn from(value: u8) -> Self {
        PropertyValue::Int(i64::from(value))
    }
}

impl From<CapsSpec> for PropertyValue {
    fn from(value: CapsSpec) -> Self {
        PropertyValue::Caps(value)
    }
}

/// Position of a stage in the conversion graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageRole {
    Source,
    Decoder,
    RateChanger,
    RateFilter,
    Converter,
    Encoder,
    FileSink,
    SurfaceSink,
}

impl StageRole {
    /// Element name inside the pipeline
    pub fn instance_name(&self) -> &'static str {
        match self {
            StageRole::Source => "video",
            StageRole::Decoder => "v_decode",
            StageRole::RateChanger => "v_rate",
            StageRole::RateFilter => "v_rate_caps",
            StageRole::Converter => "v_convert",
            StageRole::Encoder => "encoder",
            StageRole::FileSink => "file_sink",
            StageRole::SurfaceSink => "surface_sink",
        }
    }
}

/// One stage to create
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageSpec {
    pub role: StageRole,
    pub factory: &'static str,
    pub properties: Vec<(&'static str, PropertyValue)>,
}

impl StageSpec {
    fn new(role: StageRole, factory: &'static str) -> Self {
        Self {
            role,
            factory,
            properties: Vec::new(),
        }
    }

    fn with(mut self, property: &'static str, value: impl Into<PropertyValue>) -> Self {
        self.properties.push((property, value.into()));
        self
    }

    pub fn property(&self, name: &str) -> Option<&PropertyValue> {
        self.properties
            .iter()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value)
    }
}

/// Ordered stages for one conversion run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelinePlan {
    stages: Vec<StageSpec>,
}

impl PipelinePlan {
    pub fn for_request(request: &ConversionRequest, metadata: &VideoMetadata) -> Result<Self> {
        let codec = request.codec();
        let tuning = request.tuning();
        let mut stages = Vec::with_capacity(7);

        stages.push(
            StageSpec::new(StageRole::Source, "filesrc")
                .with("location", request.input().to_string_lossy().into_owned()),
        );
        stages.push(StageSpec::new(StageRole::Decoder, "decodebin"));

        if let Some(interval) = request.mode().rate_interval() {
            let nominal = metadata.frame_rate.ok_or(ConvertError::UnknownFrameRate)?;
            let rate = nominal
                .divided_by(interval)
                .ok_or_else(|| ConvertError::InvalidValue {
                    field: "Frame interval",
                    reason: format!("{} is too large for {} fps", interval, nominal),
                })?;
            stages.push(StageSpec::new(StageRole::RateChanger, "videorate").with("drop-only", true));
            stages.push(
                StageSpec::new(StageRole::RateFilter, "capsfilter")
                    .with("caps", CapsSpec::with_framerate(rate)),
            );
        }

        stages.push(StageSpec::new(StageRole::Converter, "videoconvert"));

        match codec.encoder_factory() {
            Some(encoder) => {
                let spec = StageSpec::new(StageRole::Encoder, encoder);
                let spec = match codec {
                    ImageCodec::Jpg => spec.with("quality", tuning.jpeg_quality),
                    ImageCodec::Png => spec.with("compression-level", tuning.png_compression_level),
                    ImageCodec::Bmp => spec,
                };
                stages.push(spec);
                stages.push(
                    StageSpec::new(StageRole::FileSink, "multifilesink")
                        .with("location", request.template().sink_location())
                        .with("post-messages", true)
                        .with("sync", false),
                );
            }
            None => {
                stages.push(
                    StageSpec::new(StageRole::SurfaceSink, "appsink")
                        .with("caps", CapsSpec::SURFACE)
                        .with("sync", false),
                );
            }
        }

        Ok(Self { stages })
    }

    pub fn stages(&self) -> &[StageSpec] {
        &self.stages
    }

    pub fn stage(&self, role: StageRole) -> Option<&StageSpec> {
        self.stages.iter().find(|s| s.role == role)
    }

    pub fn contains(&self, role: StageRole) -> bool {
        self.stage(role).is_some()
    }

    /// Stage that receives the decoder's video pad
    pub fn first_consumer(&self) -> StageRole {
        if self.contains(StageRole::RateChanger) {
            StageRole::RateChanger
        } else {
            StageRole::Converter
        }
    }

    /// Stages after the decoder, in link order
    pub fn downstream_chain(&self) -> Vec<StageRole> {
        self.stages
            .iter()
            .map(|s| s.role)
            .skip_while(|role| *role != self.first_consumer())
            .collect()
    }

    /// Element factories this plan needs
    pub fn factories(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.factory).collect()
    }

    /// True when frames are written by the dispatcher instead of a sink
    pub fn uses_surface_sink(&self) -> bool {
        self.contains(StageRole::SurfaceSink)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::request::{ConversionSettings, ModeChoice};
    use crate::discovery::FrameRate;
    use gstreamer as gst;

    fn request(dir: &tempfile::TempDir, codec: ImageCodec, mode: ModeChoice, interval: Option<u32>) -> ConversionRequest {
        let input = dir.path().join("clip.mp4");
        std::fs::write(&input, b"x").unwrap();
        ConversionRequest::from_settings(&ConversionSettings {
            input: Some(input),
            output_dir: Some(dir.path().join("out")),
            filename_prefix: Some("img".into()),
            codec: Some(codec),
            mode,
            interval,
            ..Default::default()
        })
        .unwrap()
    }

    fn metadata(frame_rate: Option<FrameRate>) -> VideoMetadata {
        VideoMetadata {
            path: "clip.mp4".into(),
            duration: Some(gst::ClockTime::from_seconds(10)),
            frame_rate,
            seekable: true,
            width: 320,
            height: 240,
        }
    }

    fn text(plan: &PipelinePlan, role: StageRole, property: &str) -> Option<String> {
        plan.stage(role)?.property(property).map(|v| v.to_string())
    }

    fn roles(plan: &PipelinePlan) -> Vec<StageRole> {
        plan.stages().iter().map(|s| s.role).collect()
    }

    #[test]
    fn jpg_all_frames() {
        let dir = tempfile::tempdir().unwrap();
        let plan = PipelinePlan::for_request(
            &request(&dir, ImageCodec::Jpg, ModeChoice::All, None),
            &metadata(FrameRate::new(30, 1)),
        )
        .unwrap();

        assert_eq!(
            roles(&plan),
            vec![
                StageRole::Source,
                StageRole::Decoder,
                StageRole::Converter,
                StageRole::Encoder,
                StageRole::FileSink
            ]
        );
        assert_eq!(plan.first_consumer(), StageRole::Converter);
        assert_eq!(plan.stage(StageRole::Encoder).unwrap().factory, "jpegenc");
        assert_eq!(
            plan.stage(StageRole::Encoder).unwrap().property("quality"),
            Some(&PropertyValue::Int(85))
        );

        let sink = plan.stage(StageRole::FileSink).unwrap();
        assert_eq!(sink.property("post-messages"), Some(&PropertyValue::Bool(true)));
        assert!(text(&plan, StageRole::FileSink, "location")
            .unwrap()
            .ends_with("img%010d.jpg"));
    }

    #[test]
    fn every_nth_inserts_rate_changer_first() {
        let dir = tempfile::tempdir().unwrap();
        let plan = PipelinePlan::for_request(
            &request(&dir, ImageCodec::Png, ModeChoice::Nth, Some(10)),
            &metadata(FrameRate::new(30, 1)),
        )
        .unwrap();

        assert_eq!(plan.first_consumer(), StageRole::RateChanger);
        assert_eq!(
            plan.downstream_chain(),
            vec![
                StageRole::RateChanger,
                StageRole::RateFilter,
                StageRole::Converter,
                StageRole::Encoder,
                StageRole::FileSink
            ]
        );
        assert_eq!(
            plan.stage(StageRole::RateFilter).unwrap().property("caps"),
            Some(&PropertyValue::Caps(CapsSpec::with_framerate(
                FrameRate::new(3, 1).unwrap()
            )))
        );
        assert_eq!(
            text(&plan, StageRole::RateFilter, "caps").as_deref(),
            Some("video/x-raw,framerate=3/1")
        );
        assert_eq!(
            text(&plan, StageRole::Encoder, "compression-level").as_deref(),
            Some("6")
        );
    }

    #[test]
    fn interval_of_one_needs_no_rate_changer() {
        let dir = tempfile::tempdir().unwrap();
        let plan = PipelinePlan::for_request(
            &request(&dir, ImageCodec::Jpg, ModeChoice::Nth, Some(1)),
            &metadata(None),
        )
        .unwrap();
        assert!(!plan.contains(StageRole::RateChanger));
    }

    #[test]
    fn every_nth_requires_a_known_frame_rate() {
        let dir = tempfile::tempdir().unwrap();
        let err = PipelinePlan::for_request(
            &request(&dir, ImageCodec::Jpg, ModeChoice::Nth, Some(2)),
            &metadata(None),
        )
        .unwrap_err();
        assert!(matches!(err, ConvertError::UnknownFrameRate));
    }

    #[test]
    fn interval_too_large_for_a_fraction_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let err = PipelinePlan::for_request(
            &request(&dir, ImageCodec::Jpg, ModeChoice::Nth, Some(2_147_483_649)),
            &metadata(FrameRate::new(25, 1)),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ConvertError::InvalidValue {
                field: "Frame interval",
                ..
            }
        ));
        assert!(err.class().is_recoverable());
    }

    #[test]
    fn quoted_input_path_is_kept_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("\"quoted\".mp4");
        std::fs::write(&input, b"x").unwrap();
        let request = ConversionRequest::from_settings(&ConversionSettings {
            input: Some(input.clone()),
            output_dir: Some(dir.path().join("out")),
            filename_prefix: Some("img".into()),
            codec: Some(ImageCodec::Jpg),
            ..Default::default()
        })
        .unwrap();

        let plan = PipelinePlan::for_request(&request, &metadata(None)).unwrap();
        assert_eq!(
            plan.stage(StageRole::Source).unwrap().property("location"),
            Some(&PropertyValue::Str(input.to_string_lossy().into_owned()))
        );
    }

    #[test]
    fn bmp_has_no_encoder_stage() {
        let dir = tempfile::tempdir().unwrap();
        let plan = PipelinePlan::for_request(
            &request(&dir, ImageCodec::Bmp, ModeChoice::All, None),
            &metadata(FrameRate::new(25, 1)),
        )
        .unwrap();

        assert!(!plan.contains(StageRole::Encoder));
        assert!(!plan.contains(StageRole::FileSink));
        assert!(plan.uses_surface_sink());
        assert_eq!(
            plan.factories(),
            vec!["filesrc", "decodebin", "videoconvert", "appsink"]
        );
        assert_eq!(
            text(&plan, StageRole::SurfaceSink, "caps").as_deref(),
            Some("video/x-raw,format=RGB")
        );
    }
}
