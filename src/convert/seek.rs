// Seek policy for time-window extraction
//
// The window is checked against the discovered metadata before anything is
// built. A window that runs past the end of the video is the one case the
// user gets to decide: truncate to the end, or abort.

use gstreamer as gst;
use gstreamer::prelude::*;

use super::request::{ConversionRequest, ExtractionMode};
use super::{ConvertError, Result};
use crate::discovery::VideoMetadata;
use crate::frontend::Chooser;

/// Absolute positions for the seek; no stop means "to the end"
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeekWindow {
    pub start: gst::ClockTime,
    pub stop: Option<gst::ClockTime>,
}

impl SeekWindow {
    /// Window for a time-window request, None for other modes
    pub fn for_mode(mode: ExtractionMode) -> Option<Self> {
        let ExtractionMode::TimeWindow {
            unit,
            start,
            duration,
        } = mode
        else {
            return None;
        };
        let start_time = unit.to_clock_time(start);
        let stop = (duration > 0).then(|| saturating_sum(start_time, unit.to_clock_time(duration)));
        Some(Self {
            start: start_time,
            stop,
        })
    }

    /// Length of the window, given the total duration when it is open ended
    pub fn length(&self, total: Option<gst::ClockTime>) -> Option<gst::ClockTime> {
        let end = match (self.stop, total) {
            (Some(stop), Some(total)) => stop.min(total),
            (Some(stop), None) => stop,
            (None, total) => total?,
        };
        Some(end.saturating_sub(self.start))
    }
}

fn saturating_sum(a: gst::ClockTime, b: gst::ClockTime) -> gst::ClockTime {
    let nanos = a
        .nseconds()
        .saturating_add(b.nseconds())
        .min(gst::ClockTime::MAX.nseconds());
    gst::ClockTime::from_nseconds(nanos)
}

/// How the window relates to the video's length
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowCheck {
    Fits,
    /// Stop lies beyond the end; `available` is what remains after start
    Overruns { available: gst::ClockTime },
}

/// Check a window against the discovered metadata
pub fn check_window(window: &SeekWindow, metadata: &VideoMetadata) -> Result<WindowCheck> {
    if !metadata.seekable {
        return Err(ConvertError::NotSeekable(metadata.path.clone()));
    }
    let duration = metadata.duration.ok_or(ConvertError::UnknownDuration)?;
    if window.start > duration {
        return Err(ConvertError::StartBeyondDuration {
            start: window.start,
            duration,
        });
    }
    match window.stop {
        Some(stop) if stop > duration => Ok(WindowCheck::Overruns {
            available: duration - window.start,
        }),
        _ => Ok(WindowCheck::Fits),
    }
}

/// Validate the request's window and settle an overrun with the user
///
/// Returns the request to run: unchanged, or truncated to the end of the
/// video when the user accepts. Requests without a window pass through.
pub fn resolve_window(
    request: ConversionRequest,
    metadata: &VideoMetadata,
    chooser: &dyn Chooser,
) -> Result<ConversionRequest> {
    let Some(window) = SeekWindow::for_mode(request.mode()) else {
        return Ok(request);
    };

    match check_window(&window, metadata)? {
        WindowCheck::Fits => Ok(request),
        WindowCheck::Overruns { available } => {
            log::warn!(
                "Requested period ends after the video, {} available from {}",
                available,
                window.start
            );
            let question = format!(
                "The requested period runs past the end of the video. Convert the remaining {} from {} instead?",
                available, window.start
            );
            if chooser.confirm(&question) {
                Ok(request.with_duration_to_end())
            } else {
                Err(ConvertError::WindowDeclined)
            }
        }
    }
}

/// Flushing accurate seek to the window
pub fn issue_seek(pipeline: &gst::Pipeline, window: &SeekWindow) -> Result<()> {
    let flags = gst::SeekFlags::FLUSH | gst::SeekFlags::ACCURATE;
    let result = match window.stop {
        Some(stop) => {
            log::info!("Seeking to [{}, {}]", window.start, stop);
            pipeline.seek(
                1.0,
                flags,
                gst::SeekType::Set,
                window.start,
                gst::SeekType::Set,
                stop,
            )
        }
        None => {
            log::info!("Seeking to {} until the end", window.start);
            pipeline.seek_simple(flags, window.start)
        }
    };
    result.map_err(|e| ConvertError::Seek(e.to_string()))
}
