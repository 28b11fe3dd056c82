// Raw surface to BMP
//
// BMP has no GStreamer encoder, so those frames leave the pipeline raw
// through an appsink and are written here with the image crate. Each frame
// travels to the bus thread inside a message; the streaming thread waits
// for that frame to be acknowledged before it hands over the next one, so
// at most one raw frame is queued at a time.

use std::path::Path;

use crossbeam_channel::{bounded, Receiver, Sender};
use gstreamer as gst;
use gstreamer_video as gst_video;

use super::{ConvertError, Result};

/// Bus thread end of the raw frame handoff
pub struct FrameAck {
    tx: Option<Sender<()>>,
}

/// Streaming thread end of the raw frame handoff
pub struct FrameWait {
    rx: Receiver<()>,
}

pub fn frame_handoff() -> (FrameAck, FrameWait) {
    let (tx, rx) = bounded(1);
    (FrameAck { tx: Some(tx) }, FrameWait { rx })
}

impl FrameAck {
    /// Let the streaming thread deliver its next frame
    pub fn release(&self) {
        if let Some(tx) = &self.tx {
            // A full slot already holds a release
            let _ = tx.try_send(());
        }
    }

    /// Wake a waiting streaming thread for good
    pub fn close(&mut self) {
        self.tx = None;
    }
}

impl FrameWait {
    /// Block until the last frame was handled; false once the bus side closed
    pub fn wait(&self) -> bool {
        self.rx.recv().is_ok()
    }
}

/// Copy packed RGB rows out of a buffer whose rows may be padded
///
/// Returns None when `data` is too short for the given geometry.
pub fn contiguous_rgb(width: u32, height: u32, stride: usize, data: &[u8]) -> Option<Vec<u8>> {
    let row = width as usize * 3;
    let height = height as usize;
    if stride < row {
        return None;
    }
    if height == 0 {
        return Some(Vec::new());
    }
    if data.len() < stride * (height - 1) + row {
        return None;
    }
    if stride == row {
        return Some(data[..row * height].to_vec());
    }

    let mut out = Vec::with_capacity(row * height);
    for y in 0..height {
        let offset = y * stride;
        out.extend_from_slice(&data[offset..offset + row]);
    }
    Some(out)
}

/// Write one RGB sample as a BMP file
pub fn save_bmp(sample: &gst::Sample, path: &Path) -> Result<()> {
    let fail = |reason: String| ConvertError::Surface {
        path: path.to_path_buf(),
        reason,
    };

    let caps = sample.caps().ok_or_else(|| fail("sample has no caps".into()))?;
    let info = gst_video::VideoInfo::from_caps(caps).map_err(|e| fail(e.to_string()))?;
    let buffer = sample
        .buffer()
        .ok_or_else(|| fail("sample has no buffer".into()))?;
    let map = buffer.map_readable().map_err(|e| fail(e.to_string()))?;

    let stride = info.stride()[0].max(0) as usize;
    let pixels = contiguous_rgb(info.width(), info.height(), stride, map.as_slice())
        .ok_or_else(|| fail("frame buffer is smaller than its caps say".into()))?;
    let image = image::RgbImage::from_raw(info.width(), info.height(), pixels)
        .ok_or_else(|| fail("frame does not fit an RGB image".into()))?;

    image
        .save_with_format(path, image::ImageFormat::Bmp)
        .map_err(|e| fail(e.to_string()))
}
