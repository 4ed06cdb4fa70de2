// THEORY:
// The `frame` module is the bridge between whatever produces video (an IP camera
// snapshot endpoint, a directory of stills, a test fixture) and the detection
// endpoint, which only ever sees a compact JPEG.
//
// Capture parameters are fixed per session: frames are shrunk to fit the capture
// box (aspect ratio preserved, never enlarged) and encoded at a fixed quality.
// Small, lossy frames keep the one-second poll loop cheap on the wire.

use crate::error::CaptureError;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ExtendedColorType, ImageEncoder};

/// Anything that can hand the session its current video frame.
pub trait FrameSource: Send {
    /// The latest frame, or `None` when no frame is available right now.
    fn capture(&mut self) -> Option<DynamicImage>;
}

impl<F> FrameSource for F
where
    F: FnMut() -> Option<DynamicImage> + Send,
{
    fn capture(&mut self) -> Option<DynamicImage> {
        self()
    }
}

/// Always returns the same frame. Useful for kiosks pointed at a fixed snapshot
/// and for tests.
#[derive(Debug, Clone)]
pub struct StillFrame(pub DynamicImage);

impl FrameSource for StillFrame {
    fn capture(&mut self) -> Option<DynamicImage> {
        Some(self.0.clone())
    }
}

/// Cycles through a fixed list of frames.
#[derive(Debug, Clone, Default)]
pub struct FrameSequence {
    frames: Vec<DynamicImage>,
    cursor: usize,
}

impl FrameSequence {
    pub fn new(frames: Vec<DynamicImage>) -> Self {
        Self { frames, cursor: 0 }
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl FrameSource for FrameSequence {
    fn capture(&mut self) -> Option<DynamicImage> {
        if self.frames.is_empty() {
            return None;
        }
        let frame = self.frames[self.cursor % self.frames.len()].clone();
        self.cursor = (self.cursor + 1) % self.frames.len();
        Some(frame)
    }
}

/// Fixed capture parameters for one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureSettings {
    pub max_width: u32,
    pub max_height: u32,
    /// JPEG quality, 1-100.
    pub quality: u8,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            max_width: 640,
            max_height: 480,
            quality: 60,
        }
    }
}

/// Shrinks `frame` to fit the capture box and encodes it as JPEG.
pub fn encode_frame(
    frame: &DynamicImage,
    settings: &CaptureSettings,
) -> Result<Vec<u8>, CaptureError> {
    if frame.width() == 0 || frame.height() == 0 {
        return Err(CaptureError::NoFrame);
    }

    let fitted = if frame.width() > settings.max_width || frame.height() > settings.max_height {
        frame.resize(settings.max_width, settings.max_height, FilterType::Triangle)
    } else {
        frame.clone()
    };

    let rgb = fitted.to_rgb8();
    let mut encoded = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut encoded, settings.quality.clamp(1, 100));
    encoder.write_image(rgb.as_raw(), rgb.width(), rgb.height(), ExtendedColorType::Rgb8)?;
    Ok(encoded)
}

/// Captures one frame from `source` and encodes it.
pub fn capture_encoded(
    source: &mut dyn FrameSource,
    settings: &CaptureSettings,
) -> Result<Vec<u8>, CaptureError> {
    let frame = source.capture().ok_or(CaptureError::NoFrame)?;
    encode_frame(&frame, settings)
}
