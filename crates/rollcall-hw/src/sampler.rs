//! Still-frame sampling: read the current frame from a video source and
//! encode it as a fixed-quality JPEG for the recognition service.

use crate::camera::{CameraError, VideoSource};
use crate::frame::Frame;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use image::codecs::jpeg::JpegEncoder;
use image::ExtendedColorType;
use thiserror::Error;

/// JPEG quality used when none is configured.
pub const DEFAULT_JPEG_QUALITY: u8 = 80;

const DATA_URL_PREFIX: &str = "data:image/jpeg;base64,";

#[derive(Error, Debug)]
pub enum SampleError {
    /// The source has no decodable frame yet. Callers skip the tick.
    #[error("no frame available")]
    NoFrame,
    #[error("camera error: {0}")]
    Camera(#[from] CameraError),
    #[error("jpeg encoding failed: {0}")]
    Encode(#[from] image::ImageError),
}

/// A JPEG-compressed still, ready to be sent to the recognition service.
#[derive(Debug, Clone)]
pub struct EncodedFrame {
    pub jpeg: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub sequence: u32,
}

impl EncodedFrame {
    /// `data:image/jpeg;base64,...` payload.
    pub fn to_data_url(&self) -> String {
        let mut url = String::with_capacity(DATA_URL_PREFIX.len() + self.jpeg.len() * 4 / 3 + 4);
        url.push_str(DATA_URL_PREFIX);
        STANDARD.encode_string(&self.jpeg, &mut url);
        url
    }
}

/// Samples frames at a fixed JPEG quality.
#[derive(Debug, Clone, Copy)]
pub struct FrameSampler {
    quality: u8,
}

impl Default for FrameSampler {
    fn default() -> Self {
        Self::new(DEFAULT_JPEG_QUALITY)
    }
}

impl FrameSampler {
    /// `quality` is clamped to 1..=100.
    pub fn new(quality: u8) -> Self {
        Self {
            quality: quality.clamp(1, 100),
        }
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }

    /// Read the current frame from `source` and encode it.
    ///
    /// Returns [`SampleError::NoFrame`] while the source reports a zero
    /// width or height, which happens while a stream is still attaching.
    pub fn capture(&self, source: &mut dyn VideoSource) -> Result<EncodedFrame, SampleError> {
        let (width, height) = source.dimensions();
        if width == 0 || height == 0 {
            return Err(SampleError::NoFrame);
        }
        let frame = source.read_frame()?;
        self.encode(&frame)
    }

    /// Encode an already captured frame.
    pub fn encode(&self, frame: &Frame) -> Result<EncodedFrame, SampleError> {
        if !frame.is_decodable() {
            return Err(SampleError::NoFrame);
        }

        let pixels = frame.pixel_count();
        let mut jpeg = Vec::new();
        JpegEncoder::new_with_quality(&mut jpeg, self.quality).encode(
            &frame.data[..pixels],
            frame.width,
            frame.height,
            ExtendedColorType::L8,
        )?;

        tracing::trace!(
            width = frame.width,
            height = frame.height,
            bytes = jpeg.len(),
            quality = self.quality,
            "frame encoded"
        );

        Ok(EncodedFrame {
            jpeg,
            width: frame.width,
            height: frame.height,
            sequence: frame.sequence,
        })
    }
}
