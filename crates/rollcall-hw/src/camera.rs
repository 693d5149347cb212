//! Camera resource interface and its V4L2 implementation via the `v4l` crate.
//!
//! A [`CameraProvider`] hands out a single [`VideoSource`] per acquisition.
//! The detection loop is the only caller of `acquire`/`release`.

use crate::frame::{self, Frame};
use std::path::Path;
use thiserror::Error;
use v4l::buffer::Type as BufType;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::FourCC;

#[derive(Error, Debug)]
pub enum CameraError {
    #[error("device not found: {0}")]
    DeviceNotFound(String),
    #[error("capture failed: {0}")]
    CaptureFailed(String),
    #[error("device busy")]
    DeviceBusy,
    #[error("format negotiation failed: {0}")]
    FormatNegotiationFailed(String),
    #[error("streaming not supported")]
    StreamingNotSupported,
}

/// A live video source attached to the camera.
pub trait VideoSource: Send {
    /// Current frame size. `(0, 0)` while the source cannot yet produce a
    /// decodable frame.
    fn dimensions(&self) -> (u32, u32);

    /// Read the current frame as 8-bit grayscale.
    fn read_frame(&mut self) -> Result<Frame, CameraError>;

    /// Short human-readable identifier, used in logs.
    fn describe(&self) -> String {
        "video source".to_string()
    }
}

/// Acquires and releases the shared camera resource.
pub trait CameraProvider: Send + Sync {
    /// Open the camera. Permission and device errors are returned as-is.
    fn acquire(&self) -> Result<Box<dyn VideoSource>, CameraError>;

    /// Release a source obtained from [`acquire`](Self::acquire).
    fn release(&self, source: Box<dyn VideoSource>) {
        tracing::debug!(source = %source.describe(), "releasing video source");
        drop(source);
    }
}

/// Info about a discovered V4L2 device.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub path: String,
    pub name: String,
    pub driver: String,
    pub bus: String,
}

/// Negotiated pixel format for the camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// YUYV 4:2:2 packed (2 bytes/pixel, extract Y channel).
    Yuyv,
    /// 8-bit grayscale.
    Grey,
    /// 16-bit little-endian grayscale.
    Y16,
}

/// Opens a V4L2 device on demand and negotiates the requested frame size.
#[derive(Debug, Clone)]
pub struct V4lCamera {
    pub device_path: String,
    pub width: u32,
    pub height: u32,
    /// Frames discarded right after opening, while exposure settles.
    pub warmup_frames: usize,
}

impl V4lCamera {
    pub fn new(device_path: impl Into<String>, width: u32, height: u32, warmup_frames: usize) -> Self {
        Self {
            device_path: device_path.into(),
            width,
            height,
            warmup_frames,
        }
    }

    /// Open the device and negotiate a format without discarding warmup frames.
    pub fn open(&self) -> Result<V4lSource, CameraError> {
        let device_path = self.device_path.as_str();
        if !Path::new(device_path).exists() {
            return Err(CameraError::DeviceNotFound(device_path.to_string()));
        }

        let device = Device::with_path(device_path).map_err(|e| {
            if e.to_string().contains("busy") || e.to_string().contains("EBUSY") {
                CameraError::DeviceBusy
            } else {
                CameraError::DeviceNotFound(format!("{device_path}: {e}"))
            }
        })?;

        let caps = device.query_caps().map_err(|e| {
            CameraError::CaptureFailed(format!("failed to query capabilities: {e}"))
        })?;

        tracing::info!(
            device = device_path,
            driver = %caps.driver,
            card = %caps.card,
            "opened camera"
        );

        if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
            return Err(CameraError::StreamingNotSupported);
        }

        let mut fmt = device.format().map_err(|e| {
            CameraError::FormatNegotiationFailed(format!("failed to get format: {e}"))
        })?;

        fmt.fourcc = FourCC::new(b"YUYV");
        fmt.width = self.width;
        fmt.height = self.height;

        let negotiated = device.set_format(&fmt).map_err(|e| {
            CameraError::FormatNegotiationFailed(format!("failed to set format: {e}"))
        })?;

        let fourcc = negotiated.fourcc;
        let pixel_format = if fourcc == FourCC::new(b"GREY") {
            PixelFormat::Grey
        } else if fourcc == FourCC::new(b"YUYV") {
            PixelFormat::Yuyv
        } else if fourcc == FourCC::new(b"Y16 ") || fourcc == FourCC::new(b"Y16\0") {
            PixelFormat::Y16
        } else {
            return Err(CameraError::FormatNegotiationFailed(format!(
                "unsupported pixel format: {fourcc:?} (need YUYV, GREY, or Y16)"
            )));
        };

        tracing::info!(
            width = negotiated.width,
            height = negotiated.height,
            fourcc = ?fourcc,
            "negotiated format"
        );

        Ok(V4lSource {
            device,
            width: negotiated.width,
            height: negotiated.height,
            device_path: device_path.to_string(),
            pixel_format,
        })
    }

    /// List available V4L2 video capture devices.
    pub fn list_devices() -> Vec<DeviceInfo> {
        let mut devices = Vec::new();

        for i in 0..16 {
            let path = format!("/dev/video{i}");
            if !Path::new(&path).exists() {
                continue;
            }
            let Ok(dev) = Device::with_path(&path) else {
                continue;
            };
            let Ok(caps) = dev.query_caps() else {
                continue;
            };
            if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
                continue;
            }
            devices.push(DeviceInfo {
                path,
                name: caps.card.clone(),
                driver: caps.driver.clone(),
                bus: caps.bus.clone(),
            });
        }

        devices
    }
}

impl CameraProvider for V4lCamera {
    fn acquire(&self) -> Result<Box<dyn VideoSource>, CameraError> {
        let mut source = self.open()?;

        // Discard warmup frames for AGC/AE stabilization
        if self.warmup_frames > 0 {
            tracing::info!(count = self.warmup_frames, "discarding warmup frames");
            for _ in 0..self.warmup_frames {
                if let Err(e) = source.read_frame() {
                    tracing::debug!(error = %e, "warmup frame failed");
                }
            }
        }

        Ok(Box::new(source))
    }
}

/// An opened V4L2 capture device.
pub struct V4lSource {
    device: Device,
    width: u32,
    height: u32,
    device_path: String,
    pixel_format: PixelFormat,
}

impl V4lSource {
    /// Negotiated pixel format.
    pub fn pixel_format(&self) -> PixelFormat {
        self.pixel_format
    }

    /// Convert a raw buffer to grayscale based on the negotiated format.
    fn buf_to_grayscale(&self, buf: &[u8]) -> Result<Vec<u8>, CameraError> {
        let converted = match self.pixel_format {
            PixelFormat::Grey => frame::grey_to_grayscale(buf, self.width, self.height),
            PixelFormat::Y16 => frame::y16_to_grayscale(buf, self.width, self.height),
            PixelFormat::Yuyv => frame::yuyv_to_grayscale(buf, self.width, self.height),
        };
        converted.map_err(|e| {
            CameraError::CaptureFailed(format!("{:?} conversion failed: {e}", self.pixel_format))
        })
    }
}

impl VideoSource for V4lSource {
    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn read_frame(&mut self) -> Result<Frame, CameraError> {
        let mut stream =
            MmapStream::with_buffers(&self.device, BufType::VideoCapture, 4).map_err(|e| {
                CameraError::CaptureFailed(format!("failed to create mmap stream: {e}"))
            })?;

        let (buf, meta) = stream
            .next()
            .map_err(|e| CameraError::CaptureFailed(format!("failed to dequeue buffer: {e}")))?;

        let gray = self.buf_to_grayscale(buf)?;

        Ok(Frame {
            data: gray,
            width: self.width,
            height: self.height,
            timestamp: std::time::Instant::now(),
            sequence: meta.sequence,
        })
    }

    fn describe(&self) -> String {
        self.device_path.clone()
    }
}
