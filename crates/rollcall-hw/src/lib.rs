//! rollcall-hw — Camera acquisition and still-frame sampling.
//!
//! Provides the camera resource interface used by the detection loop, a
//! V4L2 implementation, and the JPEG frame sampler.

pub mod camera;
pub mod frame;
pub mod sampler;

pub use camera::{CameraError, CameraProvider, DeviceInfo, PixelFormat, V4lCamera, VideoSource};
pub use frame::Frame;
pub use sampler::{EncodedFrame, FrameSampler, SampleError};
