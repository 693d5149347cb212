//! rollcall-core — Recognition client, cooldown registry and detection types.
//!
//! Everything here is independent of the camera and of how status is
//! presented; the detection loop in `rollcalld` wires these together.

pub mod cooldown;
pub mod intent;
pub mod recognizer;
pub mod types;

pub use cooldown::{CooldownRegistry, DEFAULT_COOLDOWN};
pub use intent::ResponseIntent;
pub use recognizer::{HttpRecognizer, Recognizer, RecognizerConfig, RecognizerError};
pub use types::{Confirmation, DetectionStatus, Employee, MessageLevel, RecognitionResult};
