//! Detection types shared by the recognition client, the detection loop and presenters.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;

/// An identified employee as reported by the recognition service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Employee {
    pub emp_id: String,
    pub name: String,
    pub department: Option<String>,
}

/// Outcome of a single recognition call. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognitionResult {
    /// A face was matched and the service accepted it.
    Success { employee: Employee, message: String },
    /// A face was found but it matched no registered employee.
    NotFound(String),
    /// No face was found in the frame.
    NoFace(String),
    /// The service answered with a failure it did not explain in a way we
    /// classify (e.g. "Attendance already marked for today").
    Rejected(String),
    /// Transport, status or decoding failure.
    Error(String),
}

impl RecognitionResult {
    /// Short variant name, for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Success { .. } => "success",
            Self::NotFound(_) => "not_found",
            Self::NoFace(_) => "no_face",
            Self::Rejected(_) => "rejected",
            Self::Error(_) => "error",
        }
    }
}

/// The single active detection status shown to the operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "name", rename_all = "snake_case")]
pub enum DetectionStatus {
    Scanning,
    Processing,
    Recognized(String),
    AlreadyMarked(String),
    NoFaceDetected,
    NotRecognized,
    ErrorState,
}

impl fmt::Display for DetectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scanning => write!(f, "Scanning for faces..."),
            Self::Processing => write!(f, "Processing..."),
            Self::Recognized(name) => write!(f, "Welcome, {name}!"),
            Self::AlreadyMarked(name) => write!(f, "{name}: attendance already marked"),
            Self::NoFaceDetected => write!(f, "No face detected"),
            Self::NotRecognized => write!(f, "Face not recognized"),
            Self::ErrorState => write!(f, "Error"),
        }
    }
}

/// Severity of an operator-facing message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageLevel {
    Info,
    Success,
    Error,
}

/// An accepted attendance mark for one tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Confirmation {
    pub employee: Employee,
    pub timestamp: DateTime<Local>,
}
