//! Recognition service wire types and response classification.
//!
//! The service only guarantees a `success` flag and a free-text `message`.
//! All matching on message wording lives in [`ResponseIntent::of_failure`].

use crate::types::{Employee, RecognitionResult};
use serde::{Deserialize, Serialize};

const NO_FACE_MARKER: &str = "no face detected";
const NOT_RECOGNIZED_MARKER: &str = "not recognized";

/// Request body: `{ "image": "data:image/jpeg;base64,..." }`.
#[derive(Debug, Clone, Serialize)]
pub struct RecognizeRequest<'a> {
    pub image: &'a str,
}

/// Employee object as sent by the service.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceEmployee {
    pub emp_id: String,
    pub name: String,
    #[serde(default)]
    pub department: Option<String>,
}

impl From<ServiceEmployee> for Employee {
    fn from(e: ServiceEmployee) -> Self {
        Self {
            emp_id: e.emp_id,
            name: e.name,
            department: e.department.filter(|d| !d.trim().is_empty()),
        }
    }
}

/// Response body: `{ success, message, employee? }`.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceResponse {
    pub success: bool,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub employee: Option<ServiceEmployee>,
}

/// What the service meant by a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseIntent {
    Accepted,
    NoFace,
    NotRecognized,
    Unclassified,
}

impl ResponseIntent {
    /// Classify a failure message by its stable substrings, case-insensitively.
    pub fn of_failure(message: &str) -> Self {
        let lower = message.to_lowercase();
        if lower.contains(NO_FACE_MARKER) {
            Self::NoFace
        } else if lower.contains(NOT_RECOGNIZED_MARKER) {
            Self::NotRecognized
        } else {
            Self::Unclassified
        }
    }

    pub fn of(response: &ServiceResponse) -> Self {
        if response.success {
            Self::Accepted
        } else {
            Self::of_failure(&response.message)
        }
    }
}

impl From<ServiceResponse> for RecognitionResult {
    fn from(response: ServiceResponse) -> Self {
        match ResponseIntent::of(&response) {
            ResponseIntent::Accepted => match response.employee {
                Some(employee) => RecognitionResult::Success {
                    employee: employee.into(),
                    message: response.message,
                },
                None => RecognitionResult::Error(
                    "service reported success without an employee".to_string(),
                ),
            },
            ResponseIntent::NoFace => RecognitionResult::NoFace(response.message),
            ResponseIntent::NotRecognized => RecognitionResult::NotFound(response.message),
            ResponseIntent::Unclassified => RecognitionResult::Rejected(response.message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> RecognitionResult {
        serde_json::from_str::<ServiceResponse>(json).unwrap().into()
    }

    #[test]
    fn test_success_with_employee() {
        let result = parse(
            r#"{"success":true,"message":"Welcome","employee":{"emp_id":"E1","name":"Alice"}}"#,
        );
        assert_eq!(
            result,
            RecognitionResult::Success {
                employee: Employee {
                    emp_id: "E1".into(),
                    name: "Alice".into(),
                    department: None,
                },
                message: "Welcome".into(),
            }
        );
    }

    #[test]
    fn test_empty_department_is_absent() {
        let result = parse(
            r#"{"success":true,"message":"ok","employee":{"emp_id":"E2","name":"Bob","department":"  "}}"#,
        );
        let RecognitionResult::Success { employee, .. } = result else {
            panic!("expected success");
        };
        assert_eq!(employee.department, None);
    }

    #[test]
    fn test_success_without_employee_is_error() {
        let result = parse(r#"{"success":true,"message":"ok"}"#);
        assert!(matches!(result, RecognitionResult::Error(_)));
    }

    #[test]
    fn test_no_face_messages() {
        for msg in ["No face detected", "No face detected in image", "no face detected."] {
            let json = format!(r#"{{"success":false,"message":"{msg}"}}"#);
            assert_eq!(parse(&json), RecognitionResult::NoFace(msg.into()), "{msg}");
        }
    }

    #[test]
    fn test_not_recognized_message() {
        let result = parse(r#"{"success":false,"message":"Face not recognized"}"#);
        assert_eq!(result, RecognitionResult::NotFound("Face not recognized".into()));
    }

    #[test]
    fn test_unknown_failures_are_rejected() {
        for msg in [
            "Attendance already marked for today",
            "No registered employees found",
            "Error recognizing face: bad input",
        ] {
            assert_eq!(ResponseIntent::of_failure(msg), ResponseIntent::Unclassified, "{msg}");
        }
    }

    #[test]
    fn test_missing_message_defaults_empty() {
        let result = parse(r#"{"success":false}"#);
        assert_eq!(result, RecognitionResult::Rejected(String::new()));
    }

    #[test]
    fn test_request_serializes_image_field() {
        let body = serde_json::to_value(RecognizeRequest { image: "data:x" }).unwrap();
        assert_eq!(body, serde_json::json!({ "image": "data:x" }));
    }
}
