//! HTTP client for the face recognition service.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use thiserror::Error;
use tracing::{debug, warn};

use crate::intent::{RecognizeRequest, ServiceResponse};
use crate::types::RecognitionResult;

#[derive(Error, Debug)]
pub enum RecognizerError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("service returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("invalid response: {0}")]
    InvalidResponse(#[from] serde_json::Error),
}

/// Sends a frame to the recognition service and classifies the answer.
///
/// Implementations never fail: every failure becomes
/// [`RecognitionResult::Error`].
#[async_trait]
pub trait Recognizer: Send + Sync {
    /// `image` is a `data:image/jpeg;base64,...` payload.
    async fn recognize(&self, image: &str) -> RecognitionResult;
}

/// Configuration for [`HttpRecognizer`].
#[derive(Debug, Clone)]
pub struct RecognizerConfig {
    /// Base URL of the service, without a trailing slash.
    pub base_url: String,
    /// Path of the recognition endpoint.
    pub path: String,
    pub timeout: Duration,
}

impl Default for RecognizerConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:5000".to_string(),
            path: "/api/mark_attendance".to_string(),
            timeout: Duration::from_secs(10),
        }
    }
}

impl RecognizerConfig {
    pub fn endpoint(&self) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            self.path.trim_start_matches('/')
        )
    }
}

/// [`Recognizer`] backed by a `POST` to the recognition service.
pub struct HttpRecognizer {
    http: Client,
    endpoint: String,
}

impl HttpRecognizer {
    pub fn new(config: &RecognizerConfig) -> Result<Self, RecognizerError> {
        let http = Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            http,
            endpoint: config.endpoint(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Perform the request and decode the body.
    ///
    /// The service reports failures as 4xx/5xx with the same JSON body, so
    /// the body is decoded whatever the status. Only an undecodable body on a
    /// non-2xx status is reported as [`RecognizerError::Status`].
    pub async fn call(&self, image: &str) -> Result<ServiceResponse, RecognizerError> {
        debug!(endpoint = %self.endpoint, bytes = image.len(), "sending recognition request");

        let response = self
            .http
            .post(&self.endpoint)
            .json(&RecognizeRequest { image })
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        match serde_json::from_str::<ServiceResponse>(&body) {
            Ok(parsed) => Ok(parsed),
            Err(_) if !status.is_success() => Err(RecognizerError::Status {
                status: status.as_u16(),
                body: truncate(&body, 200),
            }),
            Err(e) => Err(RecognizerError::InvalidResponse(e)),
        }
    }
}

#[async_trait]
impl Recognizer for HttpRecognizer {
    async fn recognize(&self, image: &str) -> RecognitionResult {
        match self.call(image).await {
            Ok(response) => response.into(),
            Err(e) => {
                warn!(endpoint = %self.endpoint, error = %e, "recognition request failed");
                RecognitionResult::Error(e.to_string())
            }
        }
    }
}

fn truncate(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}
