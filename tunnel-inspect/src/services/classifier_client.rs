//! Defect classifier client
//!
//! `DefectClassifier` is the seam the analysis coordinator calls through.
//! `HttpDefectClassifier` posts the image as multipart form data and
//! accepts either the bare result object or the
//! `{success, analysis, error, timestamp}` envelope.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::config::ClassifierSettings;

const USER_AGENT: &str = concat!("tunnel-inspect/", env!("CARGO_PKG_VERSION"));

/// Classifier call failures
#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("Classifier request timed out")]
    Timeout,

    #[error("Classifier unavailable: {0}")]
    Unavailable(String),

    #[error("Malformed classifier response: {0}")]
    MalformedResponse(String),
}

/// One image to classify
#[derive(Debug, Clone)]
pub struct ClassificationRequest {
    pub image: Vec<u8>,
    pub mime_type: String,
    /// Section name or id, passed through as context
    pub section: Option<String>,
}

/// Classifier output before mapping onto the domain taxonomy
///
/// `defect_type` and `severity` stay free-form here; confidence may be out
/// of range. The coordinator decides how to treat each.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawClassification {
    pub defect_type: String,
    pub severity: String,
    pub confidence: f64,
    #[serde(default)]
    pub crack_density: Option<f64>,
    #[serde(default)]
    pub avg_crack_length: Option<f64>,
    #[serde(default)]
    pub max_crack_width: Option<f64>,
    #[serde(default)]
    pub predicted_days_to_fix: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ResponseEnvelope {
    success: bool,
    #[serde(default)]
    analysis: Option<RawClassification>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ClassifierResponse {
    Envelope(ResponseEnvelope),
    Bare(RawClassification),
}

/// Injected classification capability
#[async_trait]
pub trait DefectClassifier: Send + Sync {
    async fn classify(
        &self,
        request: ClassificationRequest,
    ) -> Result<RawClassification, ClassifierError>;
}

/// HTTP classifier client
pub struct HttpDefectClassifier {
    http_client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpDefectClassifier {
    pub fn new(settings: &ClassifierSettings) -> Result<Self, ClassifierError> {
        // Slightly longer than the coordinator's bound so the coordinator's
        // timeout is the one callers observe
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(settings.timeout + Duration::from_secs(1))
            .build()
            .map_err(|e| ClassifierError::Unavailable(e.to_string()))?;

        Ok(Self {
            http_client,
            endpoint: settings.endpoint.clone(),
            api_key: settings.api_key.clone(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl DefectClassifier for HttpDefectClassifier {
    async fn classify(
        &self,
        request: ClassificationRequest,
    ) -> Result<RawClassification, ClassifierError> {
        let image_len = request.image.len();
        let part = reqwest::multipart::Part::bytes(request.image)
            .file_name("image")
            .mime_str(&request.mime_type)
            .map_err(|e| ClassifierError::Unavailable(format!("Invalid mime type: {}", e)))?;

        let mut form = reqwest::multipart::Form::new().part("image", part);
        if let Some(section) = request.section {
            form = form.text("section", section);
        }

        let mut builder = self.http_client.post(&self.endpoint).multipart(form);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        tracing::debug!(endpoint = %self.endpoint, image_bytes = image_len, "Posting image to classifier");

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                ClassifierError::Timeout
            } else {
                ClassifierError::Unavailable(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(ClassifierError::Unavailable(format!(
                "HTTP {}: {}",
                status.as_u16(),
                error_text.trim()
            )));
        }

        let body = response.bytes().await.map_err(|e| {
            if e.is_timeout() {
                ClassifierError::Timeout
            } else {
                ClassifierError::Unavailable(e.to_string())
            }
        })?;

        parse_response(&body)
    }
}

/// Decode a classifier response body (bare result or envelope)
pub fn parse_response(body: &[u8]) -> Result<RawClassification, ClassifierError> {
    let parsed: ClassifierResponse = serde_json::from_slice(body)
        .map_err(|e| ClassifierError::MalformedResponse(e.to_string()))?;

    match parsed {
        ClassifierResponse::Bare(result) => Ok(result),
        ClassifierResponse::Envelope(envelope) => match (envelope.success, envelope.analysis) {
            (true, Some(result)) => Ok(result),
            (true, None) => Err(ClassifierError::Unavailable(
                "Classifier reported success without an analysis".to_string(),
            )),
            (false, _) => Err(ClassifierError::Unavailable(
                envelope
                    .error
                    .unwrap_or_else(|| "Classifier reported failure".to_string()),
            )),
        },
    }
}
