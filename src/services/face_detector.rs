use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

use crate::models::FaceBox;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("face detector unavailable: {0}")]
    Unavailable(String),

    #[error("face detector timed out")]
    Timeout,

    #[error("face detector failed: {0}")]
    Failed(String),
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FaceDetector: Send + Sync {
    async fn detect(&self, image: &[u8]) -> Result<Vec<FaceBox>, DetectorError>;
}

/// Used when no detector is configured. Every call reports unavailability.
pub struct DisabledDetector;

#[async_trait]
impl FaceDetector for DisabledDetector {
    async fn detect(&self, _image: &[u8]) -> Result<Vec<FaceBox>, DetectorError> {
        Err(DetectorError::Unavailable("no face detector configured".to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct DetectResponse {
    faces: Vec<FaceBox>,
}

/// Face detection service reached over HTTP. The raw image is posted as the
/// request body and the service answers with `{"faces": [{x, y, width, height}]}`.
pub struct HttpFaceDetector {
    client: Client,
    detect_url: String,
}

impl HttpFaceDetector {
    pub fn new(detect_url: impl Into<String>, timeout: Duration) -> Result<Self, DetectorError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DetectorError::Unavailable(e.to_string()))?;

        Ok(Self {
            client,
            detect_url: detect_url.into(),
        })
    }
}

#[async_trait]
impl FaceDetector for HttpFaceDetector {
    async fn detect(&self, image: &[u8]) -> Result<Vec<FaceBox>, DetectorError> {
        let response = self
            .client
            .post(&self.detect_url)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(image.to_vec())
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    DetectorError::Timeout
                } else {
                    DetectorError::Unavailable(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            return Err(DetectorError::Unavailable(format!(
                "detector returned status {}",
                response.status()
            )));
        }

        let body: DetectResponse = response
            .json()
            .await
            .map_err(|e| DetectorError::Failed(format!("unreadable detector response: {}", e)))?;

        tracing::debug!(faces = body.faces.len(), "Face detection finished");
        Ok(body.faces)
    }
}
