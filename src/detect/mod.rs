//! Detector collaborator
//!
//! The image-to-boxes model is an external service. This module defines the
//! boundary the pipeline consumes and an HTTP client for a model-serving
//! endpoint that accepts raw image bytes and returns detections as JSON.

use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use tokio::runtime::Runtime;
use tracing::{debug, info};

use crate::pipeline::RawBox;

/// Failure of the upstream model call. Fatal to the scan request.
#[derive(Debug, thiserror::Error)]
pub enum DetectionError {
    #[error("detection service unavailable: {0}")]
    Unavailable(String),
    #[error("detection service returned a malformed response: {0}")]
    MalformedResponse(String),
}

/// Boundary consumed by the pipeline.
pub trait ObjectDetector: Send + Sync {
    fn detect(&self, image_bytes: &[u8]) -> Result<Vec<RawBox>, DetectionError>;
}

/// JSON payload returned by the detector service.
#[derive(Debug, Deserialize)]
struct DetectResponse {
    #[serde(default)]
    detections: Vec<RawBox>,
}

/// HTTP client for a model-serving endpoint.
pub struct HttpDetector {
    endpoint: String,
    client: reqwest::Client,
    runtime: Runtime,
    timeout: Duration,
}

impl HttpDetector {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        let endpoint = endpoint.into();
        info!("Using detector service at {}", endpoint);

        Ok(Self {
            endpoint,
            client: reqwest::Client::new(),
            runtime: Runtime::new().context("failed to create detector runtime")?,
            timeout,
        })
    }
}

impl ObjectDetector for HttpDetector {
    fn detect(&self, image_bytes: &[u8]) -> Result<Vec<RawBox>, DetectionError> {
        let body = image_bytes.to_vec();

        self.runtime.block_on(async {
            let response = self
                .client
                .post(&self.endpoint)
                .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
                .body(body)
                .timeout(self.timeout)
                .send()
                .await
                .map_err(|err| DetectionError::Unavailable(err.to_string()))?;

            let status = response.status();
            if !status.is_success() {
                return Err(DetectionError::Unavailable(format!(
                    "detector returned HTTP {status}"
                )));
            }

            let parsed: DetectResponse = response
                .json()
                .await
                .map_err(|err| DetectionError::MalformedResponse(err.to_string()))?;

            debug!("Detector returned {} raw boxes", parsed.detections.len());
            Ok(parsed.detections)
        })
    }
}
