//! Text-generation collaborator
//!
//! External completion service used for free-form component analysis and
//! the chat assistant. Calls carry a caller-enforced timeout; callers fall
//! back to deterministic canned text on any failure, so nothing in the
//! pipeline depends on this service being up.

use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::runtime::Runtime;
use tracing::{debug, info};

/// Failure of the text-generation call. Always recovered locally.
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("text generation unavailable: {0}")]
    Unavailable(String),
    #[error("text generation timed out after {0:?}")]
    TimedOut(Duration),
}

/// Boundary consumed by the annotator and the chat assistant.
pub trait TextGenerator: Send + Sync {
    fn complete(
        &self,
        prompt: &str,
        max_tokens: u32,
        timeout: Duration,
    ) -> Result<String, GenerationError>;
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    prompt: &'a str,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    text: String,
}

/// HTTP client for a completion endpoint.
pub struct HttpGenerator {
    endpoint: String,
    client: reqwest::Client,
    runtime: Runtime,
}

impl HttpGenerator {
    pub fn new(endpoint: impl Into<String>) -> Result<Self> {
        let endpoint = endpoint.into();
        info!("Using text-generation service at {}", endpoint);

        Ok(Self {
            endpoint,
            client: reqwest::Client::new(),
            runtime: Runtime::new().context("failed to create generation runtime")?,
        })
    }
}

impl TextGenerator for HttpGenerator {
    fn complete(
        &self,
        prompt: &str,
        max_tokens: u32,
        timeout: Duration,
    ) -> Result<String, GenerationError> {
        let request = CompletionRequest { prompt, max_tokens };

        self.runtime.block_on(async {
            let call = async {
                let response = self
                    .client
                    .post(&self.endpoint)
                    .json(&request)
                    .send()
                    .await
                    .map_err(|err| GenerationError::Unavailable(err.to_string()))?;

                let status = response.status();
                if !status.is_success() {
                    return Err(GenerationError::Unavailable(format!(
                        "generation service returned HTTP {status}"
                    )));
                }

                response
                    .json::<CompletionResponse>()
                    .await
                    .map(|completion| completion.text)
                    .map_err(|err| GenerationError::Unavailable(err.to_string()))
            };

            match tokio::time::timeout(timeout, call).await {
                Ok(result) => {
                    if result.is_ok() {
                        debug!("Generation call completed within {:?}", timeout);
                    }
                    result
                }
                Err(_) => Err(GenerationError::TimedOut(timeout)),
            }
        })
    }
}
