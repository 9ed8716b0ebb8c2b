//! Model-serving backend: vision and text generation over HTTP.
//!
//! The pipeline treats the backend as an opaque request/response service
//! behind the [`ModelBackend`] trait, so tests can inject an in-process
//! fake and the orchestrator never knows which runtime answers. The
//! default implementation speaks the Ollama `/api/generate` protocol:
//! `{model, prompt, images?, stream: false}` → `{response, done}`.
//!
//! A semaphore inside [`OllamaBackend`] bounds how many generate calls are
//! in flight at once. Unit-level concurrency alone would allow
//! `4 × concurrency` simultaneous vision requests against a single local
//! model server; the semaphore is the actual worker-pool ceiling.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

/// Errors surfaced by backend calls.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The backend endpoint could not be reached.
    #[error("backend unreachable at {endpoint}: {detail}")]
    Unavailable { endpoint: String, detail: String },

    /// The backend answered with a non-success status.
    #[error("backend returned {status}: {body}")]
    Api { status: u16, body: String },

    /// A call exceeded its per-call budget.
    #[error("backend call timed out after {secs}s")]
    Timeout { secs: u64 },

    /// The backend answered, but the body could not be decoded.
    #[error("malformed backend response: {0}")]
    InvalidResponse(String),
}

impl BackendError {
    /// Connectivity failures are what single-unit formats escalate to a
    /// fatal `BackendUnavailable`.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, BackendError::Unavailable { .. })
    }
}

/// Interface to the model-serving backend.
///
/// Both operations return the generated text verbatim; all prompt
/// engineering lives in [`crate::prompts`].
#[async_trait]
pub trait ModelBackend: Send + Sync {
    /// One vision-capable generation call: model + prompt + base64 image.
    async fn generate_vision(
        &self,
        model: &str,
        prompt: &str,
        image_base64: &str,
    ) -> Result<String, BackendError>;

    /// One text generation call: model + prompt.
    async fn generate_text(&self, model: &str, prompt: &str) -> Result<String, BackendError>;

    /// Cheap connectivity probe. Used to skip consolidation with a warning
    /// instead of issuing a doomed generate call.
    async fn is_reachable(&self) -> bool;
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
    done: bool,
}

/// Ollama-style backend client with a bounded in-flight call budget.
pub struct OllamaBackend {
    http: Client,
    base_url: String,
    permits: Arc<Semaphore>,
}

impl OllamaBackend {
    /// Create a client for `base_url`, allowing at most `max_in_flight`
    /// concurrent generate calls.
    pub fn new(base_url: impl Into<String>, max_in_flight: usize) -> Self {
        let http = Client::builder()
            .user_agent(concat!("extract2json/", env!("CARGO_PKG_VERSION")))
            .build()
            .expect("Failed to construct reqwest::Client for backend");
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            permits: Arc::new(Semaphore::new(max_in_flight.max(1))),
        }
    }

    fn generate_endpoint(&self) -> String {
        format!("{}/api/generate", self.base_url)
    }

    /// The configured base URL (used in fatal error messages).
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn generate(&self, payload: serde_json::Value) -> Result<String, BackendError> {
        // Closed only if the semaphore is dropped, which cannot happen
        // while `self` is alive.
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| BackendError::InvalidResponse(e.to_string()))?;

        let endpoint = self.generate_endpoint();
        let response = self
            .http
            .post(&endpoint)
            .json(&payload)
            .send()
            .await
            .map_err(|error| BackendError::Unavailable {
                endpoint: endpoint.clone(),
                detail: error.to_string(),
            })?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(BackendError::Unavailable {
                endpoint,
                detail: "endpoint returned 404 (is the model server running?)".into(),
            });
        }

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Api { status, body });
        }

        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|error| BackendError::InvalidResponse(error.to_string()))?;

        if !body.done {
            return Err(BackendError::InvalidResponse(
                "response incomplete (streaming not supported)".into(),
            ));
        }

        Ok(body.response.trim().to_string())
    }
}

#[async_trait]
impl ModelBackend for OllamaBackend {
    async fn generate_vision(
        &self,
        model: &str,
        prompt: &str,
        image_base64: &str,
    ) -> Result<String, BackendError> {
        debug!(model, prompt_len = prompt.len(), "vision generate");
        self.generate(json!({
            "model": model,
            "prompt": prompt,
            "images": [image_base64],
            "stream": false,
        }))
        .await
    }

    async fn generate_text(&self, model: &str, prompt: &str) -> Result<String, BackendError> {
        debug!(model, prompt_len = prompt.len(), "text generate");
        self.generate(json!({
            "model": model,
            "prompt": prompt,
            "stream": false,
        }))
        .await
    }

    async fn is_reachable(&self) -> bool {
        let endpoint = format!("{}/api/tags", self.base_url);
        match self.http.get(&endpoint).send().await {
            Ok(resp) if resp.status().is_success() => true,
            Ok(resp) => {
                warn!("Backend probe returned status {}", resp.status());
                false
            }
            Err(e) => {
                warn!("Backend probe failed: {e}");
                false
            }
        }
    }
}
