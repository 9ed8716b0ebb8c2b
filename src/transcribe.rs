//! Audio transcription collaborator.
//!
//! The pipeline depends on the [`AudioTranscriber`] trait only. The default
//! implementation posts the audio file to a whisper-server style
//! `/inference` endpoint and maps its verbose JSON response into a
//! [`Transcript`]. Running whisper out of process keeps the model's memory
//! footprint off this process and lets deployments share one server.

use crate::output::{Transcript, TranscriptSegment};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

/// Errors from the transcription collaborator.
#[derive(Debug, Error)]
pub enum TranscribeError {
    /// The transcription endpoint could not be reached.
    #[error("transcriber unreachable at {endpoint}: {detail}")]
    Unavailable { endpoint: String, detail: String },

    /// The endpoint answered with a non-success status.
    #[error("transcriber returned {status}: {body}")]
    Api { status: u16, body: String },

    /// The response body could not be decoded.
    #[error("malformed transcriber response: {0}")]
    InvalidResponse(String),

    /// The audio file could not be read.
    #[error("failed to read audio file '{path}': {detail}")]
    Io { path: String, detail: String },
}

impl TranscribeError {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, TranscribeError::Unavailable { .. })
    }
}

/// Transcribes one audio file into text plus timed segments.
#[async_trait]
pub trait AudioTranscriber: Send + Sync {
    async fn transcribe(&self, audio: &Path) -> Result<Transcript, TranscribeError>;
}

#[derive(Debug, Deserialize)]
struct InferenceSegment {
    start: f64,
    end: f64,
    text: String,
}

#[derive(Debug, Deserialize)]
struct InferenceResponse {
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    duration: Option<f64>,
    text: String,
    #[serde(default)]
    segments: Vec<InferenceSegment>,
}

/// Default transcriber: whisper-server HTTP endpoint.
pub struct WhisperServerTranscriber {
    http: reqwest::Client,
    base_url: String,
}

impl WhisperServerTranscriber {
    pub fn new(base_url: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .user_agent(concat!("extract2json/", env!("CARGO_PKG_VERSION")))
            .build()
            .expect("Failed to construct reqwest::Client for transcriber");
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/inference", self.base_url)
    }
}

#[async_trait]
impl AudioTranscriber for WhisperServerTranscriber {
    async fn transcribe(&self, audio: &Path) -> Result<Transcript, TranscribeError> {
        info!("Transcribing audio: {}", audio.display());

        let bytes = tokio::fs::read(audio)
            .await
            .map_err(|e| TranscribeError::Io {
                path: audio.display().to_string(),
                detail: e.to_string(),
            })?;

        let file_name = audio
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "audio".to_string());

        let form = reqwest::multipart::Form::new()
            .part(
                "file",
                reqwest::multipart::Part::bytes(bytes).file_name(file_name),
            )
            .text("response_format", "verbose_json");

        let endpoint = self.endpoint();
        let response = self
            .http
            .post(&endpoint)
            .multipart(form)
            .send()
            .await
            .map_err(|error| TranscribeError::Unavailable {
                endpoint: endpoint.clone(),
                detail: error.to_string(),
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(TranscribeError::Api { status, body });
        }

        let body: InferenceResponse = response
            .json()
            .await
            .map_err(|error| TranscribeError::InvalidResponse(error.to_string()))?;

        debug!(
            language = body.language.as_deref().unwrap_or("unknown"),
            segments = body.segments.len(),
            "transcription complete"
        );

        Ok(Transcript {
            language: body.language,
            duration_secs: body.duration,
            text: body.text.trim().to_string(),
            segments: body
                .segments
                .into_iter()
                .map(|s| TranscriptSegment {
                    start: s.start,
                    end: s.end,
                    text: s.text.trim().to_string(),
                })
                .collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::POST, MockServer};

    #[tokio::test]
    async fn transcribes_verbose_json_response() {
        let server = MockServer::start_async().await;
        let transcriber = WhisperServerTranscriber::new(server.base_url());

        let dir = tempfile::tempdir().expect("tempdir");
        let audio = dir.path().join("clip.wav");
        std::fs::write(&audio, b"RIFFfakewav").unwrap();

        server
            .mock_async(|when, then| {
                when.method(POST).path("/inference");
                then.status(200).json_body(serde_json::json!({
                    "language": "en",
                    "duration": 4.2,
                    "text": " hello world ",
                    "segments": [
                        {"start": 0.0, "end": 2.1, "text": " hello "},
                        {"start": 2.1, "end": 4.2, "text": " world "}
                    ]
                }));
            })
            .await;

        let transcript = transcriber.transcribe(&audio).await.expect("transcript");
        assert_eq!(transcript.text, "hello world");
        assert_eq!(transcript.language.as_deref(), Some("en"));
        assert_eq!(transcript.segments.len(), 2);
        assert_eq!(transcript.segments[1].text, "world");
    }

    #[tokio::test]
    async fn unreachable_server_maps_to_unavailable() {
        let transcriber = WhisperServerTranscriber::new("http://127.0.0.1:1");
        let dir = tempfile::tempdir().expect("tempdir");
        let audio = dir.path().join("clip.mp3");
        std::fs::write(&audio, b"ID3fake").unwrap();

        let err = transcriber.transcribe(&audio).await.expect_err("must fail");
        assert!(err.is_unavailable(), "got: {err}");
    }

    #[tokio::test]
    async fn missing_file_is_io_error() {
        let transcriber = WhisperServerTranscriber::new("http://127.0.0.1:1");
        let err = transcriber
            .transcribe(Path::new("/no/such/clip.wav"))
            .await
            .expect_err("must fail");
        assert!(matches!(err, TranscribeError::Io { .. }));
    }
}
