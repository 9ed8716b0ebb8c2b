//! Configuration types for extraction runs.
//!
//! All pipeline behaviour is controlled through [`ExtractionConfig`], built
//! via its [`ExtractionConfigBuilder`]. The config is immutable once built
//! and is threaded explicitly from the entry point down into every component;
//! no component reads process-wide mutable state.
//!
//! # Design choice: builder over constructor
//! A fifteen-field constructor is unreadable and breaks on every new field.
//! The builder lets callers set only what they care about and rely on
//! well-documented defaults for the rest.

use crate::error::ExtractError;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Configuration for an extraction run.
///
/// Built via [`ExtractionConfig::builder()`] or using
/// [`ExtractionConfig::default()`].
///
/// # Example
/// ```rust
/// use extract2json::ExtractionConfig;
///
/// let config = ExtractionConfig::builder()
///     .backend_url("http://localhost:11434")
///     .vision_model("qwen3-vl:4b")
///     .concurrency(4)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ExtractionConfig {
    /// Base URL of the model-serving backend. Default: `http://localhost:11434`.
    pub backend_url: String,

    /// Vision-capable model used for per-unit extraction. Default: `qwen3-vl:4b`.
    pub vision_model: String,

    /// Text model used for the consolidation pass. Default: `llama3.2`.
    pub text_model: String,

    /// URL of the whisper-server style transcription endpoint.
    /// Default: `http://localhost:8080`.
    pub transcriber_url: String,

    /// Number of units extracted concurrently. Default: 4.
    ///
    /// Units are network-bound against a single local model server; a small
    /// bound keeps the server responsive instead of queueing dozens of
    /// vision requests at once.
    pub concurrency: usize,

    /// Maximum backend calls in flight across all units. Default: 4.
    ///
    /// Image-like units issue four capability calls each, so the unit bound
    /// alone would allow `4 × concurrency` simultaneous requests. This cap
    /// is enforced with a semaphore inside the backend client.
    pub max_backend_calls: usize,

    /// Per-backend-call timeout in seconds. Default: 60.
    ///
    /// A timed-out call is recorded as a failed unit and never retried;
    /// local models that blow the budget once will blow it again.
    pub api_timeout_secs: u64,

    /// Maximum retry attempts on a transient backend failure. Default: 2.
    ///
    /// Transport errors and 5xx responses are usually an overloaded local
    /// server; a short exponential backoff catches most of them. Timeouts
    /// are not retried.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds (doubles per attempt). Default: 500.
    pub retry_backoff_ms: u64,

    /// Run the consolidation pass for document inputs. Default: true.
    pub consolidate_documents: bool,

    /// Run the consolidation pass for single-image inputs. Default: false.
    pub consolidate_images: bool,

    /// Run the consolidation pass for image-directory inputs. Default: false.
    pub consolidate_directories: bool,

    /// Timeout for URL fetches in seconds. Default: 120.
    pub fetch_timeout_secs: u64,

    /// Optional progress callback, invoked per unit.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            backend_url: "http://localhost:11434".to_string(),
            vision_model: "qwen3-vl:4b".to_string(),
            text_model: "llama3.2".to_string(),
            transcriber_url: "http://localhost:8080".to_string(),
            concurrency: 4,
            max_backend_calls: 4,
            api_timeout_secs: 60,
            max_retries: 2,
            retry_backoff_ms: 500,
            consolidate_documents: true,
            consolidate_images: false,
            consolidate_directories: false,
            fetch_timeout_secs: 120,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ExtractionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfig")
            .field("backend_url", &self.backend_url)
            .field("vision_model", &self.vision_model)
            .field("text_model", &self.text_model)
            .field("transcriber_url", &self.transcriber_url)
            .field("concurrency", &self.concurrency)
            .field("max_backend_calls", &self.max_backend_calls)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("max_retries", &self.max_retries)
            .field("consolidate_documents", &self.consolidate_documents)
            .field("consolidate_images", &self.consolidate_images)
            .field("consolidate_directories", &self.consolidate_directories)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn callback>"),
            )
            .finish()
    }
}

impl ExtractionConfig {
    /// Create a new builder for `ExtractionConfig`.
    pub fn builder() -> ExtractionConfigBuilder {
        ExtractionConfigBuilder {
            config: Self::default(),
        }
    }

    /// Whether the consolidation pass runs for the given input kind.
    pub fn consolidates(&self, kind: InputKind) -> bool {
        match kind {
            InputKind::Document => self.consolidate_documents,
            InputKind::Image => self.consolidate_images,
            InputKind::ImageDirectory => self.consolidate_directories,
            InputKind::Audio | InputKind::Url => false,
        }
    }
}

/// Builder for [`ExtractionConfig`].
#[derive(Debug)]
pub struct ExtractionConfigBuilder {
    config: ExtractionConfig,
}

impl ExtractionConfigBuilder {
    pub fn backend_url(mut self, url: impl Into<String>) -> Self {
        self.config.backend_url = url.into();
        self
    }

    pub fn vision_model(mut self, model: impl Into<String>) -> Self {
        self.config.vision_model = model.into();
        self
    }

    pub fn text_model(mut self, model: impl Into<String>) -> Self {
        self.config.text_model = model.into();
        self
    }

    pub fn transcriber_url(mut self, url: impl Into<String>) -> Self {
        self.config.transcriber_url = url.into();
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn max_backend_calls(mut self, n: usize) -> Self {
        self.config.max_backend_calls = n.max(1);
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn consolidate_documents(mut self, v: bool) -> Self {
        self.config.consolidate_documents = v;
        self
    }

    pub fn consolidate_images(mut self, v: bool) -> Self {
        self.config.consolidate_images = v;
        self
    }

    pub fn consolidate_directories(mut self, v: bool) -> Self {
        self.config.consolidate_directories = v;
        self
    }

    pub fn fetch_timeout_secs(mut self, secs: u64) -> Self {
        self.config.fetch_timeout_secs = secs;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ExtractionConfig, ExtractError> {
        let c = &self.config;
        if c.backend_url.trim().is_empty() {
            return Err(ExtractError::InvalidConfig(
                "backend_url must not be empty".into(),
            ));
        }
        if c.concurrency == 0 {
            return Err(ExtractError::InvalidConfig("concurrency must be ≥ 1".into()));
        }
        if c.api_timeout_secs == 0 {
            return Err(ExtractError::InvalidConfig(
                "api_timeout_secs must be ≥ 1".into(),
            ));
        }
        Ok(self.config)
    }
}

/// Processing strategy selected by the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputKind {
    /// Multi-page document converted to page images (pdf, docx, pptx).
    Document,
    /// One standalone image file.
    Image,
    /// A directory of image files, processed page-by-page.
    ImageDirectory,
    /// One audio file to transcribe (wav, mp3).
    Audio,
    /// One web page fetched as markdown.
    Url,
}

impl fmt::Display for InputKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InputKind::Document => "document",
            InputKind::Image => "image",
            InputKind::ImageDirectory => "images_dir",
            InputKind::Audio => "audio",
            InputKind::Url => "url",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = ExtractionConfig::builder().build().expect("valid default");
        assert_eq!(config.concurrency, 4);
        assert_eq!(config.backend_url, "http://localhost:11434");
        assert!(config.consolidate_documents);
        assert!(!config.consolidate_images);
    }

    #[test]
    fn builder_clamps_concurrency() {
        let config = ExtractionConfig::builder()
            .concurrency(0)
            .build()
            .expect("clamped to 1");
        assert_eq!(config.concurrency, 1);
    }

    #[test]
    fn empty_backend_url_rejected() {
        let result = ExtractionConfig::builder().backend_url("  ").build();
        assert!(matches!(result, Err(ExtractError::InvalidConfig(_))));
    }

    #[test]
    fn consolidation_flags_per_kind() {
        let config = ExtractionConfig::builder()
            .consolidate_images(true)
            .consolidate_documents(false)
            .build()
            .unwrap();
        assert!(config.consolidates(InputKind::Image));
        assert!(!config.consolidates(InputKind::Document));
        assert!(!config.consolidates(InputKind::Audio));
        assert!(!config.consolidates(InputKind::Url));
    }
}
