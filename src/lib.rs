//! # extract2json
//!
//! Extract structured JSON from documents, images, audio, and web pages
//! using local model servers.
//!
//! ## Why this crate?
//!
//! Heterogeneous inputs — a PDF report, a folder of screenshots, a meeting
//! recording, a web page — all carry extractable content, but every format
//! needs a different toolchain. This crate classifies the input, fans it
//! out into processable units, runs each unit against a local vision model
//! (and whisper for audio), merges the results deterministically, and
//! optionally asks a text model to consolidate the whole thing into a
//! summary. The output is one stable JSON record per input.
//!
//! Everything runs against local servers (Ollama, whisper-server); no
//! cloud API key is required.
//!
//! ## Pipeline Overview
//!
//! ```text
//! input (path or URL)
//!  │
//!  ├─ 1. Classify   extension/URL → document | image | images_dir | audio | url
//!  ├─ 2. Split      documents → page images via pdftoppm (per-run scratch dir)
//!  ├─ 3. Extract    concurrent per-unit calls: OCR, tables, description, flowchart
//!  ├─ 4. Aggregate  deterministic ordered merge of successful units
//!  ├─ 5. Consolidate one text-model pass → summary + description (optional)
//!  └─ 6. Output     structured JSON record + per-unit reports + run stats
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use extract2json::{extract, ExtractionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ExtractionConfig::default();
//!     let output = extract("report.pdf", &config).await?;
//!     println!("{}", serde_json::to_string_pretty(&output.record)?);
//!     eprintln!("units: {} ok / {} failed",
//!         output.stats.extracted_units,
//!         output.stats.failed_units);
//!     Ok(())
//! }
//! ```
//!
//! ## Failure model
//!
//! A failed unit (backend hiccup, per-call timeout) never aborts its
//! siblings; the record reports it per unit and the run succeeds with
//! partial results. Fatal errors are reserved for runs that cannot produce
//! anything useful: unknown formats, failed document conversion, or the
//! only unit of a single-unit format (audio, url) failing.
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `extract2json` binary (clap + anyhow + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! extract2json = { version = "0.3", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod backend;
pub mod classify;
pub mod config;
pub mod convert_doc;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod transcribe;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use backend::{BackendError, ModelBackend, OllamaBackend};
pub use classify::{classify, InputDescriptor};
pub use config::{ExtractionConfig, ExtractionConfigBuilder, InputKind};
pub use error::{ExtractError, UnitError};
pub use extract::{
    extract, extract_cancellable, extract_sync, extract_to_file, extract_with, CancelToken,
    Collaborators,
};
pub use output::{
    AggregatedView, ConsolidatedSummary, ExtractionOutput, FinalRecord, RecordBody, RunStats,
    Transcript, TranscriptSegment, UnitReport, UnitStatus, VisionExtraction,
};
pub use progress::{ExtractionProgressCallback, NoopProgressCallback, ProgressCallback};
