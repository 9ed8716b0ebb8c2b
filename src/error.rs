//! Error types for the extract2json library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`ExtractError`] — **Fatal**: the run cannot produce any useful record
//!   (unsupported format, document conversion failed, output not writable).
//!   Returned as `Err(ExtractError)` from the top-level `extract*` functions.
//!
//! * [`UnitError`] — **Non-fatal**: a single unit failed (backend hiccup,
//!   timeout) but the other units are fine. Stored inside
//!   [`crate::pipeline::UnitResult`] so callers can inspect partial success
//!   rather than losing the whole run to one bad page.
//!
//! The one deliberate exception: formats with exactly one unit (audio, url)
//! have no partial output to degrade into, so their unit failure is promoted
//! to a fatal error by the result builder.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the extract2json library.
///
/// Unit-level failures use [`UnitError`] and are stored in
/// [`crate::pipeline::UnitResult`] rather than propagated here.
#[derive(Debug, Error)]
pub enum ExtractError {
    // ── Classification errors ────────────────────────────────────────────
    /// Input path does not exist.
    #[error("Input not found: '{path}'\nCheck the path exists and is readable.")]
    InputNotFound { path: PathBuf },

    /// Input exists but its extension maps to no processing strategy.
    #[error("Unsupported format: '{input}' (extension {extension:?})\nSupported: pdf, docx, pptx, png, jpg, jpeg, wav, mp3, directories of images, http(s) URLs.")]
    UnsupportedFormat {
        input: String,
        extension: Option<String>,
    },

    // ── Splitting errors ─────────────────────────────────────────────────
    /// The document-to-image collaborator reported an error.
    #[error("Document conversion failed for '{path}': {detail}")]
    ConversionFailure { path: PathBuf, detail: String },

    /// The splitter found no units to process (e.g. an empty image directory).
    #[error("No processable units in '{input}'")]
    NoUnits { input: String },

    // ── Backend errors (fatal only for single-unit formats) ──────────────
    /// The model-serving backend could not be reached at all.
    #[error("Model backend unavailable at '{endpoint}': {detail}")]
    BackendUnavailable { endpoint: String, detail: String },

    /// Extraction failed for the only unit of a single-unit run.
    #[error("Extraction failed for '{input}': {detail}")]
    ExtractionFailure { input: String, detail: String },

    // ── I/O errors ───────────────────────────────────────────────────────
    /// Could not create or write the output record.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single processable unit.
///
/// Stored alongside [`crate::pipeline::UnitResult`] when a unit fails.
/// The overall run continues; the final record reports the failure per unit.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum UnitError {
    /// The backend could not be reached for this unit's calls.
    #[error("Unit {unit}: backend unavailable: {detail}")]
    Backend { unit: usize, detail: String },

    /// A backend call exceeded the per-call timeout. Never retried.
    #[error("Unit {unit}: call timed out after {secs}s")]
    Timeout { unit: usize, secs: u64 },

    /// The backend answered, but extraction still failed after retries.
    #[error("Unit {unit}: extraction failed after {retries} retries: {detail}")]
    Extraction {
        unit: usize,
        retries: u8,
        detail: String,
    },

    /// The run was cancelled before this unit completed.
    #[error("Unit {unit}: cancelled")]
    Cancelled { unit: usize },
}

impl UnitError {
    /// 0-based index of the unit this error belongs to.
    pub fn unit_index(&self) -> usize {
        match self {
            UnitError::Backend { unit, .. }
            | UnitError::Timeout { unit, .. }
            | UnitError::Extraction { unit, .. }
            | UnitError::Cancelled { unit } => *unit,
        }
    }

    /// Short machine-readable kind, used in per-unit reports.
    pub fn kind(&self) -> &'static str {
        match self {
            UnitError::Backend { .. } => "backend_unavailable",
            UnitError::Timeout { .. } => "timeout",
            UnitError::Extraction { .. } => "extraction_failure",
            UnitError::Cancelled { .. } => "cancelled",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_format_display() {
        let e = ExtractError::UnsupportedFormat {
            input: "notes.xyz".into(),
            extension: Some("xyz".into()),
        };
        let msg = e.to_string();
        assert!(msg.contains("notes.xyz"), "got: {msg}");
        assert!(msg.contains("xyz"));
    }

    #[test]
    fn conversion_failure_display() {
        let e = ExtractError::ConversionFailure {
            path: PathBuf::from("slides.pptx"),
            detail: "libreoffice exited with status 1".into(),
        };
        assert!(e.to_string().contains("slides.pptx"));
        assert!(e.to_string().contains("status 1"));
    }

    #[test]
    fn extraction_failure_display_names_the_input() {
        let e = ExtractError::ExtractionFailure {
            input: "meeting.wav".into(),
            detail: "transcription failed".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("meeting.wav"), "got: {msg}");
        assert!(msg.contains("transcription failed"));
    }

    #[test]
    fn unit_error_kinds_and_index() {
        let timeout = UnitError::Timeout { unit: 2, secs: 60 };
        assert_eq!(timeout.kind(), "timeout");
        assert_eq!(timeout.unit_index(), 2);

        let cancelled = UnitError::Cancelled { unit: 7 };
        assert_eq!(cancelled.kind(), "cancelled");
        assert_eq!(cancelled.unit_index(), 7);
    }

    #[test]
    fn unit_error_serializes() {
        let e = UnitError::Backend {
            unit: 1,
            detail: "connection refused".into(),
        };
        let json = serde_json::to_string(&e).expect("serialize");
        assert!(json.contains("connection refused"));
    }
}
