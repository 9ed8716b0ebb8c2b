//! Per-unit extraction: drive the collaborator calls for one unit.
//!
//! This is the only pipeline stage with network I/O. Every failure mode is
//! captured in the returned [`UnitResult`] instead of propagating, so one
//! bad unit never takes down its siblings; the orchestrator decides later
//! whether a failure is fatal (single-unit formats) or merely reported.
//!
//! ## Retry policy
//!
//! Transport and server errors are retried with exponential backoff
//! (`retry_backoff_ms * 2^attempt`). Timeouts are terminal: a local model
//! that blows the per-call budget once will blow it again, and retrying
//! multiplies the wall-clock cost of the slowest unit.

use crate::backend::{BackendError, ModelBackend};
use crate::config::ExtractionConfig;
use crate::error::UnitError;
use crate::fetch::{FetchError, UrlFetcher};
use crate::output::{Transcript, VisionExtraction};
use crate::pipeline::encode::encode_image_file;
use crate::pipeline::split::{ProcessableUnit, UnitKind};
use crate::prompts;
use crate::transcribe::AudioTranscriber;
use std::path::Path;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

/// Everything a unit needs to extract itself. Borrowed from the
/// orchestrator for the duration of the run.
pub struct UnitContext<'a> {
    pub backend: &'a dyn ModelBackend,
    pub transcriber: &'a dyn AudioTranscriber,
    pub fetcher: &'a dyn UrlFetcher,
    pub config: &'a ExtractionConfig,
}

/// What a successful unit produced; the variant follows the unit kind.
#[derive(Debug, Clone)]
pub enum UnitPayload {
    Vision(VisionExtraction),
    Transcript(Transcript),
    Markdown { markdown: String },
}

/// Outcome of one unit. Exactly one of `payload` and `error` is `Some`.
#[derive(Debug, Clone)]
pub struct UnitResult {
    /// Matches [`ProcessableUnit::index`]; results are sorted by this.
    pub unit_index: usize,
    pub payload: Option<UnitPayload>,
    pub error: Option<UnitError>,
}

impl UnitResult {
    pub fn ok(unit_index: usize, payload: UnitPayload) -> Self {
        Self {
            unit_index,
            payload: Some(payload),
            error: None,
        }
    }

    pub fn failed(unit_index: usize, error: UnitError) -> Self {
        Self {
            unit_index,
            payload: None,
            error: Some(error),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.payload.is_some()
    }

    /// The vision extraction, if this unit succeeded with one.
    pub fn vision(&self) -> Option<&VisionExtraction> {
        match &self.payload {
            Some(UnitPayload::Vision(v)) => Some(v),
            _ => None,
        }
    }
}

/// Extract one unit. Never returns an `Err`; all failures land in the
/// [`UnitResult`].
pub async fn extract_unit(unit: &ProcessableUnit, ctx: &UnitContext<'_>) -> UnitResult {
    debug!("Extracting unit {} ({})", unit.index, unit.name());
    match unit.kind {
        UnitKind::PageImage | UnitKind::Image => extract_image_unit(unit, ctx).await,
        UnitKind::AudioFile => extract_audio_unit(unit, ctx).await,
        UnitKind::Url => extract_url_unit(unit, ctx).await,
    }
}

/// Drop OCR output that is a sentinel or noise rather than real text.
///
/// Vision models answer the OCR prompt with `NO_TEXT` (instructed), or
/// occasionally with conversational refusals; none of that belongs in the
/// combined text.
pub fn filter_ocr_text(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let lowered = trimmed.to_lowercase();
    if trimmed.len() < 3 {
        return None;
    }
    if matches!(lowered.as_str(), "no_text" | "none" | "n/a" | "null" | "no text") {
        return None;
    }
    if trimmed.starts_with("Error:") {
        return None;
    }
    Some(trimmed.to_string())
}

fn clean_capability(raw: String) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

async fn extract_image_unit(unit: &ProcessableUnit, ctx: &UnitContext<'_>) -> UnitResult {
    let image_b64 = match encode_image_file(Path::new(&unit.location)) {
        Ok(b64) => b64,
        Err(e) => {
            return UnitResult::failed(
                unit.index,
                UnitError::Extraction {
                    unit: unit.index,
                    retries: 0,
                    detail: format!("failed to read image '{}': {e}", unit.location),
                },
            )
        }
    };

    // The four capability calls are independent; run them concurrently and
    // let the backend's own semaphore bound actual in-flight requests.
    let (ocr, table, description, flowchart) = tokio::join!(
        vision_call(ctx, unit.index, prompts::OCR_PROMPT, &image_b64),
        vision_call(ctx, unit.index, prompts::TABLE_PROMPT, &image_b64),
        vision_call(ctx, unit.index, prompts::DESCRIPTION_PROMPT, &image_b64),
        vision_call(ctx, unit.index, prompts::FLOWCHART_PROMPT, &image_b64),
    );

    // The unit fails if any capability failed; report the first error in a
    // fixed capability order so the outcome is deterministic.
    let failure = [&ocr, &table, &description, &flowchart]
        .into_iter()
        .find_map(|r| r.as_ref().err().cloned());
    if let Some(error) = failure {
        warn!("Unit {} failed: {error}", unit.index);
        return UnitResult::failed(unit.index, error);
    }

    // All four succeeded.
    let extraction = VisionExtraction {
        ocr_text: ocr.ok().as_deref().and_then(filter_ocr_text),
        table_data: table.ok().and_then(clean_capability),
        image_description: description.ok().and_then(clean_capability),
        flowchart: flowchart.ok().and_then(clean_capability),
    };

    UnitResult::ok(unit.index, UnitPayload::Vision(extraction))
}

/// One vision capability call with retry/backoff and a per-call timeout.
async fn vision_call(
    ctx: &UnitContext<'_>,
    unit_index: usize,
    prompt: &str,
    image_b64: &str,
) -> Result<String, UnitError> {
    let budget = Duration::from_secs(ctx.config.api_timeout_secs);
    let mut attempt: u32 = 0;

    loop {
        let call = ctx
            .backend
            .generate_vision(&ctx.config.vision_model, prompt, image_b64);

        match timeout(budget, call).await {
            Err(_) => {
                // Terminal; see the module docs on retry policy.
                return Err(UnitError::Timeout {
                    unit: unit_index,
                    secs: ctx.config.api_timeout_secs,
                });
            }
            Ok(Ok(text)) => return Ok(text),
            Ok(Err(error)) => {
                if attempt >= ctx.config.max_retries {
                    return Err(map_backend_error(unit_index, attempt, error));
                }
                // Cap the exponent so large retry counts cannot overflow the shift.
                let scale = 1u64 << attempt.min(16);
                let delay = ctx.config.retry_backoff_ms.saturating_mul(scale);
                attempt += 1;
                warn!(
                    "Unit {unit_index}: backend call failed ({error}), \
                     retry {attempt}/{} in {delay}ms",
                    ctx.config.max_retries
                );
                sleep(Duration::from_millis(delay)).await;
            }
        }
    }
}

fn map_backend_error(unit_index: usize, retries: u32, error: BackendError) -> UnitError {
    if error.is_unavailable() {
        UnitError::Backend {
            unit: unit_index,
            detail: error.to_string(),
        }
    } else {
        UnitError::Extraction {
            unit: unit_index,
            retries: retries.min(u8::MAX as u32) as u8,
            detail: error.to_string(),
        }
    }
}

async fn extract_audio_unit(unit: &ProcessableUnit, ctx: &UnitContext<'_>) -> UnitResult {
    let budget = Duration::from_secs(ctx.config.api_timeout_secs);
    let call = ctx.transcriber.transcribe(Path::new(&unit.location));
    match timeout(budget, call).await {
        Err(_) => UnitResult::failed(
            unit.index,
            UnitError::Timeout {
                unit: unit.index,
                secs: ctx.config.api_timeout_secs,
            },
        ),
        Ok(Ok(transcript)) => UnitResult::ok(unit.index, UnitPayload::Transcript(transcript)),
        Ok(Err(e)) if e.is_unavailable() => UnitResult::failed(
            unit.index,
            UnitError::Backend {
                unit: unit.index,
                detail: e.to_string(),
            },
        ),
        Ok(Err(e)) => UnitResult::failed(
            unit.index,
            UnitError::Extraction {
                unit: unit.index,
                retries: 0,
                detail: e.to_string(),
            },
        ),
    }
}

async fn extract_url_unit(unit: &ProcessableUnit, ctx: &UnitContext<'_>) -> UnitResult {
    match ctx.fetcher.fetch_markdown(&unit.location).await {
        Ok(markdown) => UnitResult::ok(unit.index, UnitPayload::Markdown { markdown }),
        Err(FetchError::Timeout { secs, .. }) => UnitResult::failed(
            unit.index,
            UnitError::Timeout {
                unit: unit.index,
                secs,
            },
        ),
        Err(e @ FetchError::Unavailable { .. }) => UnitResult::failed(
            unit.index,
            UnitError::Backend {
                unit: unit.index,
                detail: e.to_string(),
            },
        ),
        Err(e @ FetchError::Http { .. }) => UnitResult::failed(
            unit.index,
            UnitError::Extraction {
                unit: unit.index,
                retries: 0,
                detail: e.to_string(),
            },
        ),
    }
}
