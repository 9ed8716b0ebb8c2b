//! Extraction entry points and the run orchestrator.
//!
//! The public `extract*` functions wire up the default collaborators
//! (Ollama backend, pdftoppm converter, whisper-server transcriber, HTTP
//! fetcher) and drive the pipeline: classify → split → concurrent per-unit
//! extraction → aggregate → consolidate → record. Tests and embedders that
//! need different collaborators go through [`extract_with`] instead.

use crate::backend::{ModelBackend, OllamaBackend};
use crate::classify::{classify, InputDescriptor};
use crate::config::{ExtractionConfig, InputKind};
use crate::convert_doc::{DocumentConverter, PdftoppmConverter};
use crate::error::{ExtractError, UnitError};
use crate::fetch::{HttpFetcher, UrlFetcher};
use crate::output::{
    AggregatedView, ConsolidatedSummary, ExtractionOutput, FinalRecord, RecordBody, RunStats,
    UnitReport, UnitStatus,
};
use crate::pipeline::extract_unit::{extract_unit, UnitContext, UnitPayload, UnitResult};
use crate::pipeline::split::{split, ProcessableUnit};
use crate::pipeline::{aggregate, consolidate};
use crate::transcribe::{AudioTranscriber, WhisperServerTranscriber};
use futures::stream::{self, StreamExt};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

/// Cooperative cancellation handle for a running extraction.
///
/// Clone it, hand one clone to [`extract_with`] (or get one from
/// [`extract_cancellable`]) and call [`CancelToken::cancel`] from any task.
/// Units already finished keep their results; units still in flight are
/// recorded as cancelled.
#[derive(Clone, Default)]
pub struct CancelToken {
    inner: Arc<CancelInner>,
}

#[derive(Default)]
struct CancelInner {
    flag: AtomicBool,
    notify: Notify,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.inner.flag.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.flag.load(Ordering::SeqCst)
    }

    /// Resolves once [`cancel`](Self::cancel) has been called.
    pub async fn cancelled(&self) {
        loop {
            if self.is_cancelled() {
                return;
            }
            let notified = self.inner.notify.notified();
            // Re-check after registering so a cancel between the check and
            // the await is not missed.
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

/// External services the pipeline talks to, as trait objects so tests can
/// inject in-process fakes.
pub struct Collaborators<'a> {
    pub backend: &'a dyn ModelBackend,
    pub converter: &'a dyn DocumentConverter,
    pub transcriber: &'a dyn AudioTranscriber,
    pub fetcher: &'a dyn UrlFetcher,
}

/// Extract one input into a structured JSON record.
///
/// This is the primary entry point for the library.
///
/// # Arguments
/// * `input` — Local file path, directory of images, or HTTP/HTTPS URL
/// * `config` — Extraction configuration
///
/// # Returns
/// `Ok(ExtractionOutput)` on success, even if some units failed (check
/// `output.stats.failed_units`).
///
/// # Errors
/// Returns `Err(ExtractError)` only for fatal errors:
/// - Input not found or format unsupported
/// - Document conversion failed
/// - A single-unit format (audio, url) failed its only unit
pub async fn extract(
    input: impl AsRef<str>,
    config: &ExtractionConfig,
) -> Result<ExtractionOutput, ExtractError> {
    extract_cancellable(input, config, &CancelToken::new()).await
}

/// Like [`extract`], but honours a caller-owned [`CancelToken`] so the run
/// can be aborted from another task.
pub async fn extract_cancellable(
    input: impl AsRef<str>,
    config: &ExtractionConfig,
    cancel: &CancelToken,
) -> Result<ExtractionOutput, ExtractError> {
    let backend = OllamaBackend::new(&config.backend_url, config.max_backend_calls);
    let converter = PdftoppmConverter::new();
    let transcriber = WhisperServerTranscriber::new(&config.transcriber_url);
    let fetcher = HttpFetcher::new(config.fetch_timeout_secs);
    let collaborators = Collaborators {
        backend: &backend,
        converter: &converter,
        transcriber: &transcriber,
        fetcher: &fetcher,
    };
    extract_with(input.as_ref(), config, &collaborators, cancel).await
}

/// Extract with caller-supplied collaborators.
pub async fn extract_with(
    input: &str,
    config: &ExtractionConfig,
    collaborators: &Collaborators<'_>,
    cancel: &CancelToken,
) -> Result<ExtractionOutput, ExtractError> {
    let total_start = Instant::now();
    info!("Starting extraction: {input}");

    // ── Step 1: Classify ─────────────────────────────────────────────────
    let descriptor = classify(input)?;
    debug!("Classified '{}' as {}", descriptor.source, descriptor.kind);

    // ── Step 2: Split into units ─────────────────────────────────────────
    let split_start = Instant::now();
    let mut split_output = split(&descriptor, collaborators.converter).await?;
    let split_duration_ms = split_start.elapsed().as_millis() as u64;
    let total_units = split_output.units.len();
    info!("Split into {total_units} units in {split_duration_ms}ms");

    if let Some(ref cb) = config.progress_callback {
        cb.on_run_start(total_units);
    }

    // ── Step 3: Extract units concurrently ───────────────────────────────
    let extract_start = Instant::now();
    let ctx = UnitContext {
        backend: collaborators.backend,
        transcriber: collaborators.transcriber,
        fetcher: collaborators.fetcher,
        config,
    };
    let results = run_units(&split_output.units, &ctx, cancel).await;
    let extract_duration_ms = extract_start.elapsed().as_millis() as u64;

    // Page images are only needed during extraction; clean up before the
    // consolidation pass so scratch never outlives its use.
    split_output.scratch.close();

    let extracted_units = results.iter().filter(|r| r.is_ok()).count();
    let failed_units = total_units - extracted_units;

    if let Some(ref cb) = config.progress_callback {
        cb.on_run_complete(total_units, extracted_units);
    }

    // ── Step 4: Build the record ─────────────────────────────────────────
    let mut stats = RunStats {
        total_units,
        extracted_units,
        failed_units,
        total_duration_ms: 0,
        split_duration_ms,
        extract_duration_ms,
        consolidate_duration_ms: 0,
    };

    let body = build_body(
        &descriptor,
        &split_output.units,
        results,
        config,
        collaborators.backend,
        &mut stats,
    )
    .await?;

    stats.total_duration_ms = total_start.elapsed().as_millis() as u64;
    info!(
        "Extraction complete: {}/{} units, {}ms total",
        extracted_units, total_units, stats.total_duration_ms
    );

    Ok(ExtractionOutput {
        record: FinalRecord {
            source: descriptor.source.clone(),
            body,
        },
        stats,
    })
}

/// Extract and write the record as pretty-printed JSON to a file.
///
/// Uses atomic write (temp file + rename) to prevent partial files. On a
/// fatal error no output file is written or replaced.
pub async fn extract_to_file(
    input: impl AsRef<str>,
    output_path: impl AsRef<Path>,
    config: &ExtractionConfig,
) -> Result<ExtractionOutput, ExtractError> {
    let output = extract(input, config).await?;
    write_record(&output.record, output_path.as_ref()).await?;
    Ok(output)
}

/// Serialize and atomically write a record to `path`.
async fn write_record(record: &FinalRecord, path: &Path) -> Result<(), ExtractError> {
    let json = serde_json::to_string_pretty(record)
        .map_err(|e| ExtractError::Internal(format!("record serialization: {e}")))?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ExtractError::OutputWriteFailed {
                    path: path.to_path_buf(),
                    source: e,
                })?;
        }
    }

    // Atomic write: write to temp, then rename
    let tmp_path = path.with_extension("json.tmp");
    tokio::fs::write(&tmp_path, &json)
        .await
        .map_err(|e| ExtractError::OutputWriteFailed {
            path: path.to_path_buf(),
            source: e,
        })?;

    if let Err(e) = tokio::fs::rename(&tmp_path, path).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(ExtractError::OutputWriteFailed {
            path: path.to_path_buf(),
            source: e,
        });
    }

    info!("Wrote record to {}", path.display());
    Ok(())
}

/// Synchronous wrapper around [`extract`].
///
/// Creates a temporary tokio runtime internally.
pub fn extract_sync(
    input: impl AsRef<str>,
    config: &ExtractionConfig,
) -> Result<ExtractionOutput, ExtractError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| ExtractError::Internal(format!("Failed to create tokio runtime: {e}")))?
        .block_on(extract(input, config))
}

/// Run every unit through the extractor with bounded concurrency, then
/// restore unit order. `buffer_unordered` completes units as they finish;
/// the final sort makes result order a function of the input alone.
async fn run_units(
    units: &[ProcessableUnit],
    ctx: &UnitContext<'_>,
    cancel: &CancelToken,
) -> Vec<UnitResult> {
    let total = units.len();
    let mut results: Vec<UnitResult> = stream::iter(units.iter().map(|unit| {
        let cancel = cancel.clone();
        let callback = ctx.config.progress_callback.clone();
        async move {
            if cancel.is_cancelled() {
                return UnitResult::failed(unit.index, UnitError::Cancelled { unit: unit.index });
            }
            if let Some(ref cb) = callback {
                cb.on_unit_start(unit.index, total);
            }
            let result = tokio::select! {
                r = extract_unit(unit, ctx) => r,
                _ = cancel.cancelled() => {
                    UnitResult::failed(unit.index, UnitError::Cancelled { unit: unit.index })
                }
            };
            if let Some(ref cb) = callback {
                match &result.error {
                    None => cb.on_unit_complete(unit.index, total),
                    Some(e) => cb.on_unit_error(unit.index, total, &e.to_string()),
                }
            }
            result
        }
    }))
    .buffer_unordered(ctx.config.concurrency)
    .collect()
    .await;

    results.sort_by_key(|r| r.unit_index);
    results
}

/// Assemble the format-specific record body from the sorted unit results.
async fn build_body(
    descriptor: &InputDescriptor,
    units: &[ProcessableUnit],
    results: Vec<UnitResult>,
    config: &ExtractionConfig,
    backend: &dyn ModelBackend,
    stats: &mut RunStats,
) -> Result<RecordBody, ExtractError> {
    match descriptor.kind {
        InputKind::Document => {
            let reports = unit_reports(units, &results);
            let view = aggregate::aggregate(&results);
            let llm_summary =
                maybe_consolidate(descriptor, &view, config, backend, stats).await;
            Ok(RecordBody::Document {
                pages: reports,
                aggregated: view,
                llm_summary,
            })
        }
        InputKind::Image | InputKind::ImageDirectory => {
            let reports = unit_reports(units, &results);
            let view = aggregate::aggregate(&results);
            let llm_summary =
                maybe_consolidate(descriptor, &view, config, backend, stats).await;
            let aggregated = Some(view);
            Ok(if descriptor.kind == InputKind::Image {
                RecordBody::Image {
                    images: reports,
                    aggregated,
                    llm_summary,
                }
            } else {
                RecordBody::ImagesDir {
                    images: reports,
                    aggregated,
                    llm_summary,
                }
            })
        }
        InputKind::Audio => {
            let result = single_result(results)?;
            match result.payload {
                Some(UnitPayload::Transcript(transcript)) => {
                    Ok(RecordBody::Audio { transcript })
                }
                _ => Err(escalate_audio(descriptor, config, result.error)),
            }
        }
        InputKind::Url => {
            let result = single_result(results)?;
            match result.payload {
                Some(UnitPayload::Markdown { markdown }) => {
                    Ok(RecordBody::Url { content: markdown })
                }
                _ => Err(escalate_url(descriptor, result.error)),
            }
        }
    }
}

/// Run the consolidation pass when configured for this input kind.
///
/// Consolidation failure is never fatal; the record ships without a
/// summary and the failure is logged.
async fn maybe_consolidate(
    descriptor: &InputDescriptor,
    view: &AggregatedView,
    config: &ExtractionConfig,
    backend: &dyn ModelBackend,
    stats: &mut RunStats,
) -> Option<ConsolidatedSummary> {
    if !config.consolidates(descriptor.kind) {
        debug!("Consolidation disabled for {} inputs", descriptor.kind);
        return None;
    }
    if view.combined_text.is_none() && view.tables.is_empty() {
        debug!("Nothing to consolidate for '{}'", descriptor.source);
        return None;
    }

    let start = Instant::now();
    let outcome = consolidate::consolidate(
        view,
        backend,
        &config.text_model,
        config.api_timeout_secs,
    )
    .await;
    stats.consolidate_duration_ms = start.elapsed().as_millis() as u64;

    match outcome {
        Ok(summary) => Some(summary),
        Err(e) => {
            warn!("Consolidation failed, record ships without a summary: {e}");
            None
        }
    }
}

fn unit_reports(units: &[ProcessableUnit], results: &[UnitResult]) -> Vec<UnitReport> {
    units
        .iter()
        .zip(results.iter())
        .map(|(unit, result)| UnitReport {
            index: unit.index,
            name: unit.name(),
            status: if result.is_ok() {
                UnitStatus::Ok
            } else {
                UnitStatus::Failed
            },
            result: result.vision().cloned(),
            error: result.error.as_ref().map(Into::into),
        })
        .collect()
}

fn single_result(mut results: Vec<UnitResult>) -> Result<UnitResult, ExtractError> {
    match results.len() {
        1 => Ok(results.remove(0)),
        n => Err(ExtractError::Internal(format!(
            "expected exactly one unit result, got {n}"
        ))),
    }
}

/// An audio run has exactly one unit; its failure leaves nothing to
/// report, so it is promoted to a fatal error.
fn escalate_audio(
    descriptor: &InputDescriptor,
    config: &ExtractionConfig,
    error: Option<UnitError>,
) -> ExtractError {
    match error {
        Some(UnitError::Backend { detail, .. }) => ExtractError::BackendUnavailable {
            endpoint: config.transcriber_url.clone(),
            detail,
        },
        Some(e) => ExtractError::ExtractionFailure {
            input: descriptor.source.clone(),
            detail: e.to_string(),
        },
        None => ExtractError::Internal("audio unit produced no payload and no error".into()),
    }
}

fn escalate_url(descriptor: &InputDescriptor, error: Option<UnitError>) -> ExtractError {
    match error {
        Some(e) => ExtractError::ExtractionFailure {
            input: descriptor.source.clone(),
            detail: e.to_string(),
        },
        None => ExtractError::Internal("url unit produced no payload and no error".into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cancel_token_resolves_waiters() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());

        let waiter = token.clone();
        let handle = tokio::spawn(async move {
            waiter.cancelled().await;
            true
        });

        token.cancel();
        assert!(token.is_cancelled());
        assert!(handle.await.unwrap());
    }

    #[tokio::test]
    async fn cancel_before_wait_resolves_immediately() {
        let token = CancelToken::new();
        token.cancel();
        token.cancelled().await; // must not hang
    }

    #[test]
    fn cancel_is_idempotent() {
        let token = CancelToken::new();
        token.cancel();
        token.cancel();
        assert!(token.is_cancelled());
    }

    fn url_record() -> FinalRecord {
        FinalRecord {
            source: "https://example.com".into(),
            body: RecordBody::Url {
                content: "# Example".into(),
            },
        }
    }

    #[tokio::test]
    async fn write_record_replaces_the_temp_file_with_the_target() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("record.json");

        write_record(&url_record(), &path).await.expect("write");

        assert!(path.exists());
        assert!(!dir.path().join("record.json.tmp").exists());
    }

    #[tokio::test]
    async fn failed_rename_leaves_no_temp_file_behind() {
        let dir = tempfile::tempdir().unwrap();
        // A non-empty directory at the target path makes the rename fail.
        let path = dir.path().join("record.json");
        std::fs::create_dir(&path).unwrap();
        std::fs::write(path.join("occupied"), b"x").unwrap();

        let err = write_record(&url_record(), &path)
            .await
            .expect_err("rename onto a non-empty directory must fail");

        assert!(matches!(err, ExtractError::OutputWriteFailed { .. }));
        assert!(!dir.path().join("record.json.tmp").exists());
    }
}
