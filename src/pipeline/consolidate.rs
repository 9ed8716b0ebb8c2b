//! Consolidation: one text-model pass over the aggregated view.
//!
//! This is the last, optional stage. It is the only stage whose failure is
//! swallowed by the orchestrator: a run with good per-unit extractions but
//! no summary is still a useful record, so consolidation errors are logged
//! as warnings and the record ships without `llm_summary`.

use crate::backend::{BackendError, ModelBackend};
use crate::output::{AggregatedView, ConsolidatedSummary};
use crate::prompts;
use once_cell::sync::Lazy;
use regex::Regex;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info, warn};

static JSON_FENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^```(?:json)?\s*(.*?)\s*```$").expect("fence regex is valid")
});

/// Run the consolidation pass.
///
/// Probes the backend first so an offline server skips the pass with a
/// warning instead of burning the full call timeout on a doomed request.
pub async fn consolidate(
    view: &AggregatedView,
    backend: &dyn ModelBackend,
    text_model: &str,
    timeout_secs: u64,
) -> Result<ConsolidatedSummary, BackendError> {
    if !backend.is_reachable().await {
        warn!("Backend unreachable, skipping consolidation");
        return Err(BackendError::Unavailable {
            endpoint: "consolidation probe".into(),
            detail: "backend unreachable".into(),
        });
    }

    let combined = view.combined_text.as_deref().unwrap_or_default();
    let prompt = prompts::consolidation_prompt(combined, &view.tables);

    info!("Consolidating with model {text_model}");
    let budget = Duration::from_secs(timeout_secs);
    let raw = match timeout(budget, backend.generate_text(text_model, &prompt)).await {
        Err(_) => return Err(BackendError::Timeout { secs: timeout_secs }),
        Ok(reply) => reply?,
    };

    let (summary, description) = parse_model_reply(&raw);

    Ok(ConsolidatedSummary {
        text: view.combined_text.clone(),
        tables: view.tables.clone(),
        summary,
        description,
    })
}

/// Parse the text model's reply into `(summary, description)`.
///
/// Models routinely wrap JSON in markdown fences or ignore the format
/// instruction entirely. A reply that is not valid JSON is still a
/// summary in prose form, so it lands in the `summary` field verbatim.
fn parse_model_reply(raw: &str) -> (Option<String>, Option<String>) {
    let trimmed = raw.trim();
    let candidate = JSON_FENCE
        .captures(trimmed)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .unwrap_or(trimmed);

    match serde_json::from_str::<serde_json::Value>(candidate) {
        Ok(value) => {
            debug!("Consolidation reply parsed as JSON");
            let field = |key: &str| {
                value
                    .get(key)
                    .and_then(|v| v.as_str())
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
            };
            (field("summary"), field("description"))
        }
        Err(_) => {
            debug!("Consolidation reply is not JSON, keeping it as raw summary");
            let summary = if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            };
            (summary, None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct CannedBackend {
        reachable: bool,
        reply: String,
        text_called: AtomicBool,
    }

    impl CannedBackend {
        fn replying(reply: &str) -> Self {
            Self {
                reachable: true,
                reply: reply.to_string(),
                text_called: AtomicBool::new(false),
            }
        }
    }

    #[async_trait]
    impl ModelBackend for CannedBackend {
        async fn generate_vision(
            &self,
            _m: &str,
            _p: &str,
            _i: &str,
        ) -> Result<String, BackendError> {
            unreachable!("consolidation never issues vision calls")
        }

        async fn generate_text(&self, _m: &str, _p: &str) -> Result<String, BackendError> {
            self.text_called.store(true, Ordering::SeqCst);
            Ok(self.reply.clone())
        }

        async fn is_reachable(&self) -> bool {
            self.reachable
        }
    }

    struct HangingBackend;

    #[async_trait]
    impl ModelBackend for HangingBackend {
        async fn generate_vision(
            &self,
            _m: &str,
            _p: &str,
            _i: &str,
        ) -> Result<String, BackendError> {
            unreachable!("consolidation never issues vision calls")
        }

        async fn generate_text(&self, _m: &str, _p: &str) -> Result<String, BackendError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            unreachable!()
        }

        async fn is_reachable(&self) -> bool {
            true
        }
    }

    fn view_with_text(text: &str) -> AggregatedView {
        AggregatedView {
            combined_text: Some(text.to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn json_reply_fills_summary_and_description() {
        let backend = CannedBackend::replying(
            r#"{"summary": "A report.", "description": "Financial document."}"#,
        );
        let summary = consolidate(&view_with_text("revenue up"), &backend, "llama3.2", 60)
            .await
            .expect("consolidate");
        assert_eq!(summary.summary.as_deref(), Some("A report."));
        assert_eq!(summary.description.as_deref(), Some("Financial document."));
        assert_eq!(summary.text.as_deref(), Some("revenue up"));
    }

    #[tokio::test]
    async fn fenced_json_is_unwrapped() {
        let backend =
            CannedBackend::replying("```json\n{\"summary\": \"Fenced.\"}\n```");
        let summary = consolidate(&view_with_text("x"), &backend, "llama3.2", 60)
            .await
            .expect("consolidate");
        assert_eq!(summary.summary.as_deref(), Some("Fenced."));
    }

    #[tokio::test]
    async fn non_json_reply_becomes_raw_summary() {
        let backend = CannedBackend::replying("This document is about revenue growth.");
        let summary = consolidate(&view_with_text("x"), &backend, "llama3.2", 60)
            .await
            .expect("consolidate");
        assert_eq!(
            summary.summary.as_deref(),
            Some("This document is about revenue growth.")
        );
        assert_eq!(summary.description, None);
    }

    #[tokio::test]
    async fn unreachable_backend_skips_the_generate_call() {
        let backend = CannedBackend {
            reachable: false,
            reply: String::new(),
            text_called: AtomicBool::new(false),
        };
        let err = consolidate(&view_with_text("x"), &backend, "llama3.2", 60)
            .await
            .expect_err("must fail");
        assert!(err.is_unavailable());
        assert!(!backend.text_called.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn hung_generation_times_out() {
        let err = consolidate(&view_with_text("x"), &HangingBackend, "llama3.2", 1)
            .await
            .expect_err("must time out");
        assert!(matches!(err, BackendError::Timeout { secs: 1 }), "got: {err}");
    }

    #[tokio::test]
    async fn tables_are_copied_through() {
        let backend = CannedBackend::replying(r#"{"summary": "s"}"#);
        let view = AggregatedView {
            combined_text: Some("t".into()),
            tables: vec!["{\"a\": 1}".into()],
            ..Default::default()
        };
        let summary = consolidate(&view, &backend, "llama3.2", 60)
            .await
            .expect("consolidate");
        assert_eq!(summary.tables, vec!["{\"a\": 1}"]);
    }
}
