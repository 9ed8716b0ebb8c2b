//! Output types: the final JSON record and its building blocks.
//!
//! Everything here is serde-serializable and immutable once built. The
//! [`FinalRecord`] is the externally visible result of a run; its shape
//! varies by input format (`document`, `image`, `images_dir`, `audio`,
//! `url`) via an internally tagged enum, so `serde_json` emits the `type`
//! discriminator the way downstream consumers expect.

use crate::error::UnitError;
use serde::{Deserialize, Serialize};

/// Full result of an extraction run: the record plus run statistics.
///
/// The statistics are not part of the persisted record; they exist for
/// callers (and the CLI summary line).
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionOutput {
    /// The consolidated record, ready to serialize.
    pub record: FinalRecord,
    /// Timing and per-unit counts for the run.
    pub stats: RunStats,
}

/// The externally visible output object, assembled last and never mutated
/// after construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalRecord {
    /// The original input path or URL.
    pub source: String,
    #[serde(flatten)]
    pub body: RecordBody,
}

/// Format-specific portion of the final record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RecordBody {
    /// Multi-page document: per-page reports plus the aggregated view.
    Document {
        pages: Vec<UnitReport>,
        aggregated: AggregatedView,
        #[serde(skip_serializing_if = "Option::is_none")]
        llm_summary: Option<ConsolidatedSummary>,
    },
    /// Single standalone image.
    Image {
        images: Vec<UnitReport>,
        #[serde(skip_serializing_if = "Option::is_none")]
        aggregated: Option<AggregatedView>,
        #[serde(skip_serializing_if = "Option::is_none")]
        llm_summary: Option<ConsolidatedSummary>,
    },
    /// Directory of images, one report per file.
    #[serde(rename = "images_dir")]
    ImagesDir {
        images: Vec<UnitReport>,
        #[serde(skip_serializing_if = "Option::is_none")]
        aggregated: Option<AggregatedView>,
        #[serde(skip_serializing_if = "Option::is_none")]
        llm_summary: Option<ConsolidatedSummary>,
    },
    /// Transcribed audio file.
    Audio { transcript: Transcript },
    /// Fetched web page, wrapped as markdown content.
    Url { content: String },
}

/// Per-unit entry in a `document`/`image`/`images_dir` record.
///
/// Present for every unit regardless of outcome, so callers can tell a
/// fully extracted run from a partially extracted one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitReport {
    /// 0-based unit index; matches the unit's position in the input.
    pub index: usize,
    /// File name of the page image or image (e.g. `page_001.png`).
    pub name: String,
    pub status: UnitStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<VisionExtraction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<UnitErrorReport>,
}

/// Outcome of one unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitStatus {
    Ok,
    Failed,
}

/// Serializable view of a [`UnitError`] for the per-unit report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitErrorReport {
    /// Machine-readable kind: `backend_unavailable`, `timeout`,
    /// `extraction_failure`, or `cancelled`.
    pub kind: String,
    pub message: String,
}

impl From<&UnitError> for UnitErrorReport {
    fn from(e: &UnitError) -> Self {
        Self {
            kind: e.kind().to_string(),
            message: e.to_string(),
        }
    }
}

/// What the vision model extracted from one image-like unit.
///
/// All fields optional: a photo has no table, a diagram may have no
/// readable text. `None` means "capability ran, nothing found" — a failed
/// unit has no `VisionExtraction` at all.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VisionExtraction {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ocr_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table_data: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flowchart: Option<String>,
}

/// Transcription result for an audio unit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<f64>,
    pub text: String,
    pub segments: Vec<TranscriptSegment>,
}

/// One timed segment of a transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

/// Deterministic merge of the successful per-unit results, in unit order.
///
/// Failed units contribute nothing here; they remain visible in the
/// per-unit reports.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregatedView {
    /// OCR text of all successful units, joined with blank lines.
    pub combined_text: Option<String>,
    pub tables: Vec<String>,
    pub descriptions: Vec<String>,
    pub flowcharts: Vec<String>,
}

/// Result of the consolidation pass over the aggregated view.
///
/// `text` and `tables` are copied through from the view unchanged;
/// `summary` and `description` come from the text model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConsolidatedSummary {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    pub tables: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Timing and per-unit counts for a run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunStats {
    /// Units produced by the splitter.
    pub total_units: usize,
    /// Units that extracted without error.
    pub extracted_units: usize,
    /// Units recorded as failed.
    pub failed_units: usize,
    /// Wall-clock duration of the whole run.
    pub total_duration_ms: u64,
    /// Time spent splitting (document conversion included).
    pub split_duration_ms: u64,
    /// Time spent in per-unit extraction.
    pub extract_duration_ms: u64,
    /// Time spent in the consolidation pass (0 when skipped).
    pub consolidate_duration_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_serializes_with_type_tag() {
        let record = FinalRecord {
            source: "page.png".into(),
            body: RecordBody::Image {
                images: vec![UnitReport {
                    index: 0,
                    name: "page.png".into(),
                    status: UnitStatus::Ok,
                    result: Some(VisionExtraction {
                        ocr_text: Some("hello".into()),
                        ..Default::default()
                    }),
                    error: None,
                }],
                aggregated: None,
                llm_summary: None,
            },
        };

        let value = serde_json::to_value(&record).expect("serialize");
        assert_eq!(value["type"], "image");
        assert_eq!(value["source"], "page.png");
        assert_eq!(value["images"][0]["result"]["ocr_text"], "hello");
        // Omitted optional sections must not appear as null keys.
        assert!(value.get("llm_summary").is_none());
    }

    #[test]
    fn images_dir_tag_matches_wire_format() {
        let record = FinalRecord {
            source: "/shots".into(),
            body: RecordBody::ImagesDir {
                images: vec![],
                aggregated: None,
                llm_summary: None,
            },
        };
        let value = serde_json::to_value(&record).expect("serialize");
        assert_eq!(value["type"], "images_dir");
    }

    #[test]
    fn failed_unit_report_carries_error_not_result() {
        let report = UnitReport {
            index: 1,
            name: "page_002.png".into(),
            status: UnitStatus::Failed,
            result: None,
            error: Some(UnitErrorReport {
                kind: "timeout".into(),
                message: "Unit 1: call timed out after 60s".into(),
            }),
        };
        let value = serde_json::to_value(&report).expect("serialize");
        assert_eq!(value["status"], "failed");
        assert_eq!(value["error"]["kind"], "timeout");
        assert!(value.get("result").is_none());
    }

    #[test]
    fn url_record_wraps_raw_content() {
        let record = FinalRecord {
            source: "https://example.com".into(),
            body: RecordBody::Url {
                content: "<html>not markdown</html>".into(),
            },
        };
        let value = serde_json::to_value(&record).expect("serialize");
        assert_eq!(value["type"], "url");
        assert_eq!(value["content"], "<html>not markdown</html>");
    }
}
