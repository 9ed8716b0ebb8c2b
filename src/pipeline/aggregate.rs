//! Aggregation: deterministic merge of per-unit vision results.
//!
//! Pure function of its input. Results arrive already sorted by unit
//! index (the orchestrator sorts after the concurrent fan-in), so the
//! aggregated view depends only on what was extracted, never on the
//! completion order of the units.

use crate::output::AggregatedView;
use crate::pipeline::extract_unit::UnitResult;
use tracing::debug;

/// Merge successful vision results into one [`AggregatedView`].
///
/// Failed units are skipped; their absence is visible in the per-unit
/// reports, not here. OCR texts are joined with blank lines, the way one
/// would paste pages of a document together.
pub fn aggregate(results: &[UnitResult]) -> AggregatedView {
    let mut texts: Vec<&str> = Vec::new();
    let mut view = AggregatedView::default();

    for result in results {
        let Some(vision) = result.vision() else {
            continue;
        };
        if let Some(text) = vision.ocr_text.as_deref() {
            texts.push(text);
        }
        if let Some(table) = &vision.table_data {
            view.tables.push(table.clone());
        }
        if let Some(description) = &vision.image_description {
            view.descriptions.push(description.clone());
        }
        if let Some(flowchart) = &vision.flowchart {
            view.flowcharts.push(flowchart.clone());
        }
    }

    view.combined_text = if texts.is_empty() {
        None
    } else {
        Some(texts.join("\n\n"))
    };

    debug!(
        "Aggregated {} units: {} text blocks, {} tables",
        results.len(),
        texts.len(),
        view.tables.len()
    );
    view
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::UnitError;
    use crate::output::VisionExtraction;
    use crate::pipeline::extract_unit::UnitPayload;

    fn ok_result(index: usize, text: &str) -> UnitResult {
        UnitResult::ok(
            index,
            UnitPayload::Vision(VisionExtraction {
                ocr_text: Some(text.to_string()),
                ..Default::default()
            }),
        )
    }

    #[test]
    fn texts_join_in_unit_order() {
        let results = vec![ok_result(0, "page one"), ok_result(1, "page two")];
        let view = aggregate(&results);
        assert_eq!(view.combined_text.as_deref(), Some("page one\n\npage two"));
    }

    #[test]
    fn failed_units_contribute_nothing() {
        let results = vec![
            ok_result(0, "first"),
            UnitResult::failed(1, UnitError::Timeout { unit: 1, secs: 60 }),
            ok_result(2, "third"),
        ];
        let view = aggregate(&results);
        assert_eq!(view.combined_text.as_deref(), Some("first\n\nthird"));
    }

    #[test]
    fn all_failed_is_empty_view() {
        let results = vec![UnitResult::failed(
            0,
            UnitError::Backend {
                unit: 0,
                detail: "down".into(),
            },
        )];
        let view = aggregate(&results);
        assert_eq!(view, AggregatedView::default());
        assert!(view.combined_text.is_none());
    }

    #[test]
    fn tables_and_descriptions_keep_unit_order() {
        let mut first = VisionExtraction::default();
        first.table_data = Some("t1".into());
        first.image_description = Some("d1".into());
        let mut second = VisionExtraction::default();
        second.table_data = Some("t2".into());
        second.flowchart = Some("f2".into());

        let results = vec![
            UnitResult::ok(0, UnitPayload::Vision(first)),
            UnitResult::ok(1, UnitPayload::Vision(second)),
        ];
        let view = aggregate(&results);
        assert_eq!(view.tables, vec!["t1", "t2"]);
        assert_eq!(view.descriptions, vec!["d1"]);
        assert_eq!(view.flowcharts, vec!["f2"]);
    }

    #[test]
    fn aggregation_is_deterministic() {
        let results = vec![ok_result(0, "a"), ok_result(1, "b"), ok_result(2, "c")];
        assert_eq!(aggregate(&results), aggregate(&results));
    }
}
