//! Prompts for the vision capabilities and the consolidation pass.
//!
//! Centralising every prompt here serves two purposes:
//!
//! 1. **Single source of truth** — changing what a capability asks for
//!    requires editing exactly one place.
//! 2. **Testability** — unit tests can inspect prompts directly without a
//!    running model server.

/// Ask the vision model for a verbatim text transcription.
///
/// The `NO_TEXT` sentinel lets the extractor distinguish "no readable
/// text" from an empty or failed response; see
/// [`crate::pipeline::extract_unit::filter_ocr_text`].
pub const OCR_PROMPT: &str = "Extract all text from this image exactly as shown. \
If there is no readable text in the image, respond with 'NO_TEXT'.";

/// Ask the vision model for a free-form description of the image.
pub const DESCRIPTION_PROMPT: &str =
    "Provide a detailed description of what's in this image.";

/// Ask the vision model for table content as JSON.
pub const TABLE_PROMPT: &str = "If there's a table in this image, extract it as JSON. \
If no table, return empty object.";

/// Ask the vision model to describe flowchart structure.
pub const FLOWCHART_PROMPT: &str = "If this is a flowchart, describe its structure \
and flow. If not, return empty string.";

/// Build the consolidation prompt from the aggregated combined text and
/// table list.
///
/// The text model is asked for strict JSON with fixed keys; the parser in
/// [`crate::pipeline::consolidate`] tolerates fenced or non-JSON replies.
pub fn consolidation_prompt(combined_text: &str, tables: &[String]) -> String {
    let mut prompt = String::with_capacity(combined_text.len() + 512);
    prompt.push_str(
        "You are an offline extraction agent.\n\
         Given the following extracted content, produce a consolidated JSON object \
         with exactly these keys: 'summary' (a concise summary of the whole input) \
         and 'description' (a one-paragraph description of what kind of content this is).\n\
         Return only valid JSON.\n\nTEXT:\n",
    );
    prompt.push_str(combined_text);

    if !tables.is_empty() {
        prompt.push_str("\n\nTABLES:\n");
        for (i, table) in tables.iter().enumerate() {
            prompt.push_str(&format!("Table {}: {}\n", i + 1, table));
        }
    }

    prompt
}
