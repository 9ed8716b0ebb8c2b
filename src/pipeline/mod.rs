//! Pipeline stages for extraction runs.
//!
//! Each submodule implements exactly one transformation step. Keeping the
//! stages separate makes each independently testable and lets us swap a
//! collaborator (converter, backend) without touching other stages.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ split ──▶ extract_unit ──▶ aggregate ──▶ consolidate
//! (path/URL) (units)  (per-unit calls)  (merge)      (summary pass)
//! ```
//!
//! 1. [`split`] — fan a classified input out into ordered processable
//!    units; documents go through the converter collaborator into a
//!    per-run scratch directory
//! 2. [`encode`] — image file → base64 payload for vision requests
//! 3. [`extract_unit`] — drive the backend calls for one unit with
//!    retry/backoff and per-call timeouts; the only stage with network I/O
//! 4. [`aggregate`] — deterministic ordered merge of successful results
//! 5. [`consolidate`] — one text-model pass over the aggregated view

pub mod aggregate;
pub mod consolidate;
pub mod encode;
pub mod extract_unit;
pub mod split;

pub use extract_unit::{UnitPayload, UnitResult};
pub use split::{ProcessableUnit, SplitOutput, UnitKind};
