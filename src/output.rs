//! Output types: provenance, per-unit results, normalised tables, and stats.
//!
//! Every dispatched unit (a whole page or one tile of a page) comes back as a
//! [`UnitResult`] tagged with its [`Provenance`]. The aggregate
//! [`ConversionOutput`] keeps all units — including failed ones — in strict
//! provenance order, so nothing the pipeline attempted is ever silently
//! dropped. Structured extraction results live in [`ParseOutcome`], which is
//! a value, not an error: a table that could not be parsed still carries the
//! raw model text for the caller to inspect.

use crate::config::OutputShape;
use crate::error::UnitError;
use serde::{Deserialize, Serialize};

/// A rectangle in source-bitmap coordinates, half-open on both axes:
/// the covered pixels are `[left, right) × [top, bottom)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileRect {
    pub left: u32,
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
}

impl TileRect {
    pub fn width(&self) -> u32 {
        self.right - self.left
    }

    pub fn height(&self) -> u32 {
        self.bottom - self.top
    }

    pub fn area(&self) -> u64 {
        self.width() as u64 * self.height() as u64
    }
}

/// Where a unit came from: owning page, source rectangle, and row-major
/// grid position within that page's tiling.
///
/// In canvas layout the whole stacked bitmap is treated as page 0.
/// Units sort by `(page, row, col)`, which is exactly the order in which the
/// tiler emitted them; the aggregator relies on this to reassemble results
/// deterministically no matter which dispatch finished first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    /// 0-indexed page within the document.
    pub page: usize,
    /// Source rectangle of this unit within the page bitmap.
    pub rect: TileRect,
    /// Grid row of the tile (0 when the page fit in a single tile).
    pub row: u32,
    /// Grid column of the tile.
    pub col: u32,
}

impl Provenance {
    /// Sort key giving document order: by page, then top-to-bottom,
    /// left-to-right within the page grid.
    pub fn order_key(&self) -> (usize, u32, u32) {
        (self.page, self.row, self.col)
    }
}

/// The result of dispatching one unit to the vision provider.
///
/// `error: None` means `text` holds the raw model output for this unit.
/// `error: Some(_)` means the unit failed after retries; `text` is empty and
/// the aggregate is marked partial.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitResult {
    pub provenance: Provenance,
    /// Raw model text for this unit (empty on failure).
    pub text: String,
    pub input_tokens: usize,
    pub output_tokens: usize,
    pub duration_ms: u64,
    pub retries: u8,
    pub error: Option<UnitError>,
}

/// A strict tabular structure extracted from model output.
///
/// Column names and rows are kept exactly as the source produced them: no
/// row-arity enforcement, no invented cells. [`NormalizedTable::is_ragged`]
/// reports whether any row's length differs from the column count, so
/// callers who want arity validation can check without the normaliser
/// fabricating data.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl NormalizedTable {
    /// True when at least one row's cell count differs from the column count.
    pub fn is_ragged(&self) -> bool {
        self.rows.iter().any(|r| r.len() != self.columns.len())
    }
}

/// Outcome of normalising raw model text into a [`NormalizedTable`].
///
/// Always a value, never a fault: callers branch on the tag. `Failure`
/// preserves the original text verbatim together with a human-readable
/// reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ParseOutcome {
    Success { table: NormalizedTable },
    Failure { raw: String, reason: String },
}

impl ParseOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ParseOutcome::Success { .. })
    }
}

/// Document metadata extracted without inference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub title: Option<String>,
    pub author: Option<String>,
    pub subject: Option<String>,
    pub creator: Option<String>,
    pub producer: Option<String>,
    pub creation_date: Option<String>,
    pub modification_date: Option<String>,
    pub page_count: usize,
    pub pdf_version: String,
}

/// Timing, token, and completeness statistics for one conversion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionStats {
    /// Pages in the source document.
    pub total_pages: usize,
    /// Units (tiles or whole pages) the pipeline dispatched or attempted.
    pub total_units: usize,
    /// Units that came back with usable text.
    pub processed_units: usize,
    /// Units that failed after retries (still present in `units`).
    pub failed_units: usize,
    /// True whenever at least one unit failed — the aggregate is incomplete.
    pub partial: bool,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub render_duration_ms: u64,
    pub inference_duration_ms: u64,
    pub total_duration_ms: u64,
}

/// The full result of one conversion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionOutput {
    /// Output shape the conversion was run with.
    pub shape: OutputShape,
    /// All successful unit texts joined in provenance order.
    pub text: String,
    /// Every unit the pipeline attempted, in provenance order.
    pub units: Vec<UnitResult>,
    /// Structured table extraction — present only for [`OutputShape::Table`].
    pub table: Option<ParseOutcome>,
    pub metadata: DocumentMetadata,
    pub stats: ConversionStats,
}

impl ConversionOutput {
    /// Unit texts grouped by page, in page order.
    ///
    /// Every attempted page gets an entry. A failed unit contributes the
    /// empty string, so a fully-failed page appears as `""` at its own
    /// position rather than shifting later pages forward — the array index
    /// stays aligned with provenance and `stats.partial` tells the caller
    /// something is missing.
    pub fn page_texts(&self) -> Vec<String> {
        let mut pages: Vec<(usize, String)> = Vec::new();
        for unit in &self.units {
            let contribution = if unit.error.is_none() {
                unit.text.as_str()
            } else {
                ""
            };
            match pages.last_mut() {
                Some((page, text)) if *page == unit.provenance.page => {
                    if !text.is_empty() && !contribution.is_empty() {
                        text.push_str("\n\n");
                    }
                    text.push_str(contribution);
                }
                _ => pages.push((unit.provenance.page, contribution.to_string())),
            }
        }
        pages.into_iter().map(|(_, t)| t).collect()
    }

    /// Unit texts, one per tile, in provenance order.
    ///
    /// A failed tile yields the empty string at its own position; positions
    /// stay aligned with provenance and nothing is silently dropped.
    pub fn tile_texts(&self) -> Vec<String> {
        self.units
            .iter()
            .map(|u| {
                if u.error.is_none() {
                    u.text.clone()
                } else {
                    String::new()
                }
            })
            .collect()
    }

    /// Render the output as JSON in the caller-selected shape:
    /// `{result}`, `{pages: [..]}`, `{tiles: [..]}`, or `{columns, rows}`.
    /// A `partial: true` key is added whenever any unit failed.
    pub fn shaped_json(&self) -> serde_json::Value {
        use serde_json::json;
        let mut value = match self.shape {
            OutputShape::Combined => json!({ "result": self.text }),
            OutputShape::PerPage => json!({ "pages": self.page_texts() }),
            OutputShape::PerTile => json!({ "tiles": self.tile_texts() }),
            OutputShape::Table => match &self.table {
                Some(ParseOutcome::Success { table }) => {
                    json!({ "columns": table.columns, "rows": table.rows })
                }
                Some(ParseOutcome::Failure { raw, reason }) => {
                    json!({ "columns": [], "rows": [], "raw": raw, "reason": reason })
                }
                None => json!({ "columns": [], "rows": [] }),
            },
        };
        if self.stats.partial {
            if let Some(map) = value.as_object_mut() {
                map.insert("partial".into(), serde_json::Value::Bool(true));
            }
        }
        value
    }
}
