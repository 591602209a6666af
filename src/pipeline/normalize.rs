//! Normalisation: extract a strict `{columns, rows}` table from raw model text.
//!
//! Vision models rarely return bare JSON even when asked to. The normaliser
//! tolerates the usual decorations — prose before and after the object,
//! triple-fence code blocks with or without a language tag, stray
//! whitespace — and extracts the first syntactically valid object matching
//! the expected shape.
//!
//! Two rules are absolute:
//!
//! * **Never raise.** Every input produces a [`ParseOutcome`]; malformed
//!   output degrades to `Failure` carrying the original text verbatim and a
//!   human-readable reason.
//! * **Never invent.** Columns and rows come from the source text only;
//!   row arity is preserved as produced, with no fabricated cells.

use crate::output::{NormalizedTable, ParseOutcome};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::debug;

/// Outer code fence with optional language tag, e.g. ```` ```json … ``` ````.
static RE_OUTER_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[A-Za-z0-9_-]*\s*\n(.*?)\n?```\s*$").unwrap());

/// Normalise one blob of raw model text into a strict table.
pub fn normalize_table(raw: &str) -> ParseOutcome {
    let candidate = strip_fences(raw.trim());

    match extract_table(candidate) {
        Ok(table) => {
            debug!(
                "Normalised table: {} columns, {} rows",
                table.columns.len(),
                table.rows.len()
            );
            ParseOutcome::Success { table }
        }
        Err(reason) => ParseOutcome::Failure {
            raw: raw.to_string(),
            reason,
        },
    }
}

/// Strip one outer fenced code block, if the whole input is wrapped in one.
/// Fences buried inside surrounding prose are handled by the object scan
/// instead, which skips non-JSON text on both sides.
fn strip_fences(input: &str) -> &str {
    match RE_OUTER_FENCE.captures(input) {
        Some(caps) => caps.get(1).map(|m| m.as_str()).unwrap_or(input),
        None => input,
    }
}

/// Scan for the first `{…}` that parses as JSON and has the expected shape.
fn extract_table(input: &str) -> Result<NormalizedTable, String> {
    let mut saw_object = false;

    for (start, _) in input.match_indices('{') {
        // `into_iter::<Value>()` parses one leading JSON value and ignores
        // whatever trails it, which is exactly the prose-tolerance needed.
        let mut stream = serde_json::Deserializer::from_str(&input[start..]).into_iter::<Value>();
        let value = match stream.next() {
            Some(Ok(v)) => v,
            _ => continue,
        };

        let Value::Object(map) = value else { continue };
        saw_object = true;

        match table_from_object(&map) {
            Some(table) => return Ok(table),
            None => continue,
        }
    }

    if saw_object {
        Err("found a JSON object, but not with 'columns' and 'rows' arrays".into())
    } else {
        Err("no JSON object found in model output".into())
    }
}

/// Convert a JSON object into a table when it has the expected shape:
/// `columns` an array, `rows` an array of arrays.
fn table_from_object(map: &serde_json::Map<String, Value>) -> Option<NormalizedTable> {
    let columns = map.get("columns")?.as_array()?;
    let rows = map.get("rows")?.as_array()?;

    let columns: Vec<String> = columns.iter().map(cell_text).collect();
    let rows: Vec<Vec<String>> = rows
        .iter()
        .map(|row| Some(row.as_array()?.iter().map(cell_text).collect()))
        .collect::<Option<_>>()?;

    Some(NormalizedTable { columns, rows })
}

/// Render one JSON value as cell text. Strings pass through unquoted;
/// numbers and booleans keep their literal spelling; null becomes the empty
/// string; anything nested keeps its JSON rendering.
fn cell_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
