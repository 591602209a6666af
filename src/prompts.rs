//! Instruction templates sent alongside each dispatched tile.
//!
//! Centralising every instruction here serves two purposes:
//!
//! 1. **Single source of truth** — the presets are a closed set; changing a
//!    template requires editing exactly one place, and there is exactly one
//!    override channel ([`crate::config::ConversionConfig::custom_instruction`]).
//!
//! 2. **Testability** — unit tests can inspect the resolved instruction
//!    without a live provider, so prompt regressions are caught cheaply.

use crate::config::{ConversionConfig, InstructionPreset, OutputShape};

/// Basic preset: plain transcription and description.
pub const BASIC_INSTRUCTION: &str = r#"You are reading one region of a technical document page.

Transcribe all visible text completely and accurately, preserving reading
order. Briefly describe any non-text content (drawings, symbols, stamps)
inline where it appears. Output plain text only, with no commentary."#;

/// Extended preset: transcription plus annotations and dimensions.
pub const EXTENDED_INSTRUCTION: &str = r#"You are reading one region of a technical document page.

1. Transcribe all visible text completely and accurately, preserving reading order.
2. Include every annotation, callout, dimension, and legend entry you can see.
3. Note revision clouds, section markers, and reference bubbles with their labels.
4. Briefly describe non-text content (drawings, diagrams, stamps) inline.

Output plain text only, with no commentary."#;

/// Engineering preset: drawing-set take-off.
pub const ENGINEERING_INSTRUCTION: &str = r#"You are reading one region of an engineering drawing sheet.

1. Identify the sheet content visible in this region: title-block fields,
   schedules, plan/section/detail views, general notes.
2. Transcribe all text accurately: dimensions with units, grid references,
   detail and section callouts, material specifications.
3. For schedules and tables, list every row you can see, keeping columns
   aligned with their headers.
4. For drawn components (beams, columns, ducts, fixtures), name the component
   and its tag or mark where labelled.

Output plain text only, with no commentary."#;

/// Appended to the instruction when the caller asked for a structured table.
///
/// The normaliser tolerates prose and fences around the object, but the
/// instruction still asks for bare JSON to keep the failure rate down.
pub const TABLE_SCHEMA_SUFFIX: &str = r#"

FINAL OUTPUT FORMAT
Return one JSON object and nothing else:
{"columns": ["...", ...], "rows": [["...", ...], ...]}
"columns" holds the column headers in order; each entry of "rows" holds one
row's cell values in the same order. Use only data actually visible in the
image — do not invent columns or rows. Do not wrap the object in code fences."#;

/// Resolve the instruction text for a conversion: custom override when set,
/// otherwise the selected preset, with the table-schema suffix appended in
/// table mode.
pub fn resolve_instruction(config: &ConversionConfig) -> String {
    let base = match &config.custom_instruction {
        Some(text) => text.as_str(),
        None => match config.preset {
            InstructionPreset::Basic => BASIC_INSTRUCTION,
            InstructionPreset::Extended => EXTENDED_INSTRUCTION,
            InstructionPreset::Engineering => ENGINEERING_INSTRUCTION,
        },
    };

    if config.output_shape == OutputShape::Table {
        format!("{base}{TABLE_SCHEMA_SUFFIX}")
    } else {
        base.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preset_resolution() {
        let mut config = ConversionConfig::default();
        config.preset = InstructionPreset::Engineering;
        assert_eq!(resolve_instruction(&config), ENGINEERING_INSTRUCTION);
    }

    #[test]
    fn custom_overrides_preset() {
        let mut config = ConversionConfig::default();
        config.preset = InstructionPreset::Extended;
        config.custom_instruction = Some("List every door tag.".into());
        assert_eq!(resolve_instruction(&config), "List every door tag.");
    }

    #[test]
    fn table_mode_appends_schema() {
        let mut config = ConversionConfig::default();
        config.output_shape = OutputShape::Table;
        let resolved = resolve_instruction(&config);
        assert!(resolved.starts_with(BASIC_INSTRUCTION));
        assert!(resolved.contains("\"columns\""));
    }

    #[test]
    fn table_mode_suffixes_custom_text_too() {
        let mut config = ConversionConfig::default();
        config.output_shape = OutputShape::Table;
        config.custom_instruction = Some("Extract the door schedule.".into());
        let resolved = resolve_instruction(&config);
        assert!(resolved.starts_with("Extract the door schedule."));
        assert!(resolved.contains("FINAL OUTPUT FORMAT"));
    }
}
