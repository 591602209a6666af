//! # planvision
//!
//! Read paginated documents — technical drawing sets, plans, forms — with
//! Vision Language Models, despite the models' bounded input size.
//!
//! ## Why this crate?
//!
//! A drawing sheet is an image problem, not a text problem: title blocks,
//! schedules, dimension strings, and callouts are drawn, and text-layer
//! extraction gets little or nothing off them. A vision model can read a
//! sheet like a human — but only up to its input ceiling (pixel dimensions,
//! payload size, token budget), which a full-resolution A0 sheet blows
//! through immediately. This crate rasterises each page, bounds its memory
//! with a downsample cap, partitions anything still oversized into an
//! exact grid of tiles, dispatches tiles concurrently, and reassembles the
//! answers in document order — as free text or a strict `{columns, rows}`
//! table.
//!
//! ## Pipeline Overview
//!
//! ```text
//! Document
//!  │
//!  ├─ 1. Input      resolve local file or download from URL
//!  ├─ 2. Render     rasterise pages via pdfium (CPU-bound, spawn_blocking)
//!  ├─ 3. Canvas     (optional) stack all pages into one tall bitmap
//!  ├─ 4. Tile       row-major grid, exact partition, recorded provenance
//!  ├─ 5. Encode     PNG/JPEG → base64 ImageData
//!  ├─ 6. Infer      concurrent vision calls with retry/backoff/timeout
//!  └─ 7. Aggregate  provenance-ordered text, or normalised table
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use planvision::{convert, ConversionConfig, InstructionPreset, OutputShape};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / …
//!     let config = ConversionConfig::builder()
//!         .preset(InstructionPreset::Engineering)
//!         .output_shape(OutputShape::Table)
//!         .build()?;
//!     let output = convert("drawing-set.pdf", &config).await?;
//!     if output.stats.partial {
//!         eprintln!("{} units failed", output.stats.failed_units);
//!     }
//!     println!("{}", serde_json::to_string_pretty(&output.shaped_json())?);
//!     Ok(())
//! }
//! ```
//!
//! ## Failure semantics
//!
//! | Failure | Behaviour |
//! |---------|-----------|
//! | Unreadable / zero-page document | `Err(PlanVisionError)` — request aborts |
//! | Page too large after downsampling | `Err(PlanVisionError)` — request aborts |
//! | One tile's inference fails | Recorded against its provenance, siblings continue, `stats.partial = true` |
//! | Every tile fails | `Err(PlanVisionError::AllUnitsFailed)` |
//! | Table extraction fails | `ParseOutcome::Failure { raw, reason }` — a value, never a panic |
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `planvision` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! planvision = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{
    ConversionConfig, ConversionConfigBuilder, EncodeFormat, InstructionPreset, LayoutMode,
    OutputShape, PageSelection,
};
pub use convert::{convert, convert_from_bytes, convert_sync, inspect};
pub use error::{PlanVisionError, UnitError};
pub use output::{
    ConversionOutput, ConversionStats, DocumentMetadata, NormalizedTable, ParseOutcome,
    Provenance, TileRect, UnitResult,
};
pub use progress::{ConversionProgressCallback, NoopProgressCallback, ProgressCallback};
