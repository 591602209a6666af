//! Configuration types for a conversion request.
//!
//! All pipeline behaviour is controlled through [`ConversionConfig`], built
//! via its [`ConversionConfigBuilder`]. One explicit record replaces the
//! spread of near-identical request handlers this design grew out of: every
//! knob (density, tiling policy, layout mode, encode format, instruction
//! preset, output shape) lives here and is passed into the pipeline — there
//! is no process-wide mutable state.
//!
//! # Design choice: builder over constructor
//! A twenty-field constructor is unreadable and breaks on every new field.
//! The builder lets callers set only what they care about and rely on
//! documented defaults for the rest.

use crate::error::PlanVisionError;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Configuration for one document conversion.
///
/// Built via [`ConversionConfig::builder()`] or using
/// [`ConversionConfig::default()`].
///
/// # Example
/// ```rust
/// use planvision::{ConversionConfig, InstructionPreset, OutputShape};
///
/// let config = ConversionConfig::builder()
///     .dpi(150)
///     .max_tile_pixels(2000)
///     .preset(InstructionPreset::Engineering)
///     .output_shape(OutputShape::Table)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ConversionConfig {
    /// Rendering DPI used when rasterising each page. Range: 72–400. Default: 150.
    ///
    /// 150 DPI keeps line work sharp enough for a vision model to follow
    /// while staying well below typical API upload limits. Increase to
    /// 200–300 for dense small-text sheets.
    pub dpi: u32,

    /// Maximum rendered page dimension (width or height) in pixels. Default: 4000.
    ///
    /// A safety cap independent of DPI. A 300-DPI render of an A0 sheet can
    /// reach 14 000 px on the long edge and exhaust memory; any page above
    /// this cap is downsampled (Lanczos3) so its longest edge equals the cap,
    /// preserving aspect ratio.
    pub max_page_pixels: u32,

    /// Maximum tile dimension in pixels. Default: 2000.
    ///
    /// Pages (or the canvas) larger than this in either dimension are cut
    /// into a row-major grid of tiles no larger than this cap. Tiling exists
    /// purely to respect the provider's input-size ceiling; peak memory per
    /// in-flight unit is bounded by this value squared.
    pub max_tile_pixels: u32,

    /// Page layout mode. Default: [`LayoutMode::PerPage`].
    pub layout: LayoutMode,

    /// Output shape selector. Default: [`OutputShape::Combined`].
    pub output_shape: OutputShape,

    /// Encode format for dispatched tiles. Default: [`EncodeFormat::Png`].
    pub encode_format: EncodeFormat,

    /// Built-in instruction preset. Default: [`InstructionPreset::Basic`].
    pub preset: InstructionPreset,

    /// Free-text instruction override. When set, the preset is ignored
    /// (the table-schema suffix is still appended in table mode).
    pub custom_instruction: Option<String>,

    /// Number of concurrent inference calls. Default: 8.
    ///
    /// Vision APIs are network-bound; dispatching tiles in parallel cuts
    /// wall-clock time roughly linearly until the provider rate-limits.
    pub concurrency: usize,

    /// LLM model identifier, e.g. "gpt-4o". If None, uses provider default.
    pub model: Option<String>,

    /// Provider name (e.g. "openai", "anthropic", "ollama").
    pub provider_name: Option<String>,

    /// Pre-constructed provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature. Default: 0.1 — transcription wants determinism.
    pub temperature: f32,

    /// Maximum tokens the model may generate per unit. Default: 3000.
    pub max_tokens: usize,

    /// Maximum retry attempts on a transient inference failure. Default: 3.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds (exponential backoff). Default: 500.
    pub retry_backoff_ms: u64,

    /// Document password for encrypted PDFs.
    pub password: Option<String>,

    /// Page selection. Default: all pages.
    pub pages: PageSelection,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Per-inference-call timeout in seconds. Default: 60.
    pub api_timeout_secs: u64,

    /// Optional per-unit progress callback.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            dpi: 150,
            max_page_pixels: 4000,
            max_tile_pixels: 2000,
            layout: LayoutMode::default(),
            output_shape: OutputShape::default(),
            encode_format: EncodeFormat::default(),
            preset: InstructionPreset::default(),
            custom_instruction: None,
            concurrency: 8,
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.1,
            max_tokens: 3000,
            max_retries: 3,
            retry_backoff_ms: 500,
            password: None,
            pages: PageSelection::default(),
            download_timeout_secs: 120,
            api_timeout_secs: 60,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ConversionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionConfig")
            .field("dpi", &self.dpi)
            .field("max_page_pixels", &self.max_page_pixels)
            .field("max_tile_pixels", &self.max_tile_pixels)
            .field("layout", &self.layout)
            .field("output_shape", &self.output_shape)
            .field("encode_format", &self.encode_format)
            .field("preset", &self.preset)
            .field("custom_instruction", &self.custom_instruction)
            .field("concurrency", &self.concurrency)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_retries", &self.max_retries)
            .field("pages", &self.pages)
            .finish()
    }
}

impl ConversionConfig {
    /// Create a new builder for `ConversionConfig`.
    pub fn builder() -> ConversionConfigBuilder {
        ConversionConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ConversionConfig`].
#[derive(Debug)]
pub struct ConversionConfigBuilder {
    config: ConversionConfig,
}

impl ConversionConfigBuilder {
    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi.clamp(72, 400);
        self
    }

    pub fn max_page_pixels(mut self, px: u32) -> Self {
        self.config.max_page_pixels = px.max(100);
        self
    }

    pub fn max_tile_pixels(mut self, px: u32) -> Self {
        self.config.max_tile_pixels = px.max(100);
        self
    }

    pub fn layout(mut self, layout: LayoutMode) -> Self {
        self.config.layout = layout;
        self
    }

    pub fn output_shape(mut self, shape: OutputShape) -> Self {
        self.config.output_shape = shape;
        self
    }

    pub fn encode_format(mut self, format: EncodeFormat) -> Self {
        self.config.encode_format = format.clamped();
        self
    }

    pub fn preset(mut self, preset: InstructionPreset) -> Self {
        self.config.preset = preset;
        self
    }

    pub fn custom_instruction(mut self, text: impl Into<String>) -> Self {
        self.config.custom_instruction = Some(text.into());
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn pages(mut self, selection: PageSelection) -> Self {
        self.config.pages = selection;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ConversionConfig, PlanVisionError> {
        let c = &self.config;
        if c.dpi < 72 || c.dpi > 400 {
            return Err(PlanVisionError::InvalidConfig(format!(
                "DPI must be 72–400, got {}",
                c.dpi
            )));
        }
        if c.concurrency == 0 {
            return Err(PlanVisionError::InvalidConfig(
                "Concurrency must be ≥ 1".into(),
            ));
        }
        if c.max_tile_pixels == 0 {
            return Err(PlanVisionError::InvalidConfig(
                "Tile dimension must be ≥ 1".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// How page bitmaps are arranged before tiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayoutMode {
    /// Each page is tiled and dispatched independently (default).
    #[default]
    PerPage,
    /// All pages are stacked vertically into one canvas bitmap first.
    /// Use when the document must be read as a single continuous image
    /// (e.g. a schedule that spans page breaks).
    Canvas,
}

/// Which output the caller wants back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputShape {
    /// One combined text: all unit texts joined in provenance order (default).
    #[default]
    Combined,
    /// One text per page.
    PerPage,
    /// One text per tile.
    PerTile,
    /// A strict `{columns, rows}` table extracted from the model output.
    Table,
}

/// Transport encoding for dispatched tiles.
///
/// PNG is the default because it is lossless: compression artefacts on fine
/// line-art confuse vision models exactly where precision matters most.
/// JPEG trades fidelity for payload size and must be opted into explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EncodeFormat {
    /// Lossless PNG (default).
    Png,
    /// Lossy JPEG with the given quality, clamped to 1–95.
    Jpeg { quality: u8 },
}

impl Default for EncodeFormat {
    fn default() -> Self {
        EncodeFormat::Png
    }
}

impl EncodeFormat {
    /// Return the same format with the JPEG quality clamped to 1–95.
    pub fn clamped(self) -> Self {
        match self {
            EncodeFormat::Png => EncodeFormat::Png,
            EncodeFormat::Jpeg { quality } => EncodeFormat::Jpeg {
                quality: quality.clamp(1, 95),
            },
        }
    }

    /// MIME type of the encoded asset.
    pub fn mime_type(&self) -> &'static str {
        match self {
            EncodeFormat::Png => "image/png",
            EncodeFormat::Jpeg { .. } => "image/jpeg",
        }
    }
}

/// Named instruction presets — a closed set, not free-form strings.
///
/// Each preset maps to a fixed instruction template in [`crate::prompts`].
/// Callers needing anything else use
/// [`ConversionConfigBuilder::custom_instruction`], the single explicit
/// override channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstructionPreset {
    /// Transcribe visible text and describe the sheet (default).
    #[default]
    Basic,
    /// Basic plus annotations, dimensions, and legend entries.
    Extended,
    /// Engineering take-off: drawing-set reading order, schedules,
    /// component identification.
    Engineering,
}

/// Specifies which pages of the document to convert.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub enum PageSelection {
    /// Convert all pages (default).
    #[default]
    All,
    /// Convert a single page (1-indexed).
    Single(usize),
    /// Convert a contiguous range of pages (1-indexed, inclusive).
    Range(usize, usize),
    /// Convert specific pages (1-indexed, deduplicated).
    Set(Vec<usize>),
}

impl PageSelection {
    /// Expand the selection into a sorted, deduplicated list of 0-indexed page numbers.
    pub fn to_indices(&self, total_pages: usize) -> Vec<usize> {
        let mut indices: Vec<usize> = match self {
            PageSelection::All => (0..total_pages).collect(),
            PageSelection::Single(p) => {
                if *p >= 1 && *p <= total_pages {
                    vec![p - 1]
                } else {
                    vec![]
                }
            }
            PageSelection::Range(start, end) => {
                let s = (*start).max(1) - 1;
                let e = (*end).min(total_pages);
                (s..e).collect()
            }
            PageSelection::Set(pages) => pages
                .iter()
                .filter(|&&p| p >= 1 && p <= total_pages)
                .map(|p| p - 1)
                .collect(),
        };
        indices.sort_unstable();
        indices.dedup();
        indices
    }

    /// The lowest 1-indexed page the selection asks for, for error messages
    /// when the whole selection falls outside the document.
    pub fn first_requested(&self) -> usize {
        match self {
            PageSelection::All => 1,
            PageSelection::Single(p) => *p,
            PageSelection::Range(start, _) => *start,
            PageSelection::Set(pages) => pages.iter().copied().min().unwrap_or(1),
        }
    }
}
