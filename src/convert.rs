//! Conversion entry points and per-request orchestration.
//!
//! One request moves through a fixed sequence of states:
//! received → rasterised → tiled (or canvas-built) → per-unit dispatch →
//! aggregated → done. `Done` always carries either a usable result or a
//! structured failure; units that failed stay in the output tagged with
//! their provenance, and the stats mark the aggregate partial. Nothing the
//! pipeline attempted is silently dropped.
//!
//! All staging (downloaded files, byte-stream temp files, bitmaps, encoded
//! assets) is scoped to the request and released on every exit path —
//! tempfiles via RAII drop, bitmaps when the locals go out of scope.

use crate::config::{ConversionConfig, LayoutMode, OutputShape};
use crate::error::{PlanVisionError, UnitError};
use crate::output::{ConversionOutput, ConversionStats, DocumentMetadata, ParseOutcome, UnitResult};
use crate::pipeline::{canvas, encode, infer, input, normalize, render, tile};
use crate::prompts;
use edgequake_llm::{ImageData, LLMProvider, ProviderFactory};
use futures::stream::{self, StreamExt};
use image::DynamicImage;
use std::io::Write;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Convert a document file or URL.
///
/// This is the primary entry point for the library.
///
/// # Arguments
/// * `input_str` — Local file path or HTTP/HTTPS URL to a PDF
/// * `config` — Conversion configuration
///
/// # Returns
/// `Ok(ConversionOutput)` on success, even if some units failed
/// (check `output.stats.partial`).
///
/// # Errors
/// Returns `Err(PlanVisionError)` only for fatal errors:
/// - File not found / not a valid PDF / zero pages
/// - A page too large to process even after downsampling
/// - No provider configured
/// - Every dispatched unit failed
pub async fn convert(
    input_str: impl AsRef<str>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, PlanVisionError> {
    let total_start = Instant::now();
    let input_str = input_str.as_ref();
    info!("Starting conversion: {}", input_str);

    // ── Resolve input and provider ───────────────────────────────────────
    let resolved = input::resolve_input(input_str, config.download_timeout_secs).await?;
    let doc_path = resolved.path().to_path_buf();

    let provider = resolve_provider(config)?;

    // ── Metadata and page selection ──────────────────────────────────────
    let metadata = render::extract_metadata(&doc_path, config.password.as_deref()).await?;
    let total_pages = metadata.page_count;
    if total_pages == 0 {
        return Err(PlanVisionError::NoPages { path: doc_path });
    }

    let page_indices = config.pages.to_indices(total_pages);
    if page_indices.is_empty() {
        return Err(PlanVisionError::PageOutOfRange {
            page: config.pages.first_requested(),
            total: total_pages,
        });
    }
    debug!("Selected {} pages for conversion", page_indices.len());

    // ── Rasterise ────────────────────────────────────────────────────────
    let render_start = Instant::now();
    let rendered = render::render_pages(&doc_path, config, &page_indices).await?;
    if rendered.is_empty() {
        return Err(PlanVisionError::NoPages { path: doc_path });
    }
    let render_duration_ms = render_start.elapsed().as_millis() as u64;
    info!(
        "Rendered {} pages in {}ms",
        rendered.len(),
        render_duration_ms
    );

    // ── Layout and tile ──────────────────────────────────────────────────
    let tiles = build_units(&rendered, config)?;
    drop(rendered);
    info!("Partitioned into {} units", tiles.len());

    // ── Encode ───────────────────────────────────────────────────────────
    // Encode failures become failed units rather than aborting: the unit
    // stays in the aggregate against its provenance.
    let mut failed_units: Vec<UnitResult> = Vec::new();
    let mut encoded: Vec<(crate::output::Provenance, ImageData)> = Vec::new();
    for (provenance, bitmap) in &tiles {
        match encode::encode_tile(bitmap, config.encode_format) {
            Ok(asset) => encoded.push((*provenance, asset)),
            Err(e) => failed_units.push(UnitResult {
                provenance: *provenance,
                text: String::new(),
                input_tokens: 0,
                output_tokens: 0,
                duration_ms: 0,
                retries: 0,
                error: Some(UnitError::EncodeFailed {
                    page: provenance.page,
                    row: provenance.row,
                    col: provenance.col,
                    detail: e.to_string(),
                }),
            }),
        }
    }
    drop(tiles);

    let total_units = encoded.len() + failed_units.len();
    if let Some(ref cb) = config.progress_callback {
        cb.on_conversion_start(total_units);
    }

    // ── Dispatch ─────────────────────────────────────────────────────────
    let instruction = prompts::resolve_instruction(config);
    let infer_start = Instant::now();
    let mut units = dispatch_concurrent(&provider, encoded, &instruction, config, total_units).await;
    let inference_duration_ms = infer_start.elapsed().as_millis() as u64;
    units.extend(failed_units);

    // ── Aggregate ────────────────────────────────────────────────────────
    let (text, table) = aggregate(&mut units, config.output_shape);

    let processed = units.iter().filter(|u| u.error.is_none()).count();
    let failed = units.len() - processed;

    if processed == 0 {
        let first_error = units
            .iter()
            .find_map(|u| u.error.as_ref())
            .map(|e| format!("{}", e))
            .unwrap_or_else(|| "Unknown error".to_string());
        return Err(PlanVisionError::AllUnitsFailed {
            total: units.len(),
            retries: config.max_retries,
            first_error,
        });
    }

    if let Some(ref cb) = config.progress_callback {
        cb.on_conversion_complete(total_units, processed);
    }

    let stats = ConversionStats {
        total_pages,
        total_units: units.len(),
        processed_units: processed,
        failed_units: failed,
        partial: failed > 0,
        total_input_tokens: units.iter().map(|u| u.input_tokens as u64).sum(),
        total_output_tokens: units.iter().map(|u| u.output_tokens as u64).sum(),
        render_duration_ms,
        inference_duration_ms,
        total_duration_ms: total_start.elapsed().as_millis() as u64,
    };

    info!(
        "Conversion complete: {}/{} units, {}ms total{}",
        processed,
        stats.total_units,
        stats.total_duration_ms,
        if stats.partial { " (partial)" } else { "" }
    );

    Ok(ConversionOutput {
        shape: config.output_shape,
        text,
        units,
        table,
        metadata,
        stats,
    })
}

/// Convert raw document bytes in memory.
///
/// This is the natural API when the document arrives as an uploaded byte
/// stream rather than a file on disk. The bytes are staged through a managed
/// [`tempfile`] that is deleted automatically on return or panic.
pub async fn convert_from_bytes(
    bytes: &[u8],
    config: &ConversionConfig,
) -> Result<ConversionOutput, PlanVisionError> {
    let mut tmp = tempfile::NamedTempFile::new()
        .map_err(|e| PlanVisionError::Internal(format!("tempfile: {e}")))?;
    tmp.write_all(bytes)
        .map_err(|e| PlanVisionError::Internal(format!("tempfile write: {e}")))?;
    let path = tmp.path().to_string_lossy().to_string();
    // `tmp` is dropped (and the file deleted) when `convert` returns
    convert(&path, config).await
}

/// Synchronous wrapper around [`convert`].
///
/// Creates a temporary tokio runtime internally.
pub fn convert_sync(
    input_str: impl AsRef<str>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, PlanVisionError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| PlanVisionError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(convert(input_str, config))
}

/// Extract document metadata without dispatching anything.
///
/// Does not require a provider or API key.
pub async fn inspect(input_str: impl AsRef<str>) -> Result<DocumentMetadata, PlanVisionError> {
    let resolved = input::resolve_input(input_str.as_ref(), 120).await?;
    let doc_path = resolved.path().to_path_buf();
    render::extract_metadata(&doc_path, None).await
}

// ── Internal helpers ─────────────────────────────────────────────────────

/// Apply the layout mode and cut everything into provenance-tagged tiles.
fn build_units(
    rendered: &[(usize, DynamicImage)],
    config: &ConversionConfig,
) -> Result<Vec<(crate::output::Provenance, DynamicImage)>, PlanVisionError> {
    match config.layout {
        LayoutMode::PerPage => Ok(rendered
            .iter()
            .flat_map(|(idx, bitmap)| tile::tile_page(bitmap, *idx, config.max_tile_pixels))
            .collect()),
        LayoutMode::Canvas => {
            let pages: Vec<DynamicImage> = rendered.iter().map(|(_, img)| img.clone()).collect();
            let stacked = canvas::stack_pages(&pages)?;
            // The canvas is a single synthetic page 0.
            Ok(tile::tile_page(&stacked, 0, config.max_tile_pixels))
        }
    }
}

/// Dispatch all encoded units with bounded concurrency.
///
/// Completion order is whatever the network gives us; the aggregator
/// re-establishes provenance order afterwards.
async fn dispatch_concurrent(
    provider: &Arc<dyn LLMProvider>,
    encoded: Vec<(crate::output::Provenance, ImageData)>,
    instruction: &str,
    config: &ConversionConfig,
    total_units: usize,
) -> Vec<UnitResult> {
    stream::iter(encoded.into_iter().enumerate().map(|(i, (provenance, asset))| {
        let provider = Arc::clone(provider);
        let config = config.clone();
        let instruction = instruction.to_string();
        let unit_num = i + 1;
        async move {
            if let Some(ref cb) = config.progress_callback {
                cb.on_unit_start(unit_num, total_units);
            }
            let result =
                infer::dispatch_unit(&provider, provenance, asset, &instruction, &config).await;
            if let Some(ref cb) = config.progress_callback {
                match &result.error {
                    None => cb.on_unit_complete(unit_num, total_units, result.text.len()),
                    Some(e) => cb.on_unit_error(unit_num, total_units, &e.to_string()),
                }
            }
            result
        }
    }))
    .buffer_unordered(config.concurrency)
    .collect()
    .await
}

/// Reassemble units in provenance order and derive the shaped outputs.
///
/// Sorting happens here — and only here — so the guarantee that results come
/// back in document order holds regardless of which concurrent dispatch
/// finished first. In table mode the combined text is normalised; scanning
/// the combined string finds the first valid object whether the model
/// answered once for the whole document or per tile.
fn aggregate(units: &mut [UnitResult], shape: OutputShape) -> (String, Option<ParseOutcome>) {
    units.sort_by_key(|u| u.provenance.order_key());

    let text = units
        .iter()
        .filter(|u| u.error.is_none())
        .map(|u| u.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");

    let table = match shape {
        OutputShape::Table => Some(normalize::normalize_table(&text)),
        _ => None,
    };

    (text, table)
}

/// Resolve the vision provider, from most-specific to least-specific.
///
/// The fallback chain lets library users and CLI users each set exactly as
/// much as they need:
///
/// 1. **Pre-built provider** (`config.provider`) — the caller constructed
///    and configured the provider entirely; we use it as-is. Useful in tests
///    or when the caller needs custom middleware.
///
/// 2. **Named provider + model** (`config.provider_name`) — reads the
///    corresponding API key (`OPENAI_API_KEY`, etc.) from the environment.
///
/// 3. **Environment pair** (`EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`) —
///    a provider and model chosen at the execution-environment level
///    (Makefile, CI). Checked before full auto-detection so the model choice
///    is honoured even when multiple API keys are present.
///
/// 4. **Full auto-detection** (`ProviderFactory::from_env`) — scans all
///    known API key variables and picks the first available provider.
fn resolve_provider(config: &ConversionConfig) -> Result<Arc<dyn LLMProvider>, PlanVisionError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        let model = config.model.as_deref().unwrap_or("gpt-4o");
        return create_vision_provider(name, model);
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_vision_provider(&prov, &model);
        }
    }

    // Prefer OpenAI explicitly when an OpenAI key is present, so users with
    // multiple provider keys get a stable default.
    if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
        if !openai_key.is_empty() {
            let model = config.model.as_deref().unwrap_or("gpt-4o");
            return create_vision_provider("openai", model);
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| PlanVisionError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No vision provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or configure a provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}

/// Instantiate a named provider with the given model.
fn create_vision_provider(
    provider_name: &str,
    model: &str,
) -> Result<Arc<dyn LLMProvider>, PlanVisionError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        PlanVisionError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}
