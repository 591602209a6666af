//! CLI binary for planvision.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `ConversionConfig` and prints results in the selected shape.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use planvision::{
    convert, inspect, ConversionConfig, ConversionProgressCallback, EncodeFormat,
    InstructionPreset, LayoutMode, OutputShape, PageSelection, ProgressCallback,
};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: one bar over all dispatched units, correct
/// when units complete out of order under concurrency.
struct CliProgressCallback {
    bar: ProgressBar,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0); // length set in on_conversion_start
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Rendering pages…");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self {
            bar,
            errors: AtomicUsize::new(0),
        })
    }
}

impl ConversionProgressCallback for CliProgressCallback {
    fn on_conversion_start(&self, total_units: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  [{bar:42.green/238}] {pos:>3}/{len} units  ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar());
        self.bar.set_length(total_units as u64);
        self.bar.set_style(style);
        self.bar.set_prefix("Reading");
    }

    fn on_unit_start(&self, unit_num: usize, _total: usize) {
        self.bar.set_message(format!("unit {unit_num}"));
    }

    fn on_unit_complete(&self, _unit_num: usize, _total: usize, _text_len: usize) {
        self.bar.inc(1);
    }

    fn on_unit_error(&self, unit_num: usize, _total: usize, error: &str) {
        self.errors.fetch_add(1, Ordering::SeqCst);
        let msg = if error.chars().count() > 80 {
            let cut: String = error.chars().take(79).collect();
            format!("{cut}…")
        } else {
            error.to_string()
        };
        self.bar.println(format!("  ✗ unit {unit_num}: {msg}"));
        self.bar.inc(1);
    }

    fn on_conversion_complete(&self, total_units: usize, success_count: usize) {
        self.bar.finish_and_clear();
        let failed = total_units.saturating_sub(success_count);
        if failed == 0 {
            eprintln!("✔ {success_count} units read successfully");
        } else {
            eprintln!("⚠ {success_count}/{total_units} units read ({failed} failed — partial result)");
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Read a drawing set, combined text to stdout
  planvision site-plan.pdf

  # Door schedule as a strict table
  planvision --preset engineering --shape table schedule.pdf

  # Whole document as one stacked canvas, tiled
  planvision --layout canvas long-form.pdf

  # Custom instruction, JPEG transport, specific pages
  planvision --instruction "List every valve tag." --format jpeg --quality 80 --pages 2-5 pid.pdf

  # Inspect metadata (no API key needed)
  planvision --inspect-only set.pdf

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
  PDFIUM_LIB_PATH         Path to an existing libpdfium
"#;

/// Read paginated documents with Vision LLMs.
#[derive(Parser, Debug)]
#[command(
    name = "planvision",
    version,
    about = "Rasterise, tile, and read paginated documents with Vision LLMs",
    arg_required_else_help = true,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local document path or HTTP/HTTPS URL.
    input: String,

    /// Write the result to this file instead of stdout.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output shape: combined, per-page, per-tile, table.
    #[arg(long, value_enum, default_value = "combined")]
    shape: ShapeArg,

    /// Layout mode: per-page, canvas.
    #[arg(long, value_enum, default_value = "per-page")]
    layout: LayoutArg,

    /// Instruction preset: basic, extended, engineering.
    #[arg(long, value_enum, default_value = "basic")]
    preset: PresetArg,

    /// Free-text instruction override (replaces the preset).
    #[arg(long)]
    instruction: Option<String>,

    /// Rendering DPI (72–400).
    #[arg(long, default_value_t = 150,
          value_parser = clap::value_parser!(u32).range(72..=400))]
    dpi: u32,

    /// Maximum rendered page dimension in pixels.
    #[arg(long, default_value_t = 4000)]
    max_page_pixels: u32,

    /// Maximum tile dimension in pixels.
    #[arg(long, default_value_t = 2000)]
    tile_pixels: u32,

    /// Transport encoding: png, jpeg.
    #[arg(long, value_enum, default_value = "png")]
    format: FormatArg,

    /// JPEG quality (1–95, jpeg format only).
    #[arg(long, default_value_t = 85)]
    quality: u8,

    /// Page selection: all, 5, 3-15, or 1,3,5,7.
    #[arg(long, default_value = "all")]
    pages: String,

    /// LLM model ID (e.g. gpt-4o).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// Number of concurrent inference calls.
    #[arg(short, long, default_value_t = 8)]
    concurrency: usize,

    /// Max LLM output tokens per unit.
    #[arg(long, default_value_t = 3000)]
    max_tokens: usize,

    /// Retries per unit on inference failure.
    #[arg(long, default_value_t = 3)]
    max_retries: u32,

    /// Per-call inference timeout in seconds.
    #[arg(long, default_value_t = 60)]
    api_timeout: u64,

    /// Document password for encrypted PDFs.
    #[arg(long)]
    password: Option<String>,

    /// Print the result as shaped JSON even for the combined shape.
    #[arg(long)]
    json: bool,

    /// Print document metadata only, no conversion.
    #[arg(long)]
    inspect_only: bool,

    /// Disable the progress bar.
    #[arg(long)]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long)]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long)]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Debug)]
enum ShapeArg {
    Combined,
    PerPage,
    PerTile,
    Table,
}

#[derive(clap::ValueEnum, Clone, Debug)]
enum LayoutArg {
    PerPage,
    Canvas,
}

#[derive(clap::ValueEnum, Clone, Debug)]
enum PresetArg {
    Basic,
    Extended,
    Engineering,
}

#[derive(clap::ValueEnum, Clone, Debug)]
enum FormatArg {
    Png,
    Jpeg,
}

impl From<ShapeArg> for OutputShape {
    fn from(v: ShapeArg) -> Self {
        match v {
            ShapeArg::Combined => OutputShape::Combined,
            ShapeArg::PerPage => OutputShape::PerPage,
            ShapeArg::PerTile => OutputShape::PerTile,
            ShapeArg::Table => OutputShape::Table,
        }
    }
}

impl From<LayoutArg> for LayoutMode {
    fn from(v: LayoutArg) -> Self {
        match v {
            LayoutArg::PerPage => LayoutMode::PerPage,
            LayoutArg::Canvas => LayoutMode::Canvas,
        }
    }
}

impl From<PresetArg> for InstructionPreset {
    fn from(v: PresetArg) -> Self {
        match v {
            PresetArg::Basic => InstructionPreset::Basic,
            PresetArg::Extended => InstructionPreset::Extended,
            PresetArg::Engineering => InstructionPreset::Engineering,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Suppress INFO-level library logs when the progress bar is active.
    let show_progress = !cli.quiet && !cli.no_progress;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Inspect-only mode ────────────────────────────────────────────────
    if cli.inspect_only {
        let meta = inspect(&cli.input)
            .await
            .context("Failed to inspect document")?;
        println!(
            "{}",
            serde_json::to_string_pretty(&meta).context("Failed to serialise metadata")?
        );
        return Ok(());
    }

    // ── Build config and run ─────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn ConversionProgressCallback>)
    } else {
        None
    };

    let config = build_config(&cli, progress_cb)?;

    let output = match convert(&cli.input, &config).await {
        Ok(output) => output,
        Err(e) => {
            // Fatal failures keep the documented error shape on stdout.
            println!(
                "{}",
                serde_json::json!({ "error": e.to_string() })
            );
            std::process::exit(1);
        }
    };

    let rendered = match config.output_shape {
        OutputShape::Combined if !cli.json => output.text.clone(),
        _ => serde_json::to_string_pretty(&output.shaped_json())
            .context("Failed to serialise output")?,
    };

    if let Some(ref path) = cli.output {
        tokio::fs::write(path, rendered.as_bytes())
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
        if !cli.quiet {
            eprintln!(
                "Wrote {} ({} units, {}ms)",
                path.display(),
                output.stats.processed_units,
                output.stats.total_duration_ms
            );
        }
    } else {
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        handle
            .write_all(rendered.as_bytes())
            .context("Failed to write to stdout")?;
        if !rendered.ends_with('\n') {
            handle.write_all(b"\n").ok();
        }
    }

    if !cli.quiet && !show_progress {
        eprintln!(
            "{}/{} units in {}ms ({} tokens in / {} tokens out)",
            output.stats.processed_units,
            output.stats.total_units,
            output.stats.total_duration_ms,
            output.stats.total_input_tokens,
            output.stats.total_output_tokens,
        );
    }

    Ok(())
}

/// Map CLI args to `ConversionConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ConversionConfig> {
    let pages = parse_pages(&cli.pages)?;

    let encode_format = match cli.format {
        FormatArg::Png => EncodeFormat::Png,
        FormatArg::Jpeg => EncodeFormat::Jpeg {
            quality: cli.quality,
        },
    };

    let mut builder = ConversionConfig::builder()
        .dpi(cli.dpi)
        .max_page_pixels(cli.max_page_pixels)
        .max_tile_pixels(cli.tile_pixels)
        .layout(cli.layout.clone().into())
        .output_shape(cli.shape.clone().into())
        .preset(cli.preset.clone().into())
        .encode_format(encode_format)
        .concurrency(cli.concurrency)
        .max_tokens(cli.max_tokens)
        .max_retries(cli.max_retries)
        .api_timeout_secs(cli.api_timeout)
        .pages(pages);

    if let Some(ref text) = cli.instruction {
        builder = builder.custom_instruction(text.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    let mut config = builder.build().context("Invalid configuration")?;

    config.model = cli.model.clone();
    config.provider_name = cli.provider.clone();
    config.password = cli.password.clone();

    Ok(config)
}

/// Parse `--pages` string into `PageSelection`.
fn parse_pages(s: &str) -> Result<PageSelection> {
    let s = s.trim().to_lowercase();

    if s == "all" {
        return Ok(PageSelection::All);
    }

    if let Some((start, end)) = s.split_once('-') {
        let start: usize = start.trim().parse().context("Invalid start page in range")?;
        let end: usize = end.trim().parse().context("Invalid end page in range")?;
        if start < 1 {
            anyhow::bail!("Pages are 1-indexed, minimum is 1 (got {})", start);
        }
        if start > end {
            anyhow::bail!("Invalid page range '{}-{}': start must be <= end", start, end);
        }
        return Ok(PageSelection::Range(start, end));
    }

    if s.contains(',') {
        let pages: Vec<usize> = s
            .split(',')
            .map(|p| {
                p.trim()
                    .parse::<usize>()
                    .context(format!("Invalid page number: '{}'", p.trim()))
            })
            .collect::<Result<Vec<_>>>()?;
        for &p in &pages {
            if p < 1 {
                anyhow::bail!("Pages are 1-indexed, minimum is 1 (got {})", p);
            }
        }
        return Ok(PageSelection::Set(pages));
    }

    let page: usize = s.parse().context("Invalid page number")?;
    if page < 1 {
        anyhow::bail!("Pages are 1-indexed, minimum is 1 (got {})", page);
    }
    Ok(PageSelection::Single(page))
}
