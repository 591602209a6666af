//! Error types for the planvision library.
//!
//! Two distinct error types reflect two distinct failure domains:
//!
//! * [`PlanVisionError`] — **Fatal**: the conversion cannot proceed at all
//!   (unreadable document, zero pages, a page too large to process, provider
//!   not configured). Returned as `Err(PlanVisionError)` from the top-level
//!   `convert*` functions; no partial result accompanies it.
//!
//! * [`UnitError`] — **Non-fatal**: one dispatched tile or page failed
//!   (inference timeout, rate limit, empty response) but its siblings are
//!   fine. Stored inside [`crate::output::UnitResult`] so the aggregate can
//!   carry the failure against its provenance instead of dropping the unit.
//!
//! Structured-table parse failures are in neither taxonomy: the normaliser
//! returns [`crate::output::ParseOutcome::Failure`] as a value, never an
//! error, so callers can always inspect the raw model output.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the planvision library.
///
/// Per-unit failures use [`UnitError`] and are stored in
/// [`crate::output::UnitResult`] rather than propagated here.
#[derive(Debug, Error)]
pub enum PlanVisionError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("Document not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'")]
    PermissionDenied { path: PathBuf },

    /// The input string is not a valid file path or URL.
    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'")]
    DownloadTimeout { url: String, secs: u64 },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    // ── Document errors ───────────────────────────────────────────────────
    /// Document structure is corrupt and cannot be parsed.
    #[error("Document '{path}' is corrupt: {detail}")]
    CorruptDocument { path: PathBuf, detail: String },

    /// Document requires a password but none was provided.
    #[error("Document '{path}' is encrypted and requires a password.")]
    PasswordRequired { path: PathBuf },

    /// A password was provided but it is wrong.
    #[error("Wrong password for document '{path}'")]
    WrongPassword { path: PathBuf },

    /// Rasterisation produced zero pages — corrupt or empty input.
    #[error("Document '{path}' yielded no pages; input is empty or corrupt")]
    NoPages { path: PathBuf },

    /// Selected page numbers exceed the actual page count.
    #[error("Page {page} is out of range (document has {total} pages)")]
    PageOutOfRange { page: usize, total: usize },

    /// pdfium returned an error for a specific page.
    #[error("Rasterisation failed for page {page}: {detail}")]
    RasterisationFailed { page: usize, detail: String },

    /// A page exceeds safe processing bounds even after downsampling.
    #[error(
        "Page {page} is {width}x{height} px after downsampling, above the \
         safe processing limit of {limit} px total"
    )]
    PageTooLarge {
        page: usize,
        width: u32,
        height: u32,
        limit: u64,
    },

    // ── Inference errors ──────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("Vision provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// Every dispatched unit failed after all retries; output would be empty.
    #[error("All {total} units failed after {retries} retries each.\nFirst error: {first_error}")]
    AllUnitsFailed {
        total: usize,
        retries: u32,
        first_error: String,
    },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single dispatched unit (tile or page).
///
/// Stored alongside [`crate::output::UnitResult`] when a unit fails.
/// The overall conversion continues unless ALL units fail; any unit failure
/// marks the aggregate partial.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum UnitError {
    /// Image encoding failed before the unit could be dispatched.
    #[error("Page {page}, tile ({row},{col}): encoding failed: {detail}")]
    EncodeFailed {
        page: usize,
        row: u32,
        col: u32,
        detail: String,
    },

    /// Inference call failed after all retries.
    #[error("Page {page}, tile ({row},{col}): inference failed after {retries} retries: {detail}")]
    InferenceFailed {
        page: usize,
        row: u32,
        col: u32,
        retries: u8,
        detail: String,
    },

    /// Inference call exceeded the per-call timeout on every attempt.
    #[error("Page {page}, tile ({row},{col}): inference timed out after {secs}s")]
    Timeout {
        page: usize,
        row: u32,
        col: u32,
        secs: u64,
    },

    /// Provider returned an empty response on every attempt.
    #[error("Page {page}, tile ({row},{col}): provider returned an empty response")]
    EmptyResponse { page: usize, row: u32, col: u32 },
}
