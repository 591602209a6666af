//! Pipeline stages for document-to-vision conversion.
//!
//! Each submodule implements exactly one transformation step.
//! Keeping stages separate makes each independently testable and lets us
//! swap implementations (e.g. switch rendering backend) without touching
//! other stages.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ render ──▶ [canvas] ──▶ tile ──▶ encode ──▶ infer ──▶ normalize
//! (path/URL)  (pdfium)   (stack)    (grid)   (base64)   (VLM)     (table)
//! ```
//!
//! 1. [`input`]     — canonicalise the user-supplied path or URL to a local file
//! 2. [`render`]    — rasterise selected pages with a memory-bounding
//!    downsample cap; runs in `spawn_blocking` because pdfium is not async-safe
//! 3. [`canvas`]    — (canvas layout only) stack all pages into one tall bitmap
//! 4. [`tile`]      — partition oversized bitmaps into a row-major grid with
//!    recorded provenance
//! 5. [`encode`]    — PNG/JPEG-encode and base64-wrap each tile
//! 6. [`infer`]     — drive the vision call with retry/backoff/timeout; the
//!    only stage with network I/O
//! 7. [`normalize`] — extract a strict table from raw model text, tolerating
//!    fences and prose, never raising

pub mod canvas;
pub mod encode;
pub mod infer;
pub mod input;
pub mod normalize;
pub mod render;
pub mod tile;
