//! Progress-callback trait for per-unit conversion events.
//!
//! Inject an [`Arc<dyn ConversionProgressCallback>`] via
//! [`crate::config::ConversionConfigBuilder::progress_callback`] to receive
//! real-time events as the pipeline dispatches each tile or page.
//!
//! # Why callbacks instead of channels?
//!
//! The callback approach is the least-invasive integration point: callers can
//! forward events to a broadcast channel, a WebSocket, a database record, or
//! a terminal progress bar without the library knowing anything about how the
//! host application communicates. The trait is `Send + Sync` so it works
//! correctly when units are dispatched concurrently.

use std::sync::Arc;

/// Called by the conversion pipeline as it dispatches each unit.
///
/// Units are identified by their 1-based position in provenance order.
/// `on_unit_start`, `on_unit_complete`, and `on_unit_error` may be called
/// concurrently from different tasks; implementations must protect shared
/// mutable state. All methods have default no-op implementations so callers
/// only override what they care about.
pub trait ConversionProgressCallback: Send + Sync {
    /// Called once after tiling, before any unit is dispatched.
    fn on_conversion_start(&self, total_units: usize) {
        let _ = total_units;
    }

    /// Called just before the inference request is sent for a unit.
    fn on_unit_start(&self, unit_num: usize, total_units: usize) {
        let _ = (unit_num, total_units);
    }

    /// Called when a unit's raw text arrives.
    fn on_unit_complete(&self, unit_num: usize, total_units: usize, text_len: usize) {
        let _ = (unit_num, total_units, text_len);
    }

    /// Called when a unit fails after all retries are exhausted.
    fn on_unit_error(&self, unit_num: usize, total_units: usize, error: &str) {
        let _ = (unit_num, total_units, error);
    }

    /// Called once after all units have been attempted.
    fn on_conversion_complete(&self, total_units: usize, success_count: usize) {
        let _ = (total_units, success_count);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ConversionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ConversionConfig`].
pub type ProgressCallback = Arc<dyn ConversionProgressCallback>;
