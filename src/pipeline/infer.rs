//! Inference dispatch: send one encoded tile to the vision provider.
//!
//! The provider is a black box with unpredictable latency and occasional
//! failure; this module's job is to isolate that failure domain per unit.
//! [`dispatch_unit`] always returns a [`UnitResult`] — never `Err` — so a
//! single bad tile cannot abort sibling dispatches in flight. Callers check
//! `result.error` to decide what to do with the unit.
//!
//! ## Retry strategy
//!
//! HTTP 429 / 503 errors are transient and frequent under concurrent load.
//! Exponential backoff (`retry_backoff_ms * 2^attempt`) avoids thundering
//! herd: with the 500 ms default and 3 retries the wait sequence is
//! 500 ms → 1 s → 2 s. Each attempt additionally runs under the per-call
//! timeout from the configuration, so a hung connection costs at most
//! `api_timeout_secs` rather than blocking the pipeline indefinitely.

use crate::config::ConversionConfig;
use crate::error::UnitError;
use crate::output::{Provenance, UnitResult};
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider};
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, warn};

/// What the last failed attempt looked like, for choosing the final error tag.
enum AttemptFailure {
    TimedOut,
    Empty,
    Api(String),
}

/// Dispatch one unit to the provider and collect its raw text.
///
/// ## Message layout
///
/// 1. **System message** — the resolved instruction (preset or custom)
/// 2. **User message** — the encoded tile as an image attachment (empty text)
///
/// The empty user text is intentional: vision APIs require at least one user
/// turn to respond to, but the image carries all the actual content.
pub async fn dispatch_unit(
    provider: &Arc<dyn LLMProvider>,
    provenance: Provenance,
    asset: ImageData,
    instruction: &str,
    config: &ConversionConfig,
) -> UnitResult {
    let start = Instant::now();
    let unit = format!(
        "page {} tile ({},{})",
        provenance.page + 1,
        provenance.row,
        provenance.col
    );

    let messages = vec![
        ChatMessage::system(instruction),
        ChatMessage::user_with_images("", vec![asset]),
    ];

    let options = build_options(config);
    let call_timeout = Duration::from_secs(config.api_timeout_secs);

    let mut last_failure: Option<AttemptFailure> = None;

    for attempt in 0..=config.max_retries {
        if attempt > 0 {
            let backoff = backoff_delay_ms(config.retry_backoff_ms, attempt);
            warn!(
                "{}: retry {}/{} after {}ms",
                unit, attempt, config.max_retries, backoff
            );
            sleep(Duration::from_millis(backoff)).await;
        }

        match timeout(call_timeout, provider.chat(&messages, Some(&options))).await {
            Err(_elapsed) => {
                warn!(
                    "{}: attempt {} timed out after {}s",
                    unit,
                    attempt + 1,
                    config.api_timeout_secs
                );
                last_failure = Some(AttemptFailure::TimedOut);
            }
            Ok(Err(e)) => {
                let err_msg = format!("{}", e);
                warn!("{}: attempt {} failed — {}", unit, attempt + 1, err_msg);
                last_failure = Some(AttemptFailure::Api(err_msg));
            }
            Ok(Ok(response)) => {
                if response.content.trim().is_empty() {
                    warn!("{}: attempt {} returned empty content", unit, attempt + 1);
                    last_failure = Some(AttemptFailure::Empty);
                    continue;
                }

                let duration = start.elapsed();
                debug!(
                    "{}: {} input tokens, {} output tokens, {:?}",
                    unit, response.prompt_tokens, response.completion_tokens, duration
                );

                return UnitResult {
                    provenance,
                    text: response.content,
                    input_tokens: response.prompt_tokens as usize,
                    output_tokens: response.completion_tokens as usize,
                    duration_ms: duration.as_millis() as u64,
                    retries: attempt as u8,
                    error: None,
                };
            }
        }
    }

    // All retries exhausted.
    let duration = start.elapsed();
    let error = match last_failure {
        Some(AttemptFailure::TimedOut) => UnitError::Timeout {
            page: provenance.page,
            row: provenance.row,
            col: provenance.col,
            secs: config.api_timeout_secs,
        },
        Some(AttemptFailure::Empty) => UnitError::EmptyResponse {
            page: provenance.page,
            row: provenance.row,
            col: provenance.col,
        },
        Some(AttemptFailure::Api(detail)) => UnitError::InferenceFailed {
            page: provenance.page,
            row: provenance.row,
            col: provenance.col,
            retries: config.max_retries as u8,
            detail,
        },
        None => UnitError::InferenceFailed {
            page: provenance.page,
            row: provenance.row,
            col: provenance.col,
            retries: config.max_retries as u8,
            detail: "Unknown error".into(),
        },
    };

    UnitResult {
        provenance,
        text: String::new(),
        input_tokens: 0,
        output_tokens: 0,
        duration_ms: duration.as_millis() as u64,
        retries: config.max_retries as u8,
        error: Some(error),
    }
}

/// Exponential backoff delay before retry `attempt` (1-based).
///
/// The exponent is capped so a caller-supplied retry count cannot overflow
/// the shift, and the multiply saturates rather than wrapping.
fn backoff_delay_ms(base_ms: u64, attempt: u32) -> u64 {
    let exp = attempt.saturating_sub(1).min(16);
    base_ms.saturating_mul(1u64 << exp)
}

/// Build `CompletionOptions` from the conversion config.
fn build_options(config: &ConversionConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_per_attempt() {
        assert_eq!(backoff_delay_ms(500, 1), 500);
        assert_eq!(backoff_delay_ms(500, 2), 1000);
        assert_eq!(backoff_delay_ms(500, 3), 2000);
    }

    #[test]
    fn backoff_never_overflows() {
        // Absurd retry counts must not panic or wrap; the delay plateaus.
        let capped = backoff_delay_ms(500, 17);
        assert_eq!(backoff_delay_ms(500, 1000), capped);
        assert_eq!(backoff_delay_ms(500, u32::MAX), capped);
        assert_eq!(backoff_delay_ms(u64::MAX, u32::MAX), u64::MAX);
    }

    #[test]
    fn build_options_defaults() {
        let config = ConversionConfig::default();
        let opts = build_options(&config);
        assert_eq!(opts.temperature, Some(0.1));
        assert_eq!(opts.max_tokens, Some(3000));
    }
}
