//! Pipeline stages behind the session controller.
//!
//! Each submodule implements exactly one step, so each is testable on its
//! own and the two network-facing stages can be swapped for in-process fakes.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ parse ──▶ analyze ──▶ transform ──▶ postprocess
//! (bytes)  (LlamaParse) (heuristics)   (LLM)       (cleanup)
//! ```
//!
//! 1. [`input`]: load a path or URL into an [`input::Upload`] and reject
//!    anything that is not a PDF before a network call happens
//! 2. [`parse`]: upload to the parsing service, poll the job, fetch text
//!    and images
//! 3. [`analyze`]: language, table and image detection
//! 4. [`transform`]: one chat completion per instruction, with optional retry
//! 5. [`postprocess`]: deterministic cleanup of model output

pub mod analyze;
pub mod input;
pub mod parse;
pub mod postprocess;
pub mod transform;

use crate::config::ClientConfig;
use crate::error::SmartPdfError;
use std::future::Future;
use tokio::time::{sleep, Duration};
use tracing::warn;

/// Run `op` and retry retryable failures up to `config.max_retries` times.
///
/// The delay doubles each attempt (`retry_backoff_ms * 2^(attempt-1)`);
/// a server-sent `Retry-After` takes precedence when it is longer.
pub(crate) async fn with_retry<T, F, Fut>(
    config: &ClientConfig,
    what: &str,
    mut op: F,
) -> Result<T, SmartPdfError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, SmartPdfError>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(v) => return Ok(v),
            Err(e) if e.is_retryable() && attempt < config.max_retries => {
                attempt += 1;
                let server_ms = e.retry_after_secs().map(|s| s * 1000).unwrap_or(0);
                let delay = config.backoff_for(attempt).max(server_ms);
                warn!(
                    "{}: retry {}/{} after {}ms: {}",
                    what, attempt, config.max_retries, delay, e
                );
                if let Some(ref cb) = config.progress_callback {
                    cb.on_retry(attempt, config.max_retries, delay, &e.to_string());
                }
                sleep(Duration::from_millis(delay)).await;
            }
            Err(e) => return Err(e),
        }
    }
}
