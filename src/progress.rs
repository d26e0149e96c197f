//! Progress-callback trait for parse and transform status events.
//!
//! Inject an [`Arc<dyn SessionProgressCallback>`] via
//! [`crate::config::ClientConfigBuilder::progress_callback`] to receive events
//! while a parse job is uploaded, polled and its images fetched, and while a
//! transformation is in flight. The CLI forwards them to a spinner.
//!
//! # Example
//!
//! ```rust
//! use smart_pdf_parser::{ClientConfig, SessionProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingPolls(AtomicUsize);
//!
//! impl SessionProgressCallback for CountingPolls {
//!     fn on_job_status(&self, _job_id: &str, _status: &str) {
//!         self.0.fetch_add(1, Ordering::SeqCst);
//!     }
//! }
//!
//! let config = ClientConfig::builder()
//!     .progress_callback(Arc::new(CountingPolls(AtomicUsize::new(0))))
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the service clients as an action progresses.
///
/// All methods default to no-ops so callers only override what they need.
/// Image downloads run concurrently, so `on_image_fetched` may be called from
/// several tasks at once.
pub trait SessionProgressCallback: Send + Sync {
    /// The upload of `file_name` (`size` bytes) to the parse service starts.
    fn on_upload_start(&self, file_name: &str, size: usize) {
        let _ = (file_name, size);
    }

    /// A job status poll returned `status`.
    fn on_job_status(&self, job_id: &str, status: &str) {
        let _ = (job_id, status);
    }

    /// One image of `total` finished downloading.
    fn on_image_fetched(&self, name: &str, done: usize, total: usize) {
        let _ = (name, done, total);
    }

    /// The parse finished with `text_len` characters of text.
    fn on_parse_complete(&self, text_len: usize, image_count: usize) {
        let _ = (text_len, image_count);
    }

    /// A transformation request is about to be sent.
    fn on_transform_start(&self, instruction: &str, model: &str) {
        let _ = (instruction, model);
    }

    /// A transformation returned `output_len` characters.
    fn on_transform_complete(&self, output_len: usize) {
        let _ = output_len;
    }

    /// A retryable failure will be retried after `delay_ms`.
    fn on_retry(&self, attempt: u32, max_retries: u32, delay_ms: u64, error: &str) {
        let _ = (attempt, max_retries, delay_ms, error);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl SessionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ClientConfig`].
pub type ProgressCallback = Arc<dyn SessionProgressCallback>;
