//! Error type for the smart-pdf-parser library.
//!
//! Every failure is fatal for the *action* that produced it (one upload, one
//! transform, one export) but never for the session: the controller records
//! the error and the user can re-attempt. [`SmartPdfError::is_retryable`]
//! marks the transient variants that the optional retry loop may repeat.

use std::path::PathBuf;
use thiserror::Error;

/// All errors returned by the smart-pdf-parser library.
#[derive(Debug, Error)]
pub enum SmartPdfError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// Downloading a URL input failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// The upload is not a PDF. Raised before any network call.
    #[error("Unsupported file '{file_name}': {reason}\nOnly PDF uploads are accepted.")]
    UnsupportedFormat { file_name: String, reason: String },

    // ── Service errors ────────────────────────────────────────────────────
    /// Missing, malformed or rejected credential.
    #[error("Authentication error from {service}: {detail}")]
    AuthError { service: String, detail: String },

    /// The service answered HTTP 429.
    #[error("Rate limit exceeded for {service}")]
    RateLimited {
        service: String,
        retry_after_secs: Option<u64>,
    },

    /// Network failure, timeout or 5xx.
    #[error("{service} is unavailable: {detail}")]
    ServiceUnavailable { service: String, detail: String },

    /// Any other non-success HTTP answer.
    #[error("{service} returned HTTP {status}: {detail}")]
    ServiceError {
        service: String,
        status: u16,
        detail: String,
    },

    /// The parsing job finished in an error or cancelled state.
    #[error("Parsing job {job_id} ended with status {status}")]
    ParseFailed { job_id: String, status: String },

    // ── Transform errors ──────────────────────────────────────────────────
    /// Nothing to transform: the parsed text is blank.
    #[error("Parsed text is empty. Re-parse the document before running a transformation.")]
    EmptyInput,

    /// Parsed text is below the transformation threshold.
    #[error("Parsed text is too short ({len} < {min} characters); transformation is disabled.")]
    TextTooShort { len: usize, min: usize },

    /// No LLM provider could be built from the configuration.
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// The LLM API returned a non-retryable error.
    #[error("LLM API error: {message}")]
    LlmApiError { message: String },

    // ── Session / export errors ───────────────────────────────────────────
    /// The requested action is not available in the current session state.
    #[error("'{action}' is not available: {reason}")]
    InvalidState {
        action: &'static str,
        reason: &'static str,
    },

    /// A format emitter failed; no partial output is produced.
    #[error("Failed to build {format} export: {detail}")]
    ExportFailed { format: &'static str, detail: String },

    /// Could not create or write an output file.
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

impl SmartPdfError {
    /// Transient failures that a manual (or configured automatic) retry may fix.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SmartPdfError::RateLimited { .. } | SmartPdfError::ServiceUnavailable { .. }
        )
    }

    /// Server-requested delay before the next attempt, if any.
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            SmartPdfError::RateLimited {
                retry_after_secs, ..
            } => *retry_after_secs,
            _ => None,
        }
    }

    /// Classify an HTTP status from `service` into the error taxonomy.
    ///
    /// Returns `None` for success codes.
    pub fn from_status(
        service: &str,
        status: u16,
        retry_after_secs: Option<u64>,
        body: &str,
    ) -> Option<Self> {
        let detail = truncate(body.trim(), 300);
        let err = match status {
            200..=299 => return None,
            401 | 403 => SmartPdfError::AuthError {
                service: service.to_string(),
                detail,
            },
            429 => SmartPdfError::RateLimited {
                service: service.to_string(),
                retry_after_secs,
            },
            415 => SmartPdfError::UnsupportedFormat {
                file_name: "<upload>".to_string(),
                reason: detail,
            },
            500..=599 => SmartPdfError::ServiceUnavailable {
                service: service.to_string(),
                detail: format!("HTTP {status}: {detail}"),
            },
            _ => SmartPdfError::ServiceError {
                service: service.to_string(),
                status,
                detail,
            },
        };
        Some(err)
    }
}

fn truncate(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}…", &s[..idx]),
        None => s.to_string(),
    }
}
