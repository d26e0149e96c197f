//! Parse Client: send a PDF to LlamaParse and collect text and images.
//!
//! ## Job Flow
//!
//! ```text
//! POST /api/v1/parsing/upload              → { id, status }
//! GET  /api/v1/parsing/job/{id}            → poll until SUCCESS
//! GET  /api/v1/parsing/job/{id}/result/json → pages with text, md, images
//! GET  /api/v1/parsing/job/{id}/result/image/{name}   (per image)
//! ```
//!
//! Image downloads run with bounded concurrency but are yielded in page
//! order, so `embedded_images[i]` always corresponds to the i-th image
//! reference in the result.

use super::input::Upload;
use super::with_retry;
use crate::config::{ClientConfig, ResultType};
use crate::document::ImageBlob;
use crate::error::SmartPdfError;
use futures::stream::{self, StreamExt, TryStreamExt};
use reqwest::header::RETRY_AFTER;
use reqwest::multipart;
use reqwest::Url;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Service name used in errors and logs.
pub const SERVICE: &str = "LlamaParse";

/// Image type LlamaParse assigns to full-page screenshots.
const SCREENSHOT_TYPE: &str = "full_page_screenshot";

/// Everything a parse produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedContent {
    /// Page texts joined with a blank line.
    pub text: String,
    /// One rendered screenshot per page, when requested.
    pub page_images: Vec<ImageBlob>,
    /// Figures and pictures found inside the pages, in document order.
    pub embedded_images: Vec<ImageBlob>,
}

/// A document parsing backend.
///
/// The session controller is generic over this trait so tests can count
/// calls and return canned content without a network.
pub trait ParseService: Send + Sync {
    fn parse(
        &self,
        upload: &Upload,
    ) -> impl Future<Output = Result<ParsedContent, SmartPdfError>> + Send;
}

// ── Wire types ───────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct JobResponse {
    id: String,
    #[serde(default)]
    status: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct JsonResult {
    #[serde(default)]
    pages: Vec<JsonPage>,
}

#[derive(Debug, Default, Deserialize)]
struct JsonPage {
    #[serde(default)]
    page: Option<usize>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    md: Option<String>,
    #[serde(default)]
    images: Vec<JsonImage>,
}

#[derive(Debug, Deserialize)]
struct JsonImage {
    name: String,
    #[serde(default, rename = "type")]
    kind: Option<String>,
}

/// An image reference from the result, before download.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ImageRef {
    name: String,
    page: usize,
    screenshot: bool,
}

/// Coarse job state derived from the status string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JobState {
    Pending,
    Done,
    Failed,
}

fn job_state(status: &str) -> JobState {
    match status.to_ascii_uppercase().as_str() {
        "SUCCESS" | "PARTIAL_SUCCESS" => JobState::Done,
        "ERROR" | "CANCELED" | "CANCELLED" => JobState::Failed,
        _ => JobState::Pending,
    }
}

// ── Client ───────────────────────────────────────────────────────────────────

/// HTTP client for the LlamaParse REST API.
pub struct LlamaParseClient {
    config: ClientConfig,
    http: reqwest::Client,
}

impl std::fmt::Debug for LlamaParseClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlamaParseClient")
            .field("config", &self.config)
            .finish()
    }
}

impl LlamaParseClient {
    pub fn new(config: ClientConfig) -> Result<Self, SmartPdfError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| SmartPdfError::Internal(format!("HTTP client: {e}")))?;
        Ok(Self { config, http })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.llama_base_url.trim_end_matches('/'), path)
    }

    fn api_key(&self) -> Result<&str, SmartPdfError> {
        self.config
            .llama_api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or_else(|| SmartPdfError::AuthError {
                service: SERVICE.to_string(),
                detail: format!("{} is not set", crate::config::LLAMA_KEY_ENV),
            })
    }

    async fn upload(&self, key: &str, upload: &Upload) -> Result<String, SmartPdfError> {
        let part = multipart::Part::bytes(upload.bytes.clone())
            .file_name(upload.file_name.clone())
            .mime_str("application/pdf")
            .map_err(|e| SmartPdfError::Internal(e.to_string()))?;
        let form = multipart::Form::new()
            .part("file", part)
            .text("result_type", self.config.result_type.as_str())
            .text("take_screenshot", self.config.take_screenshot.to_string());

        let response = self
            .http
            .post(self.url("/api/v1/parsing/upload"))
            .bearer_auth(key)
            .multipart(form)
            .send()
            .await
            .map_err(network_error)?;

        let job: JobResponse = decode(check(response).await.map_err(|e| match e {
            SmartPdfError::UnsupportedFormat { reason, .. } => SmartPdfError::UnsupportedFormat {
                file_name: upload.file_name.clone(),
                reason,
            },
            other => other,
        })?)
        .await?;
        debug!(
            "Upload accepted: job {} ({})",
            job.id,
            job.status.as_deref().unwrap_or("?")
        );
        Ok(job.id)
    }

    async fn job_status(&self, key: &str, job_id: &str) -> Result<String, SmartPdfError> {
        let response = self
            .http
            .get(self.url(&format!("/api/v1/parsing/job/{job_id}")))
            .bearer_auth(key)
            .send()
            .await
            .map_err(network_error)?;
        let job: JobResponse = decode(check(response).await?).await?;
        Ok(job.status.unwrap_or_default())
    }

    async fn wait_for_job(&self, key: &str, job_id: &str) -> Result<(), SmartPdfError> {
        let deadline = Instant::now() + Duration::from_secs(self.config.parse_timeout_secs);
        let interval = Duration::from_millis(self.config.poll_interval_ms);
        let mut last_status = String::new();

        loop {
            let status =
                with_retry(&self.config, "job status", move || self.job_status(key, job_id))
                    .await?;
            if status != last_status {
                debug!("Job {}: {}", job_id, status);
                if let Some(ref cb) = self.config.progress_callback {
                    cb.on_job_status(job_id, &status);
                }
            }

            match job_state(&status) {
                JobState::Done => return Ok(()),
                JobState::Failed => {
                    return Err(SmartPdfError::ParseFailed {
                        job_id: job_id.to_string(),
                        status,
                    })
                }
                JobState::Pending => {}
            }

            if Instant::now() >= deadline {
                return Err(SmartPdfError::ServiceUnavailable {
                    service: SERVICE.to_string(),
                    detail: format!(
                        "job {job_id} still {status} after {}s",
                        self.config.parse_timeout_secs
                    ),
                });
            }
            last_status = status;
            tokio::time::sleep(interval).await;
        }
    }

    async fn fetch_result(&self, key: &str, job_id: &str) -> Result<JsonResult, SmartPdfError> {
        let response = self
            .http
            .get(self.url(&format!("/api/v1/parsing/job/{job_id}/result/json")))
            .bearer_auth(key)
            .send()
            .await
            .map_err(network_error)?;
        decode(check(response).await?).await
    }

    /// `…/job/{id}/result/image/{name}` with `name` as one encoded segment.
    fn image_url(&self, job_id: &str, name: &str) -> Result<Url, SmartPdfError> {
        let mut url = Url::parse(&self.url(&format!("/api/v1/parsing/job/{job_id}/result/image")))
            .map_err(|e| SmartPdfError::InvalidConfig(format!("base URL: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| SmartPdfError::InvalidConfig("base URL cannot hold a path".into()))?
            .push(name);
        Ok(url)
    }

    async fn fetch_image(
        &self,
        key: &str,
        job_id: &str,
        name: &str,
    ) -> Result<Vec<u8>, SmartPdfError> {
        let response = self
            .http
            .get(self.image_url(job_id, name)?)
            .bearer_auth(key)
            .send()
            .await
            .map_err(network_error)?;
        let bytes = check(response)
            .await?
            .bytes()
            .await
            .map_err(network_error)?;
        Ok(bytes.to_vec())
    }

    /// Download all referenced images, preserving reference order.
    ///
    /// The first download that still fails after retries fails the whole
    /// parse, so every reference in the result has exactly one blob.
    async fn fetch_images(
        &self,
        key: &str,
        job_id: &str,
        refs: Vec<ImageRef>,
    ) -> Result<Vec<(ImageRef, Vec<u8>)>, SmartPdfError> {
        let total = refs.len();
        let done = AtomicUsize::new(0);
        let done = &done;

        stream::iter(refs)
            .map(|r| async move {
                let name = r.name.as_str();
                let bytes = with_retry(&self.config, "image download", move || {
                    self.fetch_image(key, job_id, name)
                })
                .await
                .inspect_err(|e| warn!("Image {} failed: {}", name, e))?;
                let n = done.fetch_add(1, Ordering::SeqCst) + 1;
                if let Some(ref cb) = self.config.progress_callback {
                    cb.on_image_fetched(name, n, total);
                }
                Ok::<_, SmartPdfError>((r, bytes))
            })
            .buffered(self.config.image_concurrency.max(1))
            .try_collect()
            .await
    }
}

impl ParseService for LlamaParseClient {
    async fn parse(&self, upload: &Upload) -> Result<ParsedContent, SmartPdfError> {
        let key = self.api_key()?;
        info!(
            "Parsing '{}' ({} bytes) with {}",
            upload.file_name,
            upload.bytes.len(),
            SERVICE
        );
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_upload_start(&upload.file_name, upload.bytes.len());
        }

        let job_id =
            with_retry(&self.config, "upload", move || self.upload(key, upload)).await?;
        let job = job_id.as_str();
        self.wait_for_job(key, job).await?;
        let result =
            with_retry(&self.config, "result", move || self.fetch_result(key, job)).await?;

        let text = join_page_text(&result.pages, self.config.result_type);
        let refs = if self.config.fetch_images {
            image_refs(&result.pages)
        } else {
            Vec::new()
        };
        debug!(
            "Job {}: {} pages, {} chars, {} image refs",
            job,
            result.pages.len(),
            text.len(),
            refs.len()
        );

        let mut content = ParsedContent {
            text,
            ..Default::default()
        };
        for (r, bytes) in self.fetch_images(key, job, refs).await? {
            let blob = ImageBlob::new(r.name, Some(r.page), bytes);
            if r.screenshot {
                content.page_images.push(blob);
            } else {
                content.embedded_images.push(blob);
            }
        }

        info!(
            "Parsed '{}': {} chars, {} page images, {} embedded images",
            upload.file_name,
            content.text.len(),
            content.page_images.len(),
            content.embedded_images.len()
        );
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_parse_complete(
                content.text.len(),
                content.page_images.len() + content.embedded_images.len(),
            );
        }
        Ok(content)
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

fn network_error(e: reqwest::Error) -> SmartPdfError {
    let detail = if e.is_timeout() {
        "request timed out".to_string()
    } else {
        e.to_string()
    };
    SmartPdfError::ServiceUnavailable {
        service: SERVICE.to_string(),
        detail,
    }
}

/// Pass successful responses through; map everything else via the status.
async fn check(response: reqwest::Response) -> Result<reqwest::Response, SmartPdfError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let retry_after = response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_retry_after);
    let body = response.text().await.unwrap_or_default();
    Err(
        SmartPdfError::from_status(SERVICE, status.as_u16(), retry_after, &body).unwrap_or_else(
            || SmartPdfError::ServiceError {
                service: SERVICE.to_string(),
                status: status.as_u16(),
                detail: body,
            },
        ),
    )
}

async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, SmartPdfError> {
    let status = response.status().as_u16();
    let bytes = response.bytes().await.map_err(network_error)?;
    serde_json::from_slice(&bytes).map_err(|e| SmartPdfError::ServiceError {
        service: SERVICE.to_string(),
        status,
        detail: format!("malformed response: {e}"),
    })
}

/// `Retry-After` in delta-seconds form; HTTP dates are ignored.
fn parse_retry_after(value: &str) -> Option<u64> {
    value.trim().parse().ok()
}

/// Non-blank page texts joined with a blank line.
///
/// Falls back to the other representation when the preferred one is empty
/// for a page.
fn join_page_text(pages: &[JsonPage], result_type: ResultType) -> String {
    pages
        .iter()
        .filter_map(|p| {
            let (first, second) = match result_type {
                ResultType::Markdown => (&p.md, &p.text),
                ResultType::Text => (&p.text, &p.md),
            };
            [first, second]
                .into_iter()
                .flatten()
                .map(|s| s.trim())
                .find(|s| !s.is_empty())
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// All image references, in page order then result order.
fn image_refs(pages: &[JsonPage]) -> Vec<ImageRef> {
    pages
        .iter()
        .enumerate()
        .flat_map(|(idx, p)| {
            let page = p.page.unwrap_or(idx + 1);
            p.images.iter().map(move |img| ImageRef {
                name: img.name.clone(),
                page,
                screenshot: match img.kind.as_deref() {
                    Some(kind) => kind == SCREENSHOT_TYPE,
                    None => img.name.starts_with("page_"),
                },
            })
        })
        .collect()
}
