//! Input resolution: load a path or URL into an in-memory [`Upload`].
//!
//! The parse service takes the file as a multipart upload, so the whole PDF is
//! held in memory for the session anyway. [`Upload::validate_pdf`] checks the
//! `%PDF-` header so a wrong file is rejected locally instead of costing a
//! network round-trip and a parse credit.

use crate::error::SmartPdfError;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// PDF files must carry this header within the first [`HEADER_WINDOW`] bytes.
const PDF_MAGIC: &[u8] = b"%PDF-";
const HEADER_WINDOW: usize = 1024;

/// One uploaded file.
#[derive(Clone, PartialEq, Eq)]
pub struct Upload {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl std::fmt::Debug for Upload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Upload")
            .field("file_name", &self.file_name)
            .field("len", &self.bytes.len())
            .finish()
    }
}

impl Upload {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes,
        }
    }

    /// Reject anything that does not look like a PDF.
    pub fn validate_pdf(&self) -> Result<(), SmartPdfError> {
        if self.bytes.is_empty() {
            return Err(SmartPdfError::UnsupportedFormat {
                file_name: self.file_name.clone(),
                reason: "file is empty".to_string(),
            });
        }
        let window = &self.bytes[..self.bytes.len().min(HEADER_WINDOW)];
        if !window.windows(PDF_MAGIC.len()).any(|w| w == PDF_MAGIC) {
            let magic: Vec<u8> = self.bytes.iter().take(4).copied().collect();
            return Err(SmartPdfError::UnsupportedFormat {
                file_name: self.file_name.clone(),
                reason: format!("missing %PDF- header (first bytes: {magic:?})"),
            });
        }
        Ok(())
    }
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Load a local path or download an HTTP(S) URL.
///
/// The result is not validated; the session controller does that so the
/// rejection is recorded in session state.
pub async fn load_upload(input: &str, timeout_secs: u64) -> Result<Upload, SmartPdfError> {
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        read_local(Path::new(input)).await
    }
}

async fn read_local(path: &Path) -> Result<Upload, SmartPdfError> {
    let bytes = tokio::fs::read(path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::PermissionDenied => SmartPdfError::PermissionDenied {
            path: path.to_path_buf(),
        },
        _ => SmartPdfError::FileNotFound {
            path: path.to_path_buf(),
        },
    })?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "upload.pdf".to_string());

    debug!("Loaded local file: {} ({} bytes)", path.display(), bytes.len());
    Ok(Upload::new(file_name, bytes))
}

async fn download_url(url: &str, timeout_secs: u64) -> Result<Upload, SmartPdfError> {
    info!("Downloading PDF from: {}", url);

    let failed = |reason: String| SmartPdfError::DownloadFailed {
        url: url.to_string(),
        reason,
    };

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| failed(e.to_string()))?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            failed(format!("timed out after {timeout_secs}s"))
        } else {
            failed(e.to_string())
        }
    })?;

    if !response.status().is_success() {
        return Err(failed(format!("HTTP {}", response.status())));
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| failed(e.to_string()))?;

    info!("Downloaded {} bytes", bytes.len());
    Ok(Upload::new(file_name_from_url(url), bytes.to_vec()))
}

/// Last path segment when it looks like a file name, else `downloaded.pdf`.
fn file_name_from_url(url: &str) -> String {
    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some(mut segments) = parsed.path_segments() {
            if let Some(last) = segments.next_back() {
                if !last.is_empty() && last.contains('.') {
                    return last.to_string();
                }
            }
        }
    }
    "downloaded.pdf".to_string()
}
