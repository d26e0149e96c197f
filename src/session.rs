//! Session controller: the state machine that owns the current document.
//!
//! ```text
//!            upload ok                 transform ok
//!   Empty ─────────────▶ Parsed ───────────────────▶ Transformed ─┐
//!     ▲  ╲                 │ ▲                           ▲  │      │ transform ok
//!     │   ╲ upload fails   │ │ transform ok              │  └──────┘
//!     │    ▼               ▼ │                           │
//!     │    Error ◀──────── client failure ───────────────┘
//!     │      │
//!     └──────┘ reset / new upload (from any state)
//! ```
//!
//! Every action is fatal only for itself. A failed parse leaves `Error` with
//! no document; a failed transform leaves `Error` but keeps the document so
//! the user can retry or export what was parsed. No state is terminal.

use crate::config::ClientConfig;
use crate::document::{Document, InstructionKind, TransformResult};
use crate::error::SmartPdfError;
use crate::export::{emit, write_export, ExportFormat, ExportPayload};
use crate::pipeline::analyze::analyze;
use crate::pipeline::input::{load_upload, Upload};
use crate::pipeline::parse::{LlamaParseClient, ParseService};
use crate::pipeline::transform::{check_input, LlmTransformer, TransformService};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Where a session currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    #[default]
    Empty,
    Parsed,
    Transformed,
    Error,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Empty => "empty",
            SessionState::Parsed => "parsed",
            SessionState::Transformed => "transformed",
            SessionState::Error => "error",
        };
        f.write_str(s)
    }
}

/// One user session: at most one document, plus the services that act on it.
pub struct Session<P, T> {
    parser: P,
    transformer: T,
    document: Option<Document>,
    state: SessionState,
    last_error: Option<String>,
    min_transform_chars: usize,
    download_timeout_secs: u64,
}

impl<P, T> fmt::Debug for Session<P, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("state", &self.state)
            .field("document", &self.document.as_ref().map(|d| &d.file_name))
            .field("last_error", &self.last_error)
            .finish()
    }
}

impl Session<LlamaParseClient, LlmTransformer> {
    /// A session talking to LlamaParse and the configured LLM provider.
    pub fn from_config(config: ClientConfig) -> Result<Self, SmartPdfError> {
        let min = config.min_transform_chars;
        let timeout = config.request_timeout_secs;
        let parser = LlamaParseClient::new(config.clone())?;
        let transformer = LlmTransformer::new(config);
        let mut session = Session::new(parser, transformer).with_min_transform_chars(min);
        session.download_timeout_secs = timeout;
        Ok(session)
    }
}

impl<P: ParseService, T: TransformService> Session<P, T> {
    pub fn new(parser: P, transformer: T) -> Self {
        Self {
            parser,
            transformer,
            document: None,
            state: SessionState::Empty,
            last_error: None,
            min_transform_chars: ClientConfig::default().min_transform_chars,
            download_timeout_secs: ClientConfig::default().request_timeout_secs,
        }
    }

    /// Parsed text shorter than `n` characters is never sent for transformation.
    pub fn with_min_transform_chars(mut self, n: usize) -> Self {
        self.min_transform_chars = n;
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn document(&self) -> Option<&Document> {
        self.document.as_ref()
    }

    /// Message of the failure that put the session into `Error`.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Whether the current document is long enough to transform.
    pub fn can_transform(&self) -> bool {
        self.document
            .as_ref()
            .is_some_and(|d| check_input(&d.extracted_text, self.min_transform_chars).is_ok())
    }

    /// Drop the document and any error.
    pub fn reset(&mut self) {
        if self.document.is_some() || self.state != SessionState::Empty {
            info!("Session reset");
        }
        self.document = None;
        self.state = SessionState::Empty;
        self.last_error = None;
    }

    /// Replace the session's document with a freshly parsed `upload`.
    ///
    /// The previous document is discarded first, whatever the outcome.
    pub async fn upload(&mut self, upload: Upload) -> Result<&Document, SmartPdfError> {
        self.reset();
        if let Err(e) = upload.validate_pdf() {
            return Err(self.fail("upload", e));
        }

        let content = match self.parser.parse(&upload).await {
            Ok(content) => content,
            Err(e) => return Err(self.fail("parse", e)),
        };

        let analysis = analyze(&content.text, content.embedded_images.len());
        info!(
            "Parsed '{}': language={}, tables={}, images={}",
            upload.file_name, analysis.language, analysis.has_tables, analysis.has_images
        );
        let doc = Document::new(
            upload.file_name,
            upload.bytes,
            content.text,
            analysis,
            content.page_images,
            content.embedded_images,
        );
        self.state = SessionState::Parsed;
        Ok(self.document.insert(doc))
    }

    /// Load a local path or http(s) URL and [`upload`](Self::upload) it.
    ///
    /// A file that cannot be read counts as a failed upload.
    pub async fn open(&mut self, input: &str) -> Result<&Document, SmartPdfError> {
        match load_upload(input, self.download_timeout_secs).await {
            Ok(upload) => self.upload(upload).await,
            Err(e) => {
                self.reset();
                Err(self.fail("load", e))
            }
        }
    }

    /// Run `instruction` over the parsed text, replacing any earlier result.
    ///
    /// A missing document or too-short text is refused without a call and
    /// without changing state.
    pub async fn transform(
        &mut self,
        instruction: InstructionKind,
    ) -> Result<&TransformResult, SmartPdfError> {
        let Some(doc) = self.document.as_ref() else {
            return Err(SmartPdfError::InvalidState {
                action: "transform",
                reason: "no document is loaded",
            });
        };
        if let Err(e) = check_input(&doc.extracted_text, self.min_transform_chars) {
            self.last_error = Some(e.to_string());
            return Err(e);
        }

        let outcome = self
            .transformer
            .transform(&doc.extracted_text, &instruction)
            .await;
        let output = match outcome {
            Ok(output) => output,
            Err(e) => return Err(self.fail("transform", e)),
        };

        let Some(doc) = self.document.as_mut() else {
            return Err(SmartPdfError::Internal("document vanished mid-transform".into()));
        };
        self.state = SessionState::Transformed;
        self.last_error = None;
        info!("Transform '{}' done: {} chars", instruction.label(), output.len());
        Ok(doc.set_transform(TransformResult::new(instruction, output)))
    }

    /// What an export would contain right now.
    pub fn export_payload(&self) -> Result<ExportPayload, SmartPdfError> {
        self.document
            .as_ref()
            .map(ExportPayload::from_document)
            .ok_or(SmartPdfError::InvalidState {
                action: "export",
                reason: "no document is loaded",
            })
    }

    /// Complete file bytes for `format`.
    pub fn export(&self, format: ExportFormat) -> Result<Vec<u8>, SmartPdfError> {
        emit(&self.export_payload()?, format)
    }

    /// Write `format` into `dir` under its default file name.
    pub async fn export_to(
        &self,
        format: ExportFormat,
        dir: impl AsRef<Path>,
    ) -> Result<PathBuf, SmartPdfError> {
        let payload = self.export_payload()?;
        let path = dir
            .as_ref()
            .join(format.default_file_name(payload.transformed));
        write_export(&payload, format, path).await
    }

    fn fail(&mut self, action: &str, e: SmartPdfError) -> SmartPdfError {
        warn!("{} failed: {}", action, e);
        self.state = SessionState::Error;
        self.last_error = Some(e.to_string());
        e
    }
}
