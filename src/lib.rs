//! # smart-pdf-parser
//!
//! Parse PDFs with LlamaParse, analyse the result, optionally rewrite it with
//! an LLM, and export it as txt, md, docx, json, csv or xlsx.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Input      local file or URL, rejected locally unless it is a PDF
//!  ├─ 2. Parse      LlamaParse job: upload, poll, fetch text and images
//!  ├─ 3. Analyze    language, table and image detection (no network)
//!  ├─ 4. Transform  one chat completion: summary / table / report / article
//!  ├─ 5. Polish     fence stripping and whitespace cleanup of the answer
//!  └─ 6. Export     txt · md · docx · json · csv (UTF-8 BOM) · xlsx
//! ```
//!
//! A [`Session`] owns the single current [`Document`] and moves between
//! [`SessionState::Empty`], `Parsed`, `Transformed` and `Error`.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use smart_pdf_parser::{ClientConfig, ExportFormat, InstructionKind, Session};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Keys from LLAMA_CLOUD_API_KEY / OPENAI_API_KEY
//!     let mut session = Session::from_config(ClientConfig::from_env())?;
//!     let doc = session.open("report.pdf").await?;
//!     println!("language: {}", doc.detected_language);
//!
//!     session.transform(InstructionKind::Summarize).await?;
//!     let path = session.export_to(ExportFormat::Docx, "out").await?;
//!     eprintln!("wrote {}", path.display());
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `smartpdf` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! smart-pdf-parser = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod document;
pub mod error;
pub mod export;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod session;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ClientConfig, ClientConfigBuilder, KeyCheck, ResultType};
pub use document::{
    ContentAnalysis, Document, DocumentSummary, ImageBlob, InstructionKind, Table,
    TransformResult,
};
pub use error::SmartPdfError;
pub use export::{emit, write_export, ExportFormat, ExportPayload};
pub use pipeline::input::Upload;
pub use pipeline::parse::{LlamaParseClient, ParseService, ParsedContent};
pub use pipeline::transform::{LlmTransformer, TransformService};
pub use progress::{NoopProgressCallback, ProgressCallback, SessionProgressCallback};
pub use session::{Session, SessionState};
