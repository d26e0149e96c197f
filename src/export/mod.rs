//! Format emitters: turn a document (or its transformation) into download bytes.
//!
//! Every emitter is a pure function over an [`ExportPayload`] and either
//! returns the complete file or an error. Nothing is written until
//! [`write_export`] renames a fully written temp file into place.
//!
//! | Format | Container |
//! |--------|-----------|
//! | txt    | UTF-8 text |
//! | md     | UTF-8 text |
//! | docx   | OOXML word package, one paragraph per line |
//! | json   | parsed output JSON, or `{"ai_output": …}` |
//! | csv    | UTF-8 BOM, `;` separated |
//! | xlsx   | OOXML workbook, sheet `AI_Output` |

pub mod csv;
pub mod docx;
pub mod json;
mod ooxml;
pub mod text;
pub mod xlsx;

use crate::document::{Document, Table, FALLBACK_COLUMN};
use crate::error::SmartPdfError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info};

/// JSON key / column name for untransformed parsed text.
pub const PARSED_TEXT_KEY: &str = "parsed_text";

/// Supported download formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Txt,
    Markdown,
    Docx,
    Json,
    Csv,
    Xlsx,
}

impl ExportFormat {
    /// Every format, in menu order.
    pub const ALL: [ExportFormat; 6] = [
        ExportFormat::Txt,
        ExportFormat::Markdown,
        ExportFormat::Docx,
        ExportFormat::Json,
        ExportFormat::Csv,
        ExportFormat::Xlsx,
    ];

    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Txt => "txt",
            ExportFormat::Markdown => "md",
            ExportFormat::Docx => "docx",
            ExportFormat::Json => "json",
            ExportFormat::Csv => "csv",
            ExportFormat::Xlsx => "xlsx",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            ExportFormat::Txt => "text/plain; charset=utf-8",
            ExportFormat::Markdown => "text/markdown; charset=utf-8",
            ExportFormat::Docx => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
            ExportFormat::Json => "application/json",
            ExportFormat::Csv => "text/csv",
            ExportFormat::Xlsx => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        }
    }

    /// `ai_output.<ext>` for transformed content, `parsed.<ext>` otherwise.
    pub fn default_file_name(&self, transformed: bool) -> String {
        let stem = if transformed { "ai_output" } else { "parsed" };
        format!("{stem}.{}", self.extension())
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().trim_start_matches('.').to_ascii_lowercase().as_str() {
            "txt" | "text" => Ok(ExportFormat::Txt),
            "md" | "markdown" => Ok(ExportFormat::Markdown),
            "docx" | "word" => Ok(ExportFormat::Docx),
            "json" => Ok(ExportFormat::Json),
            "csv" => Ok(ExportFormat::Csv),
            "xlsx" | "excel" => Ok(ExportFormat::Xlsx),
            other => Err(format!(
                "unknown format '{other}' (expected txt, md, docx, json, csv or xlsx)"
            )),
        }
    }
}

/// Everything an emitter needs, resolved once from the document.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportPayload {
    /// Text for txt / md / docx.
    pub text: String,
    /// Value for json.
    pub json: serde_json::Value,
    /// Rows for csv / xlsx.
    pub table: Table,
    /// Whether the payload comes from a transformation.
    pub transformed: bool,
}

impl ExportPayload {
    /// Export the transformation when one exists, otherwise the parsed text.
    pub fn from_document(doc: &Document) -> Self {
        match &doc.transform {
            Some(t) => {
                let json = json::value_for(&t.output_text, FALLBACK_COLUMN);
                let table = t
                    .rows
                    .clone()
                    .unwrap_or_else(|| Table::single_cell(FALLBACK_COLUMN, &t.output_text));
                Self {
                    text: t.output_text.clone(),
                    json,
                    table,
                    transformed: true,
                }
            }
            None => Self::from_text(&doc.extracted_text),
        }
    }

    /// Payload for untransformed text.
    pub fn from_text(text: &str) -> Self {
        Self {
            text: text.to_string(),
            json: json::value_for(text, PARSED_TEXT_KEY),
            table: Table::single_cell(PARSED_TEXT_KEY, text),
            transformed: false,
        }
    }
}

/// Produce the complete file for `format`.
pub fn emit(payload: &ExportPayload, format: ExportFormat) -> Result<Vec<u8>, SmartPdfError> {
    let bytes = match format {
        ExportFormat::Txt => text::to_txt(payload),
        ExportFormat::Markdown => text::to_markdown(payload),
        ExportFormat::Docx => docx::to_docx(payload)?,
        ExportFormat::Json => json::to_json(payload)?,
        ExportFormat::Csv => csv::to_csv(&payload.table)?,
        ExportFormat::Xlsx => xlsx::to_xlsx(&payload.table)?,
    };
    debug!("Emitted {} → {} bytes", format, bytes.len());
    Ok(bytes)
}

/// Emit `format` and write it to `path`.
///
/// Uses atomic write (temp file + rename) so a failed export never leaves a
/// partial file behind.
pub async fn write_export(
    payload: &ExportPayload,
    format: ExportFormat,
    path: impl AsRef<Path>,
) -> Result<PathBuf, SmartPdfError> {
    let path = path.as_ref();
    let bytes = emit(payload, format)?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| SmartPdfError::OutputWriteFailed {
                path: path.to_path_buf(),
                source: e,
            })?;
    }

    let tmp_path = path.with_extension(format!("{}.tmp", format.extension()));
    tokio::fs::write(&tmp_path, &bytes)
        .await
        .map_err(|e| SmartPdfError::OutputWriteFailed {
            path: path.to_path_buf(),
            source: e,
        })?;

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| SmartPdfError::OutputWriteFailed {
            path: path.to_path_buf(),
            source: e,
        })?;

    info!("Wrote {} ({} bytes)", path.display(), bytes.len());
    Ok(path.to_path_buf())
}
