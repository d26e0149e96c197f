//! In-memory document model for one session.
//!
//! A [`Document`] is created from a successful parse, may carry at most one
//! [`TransformResult`], and is dropped on the next upload. Nothing here is
//! persisted.

use crate::export::csv::parse_records;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Column name used when transformed output has no tabular structure.
pub const FALLBACK_COLUMN: &str = "ai_output";

/// An image returned by the parse service.
#[derive(Clone, PartialEq, Eq)]
pub struct ImageBlob {
    /// File name as reported by the service (e.g. `page_1.jpg`, `img_p0_1.png`).
    pub name: String,
    /// 1-indexed page the image came from, when known.
    pub page: Option<usize>,
    /// Sniffed MIME type.
    pub mime_type: String,
    /// Raw image bytes.
    pub bytes: Vec<u8>,
}

impl fmt::Debug for ImageBlob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageBlob")
            .field("name", &self.name)
            .field("page", &self.page)
            .field("mime_type", &self.mime_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

impl ImageBlob {
    /// Build a blob, sniffing the MIME type from the bytes and falling back to
    /// the file-name extension.
    pub fn new(name: impl Into<String>, page: Option<usize>, bytes: Vec<u8>) -> Self {
        let name = name.into();
        let mime_type = sniff_mime(&name, &bytes).to_string();
        Self {
            name,
            page,
            mime_type,
            bytes,
        }
    }

    /// Preferred file extension for saving the blob.
    pub fn extension(&self) -> &'static str {
        match self.mime_type.as_str() {
            "image/png" => "png",
            "image/jpeg" => "jpg",
            "image/gif" => "gif",
            "image/webp" => "webp",
            "image/bmp" => "bmp",
            "image/tiff" => "tiff",
            _ => "bin",
        }
    }
}

fn sniff_mime(name: &str, bytes: &[u8]) -> &'static str {
    if let Ok(format) = image::guess_format(bytes) {
        return format.to_mime_type();
    }
    let lower = name.to_ascii_lowercase();
    if lower.ends_with(".png") {
        "image/png"
    } else if lower.ends_with(".jpg") || lower.ends_with(".jpeg") {
        "image/jpeg"
    } else if lower.ends_with(".gif") {
        "image/gif"
    } else if lower.ends_with(".webp") {
        "image/webp"
    } else {
        "application/octet-stream"
    }
}

/// The user-selected transformation goal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstructionKind {
    /// Executive summary.
    Summarize,
    /// Questions/tasks and answers as a semicolon-separated table.
    StructureAsTable,
    /// Clear and concise report.
    RewriteAsReport,
    /// Engaging article.
    RewriteAsArticle,
    /// Free-text system prompt supplied by the user.
    Custom(String),
}

impl InstructionKind {
    /// Short label used in logs, prompts listings and the CLI.
    pub fn label(&self) -> &str {
        match self {
            InstructionKind::Summarize => "summary",
            InstructionKind::StructureAsTable => "table",
            InstructionKind::RewriteAsReport => "report",
            InstructionKind::RewriteAsArticle => "article",
            InstructionKind::Custom(_) => "custom",
        }
    }

    /// All preset kinds, in menu order.
    pub fn presets() -> [InstructionKind; 4] {
        [
            InstructionKind::StructureAsTable,
            InstructionKind::Summarize,
            InstructionKind::RewriteAsReport,
            InstructionKind::RewriteAsArticle,
        ]
    }
}

impl fmt::Display for InstructionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for InstructionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "summary" | "summarize" => Ok(InstructionKind::Summarize),
            "table" | "structure-as-table" => Ok(InstructionKind::StructureAsTable),
            "report" | "rewrite-as-report" => Ok(InstructionKind::RewriteAsReport),
            "article" | "rewrite-as-article" => Ok(InstructionKind::RewriteAsArticle),
            other => Err(format!(
                "unknown instruction '{other}' (expected summary, table, report or article)"
            )),
        }
    }
}

/// Header plus rows; the tabular view used by csv, xlsx and the table preview.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    /// A one-column, one-row table holding `text` verbatim.
    pub fn single_cell(header: &str, text: &str) -> Self {
        Self {
            headers: vec![header.to_string()],
            rows: vec![vec![text.to_string()]],
        }
    }

    /// Derive rows from a JSON value.
    ///
    /// * array of objects → one row each, columns in first-seen key order
    /// * object → one row
    /// * anything else → `None`
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        use serde_json::Value;

        let objects: Vec<&serde_json::Map<String, Value>> = match value {
            Value::Array(items) if !items.is_empty() => {
                let objs: Vec<_> = items.iter().filter_map(Value::as_object).collect();
                if objs.len() != items.len() {
                    return None;
                }
                objs
            }
            Value::Object(obj) => vec![obj],
            _ => return None,
        };

        let mut headers: Vec<String> = Vec::new();
        for obj in &objects {
            for key in obj.keys() {
                if !headers.iter().any(|h| h == key) {
                    headers.push(key.clone());
                }
            }
        }

        let rows = objects
            .iter()
            .map(|obj| {
                headers
                    .iter()
                    .map(|h| obj.get(h).map(cell_text).unwrap_or_default())
                    .collect()
            })
            .collect();

        Some(Self { headers, rows })
    }

    /// Derive rows from transformed output.
    ///
    /// JSON is preferred; table-structured output is then read as
    /// semicolon-separated values; everything else becomes a single
    /// [`FALLBACK_COLUMN`] cell.
    pub fn from_transform_output(text: &str, kind: &InstructionKind) -> Self {
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(text) {
            if let Some(table) = Self::from_json(&value) {
                return table;
            }
        }

        if *kind == InstructionKind::StructureAsTable {
            let mut records = parse_records(text, b';');
            records.retain(|r| r.iter().any(|c| !c.trim().is_empty()));
            if let Some(first) = records.first() {
                if first.len() >= 2 {
                    let headers: Vec<String> = first.iter().map(|h| h.trim().to_string()).collect();
                    let width = headers.len();
                    let rows = records
                        .into_iter()
                        .skip(1)
                        .map(|mut r| {
                            r.resize(width, String::new());
                            r
                        })
                        .collect();
                    return Self { headers, rows };
                }
            }
        }

        Self::single_cell(FALLBACK_COLUMN, text)
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// The header followed by every row.
    pub fn records(&self) -> impl Iterator<Item = &[String]> {
        std::iter::once(self.headers.as_slice()).chain(self.rows.iter().map(Vec::as_slice))
    }
}

fn cell_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Output of one successful transformation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformResult {
    pub instruction: InstructionKind,
    pub output_text: String,
    /// Tabular view of the output, when one can be derived.
    pub rows: Option<Table>,
}

impl TransformResult {
    pub fn new(instruction: InstructionKind, output_text: String) -> Self {
        let table = Table::from_transform_output(&output_text, &instruction);
        let rows = if table.headers == [FALLBACK_COLUMN] {
            None
        } else {
            Some(table)
        };
        Self {
            instruction,
            output_text,
            rows,
        }
    }
}

/// Result of content analysis on freshly parsed text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentAnalysis {
    /// ISO 639-1 code, or `"unknown"`.
    pub language: String,
    pub has_tables: bool,
    pub has_images: bool,
}

/// The parsed document held by a session.
#[derive(Debug, Clone)]
pub struct Document {
    pub file_name: String,
    pub raw_bytes: Vec<u8>,
    pub extracted_text: String,
    pub detected_language: String,
    pub has_tables: bool,
    pub has_images: bool,
    /// Rendered full pages, in page order.
    pub page_images: Vec<ImageBlob>,
    /// Images embedded in the PDF, in the order received.
    pub embedded_images: Vec<ImageBlob>,
    /// Latest transformation; replaced on each re-run.
    pub transform: Option<TransformResult>,
}

impl Document {
    /// Assemble a document from a parse and its analysis.
    pub fn new(
        file_name: String,
        raw_bytes: Vec<u8>,
        extracted_text: String,
        analysis: ContentAnalysis,
        page_images: Vec<ImageBlob>,
        embedded_images: Vec<ImageBlob>,
    ) -> Self {
        Self {
            file_name,
            raw_bytes,
            extracted_text,
            detected_language: analysis.language,
            has_tables: analysis.has_tables,
            has_images: analysis.has_images,
            page_images,
            embedded_images,
            transform: None,
        }
    }

    /// Attach a transformation, replacing any previous one.
    pub fn set_transform(&mut self, result: TransformResult) -> &TransformResult {
        self.transform.insert(result)
    }

    /// Summary suitable for the metadata panel / `info` command.
    pub fn summary(&self) -> DocumentSummary {
        DocumentSummary {
            file_name: self.file_name.clone(),
            size_bytes: self.raw_bytes.len(),
            text_chars: self.extracted_text.chars().count(),
            language: self.detected_language.clone(),
            has_tables: self.has_tables,
            has_images: self.has_images,
            page_images: self.page_images.len(),
            embedded_images: self.embedded_images.len(),
            transform: self.transform.as_ref().map(|t| t.instruction.label().to_string()),
        }
    }
}

/// Serialisable overview of a [`Document`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentSummary {
    pub file_name: String,
    pub size_bytes: usize,
    pub text_chars: usize,
    pub language: String,
    pub has_tables: bool,
    pub has_images: bool,
    pub page_images: usize,
    pub embedded_images: usize,
    pub transform: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn instruction_kind_parsing() {
        assert_eq!("summary".parse::<InstructionKind>(), Ok(InstructionKind::Summarize));
        assert_eq!("TABLE".parse::<InstructionKind>(), Ok(InstructionKind::StructureAsTable));
        assert_eq!("report".parse::<InstructionKind>(), Ok(InstructionKind::RewriteAsReport));
        assert_eq!("article".parse::<InstructionKind>(), Ok(InstructionKind::RewriteAsArticle));
        assert!("poem".parse::<InstructionKind>().is_err());
    }

    #[test]
    fn table_from_json_array_keeps_key_order() {
        let v = json!([{"q": "1+1", "a": "2"}, {"q": "2+2", "a": "4", "note": "easy"}]);
        let t = Table::from_json(&v).unwrap();
        assert_eq!(t.headers, vec!["q", "a", "note"]);
        assert_eq!(t.rows[0], vec!["1+1", "2", ""]);
        assert_eq!(t.rows[1], vec!["2+2", "4", "easy"]);
    }

    #[test]
    fn table_from_json_object_is_one_row() {
        let t = Table::from_json(&json!({"title": "x", "pages": 3})).unwrap();
        assert_eq!(t.headers, vec!["title", "pages"]);
        assert_eq!(t.rows, vec![vec!["x".to_string(), "3".to_string()]]);
    }

    #[test]
    fn table_from_json_scalar_is_none() {
        assert!(Table::from_json(&json!("just text")).is_none());
        assert!(Table::from_json(&json!([1, 2])).is_none());
    }

    #[test]
    fn semicolon_table_output_becomes_rows() {
        let out = "Question;Answer A;Answer B;Correct\nWhat is 2+2?;3;4;B\nCapital of France?;Paris;Rome;A\n";
        let t = Table::from_transform_output(out, &InstructionKind::StructureAsTable);
        assert_eq!(t.headers, vec!["Question", "Answer A", "Answer B", "Correct"]);
        assert_eq!(t.rows.len(), 2);
        assert_eq!(t.rows[1][1], "Paris");
    }

    #[test]
    fn prose_falls_back_to_single_cell() {
        let t = Table::from_transform_output("A short summary.", &InstructionKind::Summarize);
        assert_eq!(t, Table::single_cell(FALLBACK_COLUMN, "A short summary."));
    }

    #[test]
    fn transform_result_rows_only_when_structured() {
        let prose = TransformResult::new(InstructionKind::Summarize, "Plain words.".into());
        assert!(prose.rows.is_none());

        let table = TransformResult::new(
            InstructionKind::StructureAsTable,
            "a;b\n1;2".into(),
        );
        assert_eq!(table.rows.unwrap().rows, vec![vec!["1".to_string(), "2".to_string()]]);
    }

    #[test]
    fn image_blob_sniffs_png() {
        let png = [0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1a, b'\n', 0, 0, 0, 0];
        let blob = ImageBlob::new("figure.bin", Some(1), png.to_vec());
        assert_eq!(blob.mime_type, "image/png");
        assert_eq!(blob.extension(), "png");
    }

    #[test]
    fn image_blob_falls_back_to_extension() {
        let blob = ImageBlob::new("page_2.jpg", Some(2), vec![1, 2, 3]);
        assert_eq!(blob.mime_type, "image/jpeg");
        assert_eq!(blob.extension(), "jpg");
    }
}
