//! Shared plumbing for Office Open XML packages (docx, xlsx).

use crate::error::SmartPdfError;
use std::io::{Cursor, Write};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

pub(crate) const XML_DECL: &str =
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#;

/// Zip the given `(part name, xml)` pairs into a package.
pub(crate) fn package(format: &'static str, parts: &[(&str, String)]) -> Result<Vec<u8>, SmartPdfError> {
    let fail = |detail: String| SmartPdfError::ExportFailed { format, detail };

    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for (name, xml) in parts {
        zip.start_file(*name, options)
            .map_err(|e| fail(format!("{name}: {e}")))?;
        zip.write_all(xml.as_bytes())
            .map_err(|e| fail(format!("{name}: {e}")))?;
    }

    let cursor = zip.finish().map_err(|e| fail(e.to_string()))?;
    Ok(cursor.into_inner())
}

/// Escape text content, dropping characters XML 1.0 cannot carry.
pub(crate) fn escape_text(text: &str) -> String {
    let cleaned: String = text
        .chars()
        .filter(|&c| matches!(c, '\t' | '\n' | '\r') || c >= ' ')
        .filter(|&c| c != '\u{FFFE}' && c != '\u{FFFF}')
        .collect();
    quick_xml::escape::escape(cleaned.as_str()).into_owned()
}
