//! Semicolon-separated CSV emitter (and the matching reader).
//!
//! Output starts with the UTF-8 byte-order mark so spreadsheet applications
//! pick the right encoding for umlauts and other non-ASCII text. Fields are
//! quoted only when they contain the delimiter, a quote or a line break.

use crate::document::Table;
use crate::error::SmartPdfError;

/// UTF-8 byte-order mark.
pub const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Field separator used by the emitter.
pub const DELIMITER: u8 = b';';

/// Header row followed by data rows, BOM-prefixed.
pub fn to_csv(table: &Table) -> Result<Vec<u8>, SmartPdfError> {
    let fail = |detail: String| SmartPdfError::ExportFailed {
        format: "csv",
        detail,
    };

    let mut out = Vec::with_capacity(UTF8_BOM.len() + 64 * (table.rows.len() + 1));
    out.extend_from_slice(UTF8_BOM);
    let mut writer = csv::WriterBuilder::new()
        .delimiter(DELIMITER)
        .flexible(true)
        .from_writer(out);
    for record in table.records() {
        writer.write_record(record).map_err(|e| fail(e.to_string()))?;
    }
    writer.into_inner().map_err(|e| fail(e.to_string()))
}

/// Split delimited text into records.
///
/// Understands quoted fields with doubled quotes and embedded line breaks,
/// LF or CRLF record ends, and ignores a leading BOM. Blank lines yield no
/// record and rows may differ in length.
pub fn parse_records(text: &str, delimiter: u8) -> Vec<Vec<String>> {
    let text = text.strip_prefix('\u{FEFF}').unwrap_or(text);
    csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes())
        .records()
        // `&str` input: the only reader errors are UTF-8 ones
        .filter_map(Result::ok)
        .map(|record| record.iter().map(str::to_string).collect())
        .collect()
}
