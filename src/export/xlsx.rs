//! Excel (.xlsx) emitter: a single `AI_Output` sheet of inline-string cells.

use super::ooxml::{escape_text, package, XML_DECL};
use crate::document::Table;
use crate::error::SmartPdfError;
use tracing::warn;

/// Name of the only worksheet.
pub const SHEET_NAME: &str = "AI_Output";

/// Excel rejects cells longer than this many characters.
pub const MAX_CELL_CHARS: usize = 32_767;

const CONTENT_TYPES: &str = r#"<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/><Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/></Types>"#;

const ROOT_RELS: &str = r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/></Relationships>"#;

const WORKBOOK_RELS: &str = r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/></Relationships>"#;

/// Build a minimal SpreadsheetML package with the header in row 1.
pub fn to_xlsx(table: &Table) -> Result<Vec<u8>, SmartPdfError> {
    let workbook = format!(
        r#"{XML_DECL}<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets><sheet name="{SHEET_NAME}" sheetId="1" r:id="rId1"/></sheets></workbook>"#
    );
    let parts = [
        ("[Content_Types].xml", format!("{XML_DECL}{CONTENT_TYPES}")),
        ("_rels/.rels", format!("{XML_DECL}{ROOT_RELS}")),
        ("xl/workbook.xml", workbook),
        ("xl/_rels/workbook.xml.rels", format!("{XML_DECL}{WORKBOOK_RELS}")),
        ("xl/worksheets/sheet1.xml", sheet_xml(table)),
    ];
    package("xlsx", &parts)
}

fn sheet_xml(table: &Table) -> String {
    let mut xml = String::with_capacity(256 + table.rows.len() * 128);
    xml.push_str(XML_DECL);
    xml.push_str(
        r#"<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>"#,
    );
    for (r, record) in table.records().enumerate() {
        let row_num = r + 1;
        xml.push_str(&format!(r#"<row r="{row_num}">"#));
        for (c, value) in record.iter().enumerate() {
            let cell_ref = format!("{}{row_num}", column_name(c));
            xml.push_str(&format!(
                r#"<c r="{cell_ref}" t="inlineStr"><is><t xml:space="preserve">{}</t></is></c>"#,
                escape_text(&clip_cell(value, &cell_ref))
            ));
        }
        xml.push_str("</row>");
    }
    xml.push_str("</sheetData></worksheet>");
    xml
}

fn clip_cell<'a>(value: &'a str, cell_ref: &str) -> &'a str {
    match value.char_indices().nth(MAX_CELL_CHARS) {
        Some((idx, _)) => {
            warn!(
                "Cell {} exceeds {} characters; truncated in xlsx export",
                cell_ref, MAX_CELL_CHARS
            );
            &value[..idx]
        }
        None => value,
    }
}

/// Zero-based column index → `A`, `B`, …, `Z`, `AA`, ….
fn column_name(mut index: usize) -> String {
    let mut name = Vec::new();
    loop {
        name.push(b'A' + (index % 26) as u8);
        if index < 26 {
            break;
        }
        index = index / 26 - 1;
    }
    name.reverse();
    String::from_utf8(name).unwrap_or_default()
}
