//! Word (.docx) emitter: one paragraph per input line.

use super::ooxml::{escape_text, package, XML_DECL};
use super::ExportPayload;
use crate::error::SmartPdfError;

const CONTENT_TYPES: &str = r#"<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/></Types>"#;

const ROOT_RELS: &str = r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/></Relationships>"#;

/// Build a minimal WordprocessingML package.
pub fn to_docx(payload: &ExportPayload) -> Result<Vec<u8>, SmartPdfError> {
    let parts = [
        ("[Content_Types].xml", format!("{XML_DECL}{CONTENT_TYPES}")),
        ("_rels/.rels", format!("{XML_DECL}{ROOT_RELS}")),
        ("word/document.xml", document_xml(&payload.text)),
    ];
    package("docx", &parts)
}

fn document_xml(text: &str) -> String {
    let mut xml = String::with_capacity(text.len() * 2 + 256);
    xml.push_str(XML_DECL);
    xml.push_str(
        r#"<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>"#,
    );
    for line in text.split('\n') {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.is_empty() {
            xml.push_str("<w:p/>");
        } else {
            xml.push_str(r#"<w:p><w:r><w:t xml:space="preserve">"#);
            xml.push_str(&escape_text(line));
            xml.push_str("</w:t></w:r></w:p>");
        }
    }
    xml.push_str("<w:sectPr/></w:body></w:document>");
    xml
}
