//! Plain text and Markdown emitters.
//!
//! Both write the payload text verbatim as UTF-8; the extension is the only
//! difference a downstream application sees.

use super::ExportPayload;

/// UTF-8 plain text.
pub fn to_txt(payload: &ExportPayload) -> Vec<u8> {
    payload.text.as_bytes().to_vec()
}

/// UTF-8 Markdown, newline-terminated.
pub fn to_markdown(payload: &ExportPayload) -> Vec<u8> {
    let mut out = payload.text.clone();
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
    out.into_bytes()
}
