//! JSON emitter.

use super::ExportPayload;
use crate::error::SmartPdfError;
use serde_json::Value;

/// Interpret `text` as JSON, or wrap it as `{ fallback_key: text }`.
///
/// Models asked for structured output often answer with valid JSON; that is
/// exported as-is so the structure survives.
pub fn value_for(text: &str, fallback_key: &str) -> Value {
    match serde_json::from_str::<Value>(text) {
        Ok(v) if v.is_object() || v.is_array() => v,
        _ => {
            let mut map = serde_json::Map::new();
            map.insert(fallback_key.to_string(), Value::String(text.to_string()));
            Value::Object(map)
        }
    }
}

/// Pretty-printed UTF-8 JSON.
pub fn to_json(payload: &ExportPayload) -> Result<Vec<u8>, SmartPdfError> {
    serde_json::to_vec_pretty(&payload.json).map_err(|e| SmartPdfError::ExportFailed {
        format: "json",
        detail: e.to_string(),
    })
}
