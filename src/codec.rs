//! String encoding for the key/value maps stored in text columns
//! (request headers, response headers, environment variables).

use std::collections::HashMap;

pub type KeyValues = HashMap<String, String>;

pub fn encode_map(map: &KeyValues) -> String {
    serde_json::to_string(map).unwrap_or_else(|_| "{}".to_string())
}

/// Parses a stored map. Non-string values are kept in their JSON text form so
/// that `{"port": 8080}` still yields `port = "8080"`.
pub fn decode_map(raw: &str) -> Result<KeyValues, serde_json::Error> {
    let parsed: HashMap<String, serde_json::Value> = serde_json::from_str(raw)?;
    Ok(parsed
        .into_iter()
        .map(|(key, value)| match value {
            serde_json::Value::String(text) => (key, text),
            other => (key, other.to_string()),
        })
        .collect())
}

/// Like [`decode_map`] but yields an empty map for malformed input.
pub fn decode_map_lossy(raw: &str, what: &str) -> KeyValues {
    decode_map(raw).unwrap_or_else(|err| {
        tracing::warn!(error = %err, "ignoring malformed stored {what}");
        KeyValues::new()
    })
}
