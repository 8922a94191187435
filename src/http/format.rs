//! Best-effort response body re-indentation. Never fails: anything that does
//! not parse is returned unchanged.

pub fn format_body(content_type: &str, raw: &str) -> String {
    if looks_like_json(content_type, raw) {
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(raw) {
            if let Ok(pretty) = serde_json::to_string_pretty(&value) {
                return pretty;
            }
        }
    }
    raw.to_string()
}

fn looks_like_json(content_type: &str, raw: &str) -> bool {
    let content_type = content_type.to_ascii_lowercase();
    if content_type.contains("json") {
        return true;
    }
    let trimmed = raw.trim_start();
    content_type.starts_with("text/plain") && (trimmed.starts_with('{') || trimmed.starts_with('['))
}
