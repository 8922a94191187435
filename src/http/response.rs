use serde::Serialize;

use crate::codec::KeyValues;

/// Normalized outcome of a call that reached the server, whatever its status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolResponse {
    pub status: u16,
    pub status_text: String,
    pub headers: KeyValues,
    pub raw_body: String,
    /// Pretty-printed body when the content allowed it, otherwise the raw body.
    pub formatted_body: String,
    pub content_type: String,
    /// Body size in bytes.
    pub size: usize,
}
