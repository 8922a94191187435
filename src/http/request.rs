use serde::{Deserialize, Serialize};

use super::method::HttpMethod;
use crate::codec::KeyValues;
use crate::environment::variables::{interpolate, interpolate_map};
use crate::error::{AppError, Result};

/// A request ready for dispatch, independent of any stored row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundRequest {
    pub method: HttpMethod,
    pub url: String,
    #[serde(default)]
    pub headers: KeyValues,
    #[serde(default)]
    pub body: Option<String>,
}

impl OutboundRequest {
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: KeyValues::new(),
            body: None,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Copy with every `{{var}}` in the URL, headers and body substituted.
    pub fn resolve(&self, variables: &KeyValues) -> OutboundRequest {
        if variables.is_empty() {
            return self.clone();
        }
        OutboundRequest {
            method: self.method,
            url: interpolate(&self.url, variables),
            headers: interpolate_map(&self.headers, variables),
            body: self.body.as_deref().map(|body| interpolate(body, variables)),
        }
    }

    /// Lower-cased URL scheme, used to pick a protocol client.
    pub fn scheme(&self) -> Result<String> {
        let url = reqwest::Url::parse(self.url.trim())
            .map_err(|err| AppError::InvalidUrl(format!("{}: {err}", self.url)))?;
        Ok(url.scheme().to_ascii_lowercase())
    }
}
