use std::error::Error as _;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE, SET_COOKIE};
use reqwest::Client;

use super::dispatcher::{BoxFuture, ProtocolClient};
use super::format::format_body;
use super::request::OutboundRequest;
use super::response::ProtocolResponse;
use crate::codec::KeyValues;
use crate::config::Config;
use crate::error::{AppError, Result};

/// HTTP/HTTPS client. Every status code is a successful outcome; only
/// failures to get a response at all become [`AppError::Transport`].
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    pub fn new(timeout: Duration, max_redirects: usize) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(max_redirects))
            .build()
            .map_err(|err| AppError::Config(format!("failed to build HTTP client: {err}")))?;
        Ok(Self { client })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(config.request_timeout(), config.max_redirects)
    }

    async fn execute(&self, request: &OutboundRequest) -> Result<ProtocolResponse> {
        let method: reqwest::Method = request.method.into();
        let headers = build_headers(&request.headers)?;

        let mut builder = self
            .client
            .request(method, request.url.trim())
            .headers(headers);
        if let Some(body) = &request.body {
            if request.method.is_bodyless() {
                tracing::debug!(
                    method = %request.method,
                    size = body.len(),
                    "request body not sent for bodyless method"
                );
            } else {
                builder = builder.body(body.clone());
            }
        }

        let response = builder.send().await.map_err(transport_error)?;

        let status = response.status();
        let status_text = status.canonical_reason().unwrap_or("Unknown").to_string();

        let response_headers = collect_headers(response.headers());

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("text/plain")
            .to_string();

        let bytes = response.bytes().await.map_err(transport_error)?;
        let raw_body = String::from_utf8_lossy(&bytes).into_owned();
        let formatted_body = format_body(&content_type, &raw_body);

        tracing::info!(status = status.as_u16(), size = bytes.len(), "response received");
        Ok(ProtocolResponse {
            status: status.as_u16(),
            status_text,
            headers: response_headers,
            raw_body,
            formatted_body,
            content_type,
            size: bytes.len(),
        })
    }
}

impl ProtocolClient for HttpClient {
    fn name(&self) -> &'static str {
        "http"
    }

    fn supports(&self, scheme: &str) -> bool {
        matches!(scheme, "http" | "https")
    }

    fn send<'a>(&'a self, request: &'a OutboundRequest) -> BoxFuture<'a, Result<ProtocolResponse>> {
        Box::pin(self.execute(request))
    }
}

pub fn build_headers(input: &KeyValues) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();

    for (key, value) in input {
        let key = key.trim();
        if key.is_empty() {
            continue;
        }

        let header_name = HeaderName::from_bytes(key.as_bytes())
            .map_err(|err| AppError::InvalidRequest(format!("invalid header name `{key}`: {err}")))?;
        let header_value = HeaderValue::from_str(value.trim()).map_err(|err| {
            AppError::InvalidRequest(format!("invalid header value for `{key}`: {err}"))
        })?;
        headers.insert(header_name, header_value);
    }

    Ok(headers)
}

/// Collects response headers into a flat map. Repeated headers keep every
/// value: joined with `", "`, or with newlines for `set-cookie`.
pub fn collect_headers(headers: &HeaderMap) -> KeyValues {
    let mut collected = KeyValues::new();
    for (key, value) in headers {
        let value = value.to_str().unwrap_or("<binary>");
        let separator = if *key == SET_COOKIE { "\n" } else { ", " };
        collected
            .entry(key.to_string())
            .and_modify(|existing: &mut String| {
                existing.push_str(separator);
                existing.push_str(value);
            })
            .or_insert_with(|| value.to_string());
    }
    collected
}

/// Flattens the error chain so the root cause (refused, DNS, timeout) is
/// part of the message.
fn transport_error(err: reqwest::Error) -> AppError {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    tracing::warn!(error = %message, "transport failure");
    AppError::Transport(message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_headers_skips_blank_names() {
        let input = KeyValues::from([
            ("Accept".to_string(), "application/json".to_string()),
            ("  ".to_string(), "ignored".to_string()),
        ]);
        let headers = build_headers(&input).unwrap();
        assert_eq!(headers.len(), 1);
        assert_eq!(headers["accept"], "application/json");
    }

    #[test]
    fn build_headers_rejects_invalid_names() {
        let input = KeyValues::from([("bad header".to_string(), "x".to_string())]);
        let err = build_headers(&input).unwrap_err();
        assert!(matches!(err, AppError::InvalidRequest(_)));
    }

    #[test]
    fn collect_headers_keeps_repeated_values() {
        let mut headers = HeaderMap::new();
        headers.append("vary", HeaderValue::from_static("Accept"));
        headers.append("vary", HeaderValue::from_static("Origin"));
        headers.append(SET_COOKIE, HeaderValue::from_static("a=1"));
        headers.append(SET_COOKIE, HeaderValue::from_static("b=2"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));

        let collected = collect_headers(&headers);
        assert_eq!(collected["vary"], "Accept, Origin");
        assert_eq!(collected["set-cookie"], "a=1\nb=2");
        assert_eq!(collected["content-type"], "text/plain");
    }

    #[test]
    fn supports_only_http_schemes() {
        let client = HttpClient::from_config(&Config::default()).unwrap();
        assert!(client.supports("http"));
        assert!(client.supports("https"));
        assert!(!client.supports("ftp"));
    }
}
