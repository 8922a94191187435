//! Protocol dispatch: an ordered list of clients, each claiming URL schemes.

use std::future::Future;
use std::pin::Pin;

use super::client::HttpClient;
use super::request::OutboundRequest;
use super::response::ProtocolResponse;
use crate::config::Config;
use crate::error::{AppError, Result};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A client able to execute requests for some URL schemes.
///
/// `send` must return `Ok` for every response the server produced, whatever
/// its status, and reserve `Err` for failures to obtain one.
pub trait ProtocolClient: Send + Sync {
    fn name(&self) -> &'static str;

    /// `scheme` is lower-case, without the trailing `:`.
    fn supports(&self, scheme: &str) -> bool;

    fn send<'a>(&'a self, request: &'a OutboundRequest) -> BoxFuture<'a, Result<ProtocolResponse>>;
}

#[derive(Default)]
pub struct Dispatcher {
    clients: Vec<Box<dyn ProtocolClient>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Dispatcher with the HTTP/HTTPS client registered.
    pub fn with_http(config: &Config) -> Result<Self> {
        let mut dispatcher = Self::new();
        dispatcher.register(HttpClient::from_config(config)?);
        Ok(dispatcher)
    }

    /// Appends a client; earlier registrations win on overlapping schemes.
    pub fn register(&mut self, client: impl ProtocolClient + 'static) {
        tracing::debug!(client = client.name(), "protocol client registered");
        self.clients.push(Box::new(client));
    }

    pub fn select(&self, scheme: &str) -> Option<&dyn ProtocolClient> {
        self.clients
            .iter()
            .find(|client| client.supports(scheme))
            .map(|client| client.as_ref())
    }

    pub async fn send(&self, request: &OutboundRequest) -> Result<ProtocolResponse> {
        let scheme = request.scheme()?;
        let client = self.select(&scheme).ok_or_else(|| {
            tracing::warn!(%scheme, url = %request.url, "no protocol client for scheme");
            AppError::UnsupportedProtocol(scheme.clone())
        })?;

        tracing::info!(client = client.name(), method = %request.method, url = %request.url, "dispatching request");
        client.send(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::KeyValues;
    use crate::http::method::HttpMethod;

    struct Canned {
        name: &'static str,
        scheme: &'static str,
        status: u16,
    }

    impl ProtocolClient for Canned {
        fn name(&self) -> &'static str {
            self.name
        }

        fn supports(&self, scheme: &str) -> bool {
            scheme == self.scheme
        }

        fn send<'a>(&'a self, _request: &'a OutboundRequest) -> BoxFuture<'a, Result<ProtocolResponse>> {
            Box::pin(async move {
                Ok(ProtocolResponse {
                    status: self.status,
                    status_text: self.name.to_string(),
                    headers: KeyValues::new(),
                    raw_body: String::new(),
                    formatted_body: String::new(),
                    content_type: "text/plain".into(),
                    size: 0,
                })
            })
        }
    }

    #[tokio::test]
    async fn first_matching_client_wins() {
        let mut dispatcher = Dispatcher::new();
        dispatcher.register(Canned { name: "first", scheme: "mock", status: 200 });
        dispatcher.register(Canned { name: "second", scheme: "mock", status: 500 });

        let response = dispatcher
            .send(&OutboundRequest::new(HttpMethod::Get, "mock://service/ping"))
            .await
            .unwrap();
        assert_eq!(response.status_text, "first");
    }

    #[tokio::test]
    async fn unmatched_scheme_is_unsupported() {
        let mut dispatcher = Dispatcher::new();
        dispatcher.register(Canned { name: "mock", scheme: "mock", status: 200 });

        let err = dispatcher
            .send(&OutboundRequest::new(HttpMethod::Get, "ftp://files.example.com/a"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::UnsupportedProtocol(scheme) if scheme == "ftp"));
    }

    #[test]
    fn http_dispatcher_selects_by_scheme() {
        let dispatcher = Dispatcher::with_http(&Config::default()).unwrap();
        assert!(dispatcher.select("http").is_some());
        assert!(dispatcher.select("https").is_some());
        assert!(dispatcher.select("ws").is_none());
    }
}
