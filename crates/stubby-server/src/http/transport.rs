//! Upstream fetches for recording and proxy responses.

use crate::stubs::{AuthorizationType, StubbedRequest};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Method, StatusCode};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tracing::debug;

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

const SUPPORTED_METHODS: [Method; 8] = [
    Method::GET,
    Method::HEAD,
    Method::TRACE,
    Method::OPTIONS,
    Method::DELETE,
    Method::POST,
    Method::PUT,
    Method::PATCH,
];

/// Request headers that are never forwarded upstream
const SKIPPED_HEADERS: [&str; 3] = ["host", "content-length", "connection"];

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Failed to create HTTP client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("Fetching from upstream is not supported for method {0}")]
    UnsupportedMethod(String),
    #[error("Failed to send request to {url}: {source}")]
    Send { url: String, source: reqwest::Error },
    #[error("Failed to read response body from {url}: {source}")]
    Body { url: String, source: reqwest::Error },
}

/// What came back from upstream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedResponse {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: Bytes,
}

#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Send `request` (method, headers, body) to `target_url`
    async fn fetch(
        &self,
        request: &StubbedRequest,
        target_url: &str,
    ) -> Result<FetchedResponse, TransportError>;
}

/// [`HttpTransport`] backed by a shared `reqwest` client
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .build()
            .map_err(TransportError::Client)?;
        Ok(Self { client })
    }

    fn method_for(request: &StubbedRequest) -> Result<Method, TransportError> {
        let name = request.methods().first().map_or("GET", String::as_str);
        SUPPORTED_METHODS
            .iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(name))
            .cloned()
            .ok_or_else(|| TransportError::UnsupportedMethod(name.to_string()))
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn fetch(
        &self,
        request: &StubbedRequest,
        target_url: &str,
    ) -> Result<FetchedResponse, TransportError> {
        let method = Self::method_for(request)?;
        let carries_body = matches!(method, Method::POST | Method::PUT | Method::PATCH);
        let mut builder = self.client.request(method.clone(), target_url);

        for (name, value) in request.headers() {
            let is_auth_pseudo_header = AuthorizationType::ALL
                .iter()
                .any(|auth| auth.header_key() == name);
            if SKIPPED_HEADERS.contains(&name.as_str()) || is_auth_pseudo_header {
                continue;
            }
            builder = builder.header(name, value);
        }
        if request.raw_authorization_header().is_none() {
            if let Some(expected) = request.expected_authorization() {
                builder = builder.header("authorization", expected);
            }
        }
        if carries_body {
            if let Some(post) = request.post_body() {
                builder = builder.body(post.to_string());
            }
        }

        let start = Instant::now();
        let response = builder.send().await.map_err(|source| TransportError::Send {
            url: target_url.to_string(),
            source,
        })?;

        let status = response.status();
        let headers = response
            .headers()
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or("").to_string()))
            .collect();

        let body = if status == StatusCode::OK || status == StatusCode::CREATED {
            response.bytes().await.map_err(|source| TransportError::Body {
                url: target_url.to_string(),
                source,
            })?
        } else {
            Bytes::from(status.canonical_reason().unwrap_or_default())
        };

        debug!(
            "{} {} answered {} in {}ms",
            method,
            target_url,
            status.as_u16(),
            start.elapsed().as_millis()
        );

        Ok(FetchedResponse {
            status: status.as_u16(),
            headers,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_selection() {
        let get = StubbedRequest::builder().build();
        assert_eq!(ReqwestTransport::method_for(&get).unwrap(), Method::GET);

        let post = StubbedRequest::builder().with_methods(["post", "put"]).build();
        assert_eq!(ReqwestTransport::method_for(&post).unwrap(), Method::POST);

        let connect = StubbedRequest::builder().with_method("CONNECT").build();
        assert!(matches!(
            ReqwestTransport::method_for(&connect),
            Err(TransportError::UnsupportedMethod(m)) if m == "CONNECT"
        ));
    }

    #[tokio::test]
    async fn test_unreachable_upstream_is_an_error() {
        let transport = ReqwestTransport::new().unwrap();
        let request = StubbedRequest::builder().with_method("GET").build();

        let result = transport.fetch(&request, "http://127.0.0.1:1/nothing").await;
        assert!(matches!(result, Err(TransportError::Send { .. })));
    }
}
