//! Stub HTTP server.

use super::descriptor::to_stubbed_request;
use crate::repository::{StubRepository, StubSearchResult};
use crate::stubs::{ResponseKind, StubbedRequest};
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{debug, error, info};

/// Serves stubbed responses from a [`StubRepository`]
pub struct StubServer {
    addr: SocketAddr,
    repository: Arc<StubRepository>,
}

impl StubServer {
    pub fn new(addr: SocketAddr, repository: Arc<StubRepository>) -> Self {
        Self { addr, repository }
    }

    /// Bind and serve until the listener fails
    pub async fn run(self) -> Result<(), anyhow::Error> {
        let listener = TcpListener::bind(self.addr).await?;
        info!(
            "Serving {} stubs on http://{}",
            self.repository.stub_count(),
            self.addr
        );
        serve(listener, self.repository).await
    }
}

/// Accept loop over an already bound listener
pub async fn serve(listener: TcpListener, repository: Arc<StubRepository>) -> Result<(), anyhow::Error> {
    loop {
        let (stream, _) = listener.accept().await?;
        let io = TokioIo::new(stream);
        let repository = Arc::clone(&repository);

        tokio::spawn(async move {
            let service = service_fn(move |req| {
                let repository = Arc::clone(&repository);
                async move { handle_request(req, repository).await }
            });

            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                debug!("Stub connection error: {}", e);
            }
        });
    }
}

async fn handle_request(
    req: Request<Incoming>,
    repository: Arc<StubRepository>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let (parts, body) = req.into_parts();
    let body = match body.collect().await {
        Ok(collected) => Some(String::from_utf8_lossy(&collected.to_bytes()).into_owned()),
        Err(e) => {
            error!("Failed to read request body: {}", e);
            None
        }
    };

    let headers = parts
        .headers
        .iter()
        .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str(), v)));
    let incoming = to_stubbed_request(
        parts.method.as_str(),
        parts.uri.path(),
        parts.uri.query(),
        headers,
        body,
    );

    let result = repository.search(incoming).await;
    if let Some(latency) = result.response.latency() {
        tokio::time::sleep(Duration::from_millis(latency)).await;
    }
    Ok(render(&result))
}

/// Reason reported for requests no stub matched
pub fn not_found_message(incoming: &StubbedRequest) -> String {
    format!(
        "(404) Nothing found for {} request at URI {}",
        incoming.methods().first().map_or("", String::as_str),
        incoming.url().unwrap_or_default()
    )
}

fn not_found_body(incoming: &StubbedRequest) -> Bytes {
    let body = serde_json::json!({
        "message": not_found_message(incoming),
        "method": incoming.methods().first(),
        "url": incoming.url(),
        "query": incoming.query(),
        "headers": incoming.headers(),
        "post": incoming.post_body(),
    });
    Bytes::from(body.to_string())
}

/// Translate a search result into the HTTP response written to the client
pub fn render(result: &StubSearchResult) -> Response<Full<Bytes>> {
    let response = &result.response;
    let mut builder = Response::builder().status(response.status());

    let body = match response.kind() {
        ResponseKind::NotFound => {
            builder = builder.header("content-type", "application/json");
            not_found_body(&result.incoming)
        }
        ResponseKind::Unauthorized => Bytes::new(),
        _ => {
            for (name, value) in response.headers() {
                builder = builder.header(name, value);
            }
            if response.kind() == ResponseKind::Redirect {
                builder = builder.header("connection", "close");
            }
            response.body().clone()
        }
    };

    builder.body(Full::new(body)).unwrap_or_else(|e| {
        error!("Could not build response for {:?}: {}", result.incoming.url(), e);
        let mut fallback = Response::new(Full::new(Bytes::from(e.to_string())));
        *fallback.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
        fallback
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matching::RegexGroups;
    use crate::stubs::StubbedResponse;

    fn result_for(response: StubbedResponse, url: &str) -> StubSearchResult {
        StubSearchResult {
            incoming: StubbedRequest::builder()
                .with_url(url)
                .with_method("GET")
                .build_incoming(),
            response,
            matched: None,
            regex_groups: RegexGroups::new(),
        }
    }

    async fn body_text(response: Response<Full<Bytes>>) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_not_found_carries_message() {
        let rendered = render(&result_for(StubbedResponse::not_found(), "/invoice/300"));
        assert_eq!(rendered.status(), StatusCode::NOT_FOUND);

        let body = body_text(rendered).await;
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(
            json["message"],
            "(404) Nothing found for GET request at URI /invoice/300"
        );
        assert_eq!(json["url"], "/invoice/300");
    }

    #[tokio::test]
    async fn test_unauthorized_is_empty() {
        let rendered = render(&result_for(StubbedResponse::unauthorized(), "/secured"));
        assert_eq!(rendered.status(), StatusCode::UNAUTHORIZED);
        assert!(body_text(rendered).await.is_empty());
    }

    #[test]
    fn test_redirect_closes_connection() {
        let redirect = StubbedResponse::builder()
            .with_status(302)
            .with_header("location", "/new")
            .build()
            .into_redirect();
        let rendered = render(&result_for(redirect, "/old"));

        assert_eq!(rendered.status(), StatusCode::FOUND);
        assert_eq!(rendered.headers()["location"], "/new");
        assert_eq!(rendered.headers()["connection"], "close");
    }

    #[tokio::test]
    async fn test_stubbed_response_is_written_verbatim() {
        let response = StubbedResponse::builder()
            .with_status(201)
            .with_header("content-type", "text/plain")
            .with_body("created")
            .build();
        let rendered = render(&result_for(response, "/items"));

        assert_eq!(rendered.status(), StatusCode::CREATED);
        assert_eq!(rendered.headers()["content-type"], "text/plain");
        assert_eq!(body_text(rendered).await, "created");
    }

    #[test]
    fn test_invalid_status_falls_back_to_server_error() {
        let response = StubbedResponse::builder().with_status(1000).build();
        let rendered = render(&result_for(response, "/broken"));
        assert_eq!(rendered.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
