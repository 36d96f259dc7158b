//! Stubbed response model.

use super::request::render_map;
use bytes::Bytes;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// How the HTTP layer should treat a response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseKind {
    #[default]
    Stubbed,
    /// Carries a `location` header; the connection is closed after writing it
    Redirect,
    Unauthorized,
    NotFound,
    Proxied,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StubbedResponse {
    status: u16,
    body: Bytes,
    headers: BTreeMap<String, String>,
    latency: Option<u64>,
    file: Option<PathBuf>,
    kind: ResponseKind,
}

impl Default for StubbedResponse {
    fn default() -> Self {
        Self::ok()
    }
}

impl StubbedResponse {
    pub fn builder() -> StubbedResponseBuilder {
        StubbedResponseBuilder::default()
    }

    /// Empty 200, used for stubs that declare no response
    pub fn ok() -> Self {
        Self {
            status: 200,
            body: Bytes::new(),
            headers: BTreeMap::new(),
            latency: None,
            file: None,
            kind: ResponseKind::Stubbed,
        }
    }

    pub fn not_found() -> Self {
        Self {
            status: 404,
            kind: ResponseKind::NotFound,
            ..Self::ok()
        }
    }

    pub fn unauthorized() -> Self {
        Self {
            status: 401,
            kind: ResponseKind::Unauthorized,
            ..Self::ok()
        }
    }

    pub fn server_error(message: impl Into<String>) -> Self {
        Self {
            status: 500,
            body: Bytes::from(message.into()),
            kind: ResponseKind::Proxied,
            ..Self::ok()
        }
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    /// Header lookup by case-insensitive name
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Simulated delay in milliseconds, applied by the HTTP layer
    pub fn latency(&self) -> Option<u64> {
        self.latency
    }

    pub fn file(&self) -> Option<&Path> {
        self.file.as_deref()
    }

    pub fn kind(&self) -> ResponseKind {
        self.kind
    }

    pub fn has_location_header(&self) -> bool {
        self.header("location").is_some()
    }

    /// A body starting with `http` is an upstream URL to fetch on every match
    pub fn is_recording_required(&self) -> bool {
        self.body
            .get(..4)
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case(b"http"))
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    pub fn with_kind(mut self, kind: ResponseKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn into_redirect(self) -> Self {
        self.with_kind(ResponseKind::Redirect)
    }

    /// Ordered `(name, value)` pairs for introspection
    pub fn fields(&self) -> Vec<(&'static str, String)> {
        let mut fields = vec![("status", self.status.to_string())];
        if !self.body.is_empty() {
            fields.push(("body", self.body_text()));
        }
        if let Some(file) = &self.file {
            fields.push(("file", file.display().to_string()));
        }
        if !self.headers.is_empty() {
            fields.push(("headers", render_map(&self.headers)));
        }
        if let Some(latency) = self.latency {
            fields.push(("latency", latency.to_string()));
        }
        fields
    }
}

#[derive(Debug, Default)]
pub struct StubbedResponseBuilder {
    status: Option<u16>,
    body: Option<Bytes>,
    headers: BTreeMap<String, String>,
    latency: Option<u64>,
    file: Option<PathBuf>,
}

impl StubbedResponseBuilder {
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn with_header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.as_ref().to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_latency(mut self, millis: u64) -> Self {
        self.latency = Some(millis);
        self
    }

    pub fn with_file(mut self, file: impl Into<PathBuf>) -> Self {
        self.file = Some(file.into());
        self
    }

    pub fn build(self) -> StubbedResponse {
        StubbedResponse {
            status: self.status.unwrap_or(200),
            body: self.body.unwrap_or_default(),
            headers: self.headers,
            latency: self.latency,
            file: self.file,
            kind: ResponseKind::Stubbed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let response = StubbedResponse::builder().build();
        assert_eq!(response.status(), 200);
        assert!(response.body().is_empty());
        assert_eq!(response.kind(), ResponseKind::Stubbed);
    }

    #[test]
    fn test_recording_detection() {
        let recording = StubbedResponse::builder()
            .with_body("HTTPS://upstream.local/data")
            .build();
        assert!(recording.is_recording_required());

        let indented = StubbedResponse::builder()
            .with_body("  https://upstream.local/data")
            .build();
        assert!(!indented.is_recording_required());

        let plain = StubbedResponse::builder().with_body("hello").build();
        assert!(!plain.is_recording_required());
        assert!(!StubbedResponse::ok().is_recording_required());
    }

    #[test]
    fn test_location_header_is_case_insensitive() {
        let response = StubbedResponse::builder()
            .with_status(301)
            .with_header("Location", "/elsewhere")
            .build();
        assert!(response.has_location_header());
        assert_eq!(response.header("LOCATION"), Some("/elsewhere"));
    }

    #[test]
    fn test_canonical_responses() {
        assert_eq!(StubbedResponse::not_found().status(), 404);
        assert_eq!(StubbedResponse::not_found().kind(), ResponseKind::NotFound);
        assert_eq!(StubbedResponse::unauthorized().status(), 401);
        assert!(StubbedResponse::unauthorized().body().is_empty());

        let error = StubbedResponse::server_error("connection refused");
        assert_eq!(error.status(), 500);
        assert_eq!(error.body_text(), "connection refused");
    }

    #[test]
    fn test_fields_skip_unset_values() {
        let response = StubbedResponse::builder()
            .with_body("x")
            .with_latency(50)
            .build();
        let names: Vec<&str> = response.fields().iter().map(|(n, _)| *n).collect();
        assert_eq!(names, vec!["status", "body", "latency"]);
    }
}
