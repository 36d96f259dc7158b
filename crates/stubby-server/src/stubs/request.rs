//! Stubbed request model.

use crate::matching::{RegexGroups, RequestMatcher};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

const BODY_METHODS: [&str; 3] = ["POST", "PUT", "PATCH"];

/// Authorization requirement declared through a pseudo header on the stub
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthorizationType {
    Basic,
    Bearer,
    Custom,
}

impl AuthorizationType {
    /// All types in precedence order
    pub const ALL: [AuthorizationType; 3] = [
        AuthorizationType::Basic,
        AuthorizationType::Bearer,
        AuthorizationType::Custom,
    ];

    pub fn header_key(self) -> &'static str {
        match self {
            AuthorizationType::Basic => "authorization-basic",
            AuthorizationType::Bearer => "authorization-bearer",
            AuthorizationType::Custom => "authorization-custom",
        }
    }

    /// Turn the stubbed value into what the `authorization` header must carry
    fn normalize(self, raw: &str) -> String {
        let raw = raw.trim();
        match self {
            AuthorizationType::Basic => format!("Basic {}", BASE64.encode(raw)),
            AuthorizationType::Bearer => format!("Bearer {raw}"),
            AuthorizationType::Custom => raw.to_string(),
        }
    }
}

impl fmt::Display for AuthorizationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.header_key())
    }
}

/// Canonical form of a query value.
///
/// Bracketed arrays (`[a,b]` or `%5Ba,b%5D`) drop the whitespace following each
/// separating comma and one pair of quotes around each element, so
/// `["a", "b"]`, `['a','b']` and `[a,b]` all compare equal. Other values are
/// returned unchanged.
pub fn normalize_query_value(value: &str) -> String {
    let Some(inner) = strip_brackets(value.trim()) else {
        return value.to_string();
    };

    let decoded = inner.replace("%22", "\"").replace("%27", "'");
    let elements: Vec<&str> = decoded
        .split(',')
        .enumerate()
        .map(|(index, element)| {
            let element = if index == 0 {
                element
            } else {
                element.trim_start()
            };
            strip_quotes(element)
        })
        .collect();
    format!("[{}]", elements.join(","))
}

fn strip_brackets(value: &str) -> Option<&str> {
    if let Some(inner) = value.strip_prefix('[').and_then(|v| v.strip_suffix(']')) {
        return Some(inner);
    }
    let len = value.len();
    if len < 6 {
        return None;
    }
    let opening = value.get(..3)?;
    let closing = value.get(len - 3..)?;
    if opening.eq_ignore_ascii_case("%5B") && closing.eq_ignore_ascii_case("%5D") {
        value.get(3..len - 3)
    } else {
        None
    }
}

fn strip_quotes(element: &str) -> &str {
    for quote in ['"', '\''] {
        if element.len() >= 2 && element.starts_with(quote) && element.ends_with(quote) {
            return &element[1..element.len() - 1];
        }
    }
    element
}

/// The request half of a stub, also used to describe incoming requests.
///
/// `PartialEq` is structural; use [`StubbedRequest::is_satisfied_by`] to
/// ask whether an incoming request matches this stub.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StubbedRequest {
    url: Option<String>,
    methods: Vec<String>,
    post: Option<String>,
    file: Option<PathBuf>,
    headers: BTreeMap<String, String>,
    query: BTreeMap<String, String>,
}

impl StubbedRequest {
    pub fn builder() -> StubbedRequestBuilder {
        StubbedRequestBuilder::default()
    }

    /// Reopen a request for modification, e.g. to decorate a forwarded copy
    pub fn into_builder(self) -> StubbedRequestBuilder {
        StubbedRequestBuilder { request: self }
    }

    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    pub fn methods(&self) -> &[String] {
        &self.methods
    }

    pub fn post_body(&self) -> Option<&str> {
        self.post.as_deref()
    }

    pub fn file(&self) -> Option<&Path> {
        self.file.as_deref()
    }

    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    /// Header lookup by case-insensitive name
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn query(&self) -> &BTreeMap<String, String> {
        &self.query
    }

    /// The body takes part in matching only for body-carrying methods
    pub fn is_request_body_stubbed(&self) -> bool {
        crate::matching::is_set(self.post_body())
            && self
                .methods
                .iter()
                .any(|m| BODY_METHODS.contains(&m.as_str()))
    }

    /// Declared authorization requirement, honouring precedence when several are set
    pub fn authorization_type(&self) -> Option<AuthorizationType> {
        AuthorizationType::ALL
            .into_iter()
            .find(|auth| self.headers.contains_key(auth.header_key()))
    }

    /// Expected value of the `authorization` header
    pub fn expected_authorization(&self) -> Option<&str> {
        self.authorization_type()
            .and_then(|auth| self.headers.get(auth.header_key()))
            .map(String::as_str)
    }

    pub fn raw_authorization_header(&self) -> Option<&str> {
        self.header("authorization")
    }

    /// Whether `asserting` satisfies every criterion declared by this stub.
    ///
    /// Not symmetric: unset criteria on `self` accept anything.
    pub fn is_satisfied_by(&self, asserting: &StubbedRequest, matcher: &RequestMatcher) -> bool {
        self.satisfied_with_groups(asserting, matcher).is_some()
    }

    /// Like [`StubbedRequest::is_satisfied_by`], also returning the captured regex groups
    pub fn satisfied_with_groups(
        &self,
        asserting: &StubbedRequest,
        matcher: &RequestMatcher,
    ) -> Option<RegexGroups> {
        matcher.matches(self, asserting)
    }

    /// Ordered `(name, value)` pairs for introspection
    pub fn fields(&self) -> Vec<(&'static str, String)> {
        let mut fields = Vec::with_capacity(6);
        if let Some(url) = &self.url {
            fields.push(("url", url.clone()));
        }
        if !self.methods.is_empty() {
            fields.push(("method", format!("[{}]", self.methods.join(", "))));
        }
        if let Some(post) = &self.post {
            fields.push(("post", post.clone()));
        }
        if let Some(file) = &self.file {
            fields.push(("file", file.display().to_string()));
        }
        if !self.headers.is_empty() {
            fields.push(("headers", render_map(&self.headers)));
        }
        if !self.query.is_empty() {
            fields.push(("query", render_map(&self.query)));
        }
        fields
    }
}

pub(crate) fn render_map(map: &BTreeMap<String, String>) -> String {
    let entries: Vec<String> = map.iter().map(|(k, v)| format!("{k}={v}")).collect();
    format!("{{{}}}", entries.join(", "))
}

#[derive(Debug, Default)]
pub struct StubbedRequestBuilder {
    request: StubbedRequest,
}

impl StubbedRequestBuilder {
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.request.url = Some(url.into());
        self
    }

    pub fn with_method(mut self, method: impl AsRef<str>) -> Self {
        let method = method.as_ref().trim().to_ascii_uppercase();
        if !method.is_empty() && !self.request.methods.contains(&method) {
            self.request.methods.push(method);
        }
        self
    }

    pub fn with_methods<I, S>(self, methods: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        methods.into_iter().fold(self, |b, m| b.with_method(m))
    }

    pub fn with_post(mut self, post: impl Into<String>) -> Self {
        self.request.post = Some(post.into());
        self
    }

    pub fn with_file(mut self, file: impl Into<PathBuf>) -> Self {
        self.request.file = Some(file.into());
        self
    }

    pub fn with_header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.request
            .headers
            .insert(name.as_ref().to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_query_param(mut self, name: impl Into<String>, value: impl AsRef<str>) -> Self {
        self.request
            .query
            .insert(name.into(), normalize_query_value(value.as_ref()));
        self
    }

    /// Finish the stub, rewriting authorization pseudo headers into the
    /// value the `authorization` header is expected to carry
    pub fn build(mut self) -> StubbedRequest {
        for auth in AuthorizationType::ALL {
            if let Some(raw) = self.request.headers.get_mut(auth.header_key()) {
                *raw = auth.normalize(raw);
            }
        }
        self.request
    }

    /// Finish an incoming request; header values are kept verbatim
    pub fn build_incoming(self) -> StubbedRequest {
        self.request
    }
}
