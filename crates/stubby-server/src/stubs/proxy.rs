//! Upstream proxy configuration.

use super::request::render_map;
use crate::constants::DEFAULT_PROXY_CONFIG_UUID;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProxyStrategy {
    /// Forward the request unchanged
    #[default]
    AsIs,
    /// Add the configured headers to the forwarded request
    Additive,
}

impl fmt::Display for ProxyStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProxyStrategy::AsIs => f.write_str("as-is"),
            ProxyStrategy::Additive => f.write_str("additive"),
        }
    }
}

impl FromStr for ProxyStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "as-is" | "as_is" | "asis" => Ok(ProxyStrategy::AsIs),
            "additive" => Ok(ProxyStrategy::Additive),
            other => Err(format!("unknown proxy strategy: {other}")),
        }
    }
}

/// A named upstream used when no stub matches
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StubProxyConfig {
    uuid: String,
    description: Option<String>,
    strategy: ProxyStrategy,
    headers: BTreeMap<String, String>,
    properties: BTreeMap<String, String>,
    yaml: String,
}

impl StubProxyConfig {
    pub fn builder() -> StubProxyConfigBuilder {
        StubProxyConfigBuilder::default()
    }

    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn strategy(&self) -> ProxyStrategy {
        self.strategy
    }

    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    pub fn properties(&self) -> &BTreeMap<String, String> {
        &self.properties
    }

    /// Base URL requests are forwarded to
    pub fn endpoint(&self) -> &str {
        self.properties
            .get("endpoint")
            .map(String::as_str)
            .unwrap_or_default()
    }

    pub fn is_default(&self) -> bool {
        self.uuid == DEFAULT_PROXY_CONFIG_UUID
    }

    pub fn yaml(&self) -> &str {
        &self.yaml
    }

    pub fn fields(&self) -> Vec<(&'static str, String)> {
        let mut fields = vec![("uuid", self.uuid.clone())];
        if let Some(description) = &self.description {
            fields.push(("description", description.clone()));
        }
        fields.push(("strategy", self.strategy.to_string()));
        if !self.headers.is_empty() {
            fields.push(("headers", render_map(&self.headers)));
        }
        fields.push(("properties", render_map(&self.properties)));
        fields
    }
}

#[derive(Debug, Default)]
pub struct StubProxyConfigBuilder {
    uuid: Option<String>,
    description: Option<String>,
    strategy: ProxyStrategy,
    headers: BTreeMap<String, String>,
    properties: BTreeMap<String, String>,
    yaml: String,
}

impl StubProxyConfigBuilder {
    pub fn with_uuid(mut self, uuid: impl Into<String>) -> Self {
        self.uuid = Some(uuid.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_strategy(mut self, strategy: ProxyStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.as_ref().to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    pub fn with_endpoint(self, endpoint: impl Into<String>) -> Self {
        self.with_property("endpoint", endpoint)
    }

    pub fn with_yaml(mut self, yaml: impl Into<String>) -> Self {
        self.yaml = yaml.into();
        self
    }

    /// A config without a UUID becomes the default one
    pub fn build(self) -> StubProxyConfig {
        StubProxyConfig {
            uuid: self
                .uuid
                .filter(|u| !u.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_PROXY_CONFIG_UUID.to_string()),
            description: self.description,
            strategy: self.strategy,
            headers: self.headers,
            properties: self.properties,
            yaml: self.yaml,
        }
    }
}
