//! `proxy-config` entries.

use super::{ConfigError, Scalar};
use crate::stubs::{ProxyStrategy, StubProxyConfig};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ProxyConfigEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Defaults to `default`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    /// `as-is` (default) or `additive`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<String>,
    /// Must contain `endpoint`
    #[serde(default)]
    pub properties: BTreeMap<String, Scalar>,
    /// Added to forwarded requests by the `additive` strategy
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, Scalar>,
}

impl ProxyConfigEntry {
    pub(crate) fn into_proxy_config(
        self,
        index: usize,
        yaml: String,
    ) -> Result<StubProxyConfig, ConfigError> {
        let strategy = match self.strategy.as_deref() {
            None => ProxyStrategy::default(),
            Some(raw) => raw
                .parse::<ProxyStrategy>()
                .map_err(|message| ConfigError::InvalidStub { index, message })?,
        };

        if !self.properties.contains_key("endpoint") {
            return Err(ConfigError::InvalidStub {
                index,
                message: "proxy-config requires properties.endpoint".to_string(),
            });
        }

        let mut builder = StubProxyConfig::builder()
            .with_strategy(strategy)
            .with_yaml(yaml);
        if let Some(uuid) = self.uuid {
            builder = builder.with_uuid(uuid);
        }
        if let Some(description) = self.description {
            builder = builder.with_description(description);
        }
        for (name, value) in self.properties {
            builder = builder.with_property(name, value.into_string());
        }
        for (name, value) in self.headers {
            builder = builder.with_header(name, value.into_string());
        }
        Ok(builder.build())
    }
}
