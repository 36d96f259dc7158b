//! Stub entries: `request` plus one or more `response`s.

use super::{ConfigError, OneOrMany, Scalar};
use crate::stubs::{StubHttpLifecycle, StubbedRequest, StubbedResponse};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::warn;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RequestEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<OneOrMany>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post: Option<String>,
    /// Path relative to the config file; its content replaces `post`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, Scalar>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub query: BTreeMap<String, Scalar>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ResponseEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<Scalar>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    /// Path relative to the config file; its content replaces `body`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, Scalar>,
    /// Delay in milliseconds before the response is written
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency: Option<Scalar>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum ResponseEntries {
    Sequence(Vec<ResponseEntry>),
    Single(ResponseEntry),
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StubEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    pub request: RequestEntry,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<ResponseEntries>,
}

impl StubEntry {
    /// Build the lifecycle, resolving files against `base_dir`
    pub(crate) fn into_lifecycle(
        self,
        index: usize,
        base_dir: &Path,
        complete_yaml: String,
    ) -> Result<StubHttpLifecycle, ConfigError> {
        let request_yaml = to_yaml_section("request", &self.request, index)?;
        let response_yaml = match &self.response {
            Some(response) => to_yaml_section("response", response, index)?,
            None => String::new(),
        };

        let request = self.request.into_request(base_dir);
        let responses = match self.response {
            None => Vec::new(),
            Some(ResponseEntries::Single(entry)) => vec![entry.into_response(index, base_dir)?],
            Some(ResponseEntries::Sequence(entries)) => entries
                .into_iter()
                .map(|entry| entry.into_response(index, base_dir))
                .collect::<Result<_, _>>()?,
        };

        let mut builder = StubHttpLifecycle::builder()
            .with_request(request)
            .with_responses(responses)
            .with_yaml(complete_yaml, request_yaml, response_yaml);
        if let Some(uuid) = self.uuid {
            builder = builder.with_uuid(uuid);
        }
        if let Some(description) = self.description {
            builder = builder.with_description(description);
        }
        Ok(builder.build())
    }
}

impl RequestEntry {
    fn into_request(self, base_dir: &Path) -> StubbedRequest {
        let mut builder = StubbedRequest::builder();
        if let Some(url) = self.url {
            builder = builder.with_url(url);
        }
        if let Some(method) = self.method {
            builder = builder.with_methods(method.into_vec());
        }

        let mut post = self.post;
        if let Some(file) = self.file {
            let path = base_dir.join(&file);
            match std::fs::read(&path) {
                Ok(content) => post = Some(String::from_utf8_lossy(&content).into_owned()),
                Err(e) => warn!(
                    "Could not read request file {}, using inline post: {}",
                    path.display(),
                    e
                ),
            }
            builder = builder.with_file(path);
        }
        if let Some(post) = post {
            builder = builder.with_post(post);
        }

        for (name, value) in self.headers {
            builder = builder.with_header(name, value.into_string());
        }
        for (name, value) in self.query {
            builder = builder.with_query_param(name, value.into_string());
        }
        builder.build()
    }
}

impl ResponseEntry {
    fn into_response(self, index: usize, base_dir: &Path) -> Result<StubbedResponse, ConfigError> {
        let mut builder = StubbedResponse::builder();

        if let Some(status) = self.status {
            let status = status.into_string();
            let code = status
                .trim()
                .parse::<u16>()
                .ok()
                .filter(|code| (100..=999).contains(code))
                .ok_or_else(|| ConfigError::InvalidStub {
                    index,
                    message: format!("invalid status '{status}'"),
                })?;
            builder = builder.with_status(code);
        }

        let mut body = self.body.map(Bytes::from);
        if let Some(file) = self.file {
            let path: PathBuf = base_dir.join(&file);
            match std::fs::read(&path) {
                Ok(content) => body = Some(Bytes::from(content)),
                Err(e) => warn!(
                    "Could not read response file {}, using inline body: {}",
                    path.display(),
                    e
                ),
            }
            builder = builder.with_file(path);
        }
        if let Some(body) = body {
            builder = builder.with_body(body);
        }

        for (name, value) in self.headers {
            builder = builder.with_header(name, value.into_string());
        }

        if let Some(latency) = self.latency {
            let latency = latency.into_string();
            let millis = latency
                .trim()
                .parse::<u64>()
                .map_err(|_| ConfigError::InvalidStub {
                    index,
                    message: format!("invalid latency '{latency}'"),
                })?;
            builder = builder.with_latency(millis);
        }

        Ok(builder.build())
    }
}

fn to_yaml_section<T: Serialize>(key: &str, value: &T, index: usize) -> Result<String, ConfigError> {
    let mut section = BTreeMap::new();
    section.insert(key, value);
    serde_yaml::to_string(&section).map_err(|e| ConfigError::InvalidStub {
        index,
        message: e.to_string(),
    })
}
