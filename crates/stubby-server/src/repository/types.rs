//! Repository inputs, outputs and errors.

use crate::matching::RegexGroups;
use crate::stubs::{StubHttpLifecycle, StubProxyConfig, StubbedRequest, StubbedResponse};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RepositoryError {
    #[error("Stub index {index} out of bounds (stub count {len})")]
    IndexOutOfBounds { index: usize, len: usize },
    #[error("No stub with uuid {0}")]
    UnknownUuid(String),
    #[error("Duplicate uuid {0}")]
    DuplicateUuid(String),
    #[error("Proxy configs are declared but none has uuid 'default'")]
    MissingDefaultProxyConfig,
    #[error("The default proxy config cannot be deleted")]
    CannotDeleteDefaultProxyConfig,
    #[error("Proxy config uuid {actual} does not match {expected}")]
    ProxyConfigUuidMismatch { expected: String, actual: String },
    #[error("No proxy config with uuid {0}")]
    UnknownProxyConfig(String),
}

/// Loaded configuration, ready to be installed with
/// [`StubRepository::reset_stubs_cache`](super::StubRepository::reset_stubs_cache)
#[derive(Debug, Default)]
pub struct ParseResult {
    pub(crate) stubs: Vec<Arc<StubHttpLifecycle>>,
    pub(crate) uuid_to_stub: HashMap<String, Arc<StubHttpLifecycle>>,
    pub(crate) proxy_configs: Vec<StubProxyConfig>,
}

impl ParseResult {
    /// Index stubs by UUID; a UUID used twice (by stubs or by proxy configs) is rejected
    pub fn new(
        stubs: Vec<StubHttpLifecycle>,
        proxy_configs: Vec<StubProxyConfig>,
    ) -> Result<Self, RepositoryError> {
        let stubs: Vec<Arc<StubHttpLifecycle>> = stubs.into_iter().map(Arc::new).collect();

        let mut uuid_to_stub = HashMap::new();
        for stub in &stubs {
            if let Some(uuid) = stub.uuid() {
                if uuid_to_stub
                    .insert(uuid.to_string(), Arc::clone(stub))
                    .is_some()
                {
                    return Err(RepositoryError::DuplicateUuid(uuid.to_string()));
                }
            }
        }

        for (i, config) in proxy_configs.iter().enumerate() {
            if proxy_configs[..i].iter().any(|c| c.uuid() == config.uuid()) {
                return Err(RepositoryError::DuplicateUuid(config.uuid().to_string()));
            }
        }

        Ok(Self {
            stubs,
            uuid_to_stub,
            proxy_configs,
        })
    }

    pub fn stubs(&self) -> &[Arc<StubHttpLifecycle>] {
        &self.stubs
    }

    pub fn stub_by_uuid(&self, uuid: &str) -> Option<&Arc<StubHttpLifecycle>> {
        self.uuid_to_stub.get(uuid)
    }

    pub fn proxy_configs(&self) -> &[StubProxyConfig] {
        &self.proxy_configs
    }
}

/// Outcome of [`StubRepository::search`](super::StubRepository::search)
#[derive(Debug, Clone)]
pub struct StubSearchResult {
    pub incoming: StubbedRequest,
    pub response: StubbedResponse,
    /// The stub that matched, if any
    pub matched: Option<Arc<StubHttpLifecycle>>,
    /// Capture groups recorded while matching
    pub regex_groups: RegexGroups,
}
