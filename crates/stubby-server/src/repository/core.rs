//! Core StubRepository struct and implementation.
//!
//! The repository owns the ordered stub list, the UUID index and the proxy
//! configs behind one `RwLock`. Searches scan the list under the read lock and
//! release it before any upstream I/O; administrative mutations take the write
//! lock and recompute every stub's resource-id before releasing it.

use super::recording::RecordingStore;
use super::types::{ParseResult, RepositoryError, StubSearchResult};
use crate::caching::{PatternCache, PatternCacheConfig};
use crate::constants::{
    DEFAULT_PROXY_CONFIG_UUID, HEADER_X_STUBBY_PROXY_CONFIG, HEADER_X_STUBBY_PROXY_REQUEST,
    HEADER_X_STUBBY_PROXY_RESPONSE,
};
use crate::http::HttpTransport;
use crate::matching::{RegexGroups, RequestMatcher};
use crate::metrics;
use crate::stubs::{
    ProxyStrategy, ResponseKind, StubHttpLifecycle, StubProxyConfig, StubbedRequest,
    StubbedResponse,
};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::ffi::OsStr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Upstream response headers that describe the upstream connection, not the body
const HOP_BY_HOP_HEADERS: [&str; 3] = ["connection", "content-length", "transfer-encoding"];

#[derive(Default)]
struct RepositoryState {
    stubs: Vec<Arc<StubHttpLifecycle>>,
    uuid_to_stub: HashMap<String, Arc<StubHttpLifecycle>>,
    proxy_configs: Vec<StubProxyConfig>,
}

impl RepositoryState {
    fn reindex(&self) {
        for (index, stub) in self.stubs.iter().enumerate() {
            stub.set_resource_id(index);
        }
    }

    fn check_index(&self, index: usize) -> Result<(), RepositoryError> {
        if index < self.stubs.len() {
            Ok(())
        } else {
            Err(RepositoryError::IndexOutOfBounds {
                index,
                len: self.stubs.len(),
            })
        }
    }

    fn index_of_uuid(&self, uuid: &str) -> Result<usize, RepositoryError> {
        self.uuid_to_stub
            .get(uuid)
            .and_then(|stub| self.stubs.iter().position(|s| Arc::ptr_eq(s, stub)))
            .ok_or_else(|| RepositoryError::UnknownUuid(uuid.to_string()))
    }

    fn replace_at(
        &mut self,
        index: usize,
        stub: StubHttpLifecycle,
    ) -> Result<Arc<StubHttpLifecycle>, RepositoryError> {
        self.check_index(index)?;
        if let Some(uuid) = stub.uuid() {
            let taken = self
                .uuid_to_stub
                .get(uuid)
                .is_some_and(|owner| !Arc::ptr_eq(owner, &self.stubs[index]));
            if taken {
                return Err(RepositoryError::DuplicateUuid(uuid.to_string()));
            }
        }

        let stub = Arc::new(stub);
        let replaced = std::mem::replace(&mut self.stubs[index], Arc::clone(&stub));
        if let Some(uuid) = replaced.uuid() {
            self.uuid_to_stub.remove(uuid);
        }
        if let Some(uuid) = stub.uuid().map(str::to_string) {
            self.uuid_to_stub.insert(uuid, stub);
        }
        self.reindex();
        Ok(replaced)
    }

    fn remove_at(&mut self, index: usize) -> Result<Arc<StubHttpLifecycle>, RepositoryError> {
        self.check_index(index)?;
        let removed = self.stubs.remove(index);
        if let Some(uuid) = removed.uuid() {
            self.uuid_to_stub.remove(uuid);
        }
        self.reindex();
        Ok(removed)
    }
}

/// Thread-safe stub store and request matcher
pub struct StubRepository {
    state: RwLock<RepositoryState>,
    matcher: RequestMatcher,
    transport: Arc<dyn HttpTransport>,
    /// Hits per resource-id
    resource_stats: DashMap<usize, AtomicU64>,
    recordings: RecordingStore,
}

impl StubRepository {
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self::with_cache_config(PatternCacheConfig::default(), transport)
    }

    pub fn with_cache_config(config: PatternCacheConfig, transport: Arc<dyn HttpTransport>) -> Self {
        let cache = Arc::new(PatternCache::new(config));
        Self {
            state: RwLock::new(RepositoryState::default()),
            matcher: RequestMatcher::new(cache),
            transport,
            resource_stats: DashMap::new(),
            recordings: RecordingStore::new(),
        }
    }

    pub fn matcher(&self) -> &RequestMatcher {
        &self.matcher
    }

    pub fn pattern_cache(&self) -> &Arc<PatternCache> {
        self.matcher.value_matcher().cache()
    }

    /// Find the response for an incoming request.
    ///
    /// The first stub whose criteria `incoming` satisfies wins. Without a match
    /// the request goes to a proxy config if any is loaded, otherwise the
    /// result carries the canonical 404.
    pub async fn search(&self, incoming: StubbedRequest) -> StubSearchResult {
        let started = Instant::now();
        let found = self.find_match(&incoming);
        let scan_ms = started.elapsed().as_secs_f64() * 1000.0;

        let (response, matched, regex_groups, outcome) = match found {
            Some((stub, groups)) => {
                let (response, outcome) = self.apply_post_match(&stub, &incoming).await;
                (response, Some(stub), groups, outcome)
            }
            None => {
                info!(
                    "No stub matched {} request at URI {}",
                    incoming.methods().first().map_or("", String::as_str),
                    incoming.url().unwrap_or_default()
                );
                match self.select_proxy_config(&incoming) {
                    Some(config) => {
                        let response = self.proxy(&config, &incoming).await;
                        (response, None, RegexGroups::new(), "proxied")
                    }
                    None => (
                        StubbedResponse::not_found(),
                        None,
                        RegexGroups::new(),
                        "not_found",
                    ),
                }
            }
        };

        metrics::record_search(outcome, scan_ms);
        StubSearchResult {
            incoming,
            response,
            matched,
            regex_groups,
        }
    }

    fn find_match(
        &self,
        incoming: &StubbedRequest,
    ) -> Option<(Arc<StubHttpLifecycle>, RegexGroups)> {
        let state = self.state.read();
        state.stubs.iter().find_map(|stub| {
            stub.request()
                .satisfied_with_groups(incoming, &self.matcher)
                .map(|groups| (Arc::clone(stub), groups))
        })
    }

    async fn apply_post_match(
        &self,
        stub: &StubHttpLifecycle,
        incoming: &StubbedRequest,
    ) -> (StubbedResponse, &'static str) {
        self.resource_stats
            .entry(stub.resource_id())
            .or_default()
            .fetch_add(1, Ordering::Relaxed);

        let response = stub.response(true);

        if stub.is_authorization_required() && stub.is_incoming_request_unauthorized(incoming) {
            debug!(
                "Stub {} requires {:?} authorization, incoming request does not carry it",
                stub.resource_id(),
                stub.request().authorization_type()
            );
            return (StubbedResponse::unauthorized(), "unauthorized");
        }

        if response.has_location_header() {
            return (response.into_redirect(), "redirect");
        }

        if response.is_recording_required() {
            let response = self.fetch_recording(stub, incoming, response).await;
            return (response, "matched");
        }

        (response, "matched")
    }

    async fn fetch_recording(
        &self,
        stub: &StubHttpLifecycle,
        incoming: &StubbedRequest,
        response: StubbedResponse,
    ) -> StubbedResponse {
        let target_url = format!(
            "{}{}",
            response.body_text().trim(),
            incoming.url().unwrap_or_default()
        );

        if let Some(body) = self.recordings.get(&target_url) {
            debug!("Replaying recorded body for {}", target_url);
            metrics::record_upstream_fetch("recording", "cached");
            return response.with_body(body);
        }

        match self.transport.fetch(stub.request(), &target_url).await {
            Ok(fetched) => {
                debug!("Recorded {} bytes from {}", fetched.body.len(), target_url);
                metrics::record_upstream_fetch("recording", "success");
                self.recordings.record(target_url, fetched.body.clone());
                response.with_body(fetched.body)
            }
            Err(e) => {
                error!("Could not record from {}: {}", target_url, e);
                metrics::record_upstream_fetch("recording", "error");
                response
            }
        }
    }

    fn select_proxy_config(&self, incoming: &StubbedRequest) -> Option<StubProxyConfig> {
        let state = self.state.read();
        if state.proxy_configs.is_empty() {
            return None;
        }

        let requested = incoming
            .header(HEADER_X_STUBBY_PROXY_CONFIG)
            .map(str::trim)
            .filter(|uuid| !uuid.is_empty());
        if let Some(uuid) = requested {
            if let Some(config) = state.proxy_configs.iter().find(|c| c.uuid() == uuid) {
                return Some(config.clone());
            }
            warn!(
                "Proxy config '{}' requested via {} is unknown, using the default config",
                uuid, HEADER_X_STUBBY_PROXY_CONFIG
            );
        }

        state
            .proxy_configs
            .iter()
            .find(|c| c.is_default())
            .cloned()
    }

    async fn proxy(&self, config: &StubProxyConfig, incoming: &StubbedRequest) -> StubbedResponse {
        let proxy_request_uuid = uuid::Uuid::new_v4().to_string();
        let target_url = format!(
            "{}{}{}",
            config.endpoint(),
            incoming.url().unwrap_or_default(),
            render_query(incoming.query())
        );

        let mut forwarded = incoming
            .clone()
            .into_builder()
            .with_header(HEADER_X_STUBBY_PROXY_REQUEST, proxy_request_uuid.clone());
        if config.strategy() == ProxyStrategy::Additive {
            for (name, value) in config.headers() {
                forwarded = forwarded.with_header(name, value.clone());
            }
        }
        let forwarded = forwarded.build_incoming();

        debug!(
            "Proxying to {} via proxy config '{}' ({})",
            target_url,
            config.uuid(),
            config.strategy()
        );

        match self.transport.fetch(&forwarded, &target_url).await {
            Ok(fetched) => {
                metrics::record_upstream_fetch("proxy", "success");
                let mut builder = StubbedResponse::builder()
                    .with_status(fetched.status)
                    .with_body(fetched.body);
                for (name, value) in fetched.headers {
                    if !HOP_BY_HOP_HEADERS.contains(&name.to_ascii_lowercase().as_str()) {
                        builder = builder.with_header(name, value);
                    }
                }
                builder
                    .build()
                    .with_kind(ResponseKind::Proxied)
                    .with_header(HEADER_X_STUBBY_PROXY_RESPONSE, proxy_request_uuid)
            }
            Err(e) => {
                error!("Proxying to {} failed: {}", target_url, e);
                metrics::record_upstream_fetch("proxy", "error");
                StubbedResponse::server_error(e.to_string())
                    .with_header(HEADER_X_STUBBY_PROXY_RESPONSE, proxy_request_uuid)
            }
        }
    }

    /// Replace every stub and proxy config.
    ///
    /// Returns whether any stubs were installed. A set of proxy configs
    /// without a `default` one is rejected and the current state is kept.
    pub fn reset_stubs_cache(&self, parsed: ParseResult) -> Result<bool, RepositoryError> {
        let ParseResult {
            stubs,
            uuid_to_stub,
            proxy_configs,
        } = parsed;

        if !proxy_configs.is_empty() && !proxy_configs.iter().any(StubProxyConfig::is_default) {
            error!("Rejecting configuration: proxy configs are declared without a default one");
            return Err(RepositoryError::MissingDefaultProxyConfig);
        }

        let installed = !stubs.is_empty();
        let (stub_count, proxy_count) = (stubs.len(), proxy_configs.len());
        {
            let mut state = self.state.write();
            state.stubs = stubs;
            state.uuid_to_stub = uuid_to_stub;
            state.proxy_configs = proxy_configs;
            state.reindex();
        }
        self.resource_stats.clear();
        self.recordings.clear();
        metrics::set_stubs_loaded(stub_count);

        info!(
            "Installed {} stubs and {} proxy configs",
            stub_count, proxy_count
        );
        Ok(installed)
    }

    pub fn update_stub_by_index(
        &self,
        index: usize,
        stub: StubHttpLifecycle,
    ) -> Result<Arc<StubHttpLifecycle>, RepositoryError> {
        let replaced = self.state.write().replace_at(index, stub)?;
        self.recordings.clear();
        debug!("Updated stub at index {}", index);
        Ok(replaced)
    }

    pub fn update_stub_by_uuid(
        &self,
        uuid: &str,
        stub: StubHttpLifecycle,
    ) -> Result<Arc<StubHttpLifecycle>, RepositoryError> {
        let replaced = {
            let mut state = self.state.write();
            let index = state.index_of_uuid(uuid)?;
            state.replace_at(index, stub)?
        };
        self.recordings.clear();
        debug!("Updated stub with uuid {}", uuid);
        Ok(replaced)
    }

    pub fn delete_stub_by_index(
        &self,
        index: usize,
    ) -> Result<Arc<StubHttpLifecycle>, RepositoryError> {
        let removed = {
            let mut state = self.state.write();
            let removed = state.remove_at(index)?;
            metrics::set_stubs_loaded(state.stubs.len());
            removed
        };
        self.recordings.clear();
        debug!("Deleted stub at index {}", index);
        Ok(removed)
    }

    pub fn delete_stub_by_uuid(
        &self,
        uuid: &str,
    ) -> Result<Arc<StubHttpLifecycle>, RepositoryError> {
        let removed = {
            let mut state = self.state.write();
            let index = state.index_of_uuid(uuid)?;
            let removed = state.remove_at(index)?;
            metrics::set_stubs_loaded(state.stubs.len());
            removed
        };
        self.recordings.clear();
        debug!("Deleted stub with uuid {}", uuid);
        Ok(removed)
    }

    /// Drop every stub; proxy configs are kept
    pub fn delete_all_stubs(&self) {
        {
            let mut state = self.state.write();
            state.stubs.clear();
            state.uuid_to_stub.clear();
        }
        self.recordings.clear();
        metrics::set_stubs_loaded(0);
        info!("Deleted all stubs");
    }

    pub fn can_match_stub_by_index(&self, index: usize) -> bool {
        index < self.state.read().stubs.len()
    }

    pub fn can_match_stub_by_uuid(&self, uuid: &str) -> bool {
        self.state.read().uuid_to_stub.contains_key(uuid)
    }

    pub fn match_stub_by_index(
        &self,
        index: usize,
    ) -> Result<Arc<StubHttpLifecycle>, RepositoryError> {
        let state = self.state.read();
        state.check_index(index)?;
        Ok(Arc::clone(&state.stubs[index]))
    }

    pub fn match_stub_by_uuid(&self, uuid: &str) -> Result<Arc<StubHttpLifecycle>, RepositoryError> {
        self.state
            .read()
            .uuid_to_stub
            .get(uuid)
            .cloned()
            .ok_or_else(|| RepositoryError::UnknownUuid(uuid.to_string()))
    }

    pub fn get_stubs(&self) -> Vec<Arc<StubHttpLifecycle>> {
        self.state.read().stubs.clone()
    }

    pub fn stub_count(&self) -> usize {
        self.state.read().stubs.len()
    }

    pub fn get_proxy_configs(&self) -> Vec<StubProxyConfig> {
        self.state.read().proxy_configs.clone()
    }

    pub fn can_match_proxy_config_by_uuid(&self, uuid: &str) -> bool {
        self.state
            .read()
            .proxy_configs
            .iter()
            .any(|c| c.uuid() == uuid)
    }

    pub fn match_proxy_config_by_uuid(&self, uuid: &str) -> Result<StubProxyConfig, RepositoryError> {
        self.state
            .read()
            .proxy_configs
            .iter()
            .find(|c| c.uuid() == uuid)
            .cloned()
            .ok_or_else(|| RepositoryError::UnknownProxyConfig(uuid.to_string()))
    }

    /// Replace the proxy config stored under `uuid`; the replacement must carry the same UUID
    pub fn update_proxy_config_by_uuid(
        &self,
        uuid: &str,
        config: StubProxyConfig,
    ) -> Result<StubProxyConfig, RepositoryError> {
        if config.uuid() != uuid {
            return Err(RepositoryError::ProxyConfigUuidMismatch {
                expected: uuid.to_string(),
                actual: config.uuid().to_string(),
            });
        }
        let mut state = self.state.write();
        let slot = state
            .proxy_configs
            .iter_mut()
            .find(|c| c.uuid() == uuid)
            .ok_or_else(|| RepositoryError::UnknownProxyConfig(uuid.to_string()))?;
        let replaced = std::mem::replace(slot, config);
        debug!("Updated proxy config {}", uuid);
        Ok(replaced)
    }

    pub fn delete_proxy_config_by_uuid(&self, uuid: &str) -> Result<StubProxyConfig, RepositoryError> {
        if uuid == DEFAULT_PROXY_CONFIG_UUID {
            return Err(RepositoryError::CannotDeleteDefaultProxyConfig);
        }
        let mut state = self.state.write();
        let index = state
            .proxy_configs
            .iter()
            .position(|c| c.uuid() == uuid)
            .ok_or_else(|| RepositoryError::UnknownProxyConfig(uuid.to_string()))?;
        debug!("Deleted proxy config {}", uuid);
        Ok(state.proxy_configs.remove(index))
    }

    /// Hit counts keyed by resource-id
    pub fn get_resource_stats(&self) -> BTreeMap<usize, u64> {
        self.resource_stats
            .iter()
            .map(|entry| (*entry.key(), entry.value().load(Ordering::Relaxed)))
            .collect()
    }

    pub fn get_resource_stats_as_csv(&self) -> String {
        let mut csv = String::from("resourceId,hits\n");
        for (resource_id, hits) in self.get_resource_stats() {
            csv.push_str(&format!("{resource_id},{hits}\n"));
        }
        csv
    }

    /// Every file referenced by a stub, with its last-modified time in epoch millis.
    ///
    /// Files are deduplicated by file name; the first reference in repository
    /// order wins. Files that cannot be inspected are left out.
    pub fn get_external_files(&self) -> BTreeMap<PathBuf, i64> {
        let files: Vec<PathBuf> = self
            .state
            .read()
            .stubs
            .iter()
            .flat_map(|stub| stub.external_files())
            .collect();

        let mut seen_names = HashSet::new();
        let mut modified = BTreeMap::new();
        for file in files {
            let Some(name) = file.file_name().map(OsStr::to_os_string) else {
                continue;
            };
            if seen_names.contains(&name) {
                continue;
            }
            match std::fs::metadata(&file).and_then(|m| m.modified()) {
                Ok(time) => {
                    seen_names.insert(name);
                    modified.insert(file, DateTime::<Utc>::from(time).timestamp_millis());
                }
                Err(e) => debug!("Skipping external file {}: {}", file.display(), e),
            }
        }
        modified
    }

    /// Proxy config YAML followed by every stub's YAML, in repository order
    pub fn dump_complete_yaml_config(&self) -> String {
        let state = self.state.read();
        let mut dump = String::new();
        for config in &state.proxy_configs {
            push_yaml(&mut dump, config.yaml());
        }
        for stub in &state.stubs {
            push_yaml(&mut dump, stub.complete_yaml());
        }
        dump
    }

    pub fn get_stub_yaml_by_index(&self, index: usize) -> Result<String, RepositoryError> {
        Ok(self.match_stub_by_index(index)?.complete_yaml().to_string())
    }

    pub fn get_stub_yaml_by_uuid(&self, uuid: &str) -> Result<String, RepositoryError> {
        Ok(self.match_stub_by_uuid(uuid)?.complete_yaml().to_string())
    }

    pub fn get_proxy_config_yaml_by_uuid(&self, uuid: &str) -> Result<String, RepositoryError> {
        Ok(self.match_proxy_config_by_uuid(uuid)?.yaml().to_string())
    }
}

fn push_yaml(dump: &mut String, yaml: &str) {
    if yaml.trim().is_empty() {
        return;
    }
    dump.push_str(yaml);
    if !yaml.ends_with('\n') {
        dump.push('\n');
    }
}

fn render_query(query: &BTreeMap<String, String>) -> String {
    if query.is_empty() {
        return String::new();
    }
    let pairs: Vec<String> = query
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect();
    format!("?{}", pairs.join("&"))
}
