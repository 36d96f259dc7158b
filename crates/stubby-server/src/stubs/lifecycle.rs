//! A stub: one request paired with a sequence of responses.

use super::cursor::SequenceCursor;
use super::request::StubbedRequest;
use super::response::StubbedResponse;
use crate::constants::HEADER_X_STUBBY_RESOURCE_ID;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug)]
pub struct StubHttpLifecycle {
    request: StubbedRequest,
    responses: Vec<StubbedResponse>,
    cursor: SequenceCursor,
    resource_id: AtomicUsize,
    uuid: Option<String>,
    description: Option<String>,
    complete_yaml: String,
    request_yaml: String,
    response_yaml: String,
}

impl StubHttpLifecycle {
    pub fn builder() -> StubHttpLifecycleBuilder {
        StubHttpLifecycleBuilder::default()
    }

    pub fn request(&self) -> &StubbedRequest {
        &self.request
    }

    pub fn responses(&self) -> &[StubbedResponse] {
        &self.responses
    }

    pub fn resource_id(&self) -> usize {
        self.resource_id.load(Ordering::Acquire)
    }

    /// Rewritten by the repository whenever the stub list changes
    pub(crate) fn set_resource_id(&self, resource_id: usize) {
        self.resource_id.store(resource_id, Ordering::Release);
    }

    pub fn uuid(&self) -> Option<&str> {
        self.uuid.as_deref()
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn complete_yaml(&self) -> &str {
        &self.complete_yaml
    }

    pub fn request_yaml(&self) -> &str {
        &self.request_yaml
    }

    pub fn response_yaml(&self) -> &str {
        &self.response_yaml
    }

    /// The response at the cursor, tagged with the resource-id header.
    ///
    /// With `consume` the cursor moves on to the next response in the
    /// sequence. A stub without responses answers with an empty 200.
    pub fn response(&self, consume: bool) -> StubbedResponse {
        let count = self.responses.len();
        let response = if count == 0 {
            StubbedResponse::ok()
        } else {
            let index = if consume {
                self.cursor.advance(count)
            } else {
                self.cursor.current(count)
            };
            self.responses[index].clone()
        };
        response.with_header(HEADER_X_STUBBY_RESOURCE_ID, self.resource_id().to_string())
    }

    pub fn is_authorization_required(&self) -> bool {
        self.request.authorization_type().is_some()
    }

    /// True when the stub demands authorization that `incoming` does not carry
    pub fn is_incoming_request_unauthorized(&self, incoming: &StubbedRequest) -> bool {
        match self.request.expected_authorization() {
            Some(expected) => incoming
                .raw_authorization_header()
                .is_none_or(|actual| actual != expected),
            None => false,
        }
    }

    /// File references of the request and every response
    pub fn external_files(&self) -> Vec<PathBuf> {
        self.request
            .file()
            .into_iter()
            .chain(self.responses.iter().filter_map(StubbedResponse::file))
            .map(PathBuf::from)
            .collect()
    }

    pub fn fields(&self) -> Vec<(&'static str, String)> {
        let mut fields = vec![("resourceId", self.resource_id().to_string())];
        if let Some(uuid) = &self.uuid {
            fields.push(("uuid", uuid.clone()));
        }
        if let Some(description) = &self.description {
            fields.push(("description", description.clone()));
        }
        fields
    }
}

#[derive(Debug, Default)]
pub struct StubHttpLifecycleBuilder {
    request: StubbedRequest,
    responses: Vec<StubbedResponse>,
    uuid: Option<String>,
    description: Option<String>,
    complete_yaml: String,
    request_yaml: String,
    response_yaml: String,
}

impl StubHttpLifecycleBuilder {
    pub fn with_request(mut self, request: StubbedRequest) -> Self {
        self.request = request;
        self
    }

    pub fn with_response(mut self, response: StubbedResponse) -> Self {
        self.responses.push(response);
        self
    }

    pub fn with_responses(mut self, responses: impl IntoIterator<Item = StubbedResponse>) -> Self {
        self.responses.extend(responses);
        self
    }

    pub fn with_uuid(mut self, uuid: impl Into<String>) -> Self {
        self.uuid = Some(uuid.into()).filter(|u: &String| !u.trim().is_empty());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_yaml(
        mut self,
        complete: impl Into<String>,
        request: impl Into<String>,
        response: impl Into<String>,
    ) -> Self {
        self.complete_yaml = complete.into();
        self.request_yaml = request.into();
        self.response_yaml = response.into();
        self
    }

    pub fn build(self) -> StubHttpLifecycle {
        StubHttpLifecycle {
            request: self.request,
            responses: self.responses,
            cursor: SequenceCursor::new(),
            resource_id: AtomicUsize::new(0),
            uuid: self.uuid,
            description: self.description,
            complete_yaml: self.complete_yaml,
            request_yaml: self.request_yaml,
            response_yaml: self.response_yaml,
        }
    }
}
