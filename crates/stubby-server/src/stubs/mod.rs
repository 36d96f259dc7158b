//! Stub entity model.
//!
//! # Module Structure
//!
//! - `request` - Stubbed request criteria and the incoming request descriptor
//! - `response` - Stubbed responses and the canonical 404/401 responses
//! - `cursor` - Lock-free position in a response sequence
//! - `lifecycle` - A request paired with its response sequence
//! - `proxy` - Upstream proxy configurations

mod cursor;
mod lifecycle;
mod proxy;
mod request;
mod response;

#[allow(unused_imports)]
pub use cursor::SequenceCursor;
#[allow(unused_imports)]
pub use lifecycle::{StubHttpLifecycle, StubHttpLifecycleBuilder};
#[allow(unused_imports)]
pub use proxy::{ProxyStrategy, StubProxyConfig, StubProxyConfigBuilder};
#[allow(unused_imports)]
pub use request::{normalize_query_value, AuthorizationType, StubbedRequest, StubbedRequestBuilder};
#[allow(unused_imports)]
pub use response::{ResponseKind, StubbedResponse, StubbedResponseBuilder};
