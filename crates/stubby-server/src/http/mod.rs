//! HTTP plumbing around the repository.
//!
//! ## Module Structure
//!
//! - `descriptor`: Inbound request to asserting [`StubbedRequest`](crate::stubs::StubbedRequest)
//! - `metrics`: Prometheus scrape endpoint
//! - `server`: hyper accept loop and response rendering
//! - `transport`: Outbound fetches for recording and proxy responses

mod descriptor;
mod metrics;
mod server;
mod transport;

#[allow(unused_imports)]
pub use descriptor::{parse_query_string, to_stubbed_request};
pub use metrics::serve_metrics;
#[allow(unused_imports)]
pub use server::{not_found_message, render, serve, StubServer};
pub use transport::{FetchedResponse, HttpTransport, ReqwestTransport, TransportError};
