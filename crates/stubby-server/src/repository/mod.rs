//! Stub storage and request resolution.
//!
//! This module provides:
//! - `StubRepository`: the ordered stub list, UUID index and proxy configs
//! - `ParseResult`: a loaded configuration ready to be installed
//! - `StubSearchResult`: the response chosen for one incoming request
//!
//! ## Module Structure
//!
//! - `types`: Inputs, outputs and errors
//! - `recording`: Bodies fetched for recording responses
//! - `core`: The repository itself

mod core;
mod recording;
mod types;


pub use core::StubRepository;
#[allow(unused_imports)]
pub use recording::RecordingStore;
pub use types::{ParseResult, RepositoryError, StubSearchResult};
