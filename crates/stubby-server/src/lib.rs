// Library exports for the server binary, integration tests and benchmarks

pub mod caching;
pub mod config;
pub mod constants;
pub mod http;
pub mod matching;
pub mod metrics;
pub mod repository;
pub mod stubs;

pub use config::{load_config, load_config_str};
pub use repository::{ParseResult, RepositoryError, StubRepository, StubSearchResult};
