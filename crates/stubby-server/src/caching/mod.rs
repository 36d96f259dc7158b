//! Caches shared by the matching engine.
//!
//! # Module Structure
//!
//! - `pattern_cache` - Compiled regex memoization keyed by pattern hash and flag set

mod pattern_cache;

#[allow(unused_imports)]
pub use pattern_cache::{CacheMetrics, PatternCache, PatternCacheConfig, PatternKey, RegexFlags};
