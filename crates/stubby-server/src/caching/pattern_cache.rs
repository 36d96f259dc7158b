//! Compiled regex cache.
//!
//! Every matched field of every request may need a compiled pattern, so the
//! cache is a concurrent map that callers share without extra locking. The key
//! is the pattern's hash combined with the flag set it was compiled with; the
//! source text is kept alongside the compiled regex so a hash collision is
//! treated as a miss instead of returning the wrong pattern.

use crate::metrics::PATTERN_CACHE_LOOKUPS;
use dashmap::DashMap;
use regex::Regex;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Configuration for the pattern cache
#[derive(Clone, Debug)]
pub struct PatternCacheConfig {
    /// Enable caching; when disabled every lookup compiles afresh
    pub enabled: bool,
    /// Maximum number of compiled patterns (LRU eviction when exceeded)
    pub max_size: usize,
    /// TTL for entries in seconds (0 = no expiration)
    pub ttl_seconds: u64,
}

impl Default for PatternCacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_size: 500,
            ttl_seconds: 3600,
        }
    }
}

/// Regex compilation flags. Each combination is cached independently.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct RegexFlags(u8);

impl RegexFlags {
    pub const NONE: Self = Self(0);
    /// `^` and `$` match at line boundaries
    pub const MULTILINE: Self = Self(0b0001);
    /// `.` matches `\n`
    pub const DOTALL: Self = Self(0b0010);
    /// Pattern text is matched literally
    pub const LITERAL: Self = Self(0b0100);
    /// Compiled for searching anywhere in the input rather than whole-input matching
    pub const SEARCH: Self = Self(0b1000);

    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }
}

/// Cache key: hash of the pattern text plus the flag bitmask
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PatternKey {
    pattern_hash: u64,
    flags: RegexFlags,
}

impl PatternKey {
    pub fn new(pattern: &str, flags: RegexFlags) -> Self {
        let mut hasher = DefaultHasher::new();
        pattern.hash(&mut hasher);
        Self {
            pattern_hash: hasher.finish(),
            flags,
        }
    }
}

struct CachedPattern {
    source: String,
    regex: Arc<Regex>,
    created_at: Instant,
    last_accessed: Instant,
}

impl CachedPattern {
    fn new(source: &str, regex: Arc<Regex>) -> Self {
        let now = Instant::now();
        Self {
            source: source.to_string(),
            regex,
            created_at: now,
            last_accessed: now,
        }
    }

    fn is_expired(&self, ttl: Duration) -> bool {
        if ttl.is_zero() {
            return false;
        }
        self.created_at.elapsed() > ttl
    }
}

/// Snapshot of cache performance counters
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CacheMetrics {
    pub hits: u64,
    pub misses: u64,
    pub inserts: u64,
    pub evictions: u64,
    pub expirations: u64,
    pub size: usize,
}

impl CacheMetrics {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    inserts: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
}

enum Lookup {
    Hit(Arc<Regex>),
    Expired,
    Miss,
}

/// Concurrent cache of compiled patterns
pub struct PatternCache {
    config: PatternCacheConfig,
    entries: DashMap<PatternKey, CachedPattern>,
    counters: Counters,
}

impl Default for PatternCache {
    fn default() -> Self {
        Self::new(PatternCacheConfig::default())
    }
}

impl PatternCache {
    pub fn new(config: PatternCacheConfig) -> Self {
        debug!(
            "Creating pattern cache: enabled={}, max_size={}, ttl={}s",
            config.enabled, config.max_size, config.ttl_seconds
        );
        Self {
            config,
            entries: DashMap::new(),
            counters: Counters::default(),
        }
    }

    /// Return the cached pattern for `(pattern, flags)`, compiling it with
    /// `compile` on a miss. Compile errors are returned and never cached.
    pub fn get_or_try_compile<F>(
        &self,
        pattern: &str,
        flags: RegexFlags,
        compile: F,
    ) -> Result<Arc<Regex>, regex::Error>
    where
        F: FnOnce() -> Result<Regex, regex::Error>,
    {
        if !self.config.enabled {
            return compile().map(Arc::new);
        }

        let key = PatternKey::new(pattern, flags);
        let ttl = Duration::from_secs(self.config.ttl_seconds);

        // The shard guard must be released before removing or inserting
        let lookup = match self.entries.get_mut(&key) {
            Some(mut entry) if entry.source == pattern => {
                if entry.is_expired(ttl) {
                    Lookup::Expired
                } else {
                    entry.last_accessed = Instant::now();
                    Lookup::Hit(Arc::clone(&entry.regex))
                }
            }
            _ => Lookup::Miss,
        };

        match lookup {
            Lookup::Hit(regex) => {
                trace!("Pattern cache hit for {:?}", key);
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                PATTERN_CACHE_LOOKUPS.with_label_values(&["hit"]).inc();
                return Ok(regex);
            }
            Lookup::Expired => {
                trace!("Pattern cache entry expired for {:?}", key);
                self.entries.remove(&key);
                self.counters.expirations.fetch_add(1, Ordering::Relaxed);
            }
            Lookup::Miss => {}
        }

        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        PATTERN_CACHE_LOOKUPS.with_label_values(&["miss"]).inc();

        let regex = Arc::new(compile()?);

        if self.entries.len() >= self.config.max_size && !self.entries.contains_key(&key) {
            self.evict_lru();
        }
        self.entries
            .insert(key, CachedPattern::new(pattern, Arc::clone(&regex)));
        self.counters.inserts.fetch_add(1, Ordering::Relaxed);
        trace!("Pattern cache insert for {:?}", key);

        Ok(regex)
    }

    fn evict_lru(&self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|entry| entry.value().last_accessed)
            .map(|entry| *entry.key());

        if let Some(key) = oldest {
            self.entries.remove(&key);
            self.counters.evictions.fetch_add(1, Ordering::Relaxed);
            trace!("Evicted pattern cache entry: {:?}", key);
        }
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn metrics(&self) -> CacheMetrics {
        CacheMetrics {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            inserts: self.counters.inserts.load(Ordering::Relaxed),
            evictions: self.counters.evictions.load(Ordering::Relaxed),
            expirations: self.counters.expirations.load(Ordering::Relaxed),
            size: self.entries.len(),
        }
    }
}
