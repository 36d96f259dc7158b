//! Prometheus metrics for stubby-server.
//!
//! Tracks stub matching outcomes, recording/proxy fetches and pattern cache efficiency.
use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_gauge, register_histogram_vec, CounterVec, Encoder, Gauge,
    HistogramVec, TextEncoder,
};
use tracing::error;

lazy_static! {
    /// Stub searches by outcome
    pub static ref STUB_SEARCHES_TOTAL: CounterVec = register_counter_vec!(
        "stubby_stub_searches_total",
        "Total number of stub searches by outcome",
        &["outcome"]  // outcome: matched|not_found|unauthorized|redirect|proxied
    )
    .unwrap();

    /// Time spent scanning the stub list
    pub static ref STUB_SEARCH_DURATION_MS: HistogramVec = register_histogram_vec!(
        "stubby_stub_search_duration_ms",
        "Histogram of stub list scan time in milliseconds",
        &["matched"],
        vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 25.0, 50.0]
    )
    .unwrap();

    /// Upstream fetches made for recording responses and proxy fallbacks
    pub static ref UPSTREAM_FETCHES_TOTAL: CounterVec = register_counter_vec!(
        "stubby_upstream_fetches_total",
        "Total number of upstream fetches",
        &["kind", "result"]  // kind: recording|proxy, result: success|error|cached
    )
    .unwrap();

    /// Pattern cache lookups
    pub static ref PATTERN_CACHE_LOOKUPS: CounterVec = register_counter_vec!(
        "stubby_pattern_cache_lookups_total",
        "Total number of compiled pattern cache lookups",
        &["result"]  // result: hit|miss
    )
    .unwrap();

    /// Number of stubs currently loaded
    pub static ref STUBS_LOADED: Gauge = register_gauge!(
        "stubby_stubs_loaded",
        "Number of stubs in the live repository"
    )
    .unwrap();
}

/// Collect and return all metrics in Prometheus text format
pub fn collect_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!("Failed to encode metrics: {}", e);
        return String::new();
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

/// Helper to record a search outcome and its scan duration
pub fn record_search(outcome: &str, duration_ms: f64) {
    STUB_SEARCHES_TOTAL.with_label_values(&[outcome]).inc();
    let matched = if outcome == "not_found" || outcome == "proxied" {
        "false"
    } else {
        "true"
    };
    STUB_SEARCH_DURATION_MS
        .with_label_values(&[matched])
        .observe(duration_ms);
}

/// Helper to record an upstream fetch
pub fn record_upstream_fetch(kind: &str, result: &str) {
    UPSTREAM_FETCHES_TOTAL
        .with_label_values(&[kind, result])
        .inc();
}

/// Helper to set the loaded stubs gauge
pub fn set_stubs_loaded(count: usize) {
    STUBS_LOADED.set(count as f64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_collection() {
        record_search("matched", 0.3);
        record_search("not_found", 0.1);
        record_upstream_fetch("recording", "success");
        set_stubs_loaded(3);

        let output = collect_metrics();

        assert!(output.contains("stubby_stub_searches_total"));
        assert!(output.contains("stubby_stub_search_duration_ms"));
        assert!(output.contains("stubby_upstream_fetches_total"));
        assert!(output.contains("stubby_stubs_loaded"));
    }
}
