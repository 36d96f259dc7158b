use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::sync::Arc;
use stubby_server::caching::PatternCache;
use stubby_server::matching::{RegexGroups, RequestMatcher, ValueMatcher};
use stubby_server::stubs::StubbedRequest;

fn stubbed_requests(count: usize, regex: bool) -> Vec<StubbedRequest> {
    (0..count)
        .map(|i| {
            let url = if regex {
                format!(r"^/api/v\d+/endpoint{i}$")
            } else {
                format!("/api/v1/endpoint{i}")
            };
            StubbedRequest::builder()
                .with_url(url)
                .with_methods(["GET", "POST"])
                .with_header("x-tenant", "acme")
                .build()
        })
        .collect()
}

fn incoming(i: usize) -> StubbedRequest {
    StubbedRequest::builder()
        .with_url(format!("/api/v1/endpoint{i}"))
        .with_method("GET")
        .with_header("X-Tenant", "acme")
        .with_header("Accept", "application/json")
        .build_incoming()
}

fn first_match(stubs: &[StubbedRequest], request: &StubbedRequest, matcher: &RequestMatcher) -> Option<usize> {
    stubs.iter().position(|stub| stub.is_satisfied_by(request, matcher))
}

fn bench_value_matching(c: &mut Criterion) {
    let mut group = c.benchmark_group("value_matching");
    let matcher = ValueMatcher::new(Arc::new(PatternCache::default()));

    group.throughput(Throughput::Elements(1));
    group.bench_function("literal", |b| {
        b.iter(|| {
            let mut groups = RegexGroups::new();
            matcher.matches(
                black_box(Some("/invoice/123")),
                black_box(Some("/invoice/123")),
                "url",
                &mut groups,
            )
        })
    });
    group.bench_function("regex_cached", |b| {
        b.iter(|| {
            let mut groups = RegexGroups::new();
            matcher.matches(
                black_box(Some(r"^/invoice/(\d+)$")),
                black_box(Some("/invoice/123")),
                "url",
                &mut groups,
            )
        })
    });
    group.finish();
}

fn bench_request_scan(c: &mut Criterion) {
    let mut group = c.benchmark_group("request_scan");
    let matcher = RequestMatcher::new(Arc::new(PatternCache::default()));

    for stub_count in [10, 100, 500] {
        for (label, regex) in [("literal", false), ("regex", true)] {
            let stubs = stubbed_requests(stub_count, regex);
            let last = incoming(stub_count - 1);
            let miss = incoming(stub_count + 1);

            group.throughput(Throughput::Elements(1));
            group.bench_with_input(
                BenchmarkId::new(format!("{label}_match_last"), stub_count),
                &stub_count,
                |b, _| b.iter(|| first_match(&stubs, black_box(&last), &matcher)),
            );
            group.bench_with_input(
                BenchmarkId::new(format!("{label}_match_none"), stub_count),
                &stub_count,
                |b, _| b.iter(|| first_match(&stubs, black_box(&miss), &matcher)),
            );
        }
    }
    group.finish();
}

criterion_group!(benches, bench_value_matching, bench_request_scan);
criterion_main!(benches);
