//! Field-ordered request comparison.
//!
//! Fields are compared in a fixed order (url, method, body, headers, query)
//! and the first failing field ends the comparison. The order also fixes the
//! order of the diagnostic log lines.

use super::body::BodyMatcher;
use super::value::{RegexGroups, ValueMatcher};
use crate::caching::PatternCache;
use crate::stubs::{AuthorizationType, StubbedRequest};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

const URL_TOKEN: &str = "url";
const HEADERS_MAP: &str = "headers";
const QUERY_MAP: &str = "query";

/// True when `stubbed` is empty or shares at least one method with `asserted`
pub fn lists_intersect(stubbed: &[String], asserted: &[String]) -> bool {
    if stubbed.is_empty() {
        return true;
    }
    asserted.iter().any(|method| {
        stubbed
            .iter()
            .any(|candidate| candidate.eq_ignore_ascii_case(method))
    })
}

fn log_step(field: &str, matched: bool, stubbed: &dyn std::fmt::Debug, asserted: &dyn std::fmt::Debug) {
    if matched {
        debug!(
            "Matched on stubbed {} [{:?}] WITH incoming [{:?}]",
            field, stubbed, asserted
        );
    } else {
        debug!(
            "Failed to match on stubbed {} [{:?}] WITH incoming [{:?}]",
            field, stubbed, asserted
        );
    }
}

/// Compares a stubbed request against an asserting request
#[derive(Debug, Clone)]
pub struct RequestMatcher {
    values: ValueMatcher,
    bodies: BodyMatcher,
}

impl RequestMatcher {
    pub fn new(cache: Arc<PatternCache>) -> Self {
        let values = ValueMatcher::new(cache);
        Self {
            bodies: BodyMatcher::new(values.clone()),
            values,
        }
    }

    pub fn value_matcher(&self) -> &ValueMatcher {
        &self.values
    }

    /// Match `asserting` against `stubbed`.
    ///
    /// Returns the regex capture groups collected along the way when every
    /// field matches, `None` otherwise.
    pub fn matches(
        &self,
        stubbed: &StubbedRequest,
        asserting: &StubbedRequest,
    ) -> Option<RegexGroups> {
        let mut groups = RegexGroups::new();

        let url_matched =
            self.values
                .matches(stubbed.url(), asserting.url(), URL_TOKEN, &mut groups);
        log_step("url", url_matched, &stubbed.url(), &asserting.url());
        if !url_matched {
            return None;
        }

        if !stubbed.methods().is_empty() {
            let method_matched = lists_intersect(stubbed.methods(), asserting.methods());
            log_step("method", method_matched, &stubbed.methods(), &asserting.methods());
            if !method_matched {
                return None;
            }
        }

        if stubbed.is_request_body_stubbed() {
            let body_matched = stubbed.post_body().is_some_and(|body| {
                self.bodies.matches(
                    body,
                    asserting.post_body(),
                    asserting.header("content-type"),
                    &mut groups,
                )
            });
            log_step(
                "post body",
                body_matched,
                &stubbed.post_body(),
                &asserting.post_body(),
            );
            if !body_matched {
                return None;
            }
        }

        if !stubbed.headers().is_empty() {
            let mut required = stubbed.headers().clone();
            for auth in AuthorizationType::ALL {
                // authorization is verified after the match to tell 401 from 404
                required.remove(auth.header_key());
            }
            let headers_matched =
                self.maps_match(&required, asserting.headers(), HEADERS_MAP, &mut groups);
            log_step("headers", headers_matched, &required, asserting.headers());
            if !headers_matched {
                return None;
            }
        }

        if !stubbed.query().is_empty() {
            let query_matched =
                self.maps_match(stubbed.query(), asserting.query(), QUERY_MAP, &mut groups);
            log_step("query", query_matched, stubbed.query(), asserting.query());
            if !query_matched {
                return None;
            }
        }

        Some(groups)
    }

    /// Every stubbed key must be present in `asserted` with a matching value.
    /// Keys only present in `asserted` are ignored.
    pub fn maps_match(
        &self,
        stubbed: &BTreeMap<String, String>,
        asserted: &BTreeMap<String, String>,
        map_name: &str,
        groups: &mut RegexGroups,
    ) -> bool {
        if stubbed.is_empty() {
            return true;
        }
        if asserted.is_empty() {
            return false;
        }

        stubbed.iter().all(|(key, value)| {
            asserted.get(key).is_some_and(|actual| {
                let token = format!("{map_name}.{key}");
                self.values
                    .matches(Some(value), Some(actual), &token, groups)
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    fn matcher() -> RequestMatcher {
        RequestMatcher::new(Arc::new(PatternCache::default()))
    }

    fn map(entries: &[(&str, &str)]) -> BTreeMap<String, String> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_lists_intersect() {
        let get = vec!["GET".to_string()];
        let get_head = vec!["GET".to_string(), "HEAD".to_string()];

        assert!(lists_intersect(&[], &get));
        assert!(lists_intersect(&get_head, &["head".to_string()]));
        assert!(!lists_intersect(&get, &["POST".to_string()]));
        assert!(!lists_intersect(&get, &[]));
    }

    #[test]
    fn test_maps_match_subset_semantics() {
        let m = matcher();
        let mut groups = RegexGroups::new();

        assert!(m.maps_match(&map(&[]), &map(&[]), "query", &mut groups));
        assert!(!m.maps_match(&map(&[("a", "1")]), &map(&[]), "query", &mut groups));
        assert!(m.maps_match(
            &map(&[("a", "1")]),
            &map(&[("a", "1"), ("b", "2")]),
            "query",
            &mut groups
        ));
        assert!(!m.maps_match(&map(&[("a", "1")]), &map(&[("b", "1")]), "query", &mut groups));
        assert!(!m.maps_match(&map(&[("a", "1")]), &map(&[("a", "2")]), "query", &mut groups));
    }

    #[test]
    fn test_maps_match_records_groups_with_map_token() {
        let m = matcher();
        let mut groups = RegexGroups::new();

        assert!(m.maps_match(
            &map(&[("id", "^([0-9]+)$")]),
            &map(&[("id", "123")]),
            "query",
            &mut groups
        ));
        assert_eq!(groups.get("query.id.1").map(String::as_str), Some("123"));
    }

    #[test]
    fn test_unset_criteria_match_anything() {
        let m = matcher();
        let stubbed = StubbedRequest::builder().build();
        let asserting = StubbedRequest::builder()
            .with_url("/anything")
            .with_method("DELETE")
            .with_header("X-Custom", "1")
            .with_query_param("q", "x")
            .build();

        assert!(m.matches(&stubbed, &asserting).is_some());
    }

    #[test]
    fn test_body_only_checked_for_body_carrying_methods() {
        let m = matcher();
        let stubbed = StubbedRequest::builder()
            .with_url("/submit")
            .with_method("GET")
            .with_post("payload")
            .build();
        let asserting = StubbedRequest::builder()
            .with_url("/submit")
            .with_method("GET")
            .build();

        assert!(!stubbed.is_request_body_stubbed());
        assert!(m.matches(&stubbed, &asserting).is_some());
    }

    #[test]
    fn test_body_mismatch_fails_post() {
        let m = matcher();
        let stubbed = StubbedRequest::builder()
            .with_url("/submit")
            .with_method("POST")
            .with_post("payload")
            .build();
        let asserting = StubbedRequest::builder()
            .with_url("/submit")
            .with_method("POST")
            .with_post("other")
            .build();

        assert!(m.matches(&stubbed, &asserting).is_none());
    }

    #[test]
    fn test_auth_headers_are_not_matching_criteria() {
        let m = matcher();
        let stubbed = StubbedRequest::builder()
            .with_url("/secure")
            .with_header("authorization-basic", "bob:secret")
            .build();
        let asserting = StubbedRequest::builder().with_url("/secure").build();

        assert!(m.matches(&stubbed, &asserting).is_some());
    }

    #[test]
    #[traced_test]
    fn test_logs_follow_field_order() {
        let m = matcher();
        let stubbed = StubbedRequest::builder()
            .with_url("/invoice")
            .with_method("GET")
            .with_query_param("status", "paid")
            .build();
        let asserting = StubbedRequest::builder()
            .with_url("/invoice")
            .with_method("GET")
            .with_query_param("status", "open")
            .build();

        assert!(m.matches(&stubbed, &asserting).is_none());
        assert!(logs_contain("Matched on stubbed url"));
        assert!(logs_contain("Matched on stubbed method"));
        assert!(logs_contain("Failed to match on stubbed query"));
    }
}
