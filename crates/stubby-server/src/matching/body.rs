//! Request body comparison.
//!
//! The asserted `content-type` picks the strategy: JSON bodies are compared
//! structurally, XML bodies through a semantic diff, anything else as text.
//! Structural comparison never fails loudly; when it cannot decide, the
//! stubbed body is handed to the [`ValueMatcher`] instead.

use super::value::{RegexGroups, ValueMatcher};
use super::xml::xml_match;
use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;
use tracing::{debug, error};

/// Template token used for body captures
pub(crate) const POST_TOKEN: &str = "post";

static SUB_TYPE_REGEX: OnceLock<Regex> = OnceLock::new();

fn get_sub_type_regex() -> &'static Regex {
    SUB_TYPE_REGEX.get_or_init(|| Regex::new(r"/(?:.*\+)?(\w*);?").unwrap())
}

/// Extract the MIME subtype from a content type, honouring structured suffixes.
///
/// `application/json` and `application/vnd.api+json; charset=utf-8` both yield `json`.
pub fn content_subtype(content_type: &str) -> Option<String> {
    get_sub_type_regex()
        .captures(content_type)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_ascii_lowercase())
}

/// Content-type aware body matcher
#[derive(Debug, Clone)]
pub struct BodyMatcher {
    values: ValueMatcher,
}

impl BodyMatcher {
    pub fn new(values: ValueMatcher) -> Self {
        Self { values }
    }

    /// Match a stubbed body against the asserted one.
    ///
    /// Callers are expected to invoke this only when the stub declares a body
    /// for a body-carrying method.
    pub fn matches(
        &self,
        stubbed: &str,
        asserted: Option<&str>,
        content_type: Option<&str>,
        groups: &mut RegexGroups,
    ) -> bool {
        let Some(asserted) = asserted.filter(|b| !b.trim().is_empty()) else {
            return false;
        };

        match content_type.and_then(content_subtype).as_deref() {
            Some("json") => self.json_match(stubbed, asserted, groups),
            Some("xml") => self.xml_body_match(stubbed, asserted, groups),
            _ => self
                .values
                .matches(Some(stubbed), Some(asserted), POST_TOKEN, groups),
        }
    }

    fn json_match(&self, stubbed: &str, asserted: &str, groups: &mut RegexGroups) -> bool {
        let parsed = serde_json::from_str::<Value>(stubbed)
            .and_then(|expected| serde_json::from_str::<Value>(asserted).map(|a| (expected, a)));

        match parsed {
            Ok((expected, actual)) => {
                if json_contains(&expected, &actual) {
                    return true;
                }
                let escaped = escape_structural_chars(stubbed);
                self.values
                    .matches(Some(&escaped), Some(asserted), POST_TOKEN, groups)
            }
            Err(e) => {
                // A stubbed JSON body that is really a regex lands here
                debug!("Body is not comparable as JSON ({}), matching as text", e);
                self.values
                    .matches(Some(stubbed), Some(asserted), POST_TOKEN, groups)
            }
        }
    }

    fn xml_body_match(&self, stubbed: &str, asserted: &str, groups: &mut RegexGroups) -> bool {
        match xml_match(stubbed, asserted, &self.values, POST_TOKEN, groups) {
            Ok(matched) => matched,
            Err(e) => {
                error!("Failed to compare XML markup: {}", e);
                self.values.regex_match(stubbed, asserted, POST_TOKEN, groups)
            }
        }
    }
}

/// Escape the JSON structural characters that are also regex metacharacters
fn escape_structural_chars(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len() + 8);
    for c in value.chars() {
        if matches!(c, '{' | '}' | '[' | ']') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Structural JSON comparison with `expected` as the stubbed side.
///
/// Objects in `actual` may carry extra fields. Arrays must have the same
/// length but their elements may appear in any order.
fn json_contains(expected: &Value, actual: &Value) -> bool {
    match (expected, actual) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::Number(a), Value::Number(b)) => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => a == b,
        },
        (Value::String(a), Value::String(b)) => a == b,
        (Value::Object(expected), Value::Object(actual)) => expected.iter().all(|(key, value)| {
            actual
                .get(key)
                .is_some_and(|actual_value| json_contains(value, actual_value))
        }),
        (Value::Array(expected), Value::Array(actual)) => {
            expected.len() == actual.len() && arrays_match_unordered(expected, actual)
        }
        _ => false,
    }
}

/// Pair every expected element with a distinct actual element (augmenting paths)
fn arrays_match_unordered(expected: &[Value], actual: &[Value]) -> bool {
    let mut owner: Vec<Option<usize>> = vec![None; actual.len()];

    fn assign(
        index: usize,
        expected: &[Value],
        actual: &[Value],
        owner: &mut [Option<usize>],
        visited: &mut [bool],
    ) -> bool {
        for slot in 0..actual.len() {
            if visited[slot] || !json_contains(&expected[index], &actual[slot]) {
                continue;
            }
            visited[slot] = true;
            let free = match owner[slot] {
                None => true,
                Some(other) => assign(other, expected, actual, owner, visited),
            };
            if free {
                owner[slot] = Some(index);
                return true;
            }
        }
        false
    }

    (0..expected.len()).all(|index| {
        let mut visited = vec![false; actual.len()];
        assign(index, expected, actual, &mut owner, &mut visited)
    })
}
