//! Semantic XML comparison.
//!
//! Both documents are reduced to element trees with comments dropped and
//! whitespace normalized. Elements are paired by name and attributes, falling
//! back to name alone, with backtracking over sibling pairings. Text and attribute values in the stubbed document may be
//! placeholders:
//!
//! - `${xmlunit.ignore}` - anything matches
//! - `${xmlunit.isNumber}` - the value parses as a number
//! - `${xmlunit.isDateTime}` / `${xmlunit.isDateTime(%d/%m/%Y)}` - the value parses as a date/time
//! - `${xmlunit.matchesRegex(^\d+$)}` - the pattern is found in the value; the
//!   matched text is recorded as a capture group

use super::value::{build_token, RegexGroups, ValueMatcher};
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::OnceLock;
use sxd_document::dom::{ChildOfElement, ChildOfRoot, Element};
use sxd_document::parser;

#[derive(Debug, thiserror::Error)]
pub enum XmlMatchError {
    #[error("Failed to parse {side} XML markup: {message}")]
    Parse { side: &'static str, message: String },
    #[error("{side} XML markup has no root element")]
    MissingRoot { side: &'static str },
    #[error("Unknown XML placeholder: {0}")]
    UnknownPlaceholder(String),
    #[error("Invalid regex in XML placeholder: {0}")]
    InvalidPlaceholderRegex(String),
}

static PLACEHOLDER_REGEX: OnceLock<Regex> = OnceLock::new();

fn get_placeholder_regex() -> &'static Regex {
    PLACEHOLDER_REGEX
        .get_or_init(|| Regex::new(r"(?s)^\$\{xmlunit\.(\w+)(?:\((.*)\))?\}$").unwrap())
}

type QualifiedName = (Option<String>, String);

#[derive(Debug, Clone, PartialEq)]
struct XmlElement {
    name: QualifiedName,
    attributes: BTreeMap<QualifiedName, String>,
    text: String,
    children: Vec<XmlElement>,
}

fn qualified(namespace: Option<&str>, local: &str) -> QualifiedName {
    (namespace.map(str::to_string), local.to_string())
}

fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn convert(element: Element<'_>) -> XmlElement {
    let name = element.name();
    let attributes = element
        .attributes()
        .into_iter()
        .map(|attr| {
            let attr_name = attr.name();
            (
                qualified(attr_name.namespace_uri(), attr_name.local_part()),
                attr.value().to_string(),
            )
        })
        .collect();

    let mut text_parts = Vec::new();
    let mut children = Vec::new();
    for child in element.children() {
        match child {
            ChildOfElement::Element(e) => children.push(convert(e)),
            ChildOfElement::Text(t) => {
                let normalized = normalize_whitespace(t.text());
                if !normalized.is_empty() {
                    text_parts.push(normalized);
                }
            }
            // comments and processing instructions do not take part in the comparison
            _ => {}
        }
    }

    XmlElement {
        name: qualified(name.namespace_uri(), name.local_part()),
        attributes,
        text: text_parts.join(" "),
        children,
    }
}

fn parse_document(markup: &str, side: &'static str) -> Result<XmlElement, XmlMatchError> {
    let package = parser::parse(markup).map_err(|e| XmlMatchError::Parse {
        side,
        message: format!("{e:?}"),
    })?;
    let document = package.as_document();
    let root = document
        .root()
        .children()
        .into_iter()
        .find_map(|child| match child {
            ChildOfRoot::Element(e) => Some(e),
            _ => None,
        })
        .ok_or(XmlMatchError::MissingRoot { side })?;
    Ok(convert(root))
}

/// Compare stubbed XML against asserted XML.
///
/// Returns an error when either document fails to parse or a placeholder is
/// malformed; callers fall back to text comparison in that case.
pub fn xml_match(
    stubbed: &str,
    asserted: &str,
    values: &ValueMatcher,
    token: &str,
    groups: &mut RegexGroups,
) -> Result<bool, XmlMatchError> {
    let control = parse_document(stubbed, "stubbed")?;
    let test = parse_document(asserted, "asserted")?;

    let mut comparison = XmlComparison {
        values,
        token,
        groups,
        regex_group_counter: 0,
    };
    comparison.elements_match(&control, &test)
}

struct XmlComparison<'a> {
    values: &'a ValueMatcher,
    token: &'a str,
    groups: &'a mut RegexGroups,
    regex_group_counter: usize,
}

impl XmlComparison<'_> {
    fn elements_match(
        &mut self,
        control: &XmlElement,
        test: &XmlElement,
    ) -> Result<bool, XmlMatchError> {
        if control.name != test.name || control.attributes.len() != test.attributes.len() {
            return Ok(false);
        }

        for (name, expected) in &control.attributes {
            let Some(actual) = test.attributes.get(name) else {
                return Ok(false);
            };
            if !self.values_match(expected, actual)? {
                return Ok(false);
            }
        }

        if !self.values_match(&control.text, &test.text)? {
            return Ok(false);
        }

        if control.children.len() != test.children.len() {
            return Ok(false);
        }

        let mut used = vec![false; test.children.len()];
        self.children_match(&control.children, &test.children, &mut used)
    }

    /// Pair every control child with an unused test child, backtracking when
    /// a pairing leaves the remaining children unmatched. Candidates with
    /// identical attributes are tried before those sharing only the name.
    fn children_match(
        &mut self,
        control: &[XmlElement],
        test: &[XmlElement],
        used: &mut [bool],
    ) -> Result<bool, XmlMatchError> {
        let Some((expected, rest)) = control.split_first() else {
            return Ok(true);
        };

        let (exact, loose): (Vec<usize>, Vec<usize>) = (0..test.len())
            .filter(|&i| !used[i] && test[i].name == expected.name)
            .partition(|&i| test[i].attributes == expected.attributes);

        for index in exact.into_iter().chain(loose) {
            let groups = self.groups.clone();
            let counter = self.regex_group_counter;

            used[index] = true;
            if self.elements_match(expected, &test[index])?
                && self.children_match(rest, test, used)?
            {
                return Ok(true);
            }
            used[index] = false;
            *self.groups = groups;
            self.regex_group_counter = counter;
        }

        Ok(false)
    }

    fn values_match(&mut self, expected: &str, actual: &str) -> Result<bool, XmlMatchError> {
        let Some(captures) = get_placeholder_regex().captures(expected.trim()) else {
            return Ok(expected == actual);
        };

        let keyword = captures.get(1).map_or("", |m| m.as_str());
        let argument = captures.get(2).map(|m| m.as_str().trim());
        let actual = actual.trim();

        match keyword {
            "ignore" => Ok(true),
            "isNumber" => Ok(actual.parse::<f64>().is_ok_and(f64::is_finite)),
            "isDateTime" => Ok(is_date_time(actual, argument.filter(|a| !a.is_empty()))),
            "matchesRegex" => {
                let Some(pattern) = argument.filter(|a| !a.is_empty()) else {
                    return Ok(false);
                };
                let found = self
                    .values
                    .find(pattern, actual)
                    .map_err(|e| XmlMatchError::InvalidPlaceholderRegex(e.to_string()))?;
                match found {
                    Some(matched) => {
                        self.regex_group_counter += 1;
                        self.groups
                            .insert(build_token(self.token, self.regex_group_counter), matched);
                        Ok(true)
                    }
                    None => Ok(false),
                }
            }
            other => Err(XmlMatchError::UnknownPlaceholder(other.to_string())),
        }
    }
}

fn is_date_time(value: &str, format: Option<&str>) -> bool {
    use chrono::{DateTime, NaiveDate, NaiveDateTime};

    match format {
        Some(format) => {
            NaiveDateTime::parse_from_str(value, format).is_ok()
                || NaiveDate::parse_from_str(value, format).is_ok()
        }
        None => {
            DateTime::parse_from_rfc3339(value).is_ok()
                || NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S").is_ok()
                || NaiveDate::parse_from_str(value, "%Y-%m-%d").is_ok()
        }
    }
}
