//! Single value comparison.
//!
//! A stubbed value matches an asserted value when it is unset, when it is a
//! regex that matches the whole asserted value, or when both are equal.

use crate::caching::{PatternCache, RegexFlags};
use regex::{Regex, RegexBuilder};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::trace;

/// Capture groups recorded during a match, keyed by `{token}.{group index}`
pub type RegexGroups = HashMap<String, String>;

const REGEX_CHARS: [char; 14] = [
    '$', '(', ')', '*', '+', '.', '?', '[', ']', '\\', '^', '{', '|', '}',
];
const REGEX_CHAR_THRESHOLD: usize = 2;

/// Flag combinations tried in order until one produces a whole-input match
const FLAG_COMBINATIONS: [RegexFlags; 3] = [
    RegexFlags::MULTILINE,
    RegexFlags::DOTALL,
    RegexFlags::MULTILINE.union(RegexFlags::DOTALL),
];

/// Cheap check for whether a stubbed string is plausibly a regex.
///
/// True when the value starts with `^`, ends with `$`, or contains at least
/// two regex metacharacters. Shorter values are never treated as patterns.
pub fn potential_regex(pattern: &str) -> bool {
    if pattern.chars().count() < REGEX_CHAR_THRESHOLD {
        return false;
    }
    if pattern.starts_with('^') || pattern.ends_with('$') {
        return true;
    }
    pattern
        .chars()
        .filter(|c| REGEX_CHARS.contains(c))
        .take(REGEX_CHAR_THRESHOLD)
        .count()
        == REGEX_CHAR_THRESHOLD
}

/// A value is set when present and not blank
pub fn is_set(value: Option<&str>) -> bool {
    value.is_some_and(|v| !v.trim().is_empty())
}

pub fn build_token(name: &str, index: usize) -> String {
    format!("{name}.{index}")
}

/// Compile `pattern` with `flags`.
///
/// Unless [`RegexFlags::SEARCH`] is set the pattern is anchored at both ends.
/// The raw pattern is validated on its own first so that unbalanced groups
/// cannot be "repaired" by the anchoring wrapper.
pub(crate) fn compile(pattern: &str, flags: RegexFlags) -> Result<Regex, regex::Error> {
    let source = if flags.contains(RegexFlags::LITERAL) {
        regex::escape(pattern)
    } else {
        Regex::new(pattern)?;
        pattern.to_string()
    };
    let source = if flags.contains(RegexFlags::SEARCH) {
        source
    } else {
        format!(r"\A(?:{source})\z")
    };
    RegexBuilder::new(&source)
        .multi_line(flags.contains(RegexFlags::MULTILINE))
        .dot_matches_new_line(flags.contains(RegexFlags::DOTALL))
        .build()
}

/// Compares one stubbed value against one asserted value
#[derive(Clone)]
pub struct ValueMatcher {
    cache: Arc<PatternCache>,
}

impl std::fmt::Debug for ValueMatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValueMatcher")
            .field("cached_patterns", &self.cache.len())
            .finish()
    }
}

impl ValueMatcher {
    pub fn new(cache: Arc<PatternCache>) -> Self {
        Self { cache }
    }

    pub fn cache(&self) -> &Arc<PatternCache> {
        &self.cache
    }

    /// Match a stubbed value against an asserted value.
    ///
    /// Capture groups of a successful regex match are recorded in `groups`
    /// under `{token}.0`, `{token}.1`, ...
    pub fn matches(
        &self,
        stubbed: Option<&str>,
        asserted: Option<&str>,
        token: &str,
        groups: &mut RegexGroups,
    ) -> bool {
        let Some(stubbed) = stubbed.filter(|v| !v.trim().is_empty()) else {
            return true;
        };
        let Some(asserted) = asserted.filter(|v| !v.trim().is_empty()) else {
            return false;
        };

        if potential_regex(stubbed) && self.regex_match(stubbed, asserted, token, groups) {
            return true;
        }
        stubbed == asserted
    }

    /// Whole-input regex match trying each flag combination in turn.
    /// A pattern that does not compile is matched literally instead.
    pub fn regex_match(
        &self,
        pattern: &str,
        subject: &str,
        token: &str,
        groups: &mut RegexGroups,
    ) -> bool {
        FLAG_COMBINATIONS
            .iter()
            .any(|flags| self.match_with_flags(pattern, subject, token, groups, *flags))
    }

    fn match_with_flags(
        &self,
        pattern: &str,
        subject: &str,
        token: &str,
        groups: &mut RegexGroups,
        flags: RegexFlags,
    ) -> bool {
        let regex = match self.compiled(pattern, flags) {
            Ok(regex) => regex,
            Err(e) => {
                trace!("Pattern '{}' does not compile ({}), matching literally", pattern, e);
                match self.compiled(pattern, RegexFlags::LITERAL) {
                    Ok(regex) => regex,
                    Err(_) => return false,
                }
            }
        };

        let Some(captures) = regex.captures(subject) else {
            return false;
        };
        for (index, group) in captures.iter().enumerate() {
            let value = group.map(|m| m.as_str().to_string()).unwrap_or_default();
            groups.insert(build_token(token, index), value);
        }
        true
    }

    /// Search for `pattern` anywhere in `subject`, returning the matched text
    pub fn find(&self, pattern: &str, subject: &str) -> Result<Option<String>, regex::Error> {
        let regex = self.compiled(pattern, RegexFlags::SEARCH)?;
        Ok(regex.find(subject).map(|m| m.as_str().to_string()))
    }

    fn compiled(&self, pattern: &str, flags: RegexFlags) -> Result<Arc<Regex>, regex::Error> {
        self.cache
            .get_or_try_compile(pattern, flags, || compile(pattern, flags))
    }
}
