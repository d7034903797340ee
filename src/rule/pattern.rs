//! Anchored, case-insensitive pattern sets for rule fields.

use regex::{Regex, RegexBuilder};

use crate::error::{PatternError, PatternField};

/// A set of compiled patterns for one rule field.
///
/// Patterns within a set are OR'd. An empty set matches everything.
#[derive(Debug, Clone, Default)]
pub struct PatternSet {
    regexes: Vec<Regex>,
}

impl PatternSet {
    /// Compile every pattern of a field, failing on the first invalid one.
    pub fn compile(
        field: PatternField,
        patterns: &[String],
        rule_index: usize,
    ) -> Result<Self, PatternError> {
        let mut regexes = Vec::with_capacity(patterns.len());
        for pattern in patterns {
            let expr = prepare_pattern(pattern);
            let regex = RegexBuilder::new(&expr)
                .case_insensitive(true)
                .build()
                .map_err(|source| PatternError {
                    rule_index,
                    field,
                    pattern: pattern.clone(),
                    source,
                })?;
            regexes.push(regex);
        }
        Ok(Self { regexes })
    }

    /// True if the set is empty or any pattern matches.
    pub fn matches(&self, value: &str) -> bool {
        self.regexes.is_empty() || self.regexes.iter().any(|re| re.is_match(value))
    }

    pub fn len(&self) -> usize {
        self.regexes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regexes.is_empty()
    }
}

/// Turn a rule pattern into an anchored regular expression.
///
/// `/expr/` is taken verbatim. Otherwise `.` and `?` are literal, `*` is a
/// wildcard, and anything else keeps its regex meaning.
pub fn prepare_pattern(pattern: &str) -> String {
    let pattern = pattern.trim();
    if let Some(inner) = verbatim(pattern) {
        return format!("^(?:{})$", inner);
    }

    let mut expr = String::with_capacity(pattern.len() + 8);
    for ch in pattern.chars() {
        match ch {
            '.' => expr.push_str(r"\."),
            '?' => expr.push_str(r"\?"),
            '*' => expr.push_str(".*"),
            _ => expr.push(ch),
        }
    }
    format!("^(?:{})$", expr)
}

fn verbatim(pattern: &str) -> Option<&str> {
    if pattern.len() >= 2 && pattern.starts_with('/') && pattern.ends_with('/') {
        Some(&pattern[1..pattern.len() - 1])
    } else {
        None
    }
}
