//! AdBlock-style list parsing and matching.

use regex::{Regex, RegexBuilder};

use super::translate::{translate, Dialect};
use crate::error::ListEntryError;

/// Outcome of a list line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListAction {
    /// Route through the proxy
    Block,
    /// Bypass the proxy (`@@` lines)
    Allow,
}

/// One translated list line.
///
/// A line whose native expression does not compile (JavaScript-only regex
/// syntax such as lookaheads) is kept for the PAC script but never matches
/// in process.
#[derive(Debug, Clone)]
pub struct ListEntry {
    action: ListAction,
    source: String,
    script_expr: String,
    native: Result<Regex, ListEntryError>,
}

impl ListEntry {
    /// Parse a single list line.
    ///
    /// Returns `None` for blank lines, `!` comments and `[...]` headers.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('!') || line.starts_with('[') {
            return None;
        }

        let (action, pattern) = match line.strip_prefix("@@") {
            Some(rest) => (ListAction::Allow, rest),
            None => (ListAction::Block, line),
        };

        let (native_expr, script_expr) = match regex_literal(pattern) {
            Some(inner) => (inner.to_string(), inner.to_string()),
            None => (
                translate(pattern, Dialect::Native),
                translate(pattern, Dialect::Script),
            ),
        };

        if native_expr.is_empty() {
            log::warn!(
                "List line {:?} matches every URL, which is highly not recommended",
                line
            );
        }

        let native = RegexBuilder::new(&native_expr)
            .case_insensitive(true)
            .build()
            .map_err(|source| ListEntryError {
                line: line.to_string(),
                expr: native_expr,
                source,
            });

        Some(Self {
            action,
            source: line.to_string(),
            script_expr,
            native,
        })
    }

    pub fn action(&self) -> ListAction {
        self.action
    }

    /// The line as written in the list.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Expression for the generated PAC script.
    pub fn script_expr(&self) -> &str {
        &self.script_expr
    }

    /// Expression used for in-process matching.
    pub fn native_expr(&self) -> &str {
        match &self.native {
            Ok(regex) => regex.as_str(),
            Err(e) => &e.expr,
        }
    }

    /// Why the native expression failed to compile, if it did.
    pub fn native_error(&self) -> Option<&ListEntryError> {
        self.native.as_ref().err()
    }

    /// True when the line only takes effect in the PAC script.
    pub fn is_script_only(&self) -> bool {
        self.native.is_err()
    }

    pub fn is_match(&self, url: &str) -> bool {
        self.native.as_ref().map_or(false, |regex| regex.is_match(url))
    }
}

fn regex_literal(pattern: &str) -> Option<&str> {
    if pattern.len() >= 2 && pattern.starts_with('/') && pattern.ends_with('/') {
        Some(&pattern[1..pattern.len() - 1])
    } else {
        None
    }
}

/// A parsed AdBlock-style list.
///
/// Allow entries are always evaluated before block entries, whatever their
/// position in the source.
#[derive(Debug, Clone, Default)]
pub struct AdBlockList {
    allow: Vec<ListEntry>,
    block: Vec<ListEntry>,
}

impl AdBlockList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse list content.
    ///
    /// Lines that fail to compile natively are logged and kept as
    /// script-only entries.
    pub fn parse(content: &str) -> Self {
        let mut list = Self::new();
        list.extend(content);
        list
    }

    /// Parse several sources in order into one list.
    pub fn from_sources<'a>(sources: impl IntoIterator<Item = &'a str>) -> Self {
        let mut list = Self::new();
        for content in sources {
            list.extend(content);
        }
        list
    }

    /// Append the lines of another source.
    pub fn extend(&mut self, content: &str) {
        for line in content.lines() {
            if let Some(entry) = ListEntry::parse(line) {
                if let Some(e) = entry.native_error() {
                    log::warn!("Keeping list line for the PAC script only: {}", e);
                }
                self.push(entry);
            }
        }
    }

    pub fn push(&mut self, entry: ListEntry) {
        match entry.action {
            ListAction::Allow => self.allow.push(entry),
            ListAction::Block => self.block.push(entry),
        }
    }

    /// Decide a URL. Allow entries win over block entries.
    pub fn decide(&self, url: &str) -> Option<ListAction> {
        if self.allow.iter().any(|e| e.is_match(url)) {
            return Some(ListAction::Allow);
        }
        if self.block.iter().any(|e| e.is_match(url)) {
            return Some(ListAction::Block);
        }
        None
    }

    pub fn is_blocked(&self, url: &str) -> bool {
        self.decide(url) == Some(ListAction::Block)
    }

    /// Entries in evaluation order: allow entries, then block entries.
    ///
    /// Script-only entries are included.
    pub fn entries(&self) -> impl Iterator<Item = &ListEntry> {
        self.allow.iter().chain(self.block.iter())
    }

    pub fn len(&self) -> usize {
        self.allow.len() + self.block.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skips_comments_and_headers() {
        assert!(ListEntry::parse("").is_none());
        assert!(ListEntry::parse("   ").is_none());
        assert!(ListEntry::parse("! comment").is_none());
        assert!(ListEntry::parse("[AutoProxy 0.2.9]").is_none());
    }

    #[test]
    fn test_allow_prefix() {
        let entry = ListEntry::parse("@@||example.com").unwrap();
        assert_eq!(entry.action(), ListAction::Allow);
        assert_eq!(entry.source(), "@@||example.com");
        assert!(entry.is_match("http://www.example.com/"));

        let entry = ListEntry::parse("||example.com").unwrap();
        assert_eq!(entry.action(), ListAction::Block);
    }

    #[test]
    fn test_regex_literal_passthrough() {
        let entry = ListEntry::parse("/foo.*bar/").unwrap();
        assert_eq!(entry.native_expr(), "foo.*bar");
        assert_eq!(entry.script_expr(), "foo.*bar");
        assert!(entry.is_match("http://x.com/FOO/and/BAR"));
        assert!(!entry.is_match("http://x.com/bar/foo"));
    }

    #[test]
    fn test_invalid_literal_is_script_only() {
        let entry = ListEntry::parse("/unclosed(/").unwrap();
        assert!(entry.is_script_only());
        assert_eq!(entry.native_error().unwrap().line, "/unclosed(/");
        assert_eq!(entry.native_expr(), "unclosed(");
        assert_eq!(entry.script_expr(), "unclosed(");
        assert!(!entry.is_match("http://unclosed(/"));
    }

    #[test]
    fn test_lookahead_literal_is_script_only() {
        let entry = ListEntry::parse(r"/^https?:\/\/(?!www\.)[^\/]+\.b\.com/").unwrap();
        assert!(entry.is_script_only());
        assert_eq!(entry.script_expr(), r"^https?:\/\/(?!www\.)[^\/]+\.b\.com");
        assert!(!entry.is_match("http://img.b.com/"));
    }

    #[test]
    fn test_match_all_line_is_kept() {
        let entry = ListEntry::parse("*").unwrap();
        assert_eq!(entry.native_expr(), "");
        assert!(entry.is_match("http://anything/"));
    }

    #[test]
    fn test_allow_before_block() {
        let list = AdBlockList::parse("*.example.com\n@@safe.example.com\n");
        assert_eq!(list.len(), 2);
        assert_eq!(
            list.decide("http://safe.example.com/"),
            Some(ListAction::Allow)
        );
        assert_eq!(
            list.decide("http://www.example.com/"),
            Some(ListAction::Block)
        );
        assert_eq!(list.decide("http://other.org/"), None);
        assert!(!list.is_blocked("http://safe.example.com/"));

        let first = list.entries().next().unwrap();
        assert_eq!(first.action(), ListAction::Allow);
    }

    #[test]
    fn test_script_only_lines_never_match() {
        let list = AdBlockList::from_sources(["||a.com\n/bad(/\n", "@@||b.a.com"]);
        assert_eq!(list.len(), 3);
        assert_eq!(list.entries().filter(|e| e.is_script_only()).count(), 1);
        assert!(list.is_blocked("http://x.a.com/"));
        assert!(!list.is_blocked("http://b.a.com/"));
        assert!(!list.is_blocked("http://bad(/"));
    }
}
