//! Routing decisions produced by rule selection.

use ahash::AHashSet;

use crate::Target;

/// Attribute asking for plain-HTTP requests to be redirected to HTTPS.
pub const ATTR_REDIRECT_HTTPS: &str = "RedirectHttps";

/// Attribute asking for line endings to be normalized on write.
pub const ATTR_CRLF: &str = "CRLF";

/// Attribute tags attached to a decision. Presence carries the meaning.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attrs {
    tags: AHashSet<String>,
}

impl Attrs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, tag: impl Into<String>) {
        self.tags.insert(tag.into());
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.tags.iter().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for Attrs {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            tags: iter.into_iter().map(Into::into).collect(),
        }
    }
}

/// Ordered target names plus attributes, before name resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Decision {
    pub targets: Vec<Target>,
    pub attrs: Attrs,
    /// Whether a rule produced this decision (as opposed to the fallback)
    pub matched: bool,
}

impl Decision {
    /// A decision taken from a matching rule.
    pub fn matched(targets: Vec<Target>, attrs: Attrs) -> Self {
        Self {
            targets,
            attrs,
            matched: true,
        }
    }

    /// The fallback decision when no rule matched.
    pub fn fallback(targets: Vec<Target>) -> Self {
        Self {
            targets,
            attrs: Attrs::new(),
            matched: false,
        }
    }
}
