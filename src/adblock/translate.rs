//! AdBlock glob to regular expression translation.
//!
//! The translation is an ordered pipeline of string rewrites. Each step is a
//! pure function over the intermediate string:
//!
//! ```text
//! ||example.com^
//!   -> collapse_stars       ||example.com^
//!   -> trailing_separator   ||example.com^
//!   -> escape_non_word      \|\|example\.com\^
//!   -> expand_wildcards     \|\|example\.com\^
//!   -> expand_separators    \|\|example\.com(?:[^\w\-.%...]|$)
//!   -> anchor_domain        ^(?:[\w\-]+:/+)?(?:[^/]+\.)?example\.com(?:...|$)
//!   -> anchor_ends          (unchanged)
//!   -> trim_wildcards       (unchanged)
//! ```

/// Target regex syntax.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// The `regex` crate, used for in-process matching
    Native,
    /// JavaScript, used in generated PAC scripts
    Script,
}

const NATIVE_SEPARATOR: &str = r"(?:[^\w\-.%\x{80}-\x{FFFF}]|$)";
const SCRIPT_SEPARATOR: &str = r"(?:[^\w\-.%\u0080-\uFFFF]|$)";

const NATIVE_DOMAIN_ANCHOR: &str = r"^(?:[\w\-]+:/+)?(?:[^/]+\.)?";
const SCRIPT_DOMAIN_ANCHOR: &str = r"^[\w\-]+:\/+(?!\/)(?:[^\/]+\.)?";

/// Translate a glob-style list pattern into a regular expression.
///
/// The `@@` prefix and `/regex/` literals are handled by the caller.
pub fn translate(pattern: &str, dialect: Dialect) -> String {
    let expr = collapse_stars(pattern);
    let expr = trailing_separator(&expr);
    let expr = escape_non_word(&expr, dialect);
    let expr = expand_wildcards(&expr);
    let expr = expand_separators(&expr, dialect);
    let expr = anchor_domain(&expr, dialect);
    let expr = anchor_ends(&expr);
    trim_wildcards(&expr)
}

/// Collapse runs of `*` into one.
pub fn collapse_stars(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        if ch == '*' && out.ends_with('*') {
            continue;
        }
        out.push(ch);
    }
    out
}

/// A trailing `^|` is the same as a trailing `^`.
pub fn trailing_separator(s: &str) -> String {
    match s.strip_suffix("^|") {
        Some(prefix) => format!("{}^", prefix),
        None => s.to_string(),
    }
}

/// Backslash-escape every non-word character.
///
/// The native dialect only escapes characters the `regex` crate treats as
/// meta characters, which keeps the in-process expressions readable.
pub fn escape_non_word(s: &str, dialect: Dialect) -> String {
    let mut out = String::with_capacity(s.len() * 2);
    for ch in s.chars() {
        if ch.is_ascii_alphanumeric() || ch == '_' {
            out.push(ch);
            continue;
        }
        match dialect {
            Dialect::Script => {
                out.push('\\');
                out.push(ch);
            }
            Dialect::Native => {
                if regex::escape(ch.encode_utf8(&mut [0; 4])).len() > ch.len_utf8() {
                    out.push('\\');
                }
                out.push(ch);
            }
        }
    }
    out
}

/// `\*` becomes `.*`.
pub fn expand_wildcards(s: &str) -> String {
    s.replace(r"\*", ".*")
}

/// `\^` becomes "a separator character or the end of input".
pub fn expand_separators(s: &str, dialect: Dialect) -> String {
    let separator = match dialect {
        Dialect::Native => NATIVE_SEPARATOR,
        Dialect::Script => SCRIPT_SEPARATOR,
    };
    s.replace(r"\^", separator)
}

/// A leading `||` matches any scheme and any subdomain of the host.
pub fn anchor_domain(s: &str, dialect: Dialect) -> String {
    let anchor = match dialect {
        Dialect::Native => NATIVE_DOMAIN_ANCHOR,
        Dialect::Script => SCRIPT_DOMAIN_ANCHOR,
    };
    match s.strip_prefix(r"\|\|") {
        Some(rest) => format!("{}{}", anchor, rest),
        None => s.to_string(),
    }
}

/// A leading `|` anchors at the start, a trailing `|` at the end.
pub fn anchor_ends(s: &str) -> String {
    let mut out = match s.strip_prefix(r"\|") {
        Some(rest) => format!("^{}", rest),
        None => s.to_string(),
    };
    if let Some(rest) = out.strip_suffix(r"\|") {
        out = format!("{}$", rest);
    }
    out
}

/// Drop a redundant leading or trailing `.*`.
pub fn trim_wildcards(s: &str) -> String {
    let s = s.strip_prefix(".*").unwrap_or(s);
    let s = s.strip_suffix(".*").unwrap_or(s);
    s.to_string()
}
