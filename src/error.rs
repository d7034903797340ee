//! Error types for spac.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Error type for spac operations.
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parsing error
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A rule pattern failed to compile
    #[error(transparent)]
    Pattern(#[from] PatternError),

    /// A rule file could not be loaded
    #[error("failed to load rule file {path:?}: {source}")]
    RuleFile {
        path: PathBuf,
        #[source]
        source: Box<Error>,
    },

    /// Invalid target name
    #[error("invalid target name: {0}")]
    InvalidTarget(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Remote fetch error
    #[error("fetch error: {0}")]
    Fetch(String),

    /// Content decoding error
    #[error("decode error: {0}")]
    Decode(String),
}

/// Result type alias for spac operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The rule field a pattern belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternField {
    Method,
    Host,
    Url,
}

impl fmt::Display for PatternField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PatternField::Method => "Method",
            PatternField::Host => "Host",
            PatternField::Url => "URL",
        };
        f.write_str(name)
    }
}

/// A rule pattern that could not be compiled.
#[derive(Error, Debug)]
#[error("invalid {field} pattern {pattern:?} in rule #{rule_index}: {source}")]
pub struct PatternError {
    /// Position of the rule in its file
    pub rule_index: usize,
    /// Field the pattern was declared in
    pub field: PatternField,
    /// Pattern text as written in the rule
    pub pattern: String,
    #[source]
    pub source: regex::Error,
}

/// Error type for a single AdBlock-style list line.
#[derive(Error, Debug, Clone)]
#[error("invalid list line {line:?} (regex {expr:?}): {source}")]
pub struct ListEntryError {
    /// Source line
    pub line: String,
    /// Translated expression that failed to compile
    pub expr: String,
    #[source]
    pub source: regex::Error,
}
