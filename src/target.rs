//! Symbolic upstream target names.

use std::fmt;

use crate::config::Transports;

/// Target names a rule can route a request to.
///
/// Built-in transports are closed variants; anything else is an explicit
/// forward-proxy address such as `10.0.0.2:3128`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Target {
    /// Pick the first enabled tunnel, else direct
    Auto,
    /// Placeholder for the rule set's default target
    Default,
    /// Connect to the origin directly
    Direct,
    /// GAE tunnel
    Gae,
    /// C4 tunnel
    C4,
    /// SSH tunnel
    Ssh,
    /// Google front, resolved per protocol
    Google,
    /// Google front for plain HTTP
    GoogleHttp,
    /// Google front for HTTPS tunnels
    GoogleHttps,
    /// Explicit forward proxy address
    Address(String),
}

impl Target {
    /// Parse a target name (case-insensitive).
    ///
    /// Unknown names become [`Target::Address`]. Returns `None` for blank input.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        if s.is_empty() {
            return None;
        }
        let target = match s.to_ascii_lowercase().as_str() {
            "auto" => Target::Auto,
            "default" => Target::Default,
            "direct" => Target::Direct,
            "gae" => Target::Gae,
            "c4" => Target::C4,
            "ssh" => Target::Ssh,
            "google" => Target::Google,
            "googlehttp" => Target::GoogleHttp,
            "googlehttps" => Target::GoogleHttps,
            _ => Target::Address(s.to_string()),
        };
        Some(target)
    }

    /// Get the canonical name.
    pub fn as_str(&self) -> &str {
        match self {
            Target::Auto => "Auto",
            Target::Default => "Default",
            Target::Direct => "Direct",
            Target::Gae => "GAE",
            Target::C4 => "C4",
            Target::Ssh => "SSH",
            Target::Google => "Google",
            Target::GoogleHttp => "GoogleHttp",
            Target::GoogleHttps => "GoogleHttps",
            Target::Address(addr) => addr,
        }
    }

    /// Resolve the generic Google target to its protocol-specific variant.
    pub fn adjust(self, is_https: bool) -> Self {
        match self {
            Target::Google if is_https => Target::GoogleHttps,
            Target::Google => Target::GoogleHttp,
            other => other,
        }
    }

    /// Substitute `Auto` with the first enabled tunnel.
    ///
    /// Order of preference is GAE, C4, SSH, then direct.
    pub fn resolve_auto(self, transports: &Transports) -> Self {
        match self {
            Target::Auto if transports.gae => Target::Gae,
            Target::Auto if transports.c4 => Target::C4,
            Target::Auto if transports.ssh => Target::Ssh,
            Target::Auto => Target::Direct,
            other => other,
        }
    }

    /// Whether this target is served by a registered tunnel handle.
    pub fn is_tunnel(&self) -> bool {
        matches!(self, Target::Gae | Target::C4 | Target::Ssh)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Target {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Target::parse(s).ok_or_else(|| crate::Error::InvalidTarget(s.to_string()))
    }
}
