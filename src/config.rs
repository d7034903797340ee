//! SPAC configuration.

use serde::Deserialize;
use std::fs;
use std::net::IpAddr;
use std::path::{Path, PathBuf};

use crate::{Result, Target};

/// Default address advertised in generated PAC scripts.
pub const DEFAULT_PAC_PROXY: &str = "127.0.0.1:48100";

/// Default listening port of the local proxy.
pub const DEFAULT_PROXY_PORT: u16 = 48100;

/// Which upstream transports are enabled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Transports {
    pub gae: bool,
    pub c4: bool,
    pub ssh: bool,
    pub google: bool,
}

/// Configuration for the SPAC subsystem.
///
/// Every key is optional. Loaded from YAML or JSON:
///
/// ```yaml
/// enable: true
/// default: Auto
/// gfwlist: https://example.com/gfwlist.txt
/// cloud_rule: https://example.com/cloud_spac.json
/// transports:
///   gae: true
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SpacConfig {
    /// Enable rule-based selection
    pub enable: bool,
    /// Default target name when no rule matches
    pub default: String,
    /// Remote GFW-style list URL
    pub gfwlist: Option<String>,
    /// Remote cloud rule file URL
    pub cloud_rule: Option<String>,
    /// Remote IP range repository URL
    pub ip_range_repo: Option<String>,
    /// Proxy address written into generated PAC scripts
    pub pac_proxy: String,
    /// Working directory holding the `spac/` folder
    pub home: PathBuf,
    /// Listening port of the local proxy
    pub proxy_port: u16,
    /// Consult the host-availability collaborator when no rule matches
    pub hosts_enable: bool,
    /// Enabled upstream transports
    pub transports: Transports,
    /// Addresses that belong to this machine
    pub local_addrs: Vec<IpAddr>,
}

impl Default for SpacConfig {
    fn default() -> Self {
        Self {
            enable: false,
            default: Target::Gae.as_str().to_string(),
            gfwlist: None,
            cloud_rule: None,
            ip_range_repo: None,
            pac_proxy: DEFAULT_PAC_PROXY.to_string(),
            home: PathBuf::from("."),
            proxy_port: DEFAULT_PROXY_PORT,
            hosts_enable: false,
            transports: Transports::default(),
            local_addrs: Vec::new(),
        }
    }
}

impl SpacConfig {
    /// Parse configuration from a YAML (or JSON) string.
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(content)?;
        Ok(config)
    }

    /// Load configuration from a file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    /// The configured default target. Blank values fall back to GAE.
    pub fn default_target(&self) -> Target {
        Target::parse(&self.default).unwrap_or(Target::Gae)
    }

    /// Remote URLs with surrounding whitespace removed; blank ones are ignored.
    pub fn gfwlist_url(&self) -> Option<&str> {
        non_blank(self.gfwlist.as_deref())
    }

    pub fn cloud_rule_url(&self) -> Option<&str> {
        non_blank(self.cloud_rule.as_deref())
    }

    pub fn ip_range_url(&self) -> Option<&str> {
        non_blank(self.ip_range_repo.as_deref())
    }

    /// File locations derived from `home`.
    pub fn paths(&self) -> SpacPaths {
        SpacPaths::new(&self.home)
    }
}

fn non_blank(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|s| !s.is_empty())
}

/// On-disk layout under `<home>/spac/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpacPaths {
    dir: PathBuf,
}

impl SpacPaths {
    pub fn new(home: impl AsRef<Path>) -> Self {
        Self {
            dir: home.as_ref().join("spac"),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// User-authored rules.
    pub fn user_rules(&self) -> PathBuf {
        self.dir.join("user_spac.json")
    }

    /// Rules downloaded from the cloud rule URL.
    pub fn cloud_rules(&self) -> PathBuf {
        self.dir.join("cloud_spac.json")
    }

    /// Rule files in priority order (user rules first).
    pub fn rule_files(&self) -> Vec<PathBuf> {
        vec![self.user_rules(), self.cloud_rules()]
    }

    /// Decoded copy of the remote GFW list.
    pub fn gfwlist(&self) -> PathBuf {
        self.dir.join("snova-gfwlist.txt")
    }

    /// User additions to the GFW list.
    pub fn user_gfwlist(&self) -> PathBuf {
        self.dir.join("user-gfwlist.txt")
    }

    /// Generated PAC script.
    pub fn pac(&self) -> PathBuf {
        self.dir.join("snova-gfwlist.pac")
    }

    /// Downloaded IP range file.
    pub fn iprange(&self) -> PathBuf {
        self.dir.join("iprange.txt")
    }
}
