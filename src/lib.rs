//! SPAC - Smart proxy auto-config.
//!
//! This crate decides, for every request passing through a local proxy,
//! which upstream transport should carry it: a direct connection, a named
//! tunnel, or an explicit HTTP forward proxy.
//!
//! # Features
//!
//! - **JSON rules**: method, host and URL patterns, named filters and a
//!   protocol restriction, matched first-match-wins
//! - **AdBlock-style lists**: GFW-style block/allow lists translated into
//!   anchored regular expressions, usable as a rule filter and as a PAC script
//! - **Hot reload**: rule files are polled and swapped in atomically
//! - **Proxy selection**: private-address detection, per-listener overrides,
//!   host-availability fallback and name resolution
//!
//! # Quick Start
//!
//! ```ignore
//! use spac::{Connection, Request, Spac, SpacConfig, UpstreamRegistry};
//! use std::sync::Arc;
//!
//! let config = SpacConfig::load("spac.yaml")?;
//! let upstreams = Arc::new(UpstreamRegistry::new());
//! let spac = Spac::init(config, upstreams)?;
//!
//! let selection = spac.select(&Request::get("http://www.google.com/"), &Connection::http());
//! for upstream in selection.upstreams() {
//!     println!("try {}", upstream.name());
//! }
//! ```
//!
//! # Rule Files
//!
//! Rule files are JSON arrays. User rules (`spac/user_spac.json`) are
//! evaluated before cloud rules (`spac/cloud_spac.json`):
//!
//! ```json
//! [
//!   {"Host": ["*.google.com"], "Proxy": ["Google", "GAE"], "Attr": ["RedirectHttps"]},
//!   {"Filter": ["IsBlockedByGFW"], "Proxy": ["Default"]},
//!   {"Proxy": ["Direct"]}
//! ]
//! ```

mod error;
mod global;
mod metadata;
mod target;

pub mod adblock;
pub mod bootstrap;
pub mod config;
pub mod decision;
pub mod fetch;
pub mod iprange;
pub mod pac;
pub mod request;
pub mod rule;
pub mod ruleset;
pub mod selector;
pub mod service;
pub mod task;
pub mod upstream;
pub mod watcher;

// Re-export core types
pub use error::{Error, ListEntryError, PatternError, PatternField, Result};
pub use target::Target;

pub use config::{SpacConfig, SpacPaths, Transports};
pub use decision::{Attrs, Decision, ATTR_CRLF, ATTR_REDIRECT_HTTPS};
pub use request::{Connection, ConnectionKind, ListenerKind, Request};

// Re-export rule and selection types
pub use adblock::{AdBlockList, Dialect, GfwListFilter, ListAction, ListEntry};
pub use rule::{Filter, FilterRegistry, Rule, RuleSpec};
pub use ruleset::{RuleCompiler, RuleSet, RuleStore};
pub use selector::{HostAvailability, LocalHandler, ProxySelector, Selection, SelectorOptions};
pub use upstream::{Forward, Upstream, UpstreamHandle, UpstreamRegistry};

// Re-export service types
pub use iprange::{IpRangeFilter, IpRangeSet};
pub use pac::PacGenerator;
pub use service::{Spac, SpacBuilder};
pub use watcher::ReloadWatcher;

// Re-export global API functions
pub use global::{init_spac, install, is_initialized, select_proxy, uninstall};

// Re-export metadata
pub use metadata::FetchMetadata;
