//! End-to-end proxy selection.
//!
//! [`ProxySelector::select`] turns one inbound request into an ordered list of
//! upstream candidates plus decision attributes:
//!
//! 1. split the host header into host and port
//! 2. private or local hosts go direct; requests for the proxy itself are
//!    handed to the [`LocalHandler`]
//! 3. a transport-specific listener forces its own transport
//! 4. otherwise the current [`RuleSet`](crate::RuleSet) is consulted
//! 5. when no rule matched, the [`HostAvailability`] collaborator may route
//!    the host direct
//! 6. plain-HTTP requests tagged `RedirectHttps` are redirected locally
//! 7. target names are resolved to [`UpstreamHandle`]s

use ipnet::IpNet;
use once_cell::sync::Lazy;
use std::net::IpAddr;
use std::sync::Arc;

use crate::config::{SpacConfig, Transports, DEFAULT_PROXY_PORT};
use crate::decision::{Attrs, Decision, ATTR_CRLF, ATTR_REDIRECT_HTTPS};
use crate::request::{Connection, ListenerKind};
use crate::rule::FilterRegistry;
use crate::ruleset::RuleStore;
use crate::upstream::{Forward, UpstreamHandle, UpstreamRegistry};
use crate::{Request, Target};

static PRIVATE_NETS: Lazy<Vec<IpNet>> = Lazy::new(|| {
    [
        "127.0.0.0/8",
        "10.0.0.0/8",
        "172.16.0.0/12",
        "192.168.0.0/16",
        "169.254.0.0/16",
        "::1/128",
        "fc00::/7",
        "fe80::/10",
    ]
    .iter()
    .filter_map(|s| s.parse().ok())
    .collect()
});

/// Answers whether a host is known to be reachable without a tunnel.
pub trait HostAvailability: Send + Sync {
    fn lookup(&self, request: &Request, host_port: &str) -> bool;
}

/// Handles requests that terminate at the proxy itself.
pub trait LocalHandler: Send + Sync {
    /// The request targets the proxy's own listening address.
    fn handle_self_request(&self, request: &Request);

    /// Answer with a redirect to the HTTPS version of the request.
    fn redirect_https(&self, request: &Request);
}

/// A [`LocalHandler`] that only logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogLocalHandler;

impl LocalHandler for LogLocalHandler {
    fn handle_self_request(&self, request: &Request) {
        log::info!("Self request {} {}", request.method, request.uri);
    }

    fn redirect_https(&self, request: &Request) {
        log::info!("Redirecting {} to https", request.uri);
    }
}

/// Result of a selection.
#[derive(Debug, Clone)]
pub enum Selection {
    /// Candidates to try in order. May be empty when every name was dropped.
    Upstreams {
        upstreams: Vec<UpstreamHandle>,
        attrs: Attrs,
    },
    /// The request was addressed to the proxy itself and has been handled.
    SelfRequest,
    /// A redirect to HTTPS has been emitted.
    RedirectHttps,
}

impl Selection {
    /// Candidates to try; empty when the request was handled locally.
    pub fn upstreams(&self) -> &[UpstreamHandle] {
        match self {
            Selection::Upstreams { upstreams, .. } => upstreams,
            _ => &[],
        }
    }

    pub fn attrs(&self) -> Option<&Attrs> {
        match self {
            Selection::Upstreams { attrs, .. } => Some(attrs),
            _ => None,
        }
    }

    /// Whether the caller must take no further action.
    pub fn is_handled(&self) -> bool {
        !matches!(self, Selection::Upstreams { .. })
    }
}

/// Settings the selector needs from the configuration.
#[derive(Debug, Clone)]
pub struct SelectorOptions {
    pub transports: Transports,
    /// The proxy's own listening port
    pub proxy_port: u16,
    /// Addresses that belong to this machine
    pub local_addrs: Vec<IpAddr>,
    /// Consult host availability when no rule matched
    pub hosts_enable: bool,
}

impl Default for SelectorOptions {
    fn default() -> Self {
        Self {
            transports: Transports::default(),
            proxy_port: DEFAULT_PROXY_PORT,
            local_addrs: Vec::new(),
            hosts_enable: false,
        }
    }
}

impl SelectorOptions {
    pub fn from_config(config: &SpacConfig) -> Self {
        Self {
            transports: config.transports,
            proxy_port: config.proxy_port,
            local_addrs: config.local_addrs.clone(),
            hosts_enable: config.hosts_enable,
        }
    }
}

/// The top-level decision function.
///
/// Never blocks on I/O: rules are read from an in-memory snapshot and every
/// collaborator is expected to answer from memory.
pub struct ProxySelector {
    store: Arc<RuleStore>,
    filters: Arc<FilterRegistry>,
    upstreams: Arc<UpstreamRegistry>,
    options: SelectorOptions,
    availability: Option<Arc<dyn HostAvailability>>,
    local: Arc<dyn LocalHandler>,
}

impl ProxySelector {
    pub fn new(
        store: Arc<RuleStore>,
        filters: Arc<FilterRegistry>,
        upstreams: Arc<UpstreamRegistry>,
        options: SelectorOptions,
    ) -> Self {
        Self {
            store,
            filters,
            upstreams,
            options,
            availability: None,
            local: Arc::new(LogLocalHandler),
        }
    }

    pub fn with_availability(mut self, availability: Arc<dyn HostAvailability>) -> Self {
        self.availability = Some(availability);
        self
    }

    pub fn with_local_handler(mut self, local: Arc<dyn LocalHandler>) -> Self {
        self.local = local;
        self
    }

    pub fn store(&self) -> &Arc<RuleStore> {
        &self.store
    }

    pub fn filters(&self) -> &Arc<FilterRegistry> {
        &self.filters
    }

    pub fn upstreams(&self) -> &Arc<UpstreamRegistry> {
        &self.upstreams
    }

    pub fn options(&self) -> &SelectorOptions {
        &self.options
    }

    /// Current default target with `Auto` resolved against enabled transports.
    pub fn default_target(&self) -> Target {
        resolve_default(self.store.load().default_target(), &self.options.transports)
    }

    /// Select upstream candidates for a request.
    pub fn select(&self, request: &Request, connection: &Connection) -> Selection {
        let is_https = connection.is_https();
        let (host, port) = request.host_port();
        let ruleset = self.store.load();
        let default_target = resolve_default(ruleset.default_target(), &self.options.transports);

        let mut decision = Decision::fallback(vec![default_target.clone()]);
        let mut select_by_rules = true;

        if self.is_private(host) {
            select_by_rules = false;
            decision = Decision::fallback(vec![Target::Direct]);
            if self.is_self(host) && port == self.options.proxy_port {
                self.local.handle_self_request(request);
                return Selection::SelfRequest;
            }
        }

        if let Some(target) = listener_target(connection.listener) {
            select_by_rules = false;
            decision = Decision::fallback(vec![target]);
        }

        if select_by_rules {
            decision = ruleset.select(request, is_https, &self.filters, decision.targets);
            if !decision.matched {
                if let Some(fallback) = self.availability_fallback(request, host, port) {
                    decision = fallback;
                }
            }

            if !is_https && decision.attrs.contains(ATTR_REDIRECT_HTTPS) {
                self.local.redirect_https(request);
                return Selection::RedirectHttps;
            }
        }

        log::debug!("Found {:?} for host {}", decision.targets, host);

        let upstreams = decision
            .targets
            .into_iter()
            .filter_map(|target| self.resolve(request, target, &default_target, is_https))
            .collect();

        Selection::Upstreams {
            upstreams,
            attrs: decision.attrs,
        }
    }

    fn availability_fallback(&self, request: &Request, host: &str, port: u16) -> Option<Decision> {
        if !self.options.hosts_enable {
            return None;
        }
        let availability = self.availability.as_ref()?;
        let host_port = join_host_port(host, port);
        if !availability.lookup(request, &host_port) {
            return None;
        }
        let mut attrs = Attrs::new();
        if !request.is_connect() {
            attrs.insert(ATTR_CRLF);
        }
        // Not a rule match, so attributes come from the fallback itself
        Some(Decision {
            targets: vec![Target::Direct, Target::Default],
            attrs,
            matched: false,
        })
    }

    fn resolve(
        &self,
        request: &Request,
        target: Target,
        default_target: &Target,
        is_https: bool,
    ) -> Option<UpstreamHandle> {
        let target = match target {
            Target::Default => default_target.clone(),
            Target::Auto => resolve_default(&Target::Auto, &self.options.transports),
            other => other,
        };
        let (host, _) = request.host_port();

        match target.adjust(is_https) {
            t @ (Target::Gae | Target::C4 | Target::Ssh) => match self.upstreams.lookup(t.as_str()) {
                Some(upstream) => Some(UpstreamHandle::Named(upstream)),
                None => {
                    log::warn!("No proxy {} defined for {}", t, host);
                    None
                }
            },
            t @ (Target::GoogleHttp | Target::GoogleHttps) => {
                if !self.options.transports.google {
                    return None;
                }
                match self.upstreams.lookup(t.as_str()) {
                    Some(upstream) => Some(UpstreamHandle::Named(upstream)),
                    None => {
                        log::warn!("No proxy {} defined for {}", t, host);
                        None
                    }
                }
            }
            Target::Direct => Some(UpstreamHandle::Forward(Forward::direct(&request.host))),
            Target::Address(address) => {
                Some(UpstreamHandle::Forward(Forward::over_proxy(&address)))
            }
            other => {
                log::warn!("Unresolvable target {} for {}", other, host);
                None
            }
        }
    }

    fn is_private(&self, host: &str) -> bool {
        if host.eq_ignore_ascii_case("localhost") {
            return true;
        }
        match host.parse::<IpAddr>() {
            Ok(ip) => {
                PRIVATE_NETS.iter().any(|net| net.contains(&ip)) || self.options.local_addrs.contains(&ip)
            }
            Err(_) => false,
        }
    }

    fn is_self(&self, host: &str) -> bool {
        if host.eq_ignore_ascii_case("localhost") {
            return true;
        }
        match host.parse::<IpAddr>() {
            Ok(ip) => ip.is_loopback() || self.options.local_addrs.contains(&ip),
            Err(_) => false,
        }
    }
}

impl std::fmt::Debug for ProxySelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxySelector")
            .field("store", &self.store)
            .field("options", &self.options)
            .field("availability", &self.availability.is_some())
            .finish()
    }
}

fn listener_target(listener: ListenerKind) -> Option<Target> {
    match listener {
        ListenerKind::Standard => None,
        ListenerKind::Gae => Some(Target::Gae),
        ListenerKind::C4 => Some(Target::C4),
        ListenerKind::Ssh => Some(Target::Ssh),
    }
}

/// `Default` and `Auto` as default targets both mean "first enabled transport".
fn resolve_default(target: &Target, transports: &Transports) -> Target {
    match target {
        Target::Default | Target::Auto => Target::Auto.resolve_auto(transports),
        other => other.clone(),
    }
}

fn join_host_port(host: &str, port: u16) -> String {
    if host.contains(':') {
        format!("[{}]:{}", host, port)
    } else {
        format!("{}:{}", host, port)
    }
}
