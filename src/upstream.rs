//! Upstream handles and the name-to-handle registry.

use ahash::AHashMap;
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;

use crate::request::DEFAULT_HTTP_PORT;

/// A live upstream transport that can take over a request.
///
/// How the transport moves bytes is up to the implementation; selection only
/// needs to identify it.
pub trait Upstream: Send + Sync {
    fn name(&self) -> &str;
}

/// A plain HTTP forward to an origin or to another proxy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Forward {
    /// Scheme-qualified target, e.g. `http://example.com:80`
    pub target: String,
    /// Whether `target` is itself a proxy rather than the origin
    pub over_proxy: bool,
}

impl Forward {
    /// Connect straight to the origin in the request's host header.
    pub fn direct(host: &str) -> Self {
        let mut target = host.trim().to_string();
        if !target.contains(':') {
            target = format!("{}:{}", target, DEFAULT_HTTP_PORT);
        }
        Self {
            target: with_scheme(target),
            over_proxy: false,
        }
    }

    /// Relay through an explicit forward proxy.
    pub fn over_proxy(address: &str) -> Self {
        Self {
            target: with_scheme(address.trim().to_string()),
            over_proxy: true,
        }
    }
}

fn with_scheme(target: String) -> String {
    if target.contains("://") {
        target
    } else {
        format!("http://{}", target)
    }
}

/// A resolved selection candidate.
#[derive(Clone)]
pub enum UpstreamHandle {
    /// A registered transport
    Named(Arc<dyn Upstream>),
    /// A forward built for this request
    Forward(Forward),
}

impl UpstreamHandle {
    pub fn name(&self) -> &str {
        match self {
            UpstreamHandle::Named(upstream) => upstream.name(),
            UpstreamHandle::Forward(forward) => &forward.target,
        }
    }

    pub fn as_forward(&self) -> Option<&Forward> {
        match self {
            UpstreamHandle::Forward(forward) => Some(forward),
            UpstreamHandle::Named(_) => None,
        }
    }
}

impl fmt::Debug for UpstreamHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpstreamHandle::Named(upstream) => f.debug_tuple("Named").field(&upstream.name()).finish(),
            UpstreamHandle::Forward(forward) => f.debug_tuple("Forward").field(forward).finish(),
        }
    }
}

/// Registry of named upstream transports.
///
/// Filled once at startup; selection only reads it.
#[derive(Default)]
pub struct UpstreamRegistry {
    handles: RwLock<AHashMap<String, Arc<dyn Upstream>>>,
}

impl UpstreamRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a transport under `name`, replacing any previous one.
    pub fn register(&self, name: &str, upstream: Arc<dyn Upstream>) {
        log::debug!("Registered upstream {}", name);
        self.handles.write().insert(name.to_string(), upstream);
    }

    pub fn lookup(&self, name: &str) -> Option<Arc<dyn Upstream>> {
        self.handles.read().get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.handles.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for UpstreamRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let handles = self.handles.read();
        let mut names: Vec<&String> = handles.keys().collect();
        names.sort();
        f.debug_struct("UpstreamRegistry").field("handles", &names).finish()
    }
}

/// An upstream that is identified by name only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedUpstream(pub String);

impl Upstream for NamedUpstream {
    fn name(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direct_forward() {
        assert_eq!(Forward::direct("example.com").target, "http://example.com:80");
        assert_eq!(Forward::direct("example.com:8080").target, "http://example.com:8080");
        assert!(!Forward::direct("example.com").over_proxy);
    }

    #[test]
    fn test_over_proxy_forward() {
        let forward = Forward::over_proxy(" 10.0.0.2:3128 ");
        assert_eq!(forward.target, "http://10.0.0.2:3128");
        assert!(forward.over_proxy);
        assert_eq!(
            Forward::over_proxy("https://proxy.local:443").target,
            "https://proxy.local:443"
        );
    }

    #[test]
    fn test_registry() {
        let registry = UpstreamRegistry::new();
        assert!(registry.lookup("GAE").is_none());

        registry.register("GAE", Arc::new(NamedUpstream("gae-1".to_string())));
        assert_eq!(registry.len(), 1);
        let handle = UpstreamHandle::Named(registry.lookup("GAE").unwrap());
        assert_eq!(handle.name(), "gae-1");
        assert!(handle.as_forward().is_none());
    }
}
