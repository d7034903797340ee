//! Request and connection metadata consumed by the selector.

/// Port assumed when the host header carries none.
pub const DEFAULT_HTTP_PORT: u16 = 80;

/// An inbound proxy request.
///
/// `host` is the raw Host header (optionally with a port) and `uri` is the
/// request URI as received, e.g. `http://example.com/x` for plain proxying or
/// `example.com:443` for CONNECT.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: String,
    pub host: String,
    pub uri: String,
}

impl Request {
    pub fn new(method: impl Into<String>, host: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            host: host.into(),
            uri: uri.into(),
        }
    }

    /// Build a GET request from an absolute URL.
    pub fn get(url: &str) -> Self {
        let authority = url
            .split_once("://")
            .map(|(_, rest)| rest)
            .unwrap_or(url);
        let host = authority.split('/').next().unwrap_or_default();
        Self::new("GET", host, url)
    }

    /// Build a CONNECT request for `host:port`.
    pub fn connect(authority: &str) -> Self {
        Self::new("CONNECT", authority, authority)
    }

    pub fn is_connect(&self) -> bool {
        self.method.eq_ignore_ascii_case("CONNECT")
    }

    /// Split the host header into host and port (default 80).
    ///
    /// Bracketed IPv6 literals are unwrapped. A bare IPv6 literal or an
    /// unparsable port leaves the whole header as the host.
    pub fn host_port(&self) -> (&str, u16) {
        split_host_port(&self.host)
    }
}

fn split_host_port(hostport: &str) -> (&str, u16) {
    if let Some(rest) = hostport.strip_prefix('[') {
        if let Some((host, tail)) = rest.split_once(']') {
            let port = tail
                .strip_prefix(':')
                .and_then(|p| p.parse().ok())
                .unwrap_or(DEFAULT_HTTP_PORT);
            return (host, port);
        }
        return (hostport, DEFAULT_HTTP_PORT);
    }

    match hostport.rsplit_once(':') {
        Some((host, port)) if !host.contains(':') => match port.parse() {
            Ok(port) => (host, port),
            Err(_) => (hostport, DEFAULT_HTTP_PORT),
        },
        _ => (hostport, DEFAULT_HTTP_PORT),
    }
}

/// Wire shape of the inbound connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionKind {
    /// Plain HTTP proxying
    #[default]
    Http,
    /// Requests read from inside an established HTTPS tunnel
    HttpsTunnel,
}

/// Listener the connection was accepted on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ListenerKind {
    /// The general-purpose proxy listener
    #[default]
    Standard,
    /// Listener dedicated to the GAE tunnel
    Gae,
    /// Listener dedicated to the C4 tunnel
    C4,
    /// Listener dedicated to the SSH tunnel
    Ssh,
}

/// Inbound connection metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Connection {
    pub kind: ConnectionKind,
    pub listener: ListenerKind,
}

impl Connection {
    pub fn http() -> Self {
        Self::default()
    }

    pub fn https_tunnel() -> Self {
        Self {
            kind: ConnectionKind::HttpsTunnel,
            listener: ListenerKind::Standard,
        }
    }

    pub fn with_listener(mut self, listener: ListenerKind) -> Self {
        self.listener = listener;
        self
    }

    pub fn is_https(&self) -> bool {
        self.kind == ConnectionKind::HttpsTunnel
    }
}
