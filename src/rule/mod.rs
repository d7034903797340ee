//! Routing rules: declarations, compiled form, and matching.

mod filter;
mod pattern;

pub use filter::{Filter, FilterRegistry};
pub use pattern::{prepare_pattern, PatternSet};

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::decision::Attrs;
use crate::error::{PatternError, PatternField};
use crate::{Request, Target};

/// A rule as written in a rule file.
///
/// ```json
/// {"Host": ["*.google.com"], "Protocol": "https", "Proxy": ["GAE", "Direct"]}
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSpec {
    #[serde(rename = "Method", alias = "method", default)]
    pub method: Vec<String>,
    #[serde(rename = "Host", alias = "host", default)]
    pub host: Vec<String>,
    #[serde(rename = "URL", alias = "url", alias = "Url", default)]
    pub url: Vec<String>,
    #[serde(rename = "Proxy", alias = "proxy", default)]
    pub proxy: Vec<String>,
    #[serde(rename = "Filter", alias = "filter", default)]
    pub filter: Vec<String>,
    #[serde(rename = "Protocol", alias = "protocol", default)]
    pub protocol: String,
    #[serde(rename = "Attr", alias = "attr", default)]
    pub attr: Vec<String>,
}

/// Protocol a rule is restricted to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Protocol {
    Http,
    Https,
    /// Anything else never matches
    Other(String),
}

impl Protocol {
    fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        if s.is_empty() {
            None
        } else if s.eq_ignore_ascii_case("http") {
            Some(Protocol::Http)
        } else if s.eq_ignore_ascii_case("https") {
            Some(Protocol::Https)
        } else {
            Some(Protocol::Other(s.to_string()))
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Http => f.write_str("http"),
            Protocol::Https => f.write_str("https"),
            Protocol::Other(s) => f.write_str(s),
        }
    }
}

/// A compiled routing rule.
#[derive(Debug, Clone)]
pub struct Rule {
    methods: PatternSet,
    hosts: PatternSet,
    urls: PatternSet,
    filters: Vec<String>,
    protocol: Option<Protocol>,
    targets: Vec<Target>,
    attrs: Vec<String>,
}

impl Rule {
    /// Compile a declaration. `index` is the rule's position, used in errors.
    pub fn compile(spec: &RuleSpec, index: usize) -> Result<Self, PatternError> {
        Ok(Self {
            methods: PatternSet::compile(PatternField::Method, &spec.method, index)?,
            hosts: PatternSet::compile(PatternField::Host, &spec.host, index)?,
            urls: PatternSet::compile(PatternField::Url, &spec.url, index)?,
            filters: spec.filter.clone(),
            protocol: Protocol::parse(&spec.protocol),
            targets: spec.proxy.iter().filter_map(|p| Target::parse(p)).collect(),
            attrs: spec.attr.clone(),
        })
    }

    /// Match a request against every criterion of this rule.
    ///
    /// Filters are checked first, then protocol, method, host and URL. The
    /// host criterion accepts either the raw host header or the bare host, so
    /// a pattern without a port matches every port and one with a port pins it.
    pub fn matches(&self, request: &Request, is_https: bool, filters: &FilterRegistry) -> bool {
        self.matches_filters(request, filters)
            && self.matches_protocol(request, is_https)
            && self.methods.matches(&request.method)
            && self.matches_host(request)
            && self.urls.matches(&request.uri)
    }

    fn matches_filters(&self, request: &Request, filters: &FilterRegistry) -> bool {
        self.filters.iter().all(|name| filters.invoke(name, request))
    }

    fn matches_protocol(&self, request: &Request, is_https: bool) -> bool {
        let required = match &self.protocol {
            Some(p) => p,
            None => return true,
        };
        let actual = if request.is_connect() || is_https {
            Protocol::Https
        } else {
            Protocol::Http
        };
        *required == actual
    }

    fn matches_host(&self, request: &Request) -> bool {
        if self.hosts.matches(&request.host) {
            return true;
        }
        let (bare, _) = request.host_port();
        bare != request.host && self.hosts.matches(bare)
    }

    /// Targets in preference order.
    pub fn targets(&self) -> &[Target] {
        &self.targets
    }

    /// Attribute tags of this rule.
    pub fn attrs(&self) -> Attrs {
        self.attrs.iter().cloned().collect()
    }

    pub fn filters(&self) -> &[String] {
        &self.filters
    }

    pub fn protocol(&self) -> Option<&Protocol> {
        self.protocol.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn rule(spec: RuleSpec) -> Rule {
        Rule::compile(&spec, 0).unwrap()
    }

    #[test]
    fn test_empty_criteria_match_anything() {
        let r = rule(RuleSpec {
            proxy: strings(&["GAE"]),
            ..Default::default()
        });
        let filters = FilterRegistry::new();

        assert!(r.matches(&Request::get("http://example.com/"), false, &filters));
        assert!(r.matches(&Request::connect("foo.org:443"), true, &filters));
        assert!(r.matches(&Request::new("DELETE", "x", "/y"), false, &filters));
        assert_eq!(r.targets(), &[Target::Gae]);
    }

    #[test]
    fn test_fields_are_anded() {
        let r = rule(RuleSpec {
            method: strings(&["GET"]),
            host: strings(&["*.example.com"]),
            url: strings(&["*/video/*"]),
            ..Default::default()
        });
        let filters = FilterRegistry::new();

        let hit = Request::get("http://www.example.com/video/1");
        assert!(r.matches(&hit, false, &filters));

        let wrong_method = Request::new("POST", "www.example.com", "http://www.example.com/video/1");
        assert!(!r.matches(&wrong_method, false, &filters));

        let wrong_url = Request::get("http://www.example.com/audio/1");
        assert!(!r.matches(&wrong_url, false, &filters));

        let wrong_host = Request::get("http://www.example.org/video/1");
        assert!(!r.matches(&wrong_host, false, &filters));
    }

    #[test]
    fn test_host_with_port() {
        let r = rule(RuleSpec {
            host: strings(&["*.google.com"]),
            ..Default::default()
        });
        let filters = FilterRegistry::new();
        assert!(r.matches(&Request::connect("www.google.com:443"), false, &filters));
        assert!(!r.matches(&Request::connect("www.google.org:443"), false, &filters));
    }

    #[test]
    fn test_plain_host_matches_any_port() {
        let r = rule(RuleSpec {
            host: strings(&["a.com"]),
            ..Default::default()
        });
        let filters = FilterRegistry::new();
        assert!(r.matches(&Request::new("GET", "a.com", "http://a.com/"), false, &filters));
        assert!(r.matches(&Request::new("GET", "a.com:8080", "http://a.com:8080/"), false, &filters));
        assert!(!r.matches(&Request::new("GET", "b.a.com:8080", "http://b.a.com:8080/"), false, &filters));

        let port_pinned = rule(RuleSpec {
            host: strings(&["a.com:8080"]),
            ..Default::default()
        });
        assert!(port_pinned.matches(&Request::new("GET", "a.com:8080", "http://a.com:8080/"), false, &filters));
        assert!(!port_pinned.matches(&Request::new("GET", "a.com:9090", "http://a.com:9090/"), false, &filters));
        assert!(!port_pinned.matches(&Request::new("GET", "a.com", "http://a.com/"), false, &filters));
    }

    #[test]
    fn test_protocol() {
        let https_only = rule(RuleSpec {
            protocol: "HTTPS".to_string(),
            ..Default::default()
        });
        let http_only = rule(RuleSpec {
            protocol: "http".to_string(),
            ..Default::default()
        });
        let filters = FilterRegistry::new();
        let get = Request::get("http://a.com/");
        let connect = Request::connect("a.com:443");

        assert!(https_only.matches(&connect, false, &filters));
        assert!(https_only.matches(&get, true, &filters));
        assert!(!https_only.matches(&get, false, &filters));

        assert!(http_only.matches(&get, false, &filters));
        assert!(!http_only.matches(&connect, false, &filters));
        assert!(!http_only.matches(&get, true, &filters));

        let odd = rule(RuleSpec {
            protocol: "ftp".to_string(),
            ..Default::default()
        });
        assert!(!odd.matches(&get, false, &filters));
        assert!(!odd.matches(&connect, false, &filters));
    }

    #[test]
    fn test_filters_all_required() {
        let filters = FilterRegistry::new();
        filters.register("Yes", Arc::new(|_: &Request| true));
        filters.register("No", Arc::new(|_: &Request| false));
        let req = Request::get("http://a.com/");

        let both_true = rule(RuleSpec {
            filter: strings(&["Yes", "Yes"]),
            ..Default::default()
        });
        assert!(both_true.matches(&req, false, &filters));

        let one_false = rule(RuleSpec {
            filter: strings(&["Yes", "No"]),
            ..Default::default()
        });
        assert!(!one_false.matches(&req, false, &filters));

        let unknown = rule(RuleSpec {
            filter: strings(&["Unknown"]),
            ..Default::default()
        });
        assert!(!unknown.matches(&req, false, &filters));
    }

    #[test]
    fn test_deserialize_rule_file_fields() {
        let json = r#"[
            {"Method": ["GET"], "Host": ["*.a.com"], "URL": [], "Proxy": ["Google", "Direct"],
             "Filter": ["InHosts"], "Protocol": "http", "Attr": ["RedirectHttps"]},
            {"host": ["b.com"], "proxy": ["SSH"]}
        ]"#;
        let specs: Vec<RuleSpec> = serde_json::from_str(json).unwrap();
        assert_eq!(specs.len(), 2);
        assert_eq!(specs[0].proxy, strings(&["Google", "Direct"]));
        assert_eq!(specs[0].protocol, "http");
        assert_eq!(specs[1].host, strings(&["b.com"]));
        assert!(specs[1].attr.is_empty());

        let r = Rule::compile(&specs[0], 0).unwrap();
        assert_eq!(r.targets(), &[Target::Google, Target::Direct]);
        assert!(r.attrs().contains("RedirectHttps"));
        assert_eq!(r.protocol(), Some(&Protocol::Http));
        assert_eq!(r.filters(), &["InHosts".to_string()]);
    }

    #[test]
    fn test_compile_error_names_rule() {
        let spec = RuleSpec {
            url: strings(&["http://(unclosed"]),
            ..Default::default()
        };
        let err = Rule::compile(&spec, 7).unwrap_err();
        assert_eq!(err.rule_index, 7);
        assert_eq!(err.field, PatternField::Url);
    }
}
