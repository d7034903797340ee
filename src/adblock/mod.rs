//! AdBlock-style block/allow lists.
//!
//! Lists such as the GFW list are translated line by line into regular
//! expressions (see [`translate`]). The same translation feeds two consumers:
//! in-process matching through [`GfwListFilter`] and the generated PAC script.

mod list;
mod translate;

pub use list::{AdBlockList, ListAction, ListEntry};
pub use translate::{
    anchor_domain, anchor_ends, collapse_stars, escape_non_word, expand_separators,
    expand_wildcards, trailing_separator, translate, trim_wildcards, Dialect,
};

use arc_swap::ArcSwap;
use quick_cache::sync::Cache;
use std::hash::{Hash, Hasher};
use std::path::Path;
use std::sync::Arc;

use crate::rule::Filter;
use crate::Request;

/// Filter name under which the GFW list is registered.
pub const GFW_FILTER_NAME: &str = "IsBlockedByGFW";

/// Default decision cache capacity (number of URLs).
const DEFAULT_CACHE_CAPACITY: usize = 10_000;

/// Named filter backed by a hot-swappable [`AdBlockList`].
///
/// Decisions are cached per URL; the cache is cleared whenever the list is
/// replaced.
pub struct GfwListFilter {
    list: ArcSwap<AdBlockList>,
    cache: Cache<u64, bool>,
}

impl GfwListFilter {
    pub fn new(list: AdBlockList) -> Self {
        Self::with_capacity(list, DEFAULT_CACHE_CAPACITY)
    }

    pub fn with_capacity(list: AdBlockList, capacity: usize) -> Self {
        Self {
            list: ArcSwap::from_pointee(list),
            cache: Cache::new(capacity.max(1)),
        }
    }

    /// Build from list files, in order. Missing files are skipped.
    pub fn from_files<P: AsRef<Path>>(paths: &[P]) -> Self {
        Self::new(load_list_files(paths))
    }

    /// Replace the list and drop cached decisions.
    pub fn reload(&self, list: AdBlockList) {
        let count = list.len();
        self.list.store(Arc::new(list));
        self.cache.clear();
        log::info!("Loaded {} GFW list entries", count);
    }

    /// Reload from list files, in order.
    pub fn reload_files<P: AsRef<Path>>(&self, paths: &[P]) {
        self.reload(load_list_files(paths));
    }

    /// Snapshot of the current list.
    pub fn list(&self) -> Arc<AdBlockList> {
        self.list.load_full()
    }

    /// Whether a URL is routed through the proxy by the list.
    pub fn is_blocked(&self, url: &str) -> bool {
        let key = cache_key(url);
        if let Some(blocked) = self.cache.get(&key) {
            return blocked;
        }
        let blocked = self.list.load().is_blocked(url);
        self.cache.insert(key, blocked);
        blocked
    }
}

impl Filter for GfwListFilter {
    fn matches(&self, request: &Request) -> bool {
        self.is_blocked(&request_url(request))
    }
}

impl std::fmt::Debug for GfwListFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GfwListFilter")
            .field("entries", &self.list.load().len())
            .field("cached", &self.cache.len())
            .finish()
    }
}

fn cache_key(url: &str) -> u64 {
    let mut hasher = ahash::AHasher::default();
    url.to_ascii_lowercase().hash(&mut hasher);
    hasher.finish()
}

/// Absolute URL of a request, as the list expects it.
///
/// A CONNECT authority becomes an `https://` URL so `|https://` entries apply.
fn request_url(request: &Request) -> String {
    if request.is_connect() {
        let (host, port) = request.host_port();
        return match port {
            443 => format!("https://{}/", host),
            _ => format!("https://{}:{}/", host, port),
        };
    }
    if request.uri.starts_with('/') {
        format!("http://{}{}", request.host, request.uri)
    } else {
        request.uri.clone()
    }
}

fn load_list_files<P: AsRef<Path>>(paths: &[P]) -> AdBlockList {
    let mut list = AdBlockList::new();
    for path in paths {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(content) => list.extend(&content),
            Err(e) => log::debug!("Skipping list file {:?}: {}", path, e),
        }
    }
    list
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_filter_matches_request() {
        let filter = GfwListFilter::new(AdBlockList::parse("||blocked.com\n@@||ok.blocked.com\n"));
        assert!(filter.matches(&Request::get("http://www.blocked.com/")));
        assert!(filter.matches(&Request::connect("blocked.com:443")));
        assert!(!filter.matches(&Request::get("http://ok.blocked.com/")));
        assert!(!filter.matches(&Request::get("http://other.com/")));

        let relative = Request::new("GET", "blocked.com", "/index.html");
        assert!(filter.matches(&relative));
    }

    #[test]
    fn test_connect_matches_https_entries() {
        let filter = GfwListFilter::new(AdBlockList::parse("|https://secure.example.com\n"));
        assert!(filter.matches(&Request::connect("secure.example.com:443")));
        assert!(!filter.matches(&Request::get("http://secure.example.com/")));

        assert_eq!(request_url(&Request::connect("a.com:443")), "https://a.com/");
        assert_eq!(request_url(&Request::connect("a.com:8443")), "https://a.com:8443/");
    }

    #[test]
    fn test_reload_clears_cache() {
        let filter = GfwListFilter::new(AdBlockList::parse("||a.com"));
        assert!(filter.is_blocked("http://a.com/"));

        filter.reload(AdBlockList::parse("||b.com"));
        assert!(!filter.is_blocked("http://a.com/"));
        assert!(filter.is_blocked("http://b.com/"));
    }

    #[test]
    fn test_from_files_skips_missing() {
        let dir = tempfile::tempdir().unwrap();
        let list = dir.path().join("gfwlist.txt");
        let user = dir.path().join("user-gfwlist.txt");
        fs::write(&list, "[AutoProxy 0.2.9]\n! comment\n||a.com\n").unwrap();

        let filter = GfwListFilter::from_files(&[list, user]);
        assert_eq!(filter.list().len(), 1);
        assert!(filter.is_blocked("https://x.a.com/"));
    }
}
