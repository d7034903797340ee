//! Named request filters referenced by rules.

use ahash::AHashMap;
use parking_lot::RwLock;
use std::sync::Arc;

use crate::Request;

/// A predicate a rule can require through its `Filter` list.
pub trait Filter: Send + Sync {
    fn matches(&self, request: &Request) -> bool;
}

impl<F> Filter for F
where
    F: Fn(&Request) -> bool + Send + Sync,
{
    fn matches(&self, request: &Request) -> bool {
        self(request)
    }
}

/// Registry of named filters.
///
/// Filters are registered at startup and may be replaced when their backing
/// data (a list file, an IP range file) is reloaded.
#[derive(Default)]
pub struct FilterRegistry {
    filters: RwLock<AHashMap<String, Arc<dyn Filter>>>,
}

impl FilterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace a filter.
    pub fn register(&self, name: &str, filter: Arc<dyn Filter>) {
        self.filters.write().insert(name.to_string(), filter);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.filters.read().contains_key(name)
    }

    /// Evaluate a filter. Unknown filters never match.
    pub fn invoke(&self, name: &str, request: &Request) -> bool {
        let filter = self.filters.read().get(name).cloned();
        match filter {
            Some(filter) => filter.matches(request),
            None => {
                log::debug!("No filter registered as {}", name);
                false
            }
        }
    }
}

impl std::fmt::Debug for FilterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let filters = self.filters.read();
        let mut names: Vec<&String> = filters.keys().collect();
        names.sort();
        f.debug_struct("FilterRegistry").field("filters", &names).finish()
    }
}
