//! Process-wide SPAC instance.
//!
//! Callers that want a singleton install one [`Spac`] at startup and select
//! through the free functions below.

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::sync::Arc;

use crate::config::SpacConfig;
use crate::request::{Connection, Request};
use crate::selector::Selection;
use crate::service::Spac;
use crate::upstream::UpstreamRegistry;
use crate::Result;

static GLOBAL_SPAC: Lazy<RwLock<Option<Arc<Spac>>>> = Lazy::new(|| RwLock::new(None));

/// Initialize a [`Spac`] and install it as the global instance.
///
/// A previously installed instance is shut down.
pub fn init_spac(config: SpacConfig, upstreams: Arc<UpstreamRegistry>) -> Result<Arc<Spac>> {
    let spac = Arc::new(Spac::init(config, upstreams)?);
    install(spac.clone());
    Ok(spac)
}

/// Install `spac` as the global instance, shutting down the previous one.
pub fn install(spac: Arc<Spac>) {
    let previous = GLOBAL_SPAC.write().replace(spac);
    if let Some(previous) = previous {
        previous.shutdown();
    }
}

/// Remove and shut down the global instance.
pub fn uninstall() {
    let previous = GLOBAL_SPAC.write().take();
    if let Some(previous) = previous {
        previous.shutdown();
    }
}

pub fn is_initialized() -> bool {
    GLOBAL_SPAC.read().is_some()
}

/// The global instance, if installed.
pub fn global() -> Option<Arc<Spac>> {
    GLOBAL_SPAC.read().clone()
}

/// Select through the global instance.
///
/// Returns `None` when no instance is installed.
pub fn select_proxy(request: &Request, connection: &Connection) -> Option<Selection> {
    let spac = global()?;
    Some(spac.select(request, connection))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_install_and_select() {
        let dir = tempfile::tempdir().unwrap();
        let config = SpacConfig {
            home: dir.path().to_path_buf(),
            default: "Direct".to_string(),
            ..Default::default()
        };
        let spac = Spac::builder(config).bootstrap(false).build().unwrap();
        install(Arc::new(spac));
        assert!(is_initialized());

        let selection = select_proxy(&Request::get("http://example.com/"), &Connection::http()).unwrap();
        assert_eq!(selection.upstreams()[0].name(), "http://example.com:80");

        uninstall();
        assert!(!is_initialized());
        assert!(select_proxy(&Request::get("http://example.com/"), &Connection::http()).is_none());
    }
}
