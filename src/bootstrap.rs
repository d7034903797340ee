//! Startup refresh of remote lists and rules.
//!
//! Each refresh is a one-shot background task started after a fixed delay so
//! that it does not compete with the proxy coming up. Failures are logged and
//! leave the local copy in place.

use base64::Engine;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::adblock::{AdBlockList, GfwListFilter};
use crate::config::SpacPaths;
use crate::fetch::{local_mtime, write_atomic, ContentFetcher};
use crate::iprange::{IpRangeFilter, IpRangeSet, DEFAULT_COUNTRY};
use crate::metadata::FetchMetadata;
use crate::pac::PacGenerator;
use crate::task::{spawn_delayed, TaskHandle};
use crate::{Error, Result};

/// Delay before a refresh task runs.
pub const DEFAULT_BOOTSTRAP_DELAY: Duration = Duration::from_secs(5);

/// Runs remote refreshes against the `spac/` directory.
pub struct Bootstrap {
    fetcher: Arc<dyn ContentFetcher>,
    paths: SpacPaths,
    proxy_port: Option<u16>,
    delay: Duration,
}

impl Bootstrap {
    pub fn new(fetcher: Arc<dyn ContentFetcher>, paths: SpacPaths, proxy_port: Option<u16>) -> Self {
        Self {
            fetcher,
            paths,
            proxy_port,
            delay: DEFAULT_BOOTSTRAP_DELAY,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn paths(&self) -> &SpacPaths {
        &self.paths
    }

    /// Fetch the GFW list, regenerate the PAC script and reload the filter.
    ///
    /// The list is base64-encoded on the wire and stored decoded. When the
    /// server reports no change the local copy is used for the PAC script.
    pub fn refresh_gfwlist(&self, url: &str, pac: &PacGenerator, filter: &GfwListFilter) -> Result<()> {
        let list_path = self.paths.gfwlist();
        log::info!("Generating PAC from GFW list {}", url);
        filter.reload_files(&self.list_files());

        let fetched = self
            .fetcher
            .fetch(url, self.proxy_port, local_mtime(&list_path), false)?;

        let content = if fetched.not_modified() {
            fs::read_to_string(&list_path).unwrap_or_default()
        } else {
            let decoded = decode_base64(&fetched.body)?;
            write_atomic(&list_path, decoded.as_bytes())?;
            decoded
        };

        let cached = FetchMetadata::load_for(&list_path).unwrap_or_default();
        let last_update = fetched
            .last_modified
            .clone()
            .or(cached.last_modified)
            .unwrap_or_default();
        if !fetched.not_modified() {
            FetchMetadata::fetched_now(url, fetched.last_modified).save_for(&list_path)?;
        }

        let mut list = AdBlockList::parse(&content);
        if let Ok(user) = fs::read_to_string(self.paths.user_gfwlist()) {
            list.extend(&user);
        }
        let script = pac.generate(&list, url, &last_update);
        write_atomic(self.paths.pac(), script.as_bytes())?;

        filter.reload(list);
        Ok(())
    }

    /// Fetch the cloud rule file. Returns true when a new file was written.
    ///
    /// The reload watcher picks up the change.
    pub fn refresh_cloud_rules(&self, url: &str) -> Result<bool> {
        let path = self.paths.cloud_rules();
        log::info!("Fetching cloud rules {}", url);
        let fetched = self
            .fetcher
            .fetch(url, self.proxy_port, local_mtime(&path), false)?;
        if fetched.not_modified() {
            return Ok(false);
        }
        write_atomic(&path, &fetched.body)?;
        FetchMetadata::fetched_now(url, fetched.last_modified).save_for(&path)?;
        Ok(true)
    }

    /// Fetch the IP range file if there is no local copy, then load it.
    pub fn refresh_ip_ranges(&self, url: &str, filter: &IpRangeFilter) -> Result<()> {
        let path = self.paths.iprange();
        if !path.exists() {
            let fetched = self.fetcher.fetch(url, self.proxy_port, None, true)?;
            write_atomic(&path, &fetched.body)?;
            FetchMetadata::fetched_now(url, fetched.last_modified).save_for(&path)?;
            log::info!("Fetched IP range file from {}", url);
        }
        filter.reload(IpRangeSet::load(&path, DEFAULT_COUNTRY)?);
        Ok(())
    }

    /// Local list files in load order.
    pub fn list_files(&self) -> [PathBuf; 2] {
        [self.paths.gfwlist(), self.paths.user_gfwlist()]
    }

    /// Run `task` once after the bootstrap delay.
    pub fn schedule<F>(&self, name: &str, task: F) -> Option<TaskHandle>
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        let task_name = name.to_string();
        let spawned = spawn_delayed(name, self.delay, move || {
            if let Err(e) = task() {
                log::error!("Task {} failed: {}", task_name, e);
            }
        });
        match spawned {
            Ok(handle) => Some(handle),
            Err(e) => {
                log::error!("Failed to start task {}: {}", name, e);
                None
            }
        }
    }
}

impl std::fmt::Debug for Bootstrap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bootstrap")
            .field("paths", &self.paths)
            .field("proxy_port", &self.proxy_port)
            .field("delay", &self.delay)
            .finish()
    }
}

/// Decode a base64 list body, ignoring line breaks.
pub fn decode_base64(body: &[u8]) -> Result<String> {
    let compact: Vec<u8> = body
        .iter()
        .copied()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(compact)
        .map_err(|e| Error::Decode(format!("invalid base64 list: {}", e)))?;
    String::from_utf8(decoded).map_err(|e| Error::Decode(format!("list is not UTF-8: {}", e)))
}
