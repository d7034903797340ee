//! SPAC service wiring.
//!
//! [`Spac`] owns the rule store, the named filters and the background tasks,
//! and exposes the selector. Build one with [`Spac::init`] or [`SpacBuilder`].

use parking_lot::Mutex;
use std::fs;
use std::sync::Arc;
use std::time::Duration;

use crate::adblock::{GfwListFilter, GFW_FILTER_NAME};
use crate::bootstrap::{Bootstrap, DEFAULT_BOOTSTRAP_DELAY};
use crate::config::SpacConfig;
use crate::fetch::{ContentFetcher, HttpFetcher};
use crate::iprange::{IpRangeFilter, IpRangeSet, DEFAULT_COUNTRY, IP_RANGE_FILTER_NAME};
use crate::pac::PacGenerator;
use crate::request::{Connection, Request};
use crate::rule::FilterRegistry;
use crate::ruleset::{RuleCompiler, RuleSet, RuleStore};
use crate::selector::{HostAvailability, LocalHandler, ProxySelector, Selection, SelectorOptions};
use crate::task::TaskHandle;
use crate::upstream::UpstreamRegistry;
use crate::watcher::{ReloadWatcher, DEFAULT_RELOAD_INTERVAL};
use crate::Result;

/// Builder for [`Spac`].
pub struct SpacBuilder {
    config: SpacConfig,
    upstreams: Arc<UpstreamRegistry>,
    fetcher: Arc<dyn ContentFetcher>,
    availability: Option<Arc<dyn HostAvailability>>,
    local: Option<Arc<dyn LocalHandler>>,
    bootstrap: bool,
    bootstrap_delay: Duration,
    reload_interval: Duration,
}

impl SpacBuilder {
    pub fn new(config: SpacConfig) -> Self {
        Self {
            config,
            upstreams: Arc::new(UpstreamRegistry::new()),
            fetcher: Arc::new(HttpFetcher::new()),
            availability: None,
            local: None,
            bootstrap: true,
            bootstrap_delay: DEFAULT_BOOTSTRAP_DELAY,
            reload_interval: DEFAULT_RELOAD_INTERVAL,
        }
    }

    pub fn upstreams(mut self, upstreams: Arc<UpstreamRegistry>) -> Self {
        self.upstreams = upstreams;
        self
    }

    pub fn fetcher(mut self, fetcher: Arc<dyn ContentFetcher>) -> Self {
        self.fetcher = fetcher;
        self
    }

    pub fn availability(mut self, availability: Arc<dyn HostAvailability>) -> Self {
        self.availability = Some(availability);
        self
    }

    pub fn local_handler(mut self, local: Arc<dyn LocalHandler>) -> Self {
        self.local = Some(local);
        self
    }

    /// Whether to schedule the remote refresh tasks. Enabled by default.
    pub fn bootstrap(mut self, enabled: bool) -> Self {
        self.bootstrap = enabled;
        self
    }

    pub fn bootstrap_delay(mut self, delay: Duration) -> Self {
        self.bootstrap_delay = delay;
        self
    }

    pub fn reload_interval(mut self, interval: Duration) -> Self {
        self.reload_interval = interval;
        self
    }

    /// Load local state, schedule refreshes and start the reload watcher.
    pub fn build(self) -> Result<Spac> {
        let config = self.config;
        let paths = config.paths();
        fs::create_dir_all(paths.dir())?;

        let filters = Arc::new(FilterRegistry::new());
        let gfw = Arc::new(GfwListFilter::from_files(&[paths.gfwlist(), paths.user_gfwlist()]));
        filters.register(GFW_FILTER_NAME, gfw.clone());

        let ip_ranges = Arc::new(IpRangeFilter::default());
        if paths.iprange().exists() {
            match IpRangeSet::load(paths.iprange(), DEFAULT_COUNTRY) {
                Ok(ranges) => ip_ranges.reload(ranges),
                Err(e) => log::error!("Failed to load IP range file: {}", e),
            }
        }
        filters.register(IP_RANGE_FILTER_NAME, ip_ranges.clone());

        let compiler = RuleCompiler::new(paths.rule_files(), config.default_target());
        let store = Arc::new(RuleStore::new(RuleSet::empty(config.default_target())));

        let mut tasks = Vec::new();
        if self.bootstrap {
            let bootstrap = Arc::new(
                Bootstrap::new(self.fetcher, paths.clone(), Some(config.proxy_port))
                    .with_delay(self.bootstrap_delay),
            );
            tasks.extend(schedule_refreshes(&bootstrap, &config, &gfw, &ip_ranges));
        }

        if config.enable {
            // Errors are logged by the store; start with an empty set
            let _ = store.reload(&compiler);
            match ReloadWatcher::new(store.clone(), compiler)
                .with_interval(self.reload_interval)
                .spawn()
            {
                Ok(handle) => tasks.push(handle),
                Err(e) => log::error!("Failed to start rule watcher: {}", e),
            }
        }

        let mut selector = ProxySelector::new(
            store.clone(),
            filters.clone(),
            self.upstreams,
            SelectorOptions::from_config(&config),
        );
        if let Some(availability) = self.availability {
            selector = selector.with_availability(availability);
        }
        if let Some(local) = self.local {
            selector = selector.with_local_handler(local);
        }

        log::info!(
            "SPAC initialized (enabled: {}, default target: {})",
            config.enable,
            selector.default_target()
        );

        Ok(Spac {
            config,
            store,
            filters,
            gfw,
            ip_ranges,
            selector,
            tasks: Mutex::new(tasks),
        })
    }
}

fn schedule_refreshes(
    bootstrap: &Arc<Bootstrap>,
    config: &SpacConfig,
    gfw: &Arc<GfwListFilter>,
    ip_ranges: &Arc<IpRangeFilter>,
) -> Vec<TaskHandle> {
    let mut tasks = Vec::new();

    if let Some(url) = config.gfwlist_url() {
        let url = url.to_string();
        let runner = bootstrap.clone();
        let filter = gfw.clone();
        let pac = PacGenerator::new(&config.pac_proxy);
        tasks.extend(bootstrap.schedule("spac-gfwlist", move || {
            runner.refresh_gfwlist(&url, &pac, &filter)
        }));
    }

    if let Some(url) = config.cloud_rule_url() {
        let url = url.to_string();
        let runner = bootstrap.clone();
        tasks.extend(bootstrap.schedule("spac-cloud-rule", move || {
            runner.refresh_cloud_rules(&url).map(|_| ())
        }));
    }

    if let Some(url) = config.ip_range_url() {
        let url = url.to_string();
        let runner = bootstrap.clone();
        let filter = ip_ranges.clone();
        tasks.extend(bootstrap.schedule("spac-iprange", move || {
            runner.refresh_ip_ranges(&url, &filter)
        }));
    }

    tasks
}

/// A running SPAC instance.
pub struct Spac {
    config: SpacConfig,
    store: Arc<RuleStore>,
    filters: Arc<FilterRegistry>,
    gfw: Arc<GfwListFilter>,
    ip_ranges: Arc<IpRangeFilter>,
    selector: ProxySelector,
    tasks: Mutex<Vec<TaskHandle>>,
}

impl Spac {
    /// Initialize with default collaborators.
    pub fn init(config: SpacConfig, upstreams: Arc<UpstreamRegistry>) -> Result<Self> {
        SpacBuilder::new(config).upstreams(upstreams).build()
    }

    pub fn builder(config: SpacConfig) -> SpacBuilder {
        SpacBuilder::new(config)
    }

    /// Select upstream candidates for a request.
    pub fn select(&self, request: &Request, connection: &Connection) -> Selection {
        self.selector.select(request, connection)
    }

    pub fn selector(&self) -> &ProxySelector {
        &self.selector
    }

    pub fn config(&self) -> &SpacConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<RuleStore> {
        &self.store
    }

    pub fn filters(&self) -> &Arc<FilterRegistry> {
        &self.filters
    }

    pub fn gfw_filter(&self) -> &Arc<GfwListFilter> {
        &self.gfw
    }

    pub fn ip_range_filter(&self) -> &Arc<IpRangeFilter> {
        &self.ip_ranges
    }

    /// Recompile the rule files now.
    pub fn reload_rules(&self) -> Result<()> {
        let paths = self.config.paths();
        let compiler = RuleCompiler::new(paths.rule_files(), self.config.default_target());
        self.store.reload(&compiler)
    }

    /// Stop every background task and wait for them to exit.
    pub fn shutdown(&self) {
        let tasks: Vec<TaskHandle> = self.tasks.lock().drain(..).collect();
        for task in tasks {
            log::debug!("Stopping {}", task.name());
            task.stop();
        }
    }
}

impl std::fmt::Debug for Spac {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Spac")
            .field("enable", &self.config.enable)
            .field("store", &self.store)
            .field("filters", &self.filters)
            .field("tasks", &self.tasks.lock().len())
            .finish()
    }
}
