//! Rule file modification polling.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use crate::ruleset::{RuleCompiler, RuleStore};
use crate::task::{spawn_periodic, TaskHandle};

/// Default polling interval.
pub const DEFAULT_RELOAD_INTERVAL: Duration = Duration::from_secs(5);

/// Polls the watched rule files and reloads the [`RuleStore`] when one of
/// them changes.
///
/// The first time a file is seen only its modification time is recorded. A
/// file that cannot be stat'ed counts as unchanged for that tick.
#[derive(Debug)]
pub struct ReloadWatcher {
    store: Arc<RuleStore>,
    compiler: RuleCompiler,
    mod_times: Vec<Option<SystemTime>>,
    interval: Duration,
}

impl ReloadWatcher {
    pub fn new(store: Arc<RuleStore>, compiler: RuleCompiler) -> Self {
        let mod_times = vec![None; compiler.paths().len()];
        Self {
            store,
            compiler,
            mod_times,
            interval: DEFAULT_RELOAD_INTERVAL,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Check every file once. Returns true when a reload was attempted.
    pub fn poll_once(&mut self) -> bool {
        let mut modified = false;
        for (slot, path) in self.mod_times.iter_mut().zip(self.compiler.paths()) {
            let mtime = match modified_time(path) {
                Some(mtime) => mtime,
                None => continue,
            };
            if let Some(last) = *slot {
                if last < mtime {
                    log::debug!("Rule file {:?} modified", path);
                    modified = true;
                }
            }
            *slot = Some(mtime);
        }

        if modified {
            // Failures are logged by the store, which keeps the previous set
            let _ = self.store.reload(&self.compiler);
        }
        modified
    }

    /// Run the polling loop on a background thread.
    pub fn spawn(mut self) -> std::io::Result<TaskHandle> {
        let interval = self.interval;
        log::info!(
            "Watching {} rule files every {:?}",
            self.compiler.paths().len(),
            interval
        );
        spawn_periodic("spac-reload", interval, move || {
            self.poll_once();
        })
    }
}

fn modified_time(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|m| m.modified()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ruleset::RuleSet;
    use crate::Target;
    use std::fs::File;

    fn touch_later(path: &Path, content: &str, secs: u64) {
        fs::write(path, content).unwrap();
        let file = File::options().write(true).open(path).unwrap();
        file.set_modified(SystemTime::now() + Duration::from_secs(secs))
            .unwrap();
    }

    #[test]
    fn test_first_observation_does_not_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("user_spac.json");
        fs::write(&path, r#"[{"Proxy": ["Direct"]}]"#).unwrap();

        let store = Arc::new(RuleStore::new(RuleSet::empty(Target::Gae)));
        let compiler = RuleCompiler::new(vec![path.clone()], Target::Gae);
        let mut watcher = ReloadWatcher::new(store.clone(), compiler);

        assert!(!watcher.poll_once());
        assert_eq!(store.generation(), 0);
        assert!(store.load().is_empty());

        assert!(!watcher.poll_once());

        touch_later(&path, r#"[{"Proxy": ["Direct"]}, {"Proxy": ["SSH"]}]"#, 10);
        assert!(watcher.poll_once());
        assert_eq!(store.generation(), 1);
        assert_eq!(store.load().len(), 2);
    }

    #[test]
    fn test_missing_file_then_created() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cloud_spac.json");

        let store = Arc::new(RuleStore::new(RuleSet::empty(Target::Gae)));
        let compiler = RuleCompiler::new(vec![path.clone()], Target::Gae);
        let mut watcher = ReloadWatcher::new(store.clone(), compiler);

        assert!(!watcher.poll_once());
        // Appearing counts as a first observation
        fs::write(&path, r#"[{"Proxy": ["Direct"]}]"#).unwrap();
        assert!(!watcher.poll_once());
        assert_eq!(store.generation(), 0);
    }

    #[test]
    fn test_bad_reload_keeps_previous_set() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("user_spac.json");
        fs::write(&path, r#"[{"Proxy": ["Direct"]}]"#).unwrap();

        let compiler = RuleCompiler::new(vec![path.clone()], Target::Gae);
        let store = Arc::new(RuleStore::new(compiler.compile().unwrap()));
        let mut watcher = ReloadWatcher::new(store.clone(), compiler);
        watcher.poll_once();

        touch_later(&path, r#"[{"Host": ["("], "Proxy": ["SSH"]}]"#, 10);
        assert!(watcher.poll_once());
        assert_eq!(store.generation(), 0);
        assert_eq!(store.load().len(), 1);
    }

    #[test]
    fn test_spawn_and_stop() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(RuleStore::new(RuleSet::empty(Target::Gae)));
        let compiler = RuleCompiler::new(vec![dir.path().join("none.json")], Target::Gae);
        let handle = ReloadWatcher::new(store, compiler)
            .with_interval(Duration::from_millis(5))
            .spawn()
            .unwrap();
        assert_eq!(handle.name(), "spac-reload");
        handle.stop();
    }
}
