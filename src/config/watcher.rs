//! Configuration file watcher for hot route reload.

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::sync::PeriodicSynchronizer;

/// Signals the route synchronizer whenever the config file changes.
///
/// The file is not parsed here; the next synchronizer tick pulls it.
pub struct ConfigWatcher {
    path: PathBuf,
    sync: Arc<PeriodicSynchronizer>,
}

impl ConfigWatcher {
    pub fn new(path: &Path, sync: Arc<PeriodicSynchronizer>) -> Self {
        Self {
            path: path.to_path_buf(),
            sync,
        }
    }

    /// Start watching the file in a background thread.
    ///
    /// Watching stops when the returned watcher is dropped.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let sync = Arc::clone(&self.sync);

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if event.kind.is_modify() || event.kind.is_create() {
                        tracing::info!("Config file change detected, scheduling route sync");
                        sync.signal_change();
                    }
                }
                Err(e) => tracing::error!(error = ?e, "Watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&self.path, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?self.path, "Config watcher started");
        Ok(watcher)
    }
}
