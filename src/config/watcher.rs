//! Configuration file watcher for hot reload.
//!
//! A change to the config file is turned into a reload notification, the same
//! event SIGHUP produces. Edits that leave the file unparseable are ignored so
//! a half-written file does not cycle the listeners.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};

use crate::config::loader::config_from_file;
use crate::lifecycle::signals::ReloadNotifier;

/// A watcher that monitors the configuration file for changes.
pub struct ConfigWatcher {
    path: PathBuf,
    reload: ReloadNotifier,
}

impl ConfigWatcher {
    pub fn new(path: &Path, reload: ReloadNotifier) -> Self {
        Self {
            path: path.to_path_buf(),
            reload,
        }
    }

    /// Start watching the file in a background thread.
    ///
    /// Watching stops when the returned watcher is dropped.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let reload = self.reload.clone();
        let path = self.path.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if event.kind.is_modify() || event.kind.is_create() {
                        match config_from_file(&path) {
                            Ok(_) => {
                                tracing::info!(path = ?path, "Config file change detected, requesting reload");
                                reload.notify();
                            }
                            Err(e) => {
                                tracing::warn!(error = %e, "Changed config file is invalid, keeping current configuration");
                            }
                        }
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
