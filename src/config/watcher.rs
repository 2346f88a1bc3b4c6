//! Configuration file watcher for hot reload.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};

use crate::config::loader::load_config;
use crate::config::schema::GuardConfig;

/// Shared, atomically replaceable configuration snapshot.
pub type SharedConfig = Arc<ArcSwap<GuardConfig>>;

/// Wrap a configuration for sharing with the gate and the watcher.
pub fn shared(config: GuardConfig) -> SharedConfig {
    Arc::new(ArcSwap::from_pointee(config))
}

/// A watcher that monitors the configuration file for changes.
pub struct ConfigWatcher {
    path: PathBuf,
    target: SharedConfig,
}

impl ConfigWatcher {
    /// Create a watcher publishing reloads into `target`.
    pub fn new(path: &Path, target: SharedConfig) -> Self {
        Self {
            path: path.to_path_buf(),
            target,
        }
    }

    /// Reload the file once. Invalid files leave the current snapshot in place.
    pub fn reload(&self) -> bool {
        reload_into(&self.path, &self.target)
    }

    /// Start watching the file in a background thread.
    ///
    /// The returned watcher must be kept alive for reloads to continue.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let target = self.target.clone();
        let path = self.path.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if event.kind.is_modify() || event.kind.is_create() {
                        tracing::info!("Config file change detected, reloading...");
                        reload_into(&path, &target);
                    }
                }
                Err(e) => tracing::error!("Watch error: {:?}", e),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&self.path, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?self.path, "Config watcher started");
        Ok(watcher)
    }
}

fn reload_into(path: &Path, target: &SharedConfig) -> bool {
    match load_config(path) {
        Ok(new_config) => {
            target.store(Arc::new(new_config));
            tracing::info!(path = ?path, "Configuration reloaded");
            true
        }
        Err(e) => {
            tracing::error!("Failed to reload config: {}. Keeping current configuration.", e);
            false
        }
    }
}
