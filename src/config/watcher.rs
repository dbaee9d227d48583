//! Filesystem watch loop for hot reload.
//!
//! The notify callback runs on the watcher's own thread; it only filters
//! event kinds and forwards paths over an mpsc channel. A Tokio task drains
//! the channel, keeps paths that look like config files, and hands reloads
//! to a [`Throttle`] so a burst of saves turns into one reload.
//!
//! Reload failures are logged and counted. They never stop the loop.

use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::error::Result;
use crate::config::manager::WeakManager;
use crate::config::resolver::{is_config_file_name, watch_dirs};
use crate::config::throttle::Throttle;
use crate::observability::metrics;

/// Default window for coalescing change bursts.
pub const DEFAULT_THROTTLE_DELAY: Duration = Duration::from_millis(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchOptions {
    /// Minimum spacing between reloads.
    pub delay: Duration,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            delay: DEFAULT_THROTTLE_DELAY,
        }
    }
}

impl WatchOptions {
    pub fn with_delay(delay: Duration) -> Self {
        Self { delay }
    }
}

/// Where the watch loop currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchState {
    /// `watch` has not been called.
    Idle,
    Watching,
    /// A throttled reload is scheduled.
    Pending,
    Reloading,
    Destroyed,
}

/// Running watcher plus its drain task.
pub(crate) struct WatchHandle {
    _watcher: RecommendedWatcher,
    tx: mpsc::UnboundedSender<PathBuf>,
    task: JoinHandle<()>,
    throttle: Throttle,
}

impl WatchHandle {
    pub(crate) fn notify(&self, path: PathBuf) {
        let _ = self.tx.send(path);
    }

    pub(crate) fn is_pending(&self) -> bool {
        self.throttle.is_pending()
    }

    pub(crate) fn stop(self) {
        self.throttle.cancel();
        self.task.abort();
        tracing::debug!("Config watcher stopped");
    }
}

fn is_relevant(kind: &EventKind) -> bool {
    kind.is_create() || kind.is_modify() || kind.is_remove()
}

fn is_config_path(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(is_config_file_name)
}

/// Watch the config directories under `cwd` and reload through `manager`.
pub(crate) fn spawn(manager: WeakManager, cwd: &Path, options: &WatchOptions) -> Result<WatchHandle> {
    let (tx, mut rx) = mpsc::unbounded_channel::<PathBuf>();

    let forward = tx.clone();
    let mut watcher = RecommendedWatcher::new(
        move |res: notify::Result<Event>| match res {
            Ok(event) if is_relevant(&event.kind) => {
                for path in event.paths {
                    let _ = forward.send(path);
                }
            }
            Ok(_) => {}
            Err(e) => tracing::error!(error = %e, "Watch error"),
        },
        Config::default(),
    )?;

    let dirs = watch_dirs(cwd);
    for dir in &dirs {
        watcher.watch(dir, RecursiveMode::NonRecursive)?;
    }
    tracing::info!(dirs = ?dirs, delay_ms = options.delay.as_millis() as u64, "Config watcher started");

    let throttle = Throttle::new(options.delay);
    let loop_throttle = throttle.clone();
    let task = tokio::spawn(async move {
        while let Some(path) = rx.recv().await {
            if !is_config_path(&path) {
                tracing::trace!(path = %path.display(), "Ignoring non-config file event");
                continue;
            }
            tracing::debug!(path = %path.display(), "Config file change detected");

            let manager = manager.clone();
            loop_throttle.call(move || async move {
                let Some(manager) = manager.upgrade() else {
                    return;
                };
                if let Err(e) = manager.reload().await {
                    metrics::record_reload_error();
                    tracing::error!(error = %e, "Failed to reload config. Keeping current configuration.");
                }
            });
        }
    });

    Ok(WatchHandle {
        _watcher: watcher,
        tx,
        task,
        throttle,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, ModifyKind};

    #[test]
    fn test_default_delay() {
        assert_eq!(WatchOptions::default().delay, Duration::from_millis(300));
    }

    #[test]
    fn test_relevant_kinds() {
        assert!(is_relevant(&EventKind::Create(CreateKind::File)));
        assert!(is_relevant(&EventKind::Modify(ModifyKind::Any)));
        assert!(!is_relevant(&EventKind::Access(notify::event::AccessKind::Any)));
    }

    #[test]
    fn test_config_path_filter() {
        assert!(is_config_path(Path::new("/p/launcher.config.toml")));
        assert!(is_config_path(Path::new("/p/.launcher/launcher.production.config.yaml")));
        assert!(!is_config_path(Path::new("/p/src/main.ts")));
        assert!(!is_config_path(Path::new("/p/launcher.lock")));
    }
}
