//! The configuration engine.
//!
//! [`ConfigManager`] owns the current snapshot and everything derived from
//! it: version record, validation cache, watch loop and event channel.
//! Callers only ever receive copies of the snapshot.

use arc_swap::{ArcSwap, ArcSwapOption};
use futures_util::future::BoxFuture;
use serde_json::Value;
use std::fs;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};
use tokio::sync::broadcast;

use crate::config::classify::{classify, diff_aliases, ChangeClassification, ReloadAction};
use crate::config::error::{ConfigError, Result};
use crate::config::events::{ConfigDelta, ConfigEvent, EVENT_CAPACITY};
use crate::config::loader::{ConfigLoader, Format, LoadOutcome};
use crate::config::merge::{merge, merge_all};
use crate::config::resolver;
use crate::config::schema::default_tree;
use crate::config::tree::ConfigTree;
use crate::config::validation::{ValidationResult, ValidationRule, Validator};
use crate::config::version::{ConfigVersion, VersionTracker};
use crate::config::watcher::{self, WatchHandle, WatchOptions, WatchState};
use crate::observability::metrics;

/// Called with the new configuration when a reload needs a full restart.
pub type RestartCallback = Arc<dyn Fn(ConfigTree) -> BoxFuture<'static, ()> + Send + Sync>;

/// Wrap an async closure as a [`RestartCallback`].
pub fn restart_callback<F, Fut>(f: F) -> RestartCallback
where
    F: Fn(ConfigTree) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(move |config| Box::pin(f(config)))
}

/// Inputs to [`ConfigManager::load`].
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Project directory searched for config files.
    pub cwd: PathBuf,
    /// Explicit config file; must exist. Relative paths are joined to `cwd`.
    pub config_file: Option<PathBuf>,
    /// Environment whose overlay is merged on top of the base file.
    pub environment: Option<String>,
    /// Preset fragments, merged between defaults and the base file.
    pub presets: Vec<ConfigTree>,
    /// Highest-priority layer (CLI flags).
    pub overrides: Option<ConfigTree>,
}

impl LoadOptions {
    pub fn new(cwd: impl Into<PathBuf>) -> Self {
        Self {
            cwd: cwd.into(),
            ..Self::default()
        }
    }

    pub fn with_config_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_file = Some(path.into());
        self
    }

    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = Some(environment.into());
        self
    }

    pub fn with_preset(mut self, preset: ConfigTree) -> Self {
        self.presets.push(preset);
        self
    }

    pub fn with_overrides(mut self, overrides: ConfigTree) -> Self {
        self.overrides = Some(overrides);
        self
    }
}

/// A fully merged configuration and where it came from.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub tree: ConfigTree,
    pub source: Option<PathBuf>,
    pub overlay: Option<PathBuf>,
    pub outcome: Option<LoadOutcome>,
}

/// Result of one watch-loop reload.
#[derive(Debug, Clone)]
pub struct ReloadReport {
    pub classification: ChangeClassification,
    pub action: ReloadAction,
    pub version: ConfigVersion,
}

struct Inner {
    config: ArcSwap<ConfigTree>,
    source: ArcSwapOption<PathBuf>,
    versions: VersionTracker,
    validator: Validator,
    loader: ConfigLoader,
    events: RwLock<Option<broadcast::Sender<ConfigEvent>>>,
    last_load: Mutex<Option<LoadOptions>>,
    on_restart: Mutex<Option<RestartCallback>>,
    watch: Mutex<Option<WatchHandle>>,
    reloading: AtomicBool,
    reloads: AtomicU64,
    destroyed: AtomicBool,
}

/// Configuration resolution and hot-reload engine.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct ConfigManager {
    inner: Arc<Inner>,
}

/// Non-owning handle held by the watch loop.
#[derive(Clone)]
pub(crate) struct WeakManager(Weak<Inner>);

impl WeakManager {
    pub(crate) fn upgrade(&self) -> Option<ConfigManager> {
        self.0.upgrade().map(|inner| ConfigManager { inner })
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigManager {
    /// A manager holding the built-in defaults.
    pub fn new() -> Self {
        Self::with_validator(Validator::new())
    }

    pub fn with_validator(validator: Validator) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                config: ArcSwap::from_pointee(default_tree()),
                source: ArcSwapOption::empty(),
                versions: VersionTracker::new(),
                validator,
                loader: ConfigLoader::new(),
                events: RwLock::new(Some(events)),
                last_load: Mutex::new(None),
                on_restart: Mutex::new(None),
                watch: Mutex::new(None),
                reloading: AtomicBool::new(false),
                reloads: AtomicU64::new(0),
                destroyed: AtomicBool::new(false),
            }),
        }
    }

    pub(crate) fn downgrade(&self) -> WeakManager {
        WeakManager(Arc::downgrade(&self.inner))
    }

    fn ensure_alive(&self) -> Result<()> {
        if self.inner.destroyed.load(Ordering::Acquire) {
            Err(ConfigError::Destroyed)
        } else {
            Ok(())
        }
    }

    fn emit(&self, event: ConfigEvent) {
        let events = self.inner.events.read().expect("event channel lock poisoned");
        if let Some(tx) = events.as_ref() {
            tracing::trace!(event = event.name(), receivers = tx.receiver_count(), "Emitting config event");
            // No receivers is fine.
            let _ = tx.send(event);
        }
    }

    /// Subscribe to configuration events. After `destroy` the receiver is closed.
    pub fn subscribe(&self) -> broadcast::Receiver<ConfigEvent> {
        match self.inner.events.read().expect("event channel lock poisoned").as_ref() {
            Some(tx) => tx.subscribe(),
            None => broadcast::channel(1).1,
        }
    }

    /// Resolve and merge every layer without touching the snapshot.
    ///
    /// Layer order, lowest first: defaults, presets, base file, environment
    /// overlay, overrides.
    pub fn resolve(&self, options: &LoadOptions) -> Result<ResolvedConfig> {
        let mut layers = vec![default_tree()];
        layers.extend(options.presets.iter().cloned());

        let base_path = match &options.config_file {
            Some(explicit) => {
                let path = if explicit.is_absolute() {
                    explicit.clone()
                } else {
                    options.cwd.join(explicit)
                };
                if !path.is_file() {
                    return Err(ConfigError::NotFound(path));
                }
                Some(path)
            }
            None => resolver::resolve(&options.cwd),
        };

        let mut outcome = None;
        if let Some(path) = &base_path {
            let loaded = self.inner.loader.load(path)?;
            outcome = Some(loaded.outcome);
            layers.push(loaded.tree);
        }

        let mut overlay_path = None;
        if let Some(environment) = &options.environment {
            if let Some(path) = resolver::resolve_overlay(&options.cwd, environment)? {
                let loaded = self.inner.loader.load(&path)?;
                tracing::info!(environment = %environment, path = %path.display(), "Merging environment overlay");
                layers.push(loaded.tree);
                overlay_path = Some(path);
            }
        }

        if let Some(overrides) = &options.overrides {
            layers.push(overrides.clone());
        }

        Ok(ResolvedConfig {
            tree: merge_all(&layers),
            source: base_path,
            overlay: overlay_path,
            outcome,
        })
    }

    /// Load, merge and install a configuration.
    pub fn load(&self, options: LoadOptions) -> Result<ConfigTree> {
        self.ensure_alive()?;
        let resolved = self.resolve(&options)?;

        self.inner.config.store(Arc::new(resolved.tree.clone()));
        self.inner.source.store(resolved.source.clone().map(Arc::new));
        let version = self
            .inner
            .versions
            .record(&resolved.tree, resolved.source.as_deref());
        *self.inner.last_load.lock().expect("load options lock poisoned") = Some(options);

        tracing::info!(
            source = ?resolved.source,
            overlay = ?resolved.overlay,
            version = %version.version,
            hash = %version.hash,
            "Configuration loaded"
        );

        self.emit(ConfigEvent::Loaded {
            config: resolved.tree.clone(),
            source: resolved.source,
            version,
        });
        Ok(resolved.tree)
    }

    /// Write `config` to `path`, in the format given by its extension.
    pub fn save(&self, path: &Path, config: &ConfigTree) -> Result<()> {
        self.ensure_alive()?;
        let format =
            Format::from_path(path).ok_or_else(|| ConfigError::UnsupportedFormat(path.to_path_buf()))?;
        let text = format.render(config)?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, text)?;

        tracing::info!(path = %path.display(), "Configuration saved");
        self.emit(ConfigEvent::Saved {
            path: path.to_path_buf(),
        });
        Ok(())
    }

    pub fn validate(&self, config: &ConfigTree) -> ValidationResult {
        self.inner.validator.validate(config)
    }

    /// Deep-merge `updates` into the current snapshot.
    pub fn update_config(&self, updates: ConfigTree) -> Result<ConfigTree> {
        self.ensure_alive()?;
        let old_config = self.config();
        let new_config = merge(&old_config, &updates);
        let delta = ConfigDelta {
            updates,
            new_config: new_config.clone(),
            old_config,
        };

        self.emit(ConfigEvent::Change(delta.clone()));
        self.inner.config.store(Arc::new(new_config.clone()));
        let source = self.source_file();
        let version = self.inner.versions.record(&new_config, source.as_deref());
        tracing::info!(version = %version.version, "Configuration updated");

        self.emit(ConfigEvent::Changed(delta));
        self.emit(ConfigEvent::Updated(new_config.clone()));
        Ok(new_config)
    }

    /// Restore the built-in defaults and forget version and cache state.
    pub fn reset(&self) {
        let defaults = default_tree();
        self.inner.config.store(Arc::new(defaults.clone()));
        self.inner.source.store(None);
        self.inner.versions.clear();
        self.inner.validator.clear_cache();
        tracing::info!("Configuration reset to defaults");
        self.emit(ConfigEvent::Reset(defaults));
    }

    pub fn add_validation_rule(&self, rule: Arc<dyn ValidationRule>) {
        tracing::debug!(rule = rule.name(), "Validation rule added");
        self.inner.validator.add_rule(rule);
    }

    pub fn remove_validation_rule(&self, name: &str) -> bool {
        self.inner.validator.remove_rule(name)
    }

    pub fn validator(&self) -> &Validator {
        &self.inner.validator
    }

    /// A copy of the current snapshot.
    pub fn config(&self) -> ConfigTree {
        self.inner.config.load().as_ref().clone()
    }

    /// A copy of one value from the current snapshot.
    pub fn get(&self, path: &str) -> Option<Value> {
        self.inner.config.load().get_path(path).cloned()
    }

    pub fn version(&self) -> Option<ConfigVersion> {
        self.inner.versions.current()
    }

    /// Whether `config` differs from the tracked version.
    pub fn has_changed(&self, config: &ConfigTree) -> bool {
        self.inner.versions.has_changed(config)
    }

    pub fn source_file(&self) -> Option<PathBuf> {
        self.inner.source.load_full().map(|p| p.as_ref().clone())
    }

    /// Number of completed watch-loop reloads.
    pub fn reload_count(&self) -> u64 {
        self.inner.reloads.load(Ordering::Relaxed)
    }

    /// Register the callback invoked when a reload needs a restart.
    pub fn set_restart_handler(&self, callback: RestartCallback) {
        *self.inner.on_restart.lock().expect("restart callback lock poisoned") = Some(callback);
    }

    /// Re-resolve with the last load options, classify against the current
    /// snapshot, and act on the result.
    pub async fn reload(&self) -> Result<ReloadReport> {
        self.ensure_alive()?;
        self.inner.reloading.store(true, Ordering::Release);
        let result = self.reload_inner().await;
        self.inner.reloading.store(false, Ordering::Release);
        result
    }

    async fn reload_inner(&self) -> Result<ReloadReport> {
        let options = self
            .inner
            .last_load
            .lock()
            .expect("load options lock poisoned")
            .clone()
            .unwrap_or_default();

        let old = self.config();
        let resolved = self.resolve(&options)?;
        let new = resolved.tree;

        let classification = classify(&old, &new);
        let action = classification.action();
        let changed = self.inner.versions.has_changed(&new);

        self.inner.config.store(Arc::new(new.clone()));
        self.inner.source.store(resolved.source.clone().map(Arc::new));
        let version = self.inner.versions.record(&new, resolved.source.as_deref());
        self.inner.reloads.fetch_add(1, Ordering::Relaxed);
        metrics::record_reload(action.label());

        if changed {
            self.emit(ConfigEvent::ConfigChanged {
                config: new.clone(),
                classification,
                version: version.clone(),
            });
        }

        match action {
            ReloadAction::Restart => {
                tracing::info!(
                    path = classification.restart_path.unwrap_or("?"),
                    version = %version.version,
                    "Configuration change requires restart"
                );
                let callback = self
                    .inner
                    .on_restart
                    .lock()
                    .expect("restart callback lock poisoned")
                    .clone();
                match callback {
                    Some(callback) => callback(new).await,
                    None => tracing::warn!("Restart required but no restart handler is registered"),
                }
            }
            ReloadAction::AliasHotUpdate => {
                let old_aliases = old.aliases();
                let new_aliases = new.aliases();
                let diff = diff_aliases(&old_aliases, &new_aliases);
                tracing::info!(
                    added = diff.added.len(),
                    changed = diff.changed.len(),
                    removed = diff.removed.len(),
                    "Alias configuration changed; a manual refresh may be required"
                );
                self.emit(ConfigEvent::AliasChanged {
                    old: old_aliases,
                    new: new_aliases,
                });
                self.emit(ConfigEvent::AliasHotUpdate(diff));
            }
            ReloadAction::HotUpdate => {
                tracing::info!(version = %version.version, "Applying hot configuration update");
                self.emit(ConfigEvent::HotUpdate {
                    config: new,
                    classification,
                });
            }
            ReloadAction::None => {
                tracing::info!("No substantive configuration change detected");
            }
        }

        Ok(ReloadReport {
            classification,
            action,
            version,
        })
    }

    /// Start watching the project's config directories, calling `on_restart`
    /// whenever a reload needs a restart.
    ///
    /// Uses the directory from the last `load` (or the current directory).
    /// Calling it again replaces the previous watcher.
    pub fn watch(&self, options: WatchOptions, on_restart: RestartCallback) -> Result<()> {
        self.ensure_alive()?;
        self.set_restart_handler(on_restart);
        let cwd = self
            .inner
            .last_load
            .lock()
            .expect("load options lock poisoned")
            .as_ref()
            .map(|o| o.cwd.clone())
            .unwrap_or_else(|| PathBuf::from("."));

        let handle = watcher::spawn(self.downgrade(), &cwd, &options)?;
        if let Some(previous) = self.inner.watch.lock().expect("watch lock poisoned").replace(handle) {
            previous.stop();
        }
        Ok(())
    }

    /// Feed a file-change notification into the watch loop, as if the
    /// filesystem watcher had reported it. Ignored when not watching.
    pub fn notify_change(&self, path: &Path) {
        if let Some(handle) = self.inner.watch.lock().expect("watch lock poisoned").as_ref() {
            handle.notify(path.to_path_buf());
        }
    }

    pub fn watch_state(&self) -> WatchState {
        if self.inner.destroyed.load(Ordering::Acquire) {
            return WatchState::Destroyed;
        }
        if self.inner.reloading.load(Ordering::Acquire) {
            return WatchState::Reloading;
        }
        match self.inner.watch.lock().expect("watch lock poisoned").as_ref() {
            None => WatchState::Idle,
            Some(handle) if handle.is_pending() => WatchState::Pending,
            Some(_) => WatchState::Watching,
        }
    }

    /// Stop watching, cancel pending reloads, clear the validation cache and
    /// close the event channel. Safe to call more than once.
    pub fn destroy(&self) {
        if self.inner.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(handle) = self.inner.watch.lock().expect("watch lock poisoned").take() {
            handle.stop();
        }
        self.inner.validator.clear_cache();
        self.inner.on_restart.lock().expect("restart callback lock poisoned").take();
        self.inner.events.write().expect("event channel lock poisoned").take();
        tracing::info!("Config manager destroyed");
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.destroyed.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::DEFAULT_PORT;
    use crate::config::validation::{FnRule, RuleReport};
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;
    use tempfile::TempDir;

    fn project(files: &[(&str, &str)]) -> TempDir {
        let dir = TempDir::new().unwrap();
        for (name, content) in files {
            let path = dir.path().join(name);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, content).unwrap();
        }
        dir
    }

    #[test]
    fn test_load_without_files_uses_defaults() {
        let dir = project(&[]);
        let manager = ConfigManager::new();
        let config = manager.load(LoadOptions::new(dir.path())).unwrap();

        assert_eq!(config.get_path("server.port"), Some(&json!(DEFAULT_PORT)));
        assert_eq!(manager.source_file(), None);
        assert_eq!(manager.version().unwrap().version.to_string(), "1.0.0");
    }

    #[test]
    fn test_explicit_missing_file_is_an_error() {
        let dir = project(&[]);
        let manager = ConfigManager::new();
        let err = manager
            .load(LoadOptions::new(dir.path()).with_config_file("nope.toml"))
            .unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }

    #[test]
    fn test_layer_order() {
        let dir = project(&[("launcher.config.toml", "[server]\nport = 3000\nhost = \"0.0.0.0\"\n")]);
        let preset = ConfigTree::from(json!({"server": {"port": 1111, "cors": false}, "preset": "vue"}));
        let overrides = ConfigTree::from(json!({"server": {"host": "127.0.0.1"}}));

        let manager = ConfigManager::new();
        let config = manager
            .load(
                LoadOptions::new(dir.path())
                    .with_preset(preset)
                    .with_overrides(overrides),
            )
            .unwrap();

        assert_eq!(config.get_path("server.port"), Some(&json!(3000)));
        assert_eq!(config.get_path("server.cors"), Some(&json!(false)));
        assert_eq!(config.get_path("server.host"), Some(&json!("127.0.0.1")));
        assert_eq!(config.get_path("preset"), Some(&json!("vue")));
    }

    #[test]
    fn test_returned_trees_are_copies() {
        let manager = ConfigManager::new();
        let mut copy = manager.config();
        copy.set_path("server.port", json!(1));
        assert_eq!(manager.get("server.port"), Some(json!(DEFAULT_PORT)));
    }

    #[tokio::test]
    async fn test_update_config_emits_change_pair() {
        let manager = ConfigManager::new();
        let mut events = manager.subscribe();

        let updated = manager
            .update_config(ConfigTree::from(json!({"server": {"port": 4000}})))
            .unwrap();
        assert_eq!(updated.get_path("server.port"), Some(&json!(4000)));

        let names: Vec<&str> = (0..3).map(|_| events.try_recv().unwrap().name()).collect();
        assert_eq!(names, vec!["change", "changed", "configUpdated"]);

        match manager.subscribe().try_recv() {
            Err(broadcast::error::TryRecvError::Empty) => {}
            other => panic!("unexpected {:?}", other.map(|e| e.name())),
        }
    }

    #[test]
    fn test_reset_restores_defaults() {
        let manager = ConfigManager::new();
        manager
            .update_config(ConfigTree::from(json!({"server": {"port": 4000}})))
            .unwrap();
        assert!(manager.version().is_some());

        manager.reset();
        assert_eq!(manager.config(), default_tree());
        assert!(manager.version().is_none());
    }

    #[test]
    fn test_save_round_trips_through_load() {
        let dir = project(&[]);
        let manager = ConfigManager::new();
        let config = ConfigTree::from(json!({"server": {"port": 8123}}));
        let path = dir.path().join(".launcher/launcher.config.yaml");

        manager.save(&path, &config).unwrap();
        let loaded = manager.load(LoadOptions::new(dir.path())).unwrap();
        assert_eq!(loaded.get_path("server.port"), Some(&json!(8123)));
        assert_eq!(manager.source_file(), Some(path));
    }

    #[test]
    fn test_save_rejects_unknown_extension() {
        let dir = project(&[]);
        let err = ConfigManager::new()
            .save(&dir.path().join("launcher.config.ini"), &default_tree())
            .unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedFormat(_)));
    }

    #[test]
    fn test_validation_rules_via_manager() {
        let manager = ConfigManager::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        manager.add_validation_rule(Arc::new(FnRule::new("count", move |_: &ConfigTree| {
            counter.fetch_add(1, Ordering::SeqCst);
            RuleReport::default()
        })));

        let config = manager.config();
        assert!(manager.validate(&config).valid);
        assert!(manager.validate(&config).valid);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        assert!(manager.remove_validation_rule("count"));
        assert!(!manager.remove_validation_rule("count"));
    }

    #[tokio::test]
    async fn test_reload_classifies_and_calls_restart() {
        let dir = project(&[("launcher.config.json", r#"{"server": {"port": 3000}}"#)]);
        let manager = ConfigManager::new();
        manager.load(LoadOptions::new(dir.path())).unwrap();

        let restarts = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&restarts);
        manager.set_restart_handler(restart_callback(move |config: ConfigTree| {
            let seen = Arc::clone(&seen);
            async move {
                seen.lock().unwrap().push(config.get_path("server.port").cloned());
            }
        }));

        let report = manager.reload().await.unwrap();
        assert_eq!(report.action, ReloadAction::None);

        fs::write(dir.path().join("launcher.config.json"), r#"{"server": {"port": 3001}}"#).unwrap();
        let report = manager.reload().await.unwrap();
        assert_eq!(report.action, ReloadAction::Restart);
        assert_eq!(report.version.version.to_string(), "1.0.1");
        assert_eq!(*restarts.lock().unwrap(), vec![Some(json!(3001))]);
        assert_eq!(manager.reload_count(), 2);
    }

    #[tokio::test]
    async fn test_destroy_is_idempotent() {
        let manager = ConfigManager::new();
        let mut events = manager.subscribe();

        manager.destroy();
        manager.destroy();

        assert!(manager.is_destroyed());
        assert_eq!(manager.watch_state(), WatchState::Destroyed);
        assert!(matches!(events.recv().await, Err(broadcast::error::RecvError::Closed)));
        assert!(matches!(manager.reload().await, Err(ConfigError::Destroyed)));
        let noop = restart_callback(|_: ConfigTree| async {});
        assert!(matches!(
            manager.watch(WatchOptions::default(), noop),
            Err(ConfigError::Destroyed)
        ));
        assert_eq!(manager.validator().cache_len(), 0);
    }
}
