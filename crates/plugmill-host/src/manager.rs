//! Hot-reload manager
//!
//! Orchestrates the registry, the watched-plugin state table, the polling
//! watcher, retry policy, statistics and lifecycle callbacks. There is no
//! global instance: hosts construct one (or several) and own it.

use parking_lot::{Condvar, Mutex, RwLock};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, SystemTime};
use tracing::{debug, error, info, warn};

use plugmill_kernel::UnitLoader;

use crate::config::HotReloadConfig;
use crate::events::{CallbackSet, PluginEvent};
use crate::loader::is_plugin_library;
use crate::registry::PluginRegistry;
use crate::state::{PluginState, StatCounters, Statistics, WatchedPluginInfo};
use crate::watcher::{PluginWatcher, WatchSink};

/// Watched-plugin state table: one record per managed plugin name plus a
/// path index for the watcher and the by-path operations.
#[derive(Default)]
struct WatchTable {
    plugins: HashMap<String, WatchedPluginInfo>,
    path_to_name: HashMap<PathBuf, String>,
}

/// State shared between the manager facade and the watcher thread.
struct ManagerShared {
    registry: Arc<PluginRegistry>,
    config: RwLock<HotReloadConfig>,
    watched: Mutex<WatchTable>,
    stats: StatCounters,
    callbacks: CallbackSet,
    shutdown: AtomicBool,
    shutdown_lock: Mutex<()>,
    shutdown_wakeup: Condvar,
}

/// Manager for loading, unloading and hot-reloading plugins at runtime.
///
/// All operations are synchronous and thread-safe; share the manager
/// across threads behind an `Arc`. Failures are reported through the
/// boolean/count return values, the per-plugin `last_error`, the failure
/// counters and the log — never as panics.
pub struct HotReloadManager {
    shared: Arc<ManagerShared>,
    watcher: PluginWatcher,
}

impl HotReloadManager {
    /// Create a manager with its own registry backed by the platform
    /// dynamic loader.
    pub fn new(config: HotReloadConfig) -> Self {
        Self::with_registry(config, Arc::new(PluginRegistry::new()))
    }

    /// Create a manager whose registry uses an injected loader.
    pub fn with_loader(config: HotReloadConfig, loader: Arc<dyn UnitLoader>) -> Self {
        Self::with_registry(config, Arc::new(PluginRegistry::with_loader(loader)))
    }

    /// Create a manager on top of an existing registry (for hosts that
    /// register built-in plugins before enabling hot reload).
    pub fn with_registry(config: HotReloadConfig, registry: Arc<PluginRegistry>) -> Self {
        Self {
            shared: Arc::new(ManagerShared {
                registry,
                config: RwLock::new(config),
                watched: Mutex::new(WatchTable::default()),
                stats: StatCounters::default(),
                callbacks: CallbackSet::new(),
                shutdown: AtomicBool::new(false),
                shutdown_lock: Mutex::new(()),
                shutdown_wakeup: Condvar::new(),
            }),
            watcher: PluginWatcher::new(),
        }
    }

    /// The registry this manager drives.
    pub fn registry(&self) -> &Arc<PluginRegistry> {
        &self.shared.registry
    }

    /// Replace the active configuration. The watcher picks the new
    /// settings up on its next tick.
    pub fn configure(&self, config: HotReloadConfig) {
        *self.shared.config.write() = config;
    }

    /// The current configuration.
    pub fn config(&self) -> HotReloadConfig {
        self.shared.config.read().clone()
    }

    // ------------------------------------------------------------------
    // Watching
    // ------------------------------------------------------------------

    /// Start watching a single file or directory. See
    /// [`start_watching_paths`](Self::start_watching_paths).
    pub fn start_watching(&self, path: impl AsRef<Path>) -> bool {
        self.start_watching_paths([path])
    }

    /// Start watching a set of files and directories for changes.
    ///
    /// Directories are scanned flat (no recursion) and only entries with
    /// a plugin library extension are considered; a change is acted on
    /// only when the file matches a managed plugin's recorded path.
    /// Returns `false` when file watching is disabled in the
    /// configuration.
    pub fn start_watching_paths<I, P>(&self, paths: I) -> bool
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        if !self.shared.config.read().enable_file_watching {
            warn!("File watching is disabled by configuration");
            return false;
        }

        self.watcher.add_paths(paths);
        self.watcher.start(self.shared.clone())
    }

    /// Signal the watcher to stop and join it. Prompt regardless of the
    /// configured poll interval.
    pub fn stop_watching(&self) {
        self.watcher.stop();
    }

    /// Whether the watcher thread is running.
    pub fn is_watching(&self) -> bool {
        self.watcher.is_running()
    }

    /// Paths currently registered with the watcher.
    pub fn watched_paths(&self) -> Vec<PathBuf> {
        self.watcher.paths()
    }

    // ------------------------------------------------------------------
    // Lifecycle operations
    // ------------------------------------------------------------------

    /// Load a plugin file, or every plugin library in a directory (flat
    /// scan). Returns whether at least one plugin was loaded.
    pub fn load_plugin(&self, path: impl AsRef<Path>) -> bool {
        let path = path.as_ref();

        if path.is_dir() {
            let mut any = false;
            match std::fs::read_dir(path) {
                Ok(entries) => {
                    for entry in entries.flatten() {
                        let entry_path = entry.path();
                        if entry_path.is_file() && is_plugin_library(&entry_path) {
                            any |= self.shared.load_one(&entry_path);
                        }
                    }
                }
                Err(e) => {
                    warn!(path = ?path, error = %e, "Cannot read plugin directory");
                }
            }
            return any;
        }

        self.shared.load_one(path)
    }

    /// Unload a plugin by name. Unknown names return `false` without
    /// touching statistics.
    pub fn unload_plugin(&self, name: &str) -> bool {
        self.shared.unload_by_name(name)
    }

    /// Unload a plugin by the path it was loaded from.
    pub fn unload_plugin_by_path(&self, path: impl AsRef<Path>) -> bool {
        match self.shared.name_for_path(path.as_ref()) {
            Some(name) => self.shared.unload_by_name(&name),
            None => {
                debug!(path = ?path.as_ref(), "No plugin registered for path");
                false
            }
        }
    }

    /// Reload a plugin by name, retrying per the configured retry policy.
    pub fn reload_plugin(&self, name: &str) -> bool {
        self.shared.reload_by_name(name)
    }

    /// Reload a plugin by the path it was loaded from.
    pub fn reload_plugin_by_path(&self, path: impl AsRef<Path>) -> bool {
        match self.shared.name_for_path(path.as_ref()) {
            Some(name) => self.shared.reload_by_name(&name),
            None => {
                debug!(path = ?path.as_ref(), "No plugin registered for path");
                false
            }
        }
    }

    /// Reload every managed plugin whose file changed on disk since it
    /// was last loaded. Returns the number of plugins reloaded.
    pub fn reload_changed_plugins(&self) -> u32 {
        let candidates: Vec<(String, PathBuf, Option<SystemTime>)> = {
            let table = self.shared.watched.lock();
            table
                .plugins
                .iter()
                .filter(|(_, info)| info.state == PluginState::Loaded)
                .map(|(name, info)| (name.clone(), info.path.clone(), info.last_modified))
                .collect()
        };

        let mut reloaded = 0;
        for (name, path, stored) in candidates {
            let current = file_mtime(&path);
            if current.is_some() && current != stored && self.shared.reload_by_name(&name) {
                reloaded += 1;
            }
        }
        reloaded
    }

    /// Unload every loaded managed plugin and clear the managed table.
    /// Returns the number of plugins unloaded.
    pub fn unload_all_plugins(&self) -> u32 {
        let names: Vec<String> = {
            let table = self.shared.watched.lock();
            table
                .plugins
                .iter()
                .filter(|(_, info)| info.state == PluginState::Loaded)
                .map(|(name, _)| name.clone())
                .collect()
        };

        let mut unloaded = 0;
        for name in names {
            if self.shared.unload_by_name(&name) {
                unloaded += 1;
            }
        }

        let mut table = self.shared.watched.lock();
        table.plugins.clear();
        table.path_to_name.clear();

        unloaded
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Lifecycle state of a plugin; `Unknown` for names never managed.
    pub fn plugin_state(&self, name: &str) -> PluginState {
        let table = self.shared.watched.lock();
        table
            .plugins
            .get(name)
            .map_or(PluginState::Unknown, |info| info.state)
    }

    /// Full watched-plugin record, if the name is managed.
    pub fn plugin_info(&self, name: &str) -> Option<WatchedPluginInfo> {
        let table = self.shared.watched.lock();
        table.plugins.get(name).cloned()
    }

    /// Names of all managed plugins.
    pub fn managed_plugin_names(&self) -> Vec<String> {
        let table = self.shared.watched.lock();
        table.plugins.keys().cloned().collect()
    }

    /// Whether a managed plugin's file was modified since its last
    /// load/reload. Unknown names and unreadable files report `false`.
    pub fn has_plugin_changed(&self, name: &str) -> bool {
        let (path, stored) = {
            let table = self.shared.watched.lock();
            match table.plugins.get(name) {
                Some(info) => (info.path.clone(), info.last_modified),
                None => return false,
            }
        };
        match file_mtime(&path) {
            Some(current) => Some(current) != stored,
            None => false,
        }
    }

    // ------------------------------------------------------------------
    // Callbacks & statistics
    // ------------------------------------------------------------------

    /// Register a lifecycle callback; returns its id.
    pub fn register_callback<F>(&self, event: PluginEvent, callback: F) -> u64
    where
        F: Fn(&str, &Path) + Send + Sync + 'static,
    {
        self.shared.callbacks.register(event, callback)
    }

    /// Unregister a callback by id; returns whether it was found.
    pub fn unregister_callback(&self, id: u64) -> bool {
        self.shared.callbacks.unregister(id)
    }

    /// Remove every callback for one event kind.
    pub fn clear_callbacks(&self, event: PluginEvent) {
        self.shared.callbacks.clear(event);
    }

    /// Remove every registered callback.
    pub fn clear_all_callbacks(&self) {
        self.shared.callbacks.clear_all();
    }

    /// Snapshot of the hot-reload counters.
    pub fn statistics(&self) -> Statistics {
        self.shared.stats.snapshot()
    }

    /// Reset all counters to zero.
    pub fn reset_statistics(&self) {
        self.shared.stats.reset();
    }

    /// Stop the watcher and cancel in-flight reload retries. Idempotent;
    /// also run on drop.
    pub fn shutdown(&self) {
        self.shared.shutdown.store(true, Ordering::SeqCst);
        {
            let _guard = self.shared.shutdown_lock.lock();
            self.shared.shutdown_wakeup.notify_all();
        }
        self.watcher.stop();
    }
}

impl Drop for HotReloadManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl ManagerShared {
    fn fire(&self, event: PluginEvent, plugin_name: &str, path: &Path) {
        self.callbacks.dispatch(event, plugin_name, path);
    }

    fn name_for_path(&self, path: &Path) -> Option<String> {
        {
            let table = self.watched.lock();
            if let Some(name) = table.path_to_name.get(path) {
                return Some(name.clone());
            }
        }
        self.registry
            .find_by_path(path)
            .map(|plugin| plugin.name().to_string())
    }

    /// Sleep for `duration`, returning early with `false` when the
    /// manager shuts down.
    fn interruptible_sleep(&self, duration: Duration) -> bool {
        if self.shutdown.load(Ordering::SeqCst) {
            return false;
        }
        let mut guard = self.shutdown_lock.lock();
        if self.shutdown.load(Ordering::SeqCst) {
            return false;
        }
        self.shutdown_wakeup.wait_for(&mut guard, duration);
        !self.shutdown.load(Ordering::SeqCst)
    }

    /// Load one plugin file, updating state, statistics and events.
    fn load_one(&self, path: &Path) -> bool {
        let known_name = {
            let mut table = self.watched.lock();
            match table.path_to_name.get(path).cloned() {
                Some(name) => {
                    if let Some(info) = table.plugins.get_mut(&name) {
                        info.state = PluginState::Loading;
                    }
                    Some(name)
                }
                None => None,
            }
        };

        self.fire(
            PluginEvent::BeforeLoad,
            known_name.as_deref().unwrap_or(""),
            path,
        );

        match self.registry.load_file(path) {
            Ok(name) => {
                let auto_reload = self.config.read().auto_reload_on_change;
                let mtime = file_mtime(path);
                {
                    let mut table = self.watched.lock();
                    let info = table
                        .plugins
                        .entry(name.clone())
                        .or_insert_with(|| WatchedPluginInfo::new(path.to_path_buf()));
                    info.path = path.to_path_buf();
                    info.state = PluginState::Loaded;
                    info.load_count += 1;
                    info.last_modified = mtime;
                    info.last_error = None;
                    info.auto_reload = auto_reload;
                    table.path_to_name.insert(path.to_path_buf(), name.clone());
                }

                self.stats.total_loads.fetch_add(1, Ordering::Relaxed);
                self.fire(PluginEvent::AfterLoad, &name, path);
                true
            }
            Err(e) => {
                warn!(path = ?path, error = %e, "Failed to load plugin");
                self.stats.failed_loads.fetch_add(1, Ordering::Relaxed);
                if let Some(name) = &known_name {
                    let mut table = self.watched.lock();
                    if let Some(info) = table.plugins.get_mut(name) {
                        info.state = PluginState::Error;
                        info.last_error = Some(e.to_string());
                    }
                }
                self.fire(
                    PluginEvent::LoadFailed,
                    known_name.as_deref().unwrap_or(""),
                    path,
                );
                false
            }
        }
    }

    /// Unload one plugin by name, updating state, statistics and events.
    fn unload_by_name(&self, name: &str) -> bool {
        let path = {
            let mut table = self.watched.lock();
            match table.plugins.get_mut(name) {
                Some(info) => {
                    info.state = PluginState::Unloading;
                    info.path.clone()
                }
                None => match self.registry.find(name) {
                    Some(plugin) => plugin.path().to_path_buf(),
                    None => {
                        debug!(plugin = %name, "Unload requested for unknown plugin");
                        return false;
                    }
                },
            }
        };

        self.fire(PluginEvent::BeforeUnload, name, &path);

        match self.registry.unload(name) {
            Ok(()) => {
                self.stats.total_unloads.fetch_add(1, Ordering::Relaxed);
                {
                    let mut table = self.watched.lock();
                    if let Some(info) = table.plugins.get_mut(name) {
                        info.state = PluginState::Unloaded;
                    }
                    table.path_to_name.remove(&path);
                }
                self.fire(PluginEvent::AfterUnload, name, &path);
                true
            }
            Err(e) => {
                warn!(plugin = %name, error = %e, "Failed to unload plugin");
                self.stats.failed_unloads.fetch_add(1, Ordering::Relaxed);
                {
                    let mut table = self.watched.lock();
                    if let Some(info) = table.plugins.get_mut(name) {
                        info.state = PluginState::Error;
                        info.last_error = Some(e.to_string());
                    }
                }
                self.fire(PluginEvent::UnloadFailed, name, &path);
                false
            }
        }
    }

    /// Reload one plugin by name with the configured retry policy.
    fn reload_by_name(&self, name: &str) -> bool {
        let path = {
            let mut table = self.watched.lock();
            match table.plugins.get_mut(name) {
                Some(info) => {
                    info.state = PluginState::Reloading;
                    info.path.clone()
                }
                None => match self.registry.find(name) {
                    Some(plugin) if !plugin.is_builtin() => plugin.path().to_path_buf(),
                    Some(_) => {
                        debug!(plugin = %name, "Reload requested for built-in plugin");
                        return false;
                    }
                    None => {
                        error!(plugin = %name, "Plugin not found for reload");
                        return false;
                    }
                },
            }
        };

        self.fire(PluginEvent::BeforeReload, name, &path);

        let (max_attempts, retry_delay) = {
            let config = self.config.read();
            (config.max_retry_count.saturating_add(1), config.retry_delay)
        };

        let mut last_error = None;
        for attempt in 1..=max_attempts {
            // After a half-failed attempt (unload succeeded, load did
            // not) the registry no longer knows the name; retry from the
            // recorded path.
            let result = if self.registry.is_loaded(name) {
                self.registry.reload(name).map(|_| ())
            } else {
                self.registry.load_file(&path).map(|_| ())
            };

            match result {
                Ok(()) => {
                    self.stats.total_reloads.fetch_add(1, Ordering::Relaxed);
                    let mtime = file_mtime(&path);
                    {
                        let mut table = self.watched.lock();
                        let info = table
                            .plugins
                            .entry(name.to_string())
                            .or_insert_with(|| WatchedPluginInfo::new(path.clone()));
                        info.state = PluginState::Loaded;
                        info.load_count += 1;
                        info.reload_count += 1;
                        info.last_modified = mtime;
                        info.last_error = None;
                        table.path_to_name.insert(path.clone(), name.to_string());
                    }
                    info!(plugin = %name, attempt, "Plugin reloaded");
                    self.fire(PluginEvent::AfterReload, name, &path);
                    return true;
                }
                Err(e) => {
                    self.stats.failed_reloads.fetch_add(1, Ordering::Relaxed);
                    warn!(plugin = %name, attempt, error = %e, "Plugin reload attempt failed");
                    last_error = Some(e.to_string());

                    if attempt < max_attempts && !self.interruptible_sleep(retry_delay) {
                        debug!(plugin = %name, "Reload retries cancelled by shutdown");
                        break;
                    }
                }
            }
        }

        {
            let mut table = self.watched.lock();
            if let Some(info) = table.plugins.get_mut(name) {
                info.state = PluginState::Error;
                info.last_error = last_error;
            }
        }
        error!(plugin = %name, "Failed to reload plugin");
        false
    }
}

impl WatchSink for ManagerShared {
    fn watch_interval(&self) -> Duration {
        self.config.read().watch_interval
    }

    fn debounce_delay(&self) -> Duration {
        self.config.read().debounce_delay
    }

    fn watch_started(&self) {
        self.fire(PluginEvent::WatchStarted, "", Path::new(""));
    }

    fn watch_stopped(&self) {
        self.fire(PluginEvent::WatchStopped, "", Path::new(""));
    }

    fn observe(&self, path: &Path) -> bool {
        let Some(mtime) = file_mtime(path) else {
            return false;
        };

        // Conservative policy: only files matching a managed plugin's
        // recorded path are tracked; anything else in a watched directory
        // is ignored until the host loads it.
        let (name, auto_reload) = {
            let mut table = self.watched.lock();
            let Some(name) = table.path_to_name.get(path).cloned() else {
                return false;
            };
            let Some(info) = table.plugins.get_mut(&name) else {
                return false;
            };
            if info.last_modified == Some(mtime) {
                return false;
            }
            info.last_modified = Some(mtime);
            (name, info.auto_reload)
        };

        self.stats.file_change_events.fetch_add(1, Ordering::Relaxed);
        info!(plugin = %name, path = ?path, "Plugin file changed");
        self.fire(PluginEvent::FileChanged, &name, path);

        auto_reload && self.config.read().auto_reload_on_change
    }

    fn settled(&self, path: &Path) {
        if self.shutdown.load(Ordering::SeqCst) {
            return;
        }
        let name = {
            let table = self.watched.lock();
            table.path_to_name.get(path).cloned()
        };
        if let Some(name) = name {
            info!(plugin = %name, "Plugin file changed, reloading");
            self.reload_by_name(&name);
        }
    }
}

fn file_mtime(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> HotReloadManager {
        HotReloadManager::new(HotReloadConfig::default())
    }

    #[test]
    fn unknown_plugin_state() {
        let manager = manager();
        assert_eq!(
            manager.plugin_state("non_existent_plugin"),
            PluginState::Unknown
        );
        assert!(manager.plugin_info("non_existent_plugin").is_none());
        assert!(!manager.has_plugin_changed("non_existent_plugin"));
        assert!(manager.managed_plugin_names().is_empty());
    }

    #[test]
    fn unload_unknown_leaves_statistics_untouched() {
        let manager = manager();
        assert!(!manager.unload_plugin("non_existent_plugin"));
        assert_eq!(manager.statistics(), Statistics::default());
    }

    #[test]
    fn reload_unknown_returns_false() {
        let manager = manager();
        assert!(!manager.reload_plugin("non_existent_plugin"));
    }

    #[test]
    fn statistics_initial_state_and_reset() {
        let manager = manager();
        assert_eq!(manager.statistics(), Statistics::default());
        manager.reset_statistics();
        assert_eq!(manager.statistics(), Statistics::default());
    }

    #[test]
    fn configure_replaces_config() {
        let manager = manager();
        manager.configure(
            HotReloadConfig::new()
                .with_watch_interval(Duration::from_millis(500))
                .with_debounce_delay(Duration::from_millis(250))
                .with_max_retry_count(5)
                .with_retry_delay(Duration::from_millis(2000))
                .with_auto_reload(false),
        );

        let config = manager.config();
        assert_eq!(config.watch_interval, Duration::from_millis(500));
        assert_eq!(config.debounce_delay, Duration::from_millis(250));
        assert_eq!(config.max_retry_count, 5);
        assert_eq!(config.retry_delay, Duration::from_millis(2000));
        assert!(!config.auto_reload_on_change);
    }

    #[test]
    fn watching_disabled_by_configuration() {
        let manager =
            HotReloadManager::new(HotReloadConfig::default().with_file_watching(false));
        assert!(!manager.start_watching("."));
        assert!(!manager.is_watching());
    }

    #[test]
    fn watching_start_stop() {
        let manager = manager();
        assert!(!manager.is_watching());

        assert!(manager.start_watching("."));
        assert!(manager.is_watching());
        assert_eq!(manager.watched_paths().len(), 1);

        manager.stop_watching();
        assert!(!manager.is_watching());
    }

    #[test]
    fn watching_multiple_paths() {
        let manager = manager();
        let dir_a = tempfile::tempdir().unwrap();
        let dir_b = tempfile::tempdir().unwrap();

        assert!(manager.start_watching_paths([dir_a.path(), dir_b.path()]));
        assert_eq!(manager.watched_paths().len(), 2);
        manager.stop_watching();
    }
}
