//! Plugin lifecycle state and hot-reload statistics.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

/// Lifecycle state of a managed plugin.
///
/// `Unknown` is the state of any name the manager has never seen.
/// `Unloaded` and `Error` are rest states; a new load or reload may be
/// started from either.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum PluginState {
    /// Never managed.
    #[default]
    Unknown,
    /// Load in progress.
    Loading,
    /// Loaded and ready.
    Loaded,
    /// Unload in progress.
    Unloading,
    /// Unloaded after a successful unload.
    Unloaded,
    /// Reload in progress.
    Reloading,
    /// Last operation failed; see `last_error`.
    Error,
}

impl std::fmt::Display for PluginState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PluginState::Unknown => write!(f, "Unknown"),
            PluginState::Loading => write!(f, "Loading"),
            PluginState::Loaded => write!(f, "Loaded"),
            PluginState::Unloading => write!(f, "Unloading"),
            PluginState::Unloaded => write!(f, "Unloaded"),
            PluginState::Reloading => write!(f, "Reloading"),
            PluginState::Error => write!(f, "Error"),
        }
    }
}

/// Per-plugin record kept by the hot-reload manager.
///
/// Created on first load, mutated by every lifecycle operation, and only
/// removed by an explicit clear of the managed table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchedPluginInfo {
    /// File the plugin was loaded from.
    pub path: PathBuf,
    /// Modification time observed at the last load/reload (or by the
    /// watcher).
    pub last_modified: Option<SystemTime>,
    /// Current lifecycle state.
    pub state: PluginState,
    /// Number of successful loads, the initial one included.
    pub load_count: u64,
    /// Number of successful reloads.
    pub reload_count: u64,
    /// Message of the most recent failure, if any.
    pub last_error: Option<String>,
    /// Whether the watcher may reload this plugin automatically.
    pub auto_reload: bool,
}

impl WatchedPluginInfo {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            last_modified: None,
            state: PluginState::Unknown,
            load_count: 0,
            reload_count: 0,
            last_error: None,
            auto_reload: true,
        }
    }
}

/// Snapshot of the hot-reload counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statistics {
    pub total_loads: u64,
    pub total_unloads: u64,
    pub total_reloads: u64,
    pub failed_loads: u64,
    pub failed_unloads: u64,
    pub failed_reloads: u64,
    pub file_change_events: u64,
}

/// Live counters behind [`Statistics`]. Monotonic except for explicit
/// reset.
#[derive(Debug, Default)]
pub(crate) struct StatCounters {
    pub total_loads: AtomicU64,
    pub total_unloads: AtomicU64,
    pub total_reloads: AtomicU64,
    pub failed_loads: AtomicU64,
    pub failed_unloads: AtomicU64,
    pub failed_reloads: AtomicU64,
    pub file_change_events: AtomicU64,
}

impl StatCounters {
    pub fn snapshot(&self) -> Statistics {
        Statistics {
            total_loads: self.total_loads.load(Ordering::Relaxed),
            total_unloads: self.total_unloads.load(Ordering::Relaxed),
            total_reloads: self.total_reloads.load(Ordering::Relaxed),
            failed_loads: self.failed_loads.load(Ordering::Relaxed),
            failed_unloads: self.failed_unloads.load(Ordering::Relaxed),
            failed_reloads: self.failed_reloads.load(Ordering::Relaxed),
            file_change_events: self.file_change_events.load(Ordering::Relaxed),
        }
    }

    pub fn reset(&self) {
        self.total_loads.store(0, Ordering::Relaxed);
        self.total_unloads.store(0, Ordering::Relaxed);
        self.total_reloads.store(0, Ordering::Relaxed);
        self.failed_loads.store(0, Ordering::Relaxed);
        self.failed_unloads.store(0, Ordering::Relaxed);
        self.failed_reloads.store(0, Ordering::Relaxed);
        self.file_change_events.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;

    #[test]
    fn state_display() {
        assert_eq!(PluginState::Unknown.to_string(), "Unknown");
        assert_eq!(PluginState::Reloading.to_string(), "Reloading");
        assert_eq!(PluginState::default(), PluginState::Unknown);
    }

    #[test]
    fn counters_snapshot_and_reset() {
        let counters = StatCounters::default();
        counters.total_loads.fetch_add(2, Ordering::Relaxed);
        counters.failed_reloads.fetch_add(1, Ordering::Relaxed);

        let stats = counters.snapshot();
        assert_eq!(stats.total_loads, 2);
        assert_eq!(stats.failed_reloads, 1);
        assert_eq!(stats.total_unloads, 0);

        counters.reset();
        assert_eq!(counters.snapshot(), Statistics::default());
    }

    #[test]
    fn info_starts_unknown() {
        let info = WatchedPluginInfo::new(PathBuf::from("/plugins/libx.so"));
        assert_eq!(info.state, PluginState::Unknown);
        assert_eq!(info.load_count, 0);
        assert!(info.auto_reload);
        assert!(info.last_error.is_none());
    }
}
