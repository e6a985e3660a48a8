//! Hot-reload configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the hot-reload manager.
///
/// Read-mostly; `HotReloadManager::configure` replaces the whole value
/// atomically and the watcher picks the new settings up on its next tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HotReloadConfig {
    /// Enable the background file watcher.
    pub enable_file_watching: bool,
    /// Interval between watcher polls.
    pub watch_interval: Duration,
    /// Quiescence window after a file change before acting on it.
    pub debounce_delay: Duration,
    /// Maximum retry count for failed reloads.
    pub max_retry_count: u32,
    /// Delay between reload retry attempts.
    pub retry_delay: Duration,
    /// Reload plugins automatically when their files change.
    pub auto_reload_on_change: bool,
    /// Reserved: back up the old plugin binary before reloading. No
    /// operation reads this yet.
    pub backup_before_reload: bool,
    /// Reserved: directory for plugin backups.
    pub backup_directory: Option<PathBuf>,
}

impl Default for HotReloadConfig {
    fn default() -> Self {
        Self {
            enable_file_watching: true,
            watch_interval: Duration::from_millis(1000),
            debounce_delay: Duration::from_millis(500),
            max_retry_count: 3,
            retry_delay: Duration::from_millis(1000),
            auto_reload_on_change: true,
            backup_before_reload: false,
            backup_directory: None,
        }
    }
}

impl HotReloadConfig {
    /// Create a new configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable/disable file watching.
    pub fn with_file_watching(mut self, enabled: bool) -> Self {
        self.enable_file_watching = enabled;
        self
    }

    /// Set the watcher poll interval.
    pub fn with_watch_interval(mut self, interval: Duration) -> Self {
        self.watch_interval = interval;
        self
    }

    /// Set the debounce window.
    pub fn with_debounce_delay(mut self, delay: Duration) -> Self {
        self.debounce_delay = delay;
        self
    }

    /// Set the maximum reload retry count.
    pub fn with_max_retry_count(mut self, count: u32) -> Self {
        self.max_retry_count = count;
        self
    }

    /// Set the delay between reload retries.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Enable/disable automatic reload on file changes.
    pub fn with_auto_reload(mut self, enabled: bool) -> Self {
        self.auto_reload_on_change = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let config = HotReloadConfig::default();
        assert!(config.enable_file_watching);
        assert_eq!(config.watch_interval, Duration::from_millis(1000));
        assert_eq!(config.debounce_delay, Duration::from_millis(500));
        assert_eq!(config.max_retry_count, 3);
        assert_eq!(config.retry_delay, Duration::from_millis(1000));
        assert!(config.auto_reload_on_change);
        assert!(!config.backup_before_reload);
        assert!(config.backup_directory.is_none());
    }

    #[test]
    fn builders() {
        let config = HotReloadConfig::new()
            .with_file_watching(false)
            .with_watch_interval(Duration::from_millis(50))
            .with_debounce_delay(Duration::from_millis(20))
            .with_max_retry_count(5)
            .with_retry_delay(Duration::from_millis(10))
            .with_auto_reload(false);

        assert!(!config.enable_file_watching);
        assert_eq!(config.watch_interval, Duration::from_millis(50));
        assert_eq!(config.debounce_delay, Duration::from_millis(20));
        assert_eq!(config.max_retry_count, 5);
        assert_eq!(config.retry_delay, Duration::from_millis(10));
        assert!(!config.auto_reload_on_change);
    }
}
