//! Plugin lifecycle events and callback dispatch.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Lifecycle events delivered to registered callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PluginEvent {
    /// Fired before a plugin is unloaded.
    BeforeUnload,
    /// Fired after a plugin was unloaded.
    AfterUnload,
    /// Fired before a plugin is loaded.
    BeforeLoad,
    /// Fired after a plugin was loaded.
    AfterLoad,
    /// Fired before a plugin is reloaded.
    BeforeReload,
    /// Fired after a plugin was reloaded.
    AfterReload,
    /// Fired when loading a plugin failed.
    LoadFailed,
    /// Fired when unloading a plugin failed.
    UnloadFailed,
    /// Fired when file watching starts.
    WatchStarted,
    /// Fired when file watching stops.
    WatchStopped,
    /// Fired when a watched plugin file changed.
    FileChanged,
}

/// Callback invoked with the plugin name and path of the event.
pub type EventCallback = dyn Fn(&str, &Path) + Send + Sync;

/// Per-event-kind lists of owned callbacks, addressed by a process-wide
/// ascending id.
///
/// Dispatch copies the relevant list under the lock and invokes the
/// callbacks after releasing it, so a callback may freely call back into
/// the manager without deadlocking.
#[derive(Default)]
pub struct CallbackSet {
    next_id: AtomicU64,
    lists: Mutex<HashMap<PluginEvent, Vec<(u64, Arc<EventCallback>)>>>,
}

impl CallbackSet {
    pub fn new() -> Self {
        Self {
            // Ids start at 1 so 0 never names a registration.
            next_id: AtomicU64::new(1),
            lists: Mutex::new(HashMap::new()),
        }
    }

    /// Register a callback for an event kind; returns its id.
    ///
    /// Ids are unique and strictly increasing across all event kinds.
    pub fn register<F>(&self, event: PluginEvent, callback: F) -> u64
    where
        F: Fn(&str, &Path) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut lists = self.lists.lock();
        lists.entry(event).or_default().push((id, Arc::new(callback)));
        id
    }

    /// Remove the callback with the given id; returns whether it was
    /// found.
    pub fn unregister(&self, id: u64) -> bool {
        let mut lists = self.lists.lock();
        for callbacks in lists.values_mut() {
            if let Some(index) = callbacks.iter().position(|(cb_id, _)| *cb_id == id) {
                callbacks.remove(index);
                return true;
            }
        }
        false
    }

    /// Remove every callback registered for one event kind.
    pub fn clear(&self, event: PluginEvent) {
        let mut lists = self.lists.lock();
        lists.remove(&event);
    }

    /// Remove every registered callback.
    pub fn clear_all(&self) {
        let mut lists = self.lists.lock();
        lists.clear();
    }

    /// Number of callbacks registered for one event kind.
    pub fn len(&self, event: PluginEvent) -> usize {
        let lists = self.lists.lock();
        lists.get(&event).map_or(0, Vec::len)
    }

    /// Invoke every callback registered for `event`, in registration
    /// order.
    pub fn dispatch(&self, event: PluginEvent, plugin_name: &str, path: &Path) {
        let snapshot: Vec<Arc<EventCallback>> = {
            let lists = self.lists.lock();
            match lists.get(&event) {
                Some(callbacks) => callbacks.iter().map(|(_, cb)| cb.clone()).collect(),
                None => return,
            }
        };

        for callback in snapshot {
            callback(plugin_name, path);
        }
    }
}
