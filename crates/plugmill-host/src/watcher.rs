//! Polling file watcher
//!
//! One background thread samples the modification time of every watched
//! plugin file on an interval, reports changes to a [`WatchSink`], and
//! applies a per-file debounce window before declaring a change settled.
//! Cancellation is a flag plus a condvar, so stopping returns promptly
//! instead of waiting out a full poll interval.

use parking_lot::{Condvar, Mutex};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::loader::is_plugin_library;

/// Receiver for watcher observations.
///
/// The manager implements this; a standalone sink works too (see the
/// watcher tests).
pub trait WatchSink: Send + Sync {
    /// Current poll interval.
    fn watch_interval(&self) -> Duration;

    /// Current debounce window.
    fn debounce_delay(&self) -> Duration;

    /// The watcher thread entered its loop.
    fn watch_started(&self);

    /// The watcher thread is exiting.
    fn watch_stopped(&self);

    /// A candidate file was scanned. The sink compares against its
    /// recorded modification time and records the new one; returning
    /// `true` arms (or re-arms) the file's debounce window.
    fn observe(&self, path: &Path) -> bool;

    /// The debounce window for `path` elapsed with no further change.
    fn settled(&self, path: &Path);
}

struct WatchControl {
    running: AtomicBool,
    lock: Mutex<()>,
    wakeup: Condvar,
}

/// Background polling watcher over a set of files and directories.
pub struct PluginWatcher {
    paths: Arc<Mutex<Vec<PathBuf>>>,
    control: Arc<WatchControl>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl PluginWatcher {
    pub fn new() -> Self {
        Self {
            paths: Arc::new(Mutex::new(Vec::new())),
            control: Arc::new(WatchControl {
                running: AtomicBool::new(false),
                lock: Mutex::new(()),
                wakeup: Condvar::new(),
            }),
            handle: Mutex::new(None),
        }
    }

    /// Add paths to the watch set (deduplicated).
    pub fn add_paths<I, P>(&self, new_paths: I)
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let mut paths = self.paths.lock();
        for path in new_paths {
            let path = path.as_ref().to_path_buf();
            if !paths.contains(&path) {
                info!(path = ?path, "Watching path for plugin changes");
                paths.push(path);
            }
        }
    }

    /// Currently watched paths.
    pub fn paths(&self) -> Vec<PathBuf> {
        self.paths.lock().clone()
    }

    /// Whether the watcher thread is running.
    pub fn is_running(&self) -> bool {
        self.control.running.load(Ordering::SeqCst)
    }

    /// Start the watcher thread if it is not already running.
    pub fn start(&self, sink: Arc<dyn WatchSink>) -> bool {
        let mut handle = self.handle.lock();
        if self.is_running() {
            return true;
        }

        self.control.running.store(true, Ordering::SeqCst);
        let control = self.control.clone();
        let paths = self.paths.clone();

        let spawned = std::thread::Builder::new()
            .name("plugmill-watcher".to_string())
            .spawn(move || watcher_loop(control, paths, sink));

        match spawned {
            Ok(join_handle) => {
                *handle = Some(join_handle);
                true
            }
            Err(e) => {
                warn!(error = %e, "Failed to spawn watcher thread");
                self.control.running.store(false, Ordering::SeqCst);
                false
            }
        }
    }

    /// Signal the watcher thread to stop and join it.
    ///
    /// Latency is bounded by the condvar wakeup, not by the configured
    /// poll interval.
    pub fn stop(&self) {
        if !self.is_running() {
            return;
        }

        self.control.running.store(false, Ordering::SeqCst);
        {
            let _guard = self.control.lock.lock();
            self.control.wakeup.notify_all();
        }

        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            // A callback may call stop from the watcher thread itself; the
            // loop exits on the cleared flag, so joining would deadlock.
            if handle.thread().id() == std::thread::current().id() {
                return;
            }
            if handle.join().is_err() {
                warn!("Watcher thread panicked during shutdown");
            }
        }
    }
}

impl Default for PluginWatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for PluginWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

fn watcher_loop(
    control: Arc<WatchControl>,
    paths: Arc<Mutex<Vec<PathBuf>>>,
    sink: Arc<dyn WatchSink>,
) {
    info!("Plugin file watcher started");
    sink.watch_started();

    let mut pending: HashMap<PathBuf, Instant> = HashMap::new();

    while control.running.load(Ordering::SeqCst) {
        let interval = sink.watch_interval();
        // Wake early for the nearest debounce deadline so settles are not
        // delayed by a long poll interval.
        let now = Instant::now();
        let wait = pending
            .values()
            .map(|deadline| deadline.saturating_duration_since(now))
            .min()
            .map_or(interval, |until_deadline| until_deadline.min(interval));

        {
            let mut guard = control.lock.lock();
            if control.running.load(Ordering::SeqCst) {
                control.wakeup.wait_for(&mut guard, wait);
            }
        }
        if !control.running.load(Ordering::SeqCst) {
            break;
        }

        let debounce = sink.debounce_delay();
        let snapshot = paths.lock().clone();
        for watch_path in snapshot {
            for file in candidate_files(&watch_path) {
                if sink.observe(&file) {
                    pending.insert(file, Instant::now() + debounce);
                }
            }
        }

        let now = Instant::now();
        let ready: Vec<PathBuf> = pending
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(path, _)| path.clone())
            .collect();
        for path in ready {
            pending.remove(&path);
            sink.settled(&path);
        }
    }

    info!("Plugin file watcher stopped");
    sink.watch_stopped();
}

/// Files a watch path contributes: the file itself, or a flat scan of
/// plugin libraries for a directory. Unreadable paths are skipped.
fn candidate_files(watch_path: &Path) -> Vec<PathBuf> {
    if watch_path.is_file() {
        return vec![watch_path.to_path_buf()];
    }
    if watch_path.is_dir() {
        match std::fs::read_dir(watch_path) {
            Ok(entries) => {
                return entries
                    .flatten()
                    .map(|entry| entry.path())
                    .filter(|path| path.is_file() && is_plugin_library(path))
                    .collect();
            }
            Err(e) => {
                debug!(path = ?watch_path, error = %e, "Skipping unreadable watch path");
            }
        }
    }
    Vec::new()
}
