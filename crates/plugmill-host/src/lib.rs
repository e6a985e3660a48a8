//! plugmill-host: plugin registry and hot-reload manager.
//!
//! This crate is the host-process half of Plugmill. It keeps a
//! [`registry::PluginRegistry`] of loaded native plugins, layers a
//! per-plugin lifecycle state table on top of it, and drives a background
//! polling watcher so plugins can be reloaded when their files change on
//! disk — all without restarting the host.
//!
//! The entry point for most applications is [`manager::HotReloadManager`]:
//!
//! ```no_run
//! use plugmill_host::{HotReloadConfig, HotReloadManager, PluginEvent};
//!
//! let manager = HotReloadManager::new(HotReloadConfig::default());
//!
//! manager.register_callback(PluginEvent::AfterReload, |name, path| {
//!     println!("reloaded {name} from {}", path.display());
//! });
//!
//! manager.load_plugin("plugins/libimage_codecs.so");
//! manager.start_watching("plugins");
//! // ... host runs ...
//! manager.shutdown();
//! ```
//!
//! There is no global manager; hosts own the instance and may create
//! several independent ones (each with its own registry), which also keeps
//! tests deterministic.

pub mod config;
pub mod events;
pub mod loader;
pub mod manager;
pub mod paths;
pub mod registry;
pub mod state;
pub mod watcher;

pub use config::HotReloadConfig;
pub use events::{CallbackSet, PluginEvent};
pub use loader::DylibLoader;
pub use manager::HotReloadManager;
pub use paths::default_plugin_paths;
pub use registry::{Plugin, PluginRegistry, RegistryError};
pub use state::{PluginState, Statistics, WatchedPluginInfo};
pub use watcher::{PluginWatcher, WatchSink};

pub use plugmill_kernel::{
    CURRENT_API_VERSION, ComponentDescriptor, LoadedUnit, ModuleDescriptor, PluginDescriptor,
    PluginError, PluginVersion, UnitLoader,
};
