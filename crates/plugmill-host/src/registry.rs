//! Plugin registry
//!
//! Process-wide collection of loaded plugins with name and path indexes.
//! All mutations are serialized by one registry lock; lookups hand out
//! reference-counted handles, so a handle obtained just before a
//! concurrent unload keeps the code object mapped until it is dropped.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use plugmill_kernel::{
    ComponentDescriptor, LoadedUnit, ModuleDescriptor, PluginDescriptor, PluginError, UnitLoader,
    CURRENT_API_VERSION,
};

use crate::loader::{DylibLoader, is_plugin_library};

/// Errors that can occur during registry operations.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum RegistryError {
    #[error(transparent)]
    Plugin(#[from] PluginError),

    #[error("Plugin already registered: {0}")]
    DuplicateName(String),

    #[error("Plugin not found: {0}")]
    NotFound(String),

    #[error("No plugin registered for path: {0}")]
    PathNotRegistered(PathBuf),

    #[error("Built-in plugin cannot be unloaded: {0}")]
    BuiltinProtected(String),
}

/// A loaded plugin.
///
/// Wraps the descriptor copied out of the code object, the handle keeping
/// that code object mapped, and name indexes for its modules and
/// components. Handed out as `Arc<Plugin>`; the library is unmapped when
/// the registry entry and every outstanding handle are gone.
pub struct Plugin {
    path: PathBuf,
    descriptor: PluginDescriptor,
    modules_by_name: HashMap<String, usize>,
    components_by_name: HashMap<String, usize>,
    // Keeps the code object mapped; None for built-in plugins.
    _unit: Option<Arc<dyn LoadedUnit>>,
    builtin: bool,
}

impl Plugin {
    fn new(path: PathBuf, descriptor: PluginDescriptor, unit: Option<Arc<dyn LoadedUnit>>) -> Self {
        let builtin = unit.is_none();
        let modules_by_name = descriptor
            .modules()
            .iter()
            .enumerate()
            .map(|(index, module)| (module.name().to_string(), index))
            .collect();
        let components_by_name = descriptor
            .components()
            .iter()
            .enumerate()
            .map(|(index, component)| (component.name().to_string(), index))
            .collect();

        Self {
            path,
            descriptor,
            modules_by_name,
            components_by_name,
            _unit: unit,
            builtin,
        }
    }

    pub fn name(&self) -> &str {
        self.descriptor.name()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn descriptor(&self) -> &PluginDescriptor {
        &self.descriptor
    }

    /// Whether this plugin was registered statically by the host.
    pub fn is_builtin(&self) -> bool {
        self.builtin
    }

    /// O(1) module lookup by name.
    pub fn find_module(&self, name: &str) -> Option<&ModuleDescriptor> {
        self.modules_by_name
            .get(name)
            .map(|&index| &self.descriptor.modules()[index])
    }

    /// O(1) component lookup by name.
    pub fn find_component(&self, name: &str) -> Option<&ComponentDescriptor> {
        self.components_by_name
            .get(name)
            .map(|&index| &self.descriptor.components()[index])
    }
}

impl std::fmt::Debug for Plugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Plugin")
            .field("name", &self.name())
            .field("path", &self.path)
            .field("version", &self.descriptor.version().to_string())
            .field("builtin", &self.builtin)
            .finish()
    }
}

struct RegistryInner {
    plugins: HashMap<String, Arc<Plugin>>,
    path_to_name: HashMap<PathBuf, String>,
}

/// Thread-safe registry of loaded plugins.
pub struct PluginRegistry {
    inner: RwLock<RegistryInner>,
    loader: Arc<dyn UnitLoader>,
}

impl PluginRegistry {
    /// Create a registry backed by the platform dynamic loader.
    pub fn new() -> Self {
        Self::with_loader(Arc::new(DylibLoader::new()))
    }

    /// Create a registry with an injected loader.
    pub fn with_loader(loader: Arc<dyn UnitLoader>) -> Self {
        Self {
            inner: RwLock::new(RegistryInner {
                plugins: HashMap::new(),
                path_to_name: HashMap::new(),
            }),
            loader,
        }
    }

    /// Register a built-in plugin from a host-constructed descriptor.
    ///
    /// Built-in plugins have no backing code object and can never be
    /// unloaded or reloaded.
    pub fn register_builtin(&self, descriptor: PluginDescriptor) -> Result<String, RegistryError> {
        let name = descriptor.name().to_string();
        let mut inner = self.inner.write();

        if inner.plugins.contains_key(&name) {
            return Err(RegistryError::DuplicateName(name));
        }

        let plugin = Arc::new(Plugin::new(PathBuf::new(), descriptor, None));
        inner.plugins.insert(name.clone(), plugin);

        info!(plugin = %name, "Built-in plugin registered");
        Ok(name)
    }

    /// Load a plugin file, or every plugin library in a directory.
    ///
    /// Directories are scanned flat (no recursion); entries without a
    /// plugin library extension are ignored and individual load failures
    /// are logged and skipped. Returns the names that were loaded.
    pub fn load(&self, path: impl AsRef<Path>) -> Result<Vec<String>, RegistryError> {
        let path = path.as_ref();

        if path.is_dir() {
            let mut loaded = Vec::new();
            let entries = std::fs::read_dir(path).map_err(PluginError::from)?;
            for entry in entries.flatten() {
                let entry_path = entry.path();
                if !entry_path.is_file() || !is_plugin_library(&entry_path) {
                    continue;
                }
                match self.load_file(&entry_path) {
                    Ok(name) => loaded.push(name),
                    Err(e) => {
                        warn!(path = ?entry_path, error = %e, "Failed to load plugin");
                    }
                }
            }
            return Ok(loaded);
        }

        self.load_file(path).map(|name| vec![name])
    }

    /// Load a single plugin file; returns the plugin name.
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<String, RegistryError> {
        let path = path.as_ref();

        let unit = self.loader.open(path)?;
        let descriptor = unit.descriptor()?;

        if descriptor.api_version() != CURRENT_API_VERSION {
            return Err(PluginError::ApiVersionMismatch {
                expected: CURRENT_API_VERSION,
                actual: descriptor.api_version(),
            }
            .into());
        }

        let name = descriptor.name().to_string();
        let version = descriptor.version();
        let plugin = Arc::new(Plugin::new(path.to_path_buf(), descriptor, Some(unit)));

        let mut inner = self.inner.write();
        if inner.plugins.contains_key(&name) {
            return Err(RegistryError::DuplicateName(name));
        }
        inner.path_to_name.insert(path.to_path_buf(), name.clone());
        inner.plugins.insert(name.clone(), plugin);

        info!(plugin = %name, version = %version, path = ?path, "Plugin loaded");
        Ok(name)
    }

    /// Look up a plugin by name.
    pub fn find(&self, name: &str) -> Option<Arc<Plugin>> {
        let inner = self.inner.read();
        inner.plugins.get(name).cloned()
    }

    /// Look up a plugin by the path it was loaded from.
    pub fn find_by_path(&self, path: impl AsRef<Path>) -> Option<Arc<Plugin>> {
        let inner = self.inner.read();
        let name = inner.path_to_name.get(path.as_ref())?;
        inner.plugins.get(name).cloned()
    }

    /// Unload a plugin by name.
    ///
    /// The code object is unmapped once the last outstanding handle is
    /// dropped; instances created from the old descriptors become invalid
    /// at that point.
    pub fn unload(&self, name: &str) -> Result<(), RegistryError> {
        let mut inner = self.inner.write();

        match inner.plugins.get(name) {
            None => return Err(RegistryError::NotFound(name.to_string())),
            Some(plugin) if plugin.is_builtin() => {
                return Err(RegistryError::BuiltinProtected(name.to_string()));
            }
            Some(_) => {}
        }
        if let Some(plugin) = inner.plugins.remove(name) {
            inner.path_to_name.remove(plugin.path());
        }
        drop(inner);

        info!(plugin = %name, "Plugin unloaded");
        Ok(())
    }

    /// Unload a plugin by path; returns the name that was unloaded.
    pub fn unload_by_path(&self, path: impl AsRef<Path>) -> Result<String, RegistryError> {
        let path = path.as_ref();
        let name = {
            let inner = self.inner.read();
            inner
                .path_to_name
                .get(path)
                .cloned()
                .ok_or_else(|| RegistryError::PathNotRegistered(path.to_path_buf()))?
        };
        self.unload(&name)?;
        Ok(name)
    }

    /// Reload a plugin by name: unload, then load again from its recorded
    /// path. Returns the (possibly new) plugin name.
    pub fn reload(&self, name: &str) -> Result<String, RegistryError> {
        let path = {
            let inner = self.inner.read();
            let plugin = inner
                .plugins
                .get(name)
                .ok_or_else(|| RegistryError::NotFound(name.to_string()))?;
            if plugin.is_builtin() {
                return Err(RegistryError::BuiltinProtected(name.to_string()));
            }
            plugin.path().to_path_buf()
        };

        debug!(plugin = %name, path = ?path, "Reloading plugin");
        self.unload(name)?;
        self.load_file(&path)
    }

    /// Reload a plugin by path.
    pub fn reload_by_path(&self, path: impl AsRef<Path>) -> Result<String, RegistryError> {
        let path = path.as_ref();
        let name = {
            let inner = self.inner.read();
            inner
                .path_to_name
                .get(path)
                .cloned()
                .ok_or_else(|| RegistryError::PathNotRegistered(path.to_path_buf()))?
        };
        self.reload(&name)
    }

    /// Whether a plugin with this name is currently registered.
    pub fn is_loaded(&self, name: &str) -> bool {
        let inner = self.inner.read();
        inner.plugins.contains_key(name)
    }

    /// Number of registered plugins, built-ins included.
    pub fn count(&self) -> usize {
        let inner = self.inner.read();
        inner.plugins.len()
    }

    /// Names of all registered plugins.
    pub fn names(&self) -> Vec<String> {
        let inner = self.inner.read();
        inner.plugins.keys().cloned().collect()
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new()
    }
}
