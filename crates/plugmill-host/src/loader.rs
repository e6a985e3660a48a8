//! Dynamic library loader
//!
//! The libloading-backed implementation of the loadable-unit capability.

use libloading::{Library, Symbol};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use plugmill_kernel::abi::{DESCRIPTOR_SYMBOL, DescriptorAccessorFn};
use plugmill_kernel::{LoadedUnit, PluginDescriptor, PluginError, UnitLoader};

/// Check whether a path looks like a native plugin library.
pub fn is_plugin_library(path: &Path) -> bool {
    let ext = path.extension().and_then(|e| e.to_str());
    matches!(ext, Some("so") | Some("dylib") | Some("dll"))
}

/// Opens plugins with the platform dynamic loader.
#[derive(Debug, Default)]
pub struct DylibLoader;

impl DylibLoader {
    pub fn new() -> Self {
        Self
    }
}

impl UnitLoader for DylibLoader {
    fn open(&self, path: &Path) -> Result<Arc<dyn LoadedUnit>, PluginError> {
        info!("Loading plugin library: {:?}", path);

        // Safety: loading foreign code is inherently unsafe; the caller
        // chose the file. Initializers run here.
        let library =
            unsafe { Library::new(path) }.map_err(|e| PluginError::LibraryLoad(e.to_string()))?;

        Ok(Arc::new(DylibUnit {
            path: path.to_path_buf(),
            library,
        }))
    }
}

/// A shared library opened by [`DylibLoader`].
struct DylibUnit {
    path: PathBuf,
    library: Library,
}

impl LoadedUnit for DylibUnit {
    fn path(&self) -> &Path {
        &self.path
    }

    fn descriptor(&self) -> Result<PluginDescriptor, PluginError> {
        let accessor: Symbol<'_, DescriptorAccessorFn> = unsafe {
            self.library.get(DESCRIPTOR_SYMBOL).map_err(|e| {
                PluginError::SymbolNotFound(format!("plugmill_plugin_descriptor: {e}"))
            })?
        };

        // Safety: the symbol matches the documented accessor signature and
        // the library stays mapped while `self` is alive.
        let raw = unsafe { accessor() };
        unsafe { PluginDescriptor::from_raw(raw) }
    }
}

impl Drop for DylibUnit {
    fn drop(&mut self) {
        debug!("Unloading plugin library: {:?}", self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plugin_library_extensions() {
        assert!(is_plugin_library(Path::new("/plugins/libcodec.so")));
        assert!(is_plugin_library(Path::new("/plugins/libcodec.dylib")));
        assert!(is_plugin_library(Path::new("codec.dll")));

        assert!(!is_plugin_library(Path::new("/plugins/codec.txt")));
        assert!(!is_plugin_library(Path::new("/plugins/codec")));
    }

    #[test]
    fn open_missing_file_is_recoverable() {
        let loader = DylibLoader::new();
        let result = loader.open(Path::new("/non/existent/libplugin.so"));
        assert!(matches!(result, Err(PluginError::LibraryLoad(_))));
    }
}
