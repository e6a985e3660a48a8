//! Shared test support: an in-memory unit loader so registry and manager
//! behavior can be exercised without real dynamic libraries.

// Not every test binary uses every helper.
#![allow(dead_code)]

use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use plugmill_host::{
    ComponentDescriptor, LoadedUnit, ModuleDescriptor, PluginDescriptor, PluginError,
    PluginVersion, UnitLoader,
};

struct LoadSpec {
    descriptor: PluginDescriptor,
    fail_remaining: u32,
    open_count: u64,
}

/// Serves descriptors from an in-memory table keyed by path, with
/// injectable transient failures.
#[derive(Default)]
pub struct FakeLoader {
    specs: Mutex<HashMap<PathBuf, LoadSpec>>,
}

impl FakeLoader {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register the descriptor served for `path`.
    pub fn provide(&self, path: impl AsRef<Path>, descriptor: PluginDescriptor) {
        self.specs.lock().insert(
            path.as_ref().to_path_buf(),
            LoadSpec {
                descriptor,
                fail_remaining: 0,
                open_count: 0,
            },
        );
    }

    /// Make the next `count` opens of `path` fail.
    pub fn fail_times(&self, path: impl AsRef<Path>, count: u32) {
        if let Some(spec) = self.specs.lock().get_mut(path.as_ref()) {
            spec.fail_remaining = count;
        }
    }

    /// How many times `path` has been opened (including failed opens).
    pub fn open_count(&self, path: impl AsRef<Path>) -> u64 {
        self.specs
            .lock()
            .get(path.as_ref())
            .map_or(0, |spec| spec.open_count)
    }
}

impl UnitLoader for FakeLoader {
    fn open(&self, path: &Path) -> Result<Arc<dyn LoadedUnit>, PluginError> {
        let mut specs = self.specs.lock();
        let spec = specs
            .get_mut(path)
            .ok_or_else(|| PluginError::LibraryLoad(format!("cannot open {}", path.display())))?;

        spec.open_count += 1;
        if spec.fail_remaining > 0 {
            spec.fail_remaining -= 1;
            return Err(PluginError::LibraryLoad(
                "injected transient failure".to_string(),
            ));
        }

        Ok(Arc::new(FakeUnit {
            path: path.to_path_buf(),
            descriptor: spec.descriptor.clone(),
        }))
    }
}

struct FakeUnit {
    path: PathBuf,
    descriptor: PluginDescriptor,
}

impl LoadedUnit for FakeUnit {
    fn path(&self) -> &Path {
        &self.path
    }

    fn descriptor(&self) -> Result<PluginDescriptor, PluginError> {
        Ok(self.descriptor.clone())
    }
}

/// A minimal valid descriptor with one module and one component.
pub fn descriptor(name: &str) -> PluginDescriptor {
    PluginDescriptor::new(name, PluginVersion::new(1, 0, 0, 0))
        .with_description("test plugin")
        .with_module(ModuleDescriptor::new("core", "core module"))
        .with_component(ComponentDescriptor::new("core_ops", "core component"))
}

/// Create an empty plugin file on disk and return its path.
pub fn plugin_file(dir: &Path, file_name: &str) -> PathBuf {
    let path = dir.join(file_name);
    std::fs::write(&path, b"stand-in plugin binary").unwrap();
    path
}

/// Push a file's modification time to a distinct value so mtime-based
/// change detection sees it regardless of filesystem timestamp
/// granularity.
pub fn touch(path: &Path, stamp: std::time::SystemTime) {
    let file = std::fs::File::options().write(true).open(path).unwrap();
    file.set_modified(stamp).unwrap();
}
