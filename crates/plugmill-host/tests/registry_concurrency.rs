//! Registry behavior under concurrent lookup and reload churn.

mod common;

use common::{FakeLoader, plugin_file};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use plugmill_host::{
    ModuleDescriptor, PluginDescriptor, PluginRegistry, PluginVersion,
};

fn two_module_descriptor(name: &str) -> PluginDescriptor {
    PluginDescriptor::new(name, PluginVersion::new(3, 1, 4, 1))
        .with_description("concurrency fixture")
        .with_module(ModuleDescriptor::new("alpha", "first"))
        .with_module(ModuleDescriptor::new("beta", "second"))
}

#[test]
fn concurrent_find_never_observes_a_torn_plugin() {
    let dir = tempfile::tempdir().unwrap();
    let path = plugin_file(dir.path(), "libchurn.so");
    let loader = FakeLoader::new();
    loader.provide(&path, two_module_descriptor("churn"));

    let registry = Arc::new(PluginRegistry::with_loader(loader));
    registry.load_file(&path).unwrap();

    let stop = Arc::new(AtomicBool::new(false));

    let reader = {
        let registry = registry.clone();
        let stop = stop.clone();
        std::thread::spawn(move || {
            let mut observed = 0u64;
            while !stop.load(Ordering::Relaxed) {
                if let Some(plugin) = registry.find("churn") {
                    // Every field must be consistent with a fully loaded
                    // plugin, pre- or post-reload.
                    assert_eq!(plugin.name(), "churn");
                    assert_eq!(plugin.descriptor().modules().len(), 2);
                    assert!(plugin.find_module("alpha").is_some());
                    assert!(plugin.find_module("beta").is_some());
                    assert_eq!(
                        plugin.descriptor().version(),
                        PluginVersion::new(3, 1, 4, 1)
                    );
                    observed += 1;
                }
            }
            observed
        })
    };

    let churner = {
        let registry = registry.clone();
        let path = path.clone();
        std::thread::spawn(move || {
            for _ in 0..200 {
                let _ = registry.unload("churn");
                let _ = registry.load_file(&path);
            }
        })
    };

    churner.join().unwrap();
    stop.store(true, Ordering::Relaxed);
    let observed = reader.join().unwrap();

    assert!(observed > 0);
    assert!(registry.is_loaded("churn"));
}

#[test]
fn handle_outlives_a_concurrent_unload() {
    let dir = tempfile::tempdir().unwrap();
    let path = plugin_file(dir.path(), "libkeep.so");
    let loader = FakeLoader::new();
    loader.provide(&path, two_module_descriptor("keep"));

    let registry = PluginRegistry::with_loader(loader);
    registry.load_file(&path).unwrap();

    let handle = registry.find("keep").unwrap();
    registry.unload("keep").unwrap();

    // The registry entry is gone but the handle still reads consistently.
    assert!(!registry.is_loaded("keep"));
    assert_eq!(handle.name(), "keep");
    assert!(handle.find_module("alpha").is_some());
}

#[test]
fn reload_replaces_the_registered_entry() {
    let dir = tempfile::tempdir().unwrap();
    let path = plugin_file(dir.path(), "libswap.so");
    let loader = FakeLoader::new();
    loader.provide(&path, two_module_descriptor("swap"));

    let registry = PluginRegistry::with_loader(loader.clone());
    registry.load_file(&path).unwrap();
    let before = registry.find("swap").unwrap();

    loader.provide(
        &path,
        PluginDescriptor::new("swap", PluginVersion::new(4, 0, 0, 0))
            .with_module(ModuleDescriptor::new("alpha", "rebuilt")),
    );
    registry.reload("swap").unwrap();

    let after = registry.find("swap").unwrap();
    assert_eq!(before.descriptor().version(), PluginVersion::new(3, 1, 4, 1));
    assert_eq!(after.descriptor().version(), PluginVersion::new(4, 0, 0, 0));
    assert_eq!(after.descriptor().modules().len(), 1);
}
