//! Host-side descriptor model
//!
//! Owned views over the raw ABI structs. The string data is copied out at
//! load time so lookups never chase pointers into the plugin binary; the
//! factory function pointers are kept and stay callable for as long as the
//! owning code object remains mapped (the registry guarantees this by
//! holding the unit handle inside each `Plugin`).

use serde::{Deserialize, Serialize};
use std::ffi::{CStr, c_char, c_void};

use crate::abi::{
    AddOptionsFn, CURRENT_API_VERSION, ComponentCreateFn, ModuleCreateFn, RawComponentDescriptor,
    RawModuleDescriptor, RawPluginDescriptor,
};
use crate::error::PluginError;

/// Four-part plugin version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct PluginVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
    pub build: u32,
}

impl PluginVersion {
    /// Create a new version.
    pub fn new(major: u32, minor: u32, patch: u32, build: u32) -> Self {
        Self {
            major,
            minor,
            patch,
            build,
        }
    }

    /// Check if this version is compatible with another (same major version).
    pub fn is_compatible(&self, other: &PluginVersion) -> bool {
        self.major == other.major
    }
}

impl std::fmt::Display for PluginVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.major, self.minor, self.patch, self.build
        )
    }
}

/// A module exported by a plugin.
///
/// Stateless; any number of instances may be created from one descriptor.
#[derive(Debug, Clone)]
pub struct ModuleDescriptor {
    name: String,
    description: String,
    raw: *const RawModuleDescriptor,
    create: Option<ModuleCreateFn>,
}

impl ModuleDescriptor {
    /// Create a descriptor with no instance factory, for plugins the host
    /// registers statically.
    pub fn new(name: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            raw: std::ptr::null(),
            create: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Whether the plugin supplied an instance factory.
    pub fn has_factory(&self) -> bool {
        self.create.is_some()
    }

    /// Create a runtime instance from this descriptor.
    ///
    /// Returns null when the descriptor carries no factory.
    ///
    /// # Safety
    /// The owning code object must still be mapped, which holds whenever
    /// the `Plugin` this descriptor was obtained from is still alive.
    /// Ownership of the returned instance passes to the caller.
    pub unsafe fn create_instance(&self) -> *mut c_void {
        match self.create {
            Some(create) => unsafe { create(self.raw) },
            None => std::ptr::null_mut(),
        }
    }
}

/// A component exported by a plugin. Symmetric with [`ModuleDescriptor`].
#[derive(Debug, Clone)]
pub struct ComponentDescriptor {
    name: String,
    description: String,
    raw: *const RawComponentDescriptor,
    create: Option<ComponentCreateFn>,
}

impl ComponentDescriptor {
    /// Create a descriptor with no instance factory.
    pub fn new(name: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            raw: std::ptr::null(),
            create: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn has_factory(&self) -> bool {
        self.create.is_some()
    }

    /// Create a runtime instance from this descriptor.
    ///
    /// # Safety
    /// Same contract as [`ModuleDescriptor::create_instance`].
    pub unsafe fn create_instance(&self) -> *mut c_void {
        match self.create {
            Some(create) => unsafe { create(self.raw) },
            None => std::ptr::null_mut(),
        }
    }
}

/// Owned view of a plugin's descriptor.
#[derive(Debug, Clone)]
pub struct PluginDescriptor {
    name: String,
    description: String,
    api_version: u32,
    version: PluginVersion,
    modules: Vec<ModuleDescriptor>,
    components: Vec<ComponentDescriptor>,
    raw: *const RawPluginDescriptor,
    add_options: Option<AddOptionsFn>,
}

// Safety: the raw pointers reference immutable descriptor data inside the
// plugin binary; all mutation happens on the owned String/Vec fields.
unsafe impl Send for ModuleDescriptor {}
unsafe impl Sync for ModuleDescriptor {}
unsafe impl Send for ComponentDescriptor {}
unsafe impl Sync for ComponentDescriptor {}
unsafe impl Send for PluginDescriptor {}
unsafe impl Sync for PluginDescriptor {}

impl PluginDescriptor {
    /// Create a descriptor for a plugin the host registers statically.
    pub fn new(name: &str, version: PluginVersion) -> Self {
        Self {
            name: name.to_string(),
            description: String::new(),
            api_version: CURRENT_API_VERSION,
            version,
            modules: Vec::new(),
            components: Vec::new(),
            raw: std::ptr::null(),
            add_options: None,
        }
    }

    /// Set description.
    pub fn with_description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    /// Declare an API version other than the host's own. Mostly useful in
    /// tests exercising the version check.
    pub fn with_api_version(mut self, api_version: u32) -> Self {
        self.api_version = api_version;
        self
    }

    /// Add a module descriptor.
    pub fn with_module(mut self, module: ModuleDescriptor) -> Self {
        self.modules.push(module);
        self
    }

    /// Add a component descriptor.
    pub fn with_component(mut self, component: ComponentDescriptor) -> Self {
        self.components.push(component);
        self
    }

    /// Copy a raw descriptor out of a loaded code object.
    ///
    /// # Safety
    /// `raw` must point to a valid [`RawPluginDescriptor`] whose pointers
    /// follow the nullability contract documented on the ABI structs, and
    /// the owning code object must stay mapped for the duration of the
    /// call.
    pub unsafe fn from_raw(raw: *const RawPluginDescriptor) -> Result<Self, PluginError> {
        if raw.is_null() {
            return Err(PluginError::InvalidDescriptor(
                "descriptor pointer is null".to_string(),
            ));
        }
        let desc = unsafe { &*raw };

        let name = unsafe { required_str(desc.name, "plugin name")? };
        let description = unsafe { optional_str(desc.description) };

        let raw_modules = unsafe {
            raw_slice(
                desc.module_descriptors,
                desc.module_count,
                "module descriptor array",
            )?
        };
        let mut modules = Vec::with_capacity(desc.module_count);
        for raw_module in raw_modules {
            modules.push(ModuleDescriptor {
                name: unsafe { required_str(raw_module.name, "module name")? },
                description: unsafe { optional_str(raw_module.description) },
                raw: raw_module as *const RawModuleDescriptor,
                create: raw_module.create,
            });
        }

        let raw_components = unsafe {
            raw_slice(
                desc.component_descriptors,
                desc.component_count,
                "component descriptor array",
            )?
        };
        let mut components = Vec::with_capacity(desc.component_count);
        for raw_component in raw_components {
            components.push(ComponentDescriptor {
                name: unsafe { required_str(raw_component.name, "component name")? },
                description: unsafe { optional_str(raw_component.description) },
                raw: raw_component as *const RawComponentDescriptor,
                create: raw_component.create,
            });
        }

        Ok(Self {
            name,
            description,
            api_version: desc.api_version,
            version: PluginVersion {
                major: desc.version.major,
                minor: desc.version.minor,
                patch: desc.version.patch,
                build: desc.version.build,
            },
            modules,
            components,
            raw,
            add_options: desc.add_options,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn api_version(&self) -> u32 {
        self.api_version
    }

    pub fn version(&self) -> PluginVersion {
        self.version
    }

    pub fn modules(&self) -> &[ModuleDescriptor] {
        &self.modules
    }

    pub fn components(&self) -> &[ComponentDescriptor] {
        &self.components
    }

    /// Whether the plugin supplied an option-registration hook.
    pub fn has_options_hook(&self) -> bool {
        self.add_options.is_some()
    }

    /// Invoke the plugin's option-registration hook, if any.
    ///
    /// # Safety
    /// `registry` must be whatever opaque option-registry pointer the host
    /// and the plugin agreed on, and the owning code object must still be
    /// mapped.
    pub unsafe fn add_options(&self, registry: *mut c_void) {
        if let Some(add_options) = self.add_options {
            if !self.raw.is_null() {
                unsafe { add_options(self.raw, registry) };
            }
        }
    }
}

/// Read a required NUL-terminated string field.
unsafe fn required_str(ptr: *const c_char, what: &str) -> Result<String, PluginError> {
    if ptr.is_null() {
        return Err(PluginError::InvalidDescriptor(format!("{what} is null")));
    }
    Ok(unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned())
}

/// Read an optional NUL-terminated string field.
unsafe fn optional_str(ptr: *const c_char) -> String {
    if ptr.is_null() {
        String::new()
    } else {
        unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned()
    }
}

/// View a (pointer, count) pair as a slice, rejecting null with non-zero
/// count.
unsafe fn raw_slice<'a, T>(
    ptr: *const T,
    count: usize,
    what: &str,
) -> Result<&'a [T], PluginError> {
    if count == 0 {
        return Ok(&[]);
    }
    if ptr.is_null() {
        return Err(PluginError::InvalidDescriptor(format!(
            "{what} is null with count {count}"
        )));
    }
    Ok(unsafe { std::slice::from_raw_parts(ptr, count) })
}
