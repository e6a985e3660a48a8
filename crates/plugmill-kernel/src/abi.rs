//! Raw plugin ABI
//!
//! The bit-exact layout shared across the host/plugin boundary. Every
//! struct here is `#[repr(C)]`, owned by the plugin binary, and immutable
//! once the accessor symbol has returned it. Pointers stay valid for as
//! long as the code object remains mapped.

use std::ffi::{c_char, c_void};

/// API version compiled into this host.
///
/// A plugin whose descriptor carries a different value is rejected at
/// load time; there is no compatibility window.
pub const CURRENT_API_VERSION: u32 = 1;

/// Name of the exported descriptor accessor symbol.
pub const DESCRIPTOR_SYMBOL: &[u8] = b"plugmill_plugin_descriptor\0";

/// Signature of the exported descriptor accessor.
pub type DescriptorAccessorFn = unsafe extern "C" fn() -> *const RawPluginDescriptor;

/// Factory producing a module instance from its descriptor.
///
/// The returned pointer is an opaque runtime instance owned by the
/// caller; the descriptor is stateless and may be instantiated any
/// number of times.
pub type ModuleCreateFn = unsafe extern "C" fn(*const RawModuleDescriptor) -> *mut c_void;

/// Factory producing a component instance from its descriptor.
pub type ComponentCreateFn = unsafe extern "C" fn(*const RawComponentDescriptor) -> *mut c_void;

/// Hook through which a plugin registers program options with the host's
/// argument parser. The second argument is the host's opaque option
/// registry; argument parsing itself is outside this crate.
pub type AddOptionsFn = unsafe extern "C" fn(*const RawPluginDescriptor, *mut c_void);

/// Four-part plugin version as carried over the ABI.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawPluginVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
    pub build: u32,
}

/// Module descriptor as exported by a plugin.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct RawModuleDescriptor {
    /// NUL-terminated module name. Must not be null.
    pub name: *const c_char,
    /// NUL-terminated description. May be null.
    pub description: *const c_char,
    /// Instance factory. May be null for descriptor-only modules.
    pub create: Option<ModuleCreateFn>,
}

/// Component descriptor as exported by a plugin.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct RawComponentDescriptor {
    /// NUL-terminated component name. Must not be null.
    pub name: *const c_char,
    /// NUL-terminated description. May be null.
    pub description: *const c_char,
    /// Instance factory. May be null for descriptor-only components.
    pub create: Option<ComponentCreateFn>,
}

/// Top-level plugin descriptor returned by the accessor symbol.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct RawPluginDescriptor {
    /// NUL-terminated plugin name. Must not be null.
    pub name: *const c_char,
    /// NUL-terminated description. May be null.
    pub description: *const c_char,
    /// Must equal [`CURRENT_API_VERSION`] of the host.
    pub api_version: u32,
    pub version: RawPluginVersion,
    pub module_count: usize,
    /// Array of `module_count` module descriptors. May be null only when
    /// `module_count` is zero.
    pub module_descriptors: *const RawModuleDescriptor,
    pub component_count: usize,
    /// Array of `component_count` component descriptors. May be null only
    /// when `component_count` is zero.
    pub component_descriptors: *const RawComponentDescriptor,
    /// Optional option-registration hook.
    pub add_options: Option<AddOptionsFn>,
}

// Safety: descriptors are published once and never mutated; the pointers
// they carry reference static data inside the plugin binary.
unsafe impl Sync for RawModuleDescriptor {}
unsafe impl Send for RawModuleDescriptor {}
unsafe impl Sync for RawComponentDescriptor {}
unsafe impl Send for RawComponentDescriptor {}
unsafe impl Sync for RawPluginDescriptor {}
unsafe impl Send for RawPluginDescriptor {}

/// Emit the descriptor accessor a Plugmill host looks for.
///
/// Use from a `cdylib` plugin crate with a `static` descriptor:
///
/// ```ignore
/// static DESCRIPTOR: RawPluginDescriptor = RawPluginDescriptor { /* ... */ };
/// plugmill_kernel::declare_plugin!(&DESCRIPTOR);
/// ```
#[macro_export]
macro_rules! declare_plugin {
    ($descriptor:expr) => {
        #[unsafe(no_mangle)]
        pub unsafe extern "C" fn plugmill_plugin_descriptor()
        -> *const $crate::abi::RawPluginDescriptor {
            $descriptor
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_symbol_is_nul_terminated() {
        assert_eq!(DESCRIPTOR_SYMBOL.last(), Some(&0u8));
    }

    #[test]
    fn raw_version_is_four_words() {
        assert_eq!(
            std::mem::size_of::<RawPluginVersion>(),
            4 * std::mem::size_of::<u32>()
        );
    }
}
