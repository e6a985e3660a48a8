//! plugmill-kernel: the contract between a Plugmill host and its plugins.
//!
//! A plugin is a native shared library that exports a single accessor
//! symbol returning a pointer to a [`abi::RawPluginDescriptor`]. This crate
//! defines that ABI, the owned host-side view of it
//! ([`descriptor::PluginDescriptor`]), the typed error hierarchy, and the
//! [`loadable::UnitLoader`] capability through which the host opens native
//! code objects. The registry and hot-reload machinery live in
//! `plugmill-host`; plugin authors only need this crate and the
//! [`declare_plugin!`] macro.

pub mod abi;
pub mod descriptor;
pub mod error;
pub mod loadable;

pub use abi::{CURRENT_API_VERSION, DESCRIPTOR_SYMBOL, RawPluginDescriptor};
pub use descriptor::{ComponentDescriptor, ModuleDescriptor, PluginDescriptor, PluginVersion};
pub use error::PluginError;
pub use loadable::{LoadedUnit, UnitLoader};

/// Plugin operation result type using the typed [`PluginError`].
pub type PluginResult<T> = Result<T, PluginError>;
