//! Loadable-unit capability
//!
//! The registry never touches the platform loader directly; it goes
//! through these traits so tests can substitute in-memory units and so a
//! host can swap the loading mechanism without touching registry logic.

use std::path::Path;
use std::sync::Arc;

use crate::descriptor::PluginDescriptor;
use crate::error::PluginError;

/// An opened native code object.
///
/// The unit stays mapped for as long as any `Arc<dyn LoadedUnit>` clone is
/// alive; dropping the last handle closes it. Descriptors obtained from a
/// unit are only valid while such a handle exists.
pub trait LoadedUnit: Send + Sync {
    /// Path the unit was opened from.
    fn path(&self) -> &Path;

    /// Resolve the exported descriptor accessor and copy the descriptor
    /// out.
    ///
    /// Fails with [`PluginError::SymbolNotFound`] when the accessor symbol
    /// is absent and [`PluginError::InvalidDescriptor`] when the returned
    /// descriptor is null or malformed.
    fn descriptor(&self) -> Result<PluginDescriptor, PluginError>;
}

/// Opens native code objects from the file system.
pub trait UnitLoader: Send + Sync {
    /// Open the code object at `path`.
    ///
    /// Failure is recoverable; it must never abort the process.
    fn open(&self, path: &Path) -> Result<Arc<dyn LoadedUnit>, PluginError>;
}
