//! Typed errors for the plugin sub-system.

use thiserror::Error;

/// Errors that can occur while opening a code object or reading its
/// descriptor.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PluginError {
    /// The platform loader refused the file (not found, corrupt, wrong
    /// architecture, ...).
    #[error("Failed to load library: {0}")]
    LibraryLoad(String),

    /// The descriptor accessor symbol is missing from the code object.
    #[error("Symbol not found: {0}")]
    SymbolNotFound(String),

    /// The exported descriptor is null or structurally invalid.
    #[error("Invalid plugin descriptor: {0}")]
    InvalidDescriptor(String),

    /// The plugin was built against a different host API version.
    #[error("API version mismatch: expected {expected}, got {actual}")]
    ApiVersionMismatch { expected: u32, actual: u32 },

    /// An I/O error surfaced during a plugin operation.
    #[error("Plugin I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
}
