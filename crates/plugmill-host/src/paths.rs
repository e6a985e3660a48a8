//! Default plugin search paths.

use std::ffi::OsStr;
use std::path::PathBuf;

/// Environment variable listing extra plugin directories, separated the
/// platform way (`:` on Unix, `;` on Windows).
pub const PLUGIN_PATH_ENV: &str = "PLUGMILL_PLUGIN_PATH";

/// Directories a host scans for plugins when none are configured
/// explicitly: the entries of [`PLUGIN_PATH_ENV`], then
/// `$HOME/.plugmill/plugin`.
pub fn default_plugin_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    if let Some(env_value) = std::env::var_os(PLUGIN_PATH_ENV) {
        paths.extend(split_env_paths(&env_value));
    }

    if let Some(home) = dirs::home_dir() {
        paths.push(home.join(".plugmill").join("plugin"));
    }

    paths
}

fn split_env_paths(value: &OsStr) -> Vec<PathBuf> {
    std::env::split_paths(value)
        .filter(|path| !path.as_os_str().is_empty())
        .collect()
}
