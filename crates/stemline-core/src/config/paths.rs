//! Standard locations for stemline configuration files

use std::path::PathBuf;

/// Directory holding stemline config files
///
/// Returns `<platform config dir>/stemline`, or `./stemline` when the
/// platform has no config dir.
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("stemline")
}

/// Path of a named config file inside [`default_config_dir`]
pub fn default_config_path(filename: &str) -> PathBuf {
    default_config_dir().join(filename)
}
