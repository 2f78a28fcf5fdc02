//! YAML configuration I/O
//!
//! Works with any serde type that has a sensible `Default`. Reading never
//! fails: a missing or broken file yields defaults and a log line.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;

/// Load configuration from a YAML file, falling back to `T::default()`
///
/// ```ignore
/// let config: SessionConfig = load_config(Path::new("session.yaml"));
/// ```
pub fn load_config<T>(path: &Path) -> T
where
    T: DeserializeOwned + Default,
{
    log::info!("load_config: reading {:?}", path);

    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            log::info!("load_config: {:?} not found, using defaults", path);
            return T::default();
        }
        Err(e) => {
            log::warn!("load_config: cannot read {:?}: {}, using defaults", path, e);
            return T::default();
        }
    };

    match serde_yaml::from_str::<T>(&contents) {
        Ok(config) => config,
        Err(e) => {
            log::warn!("load_config: invalid YAML in {:?}: {}, using defaults", path, e);
            T::default()
        }
    }
}

/// Load configuration, writing the defaults out first if the file is missing
///
/// Gives users a file to edit on first run.
pub fn load_or_init_config<T>(path: &Path) -> Result<T>
where
    T: DeserializeOwned + Serialize + Default,
{
    if !path.exists() {
        let config = T::default();
        save_config(&config, path)?;
        log::info!("load_or_init_config: wrote default config to {:?}", path);
        return Ok(config);
    }
    Ok(load_config(path))
}

/// Save configuration as YAML, creating parent directories
pub fn save_config<T>(config: &T, path: &Path) -> Result<()>
where
    T: Serialize,
{
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create config directory {:?}", parent))?;
    }

    let yaml = serde_yaml::to_string(config).context("Failed to serialize config")?;
    std::fs::write(path, yaml).with_context(|| format!("Failed to write {:?}", path))?;

    log::info!("save_config: wrote {:?}", path);
    Ok(())
}
