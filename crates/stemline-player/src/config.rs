//! Player configuration for stemline-player
//!
//! Stored as YAML in the user's config directory.
//! Default location: ~/.config/stemline/player.yaml

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use stemline_core::config::{default_config_path as core_config_path, SessionConfig};
use stemline_core::loader::StemManifest;

/// Stem types looked for when a directory is given instead of a manifest
pub const DEFAULT_STEMS: [&str; 4] = ["vocals", "drums", "bass", "other"];

/// File extensions tried for each stem, most preferred first
pub const DEFAULT_EXTENSIONS: [&str; 3] = ["flac", "wav", "mp3"];

/// Root configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Engine settings shared with every stemline front end
    pub session: SessionConfig,
    /// YAML stem manifest to open
    pub manifest_path: Option<PathBuf>,
    /// Directory of `<stem>.<ext>` files, used when no manifest is set
    pub stem_dir: Option<PathBuf>,
    /// Playback length before stopping; 0 plays to the end
    pub run_seconds: f64,
    /// Cooperative tick period
    pub tick_ms: u64,
    /// How often cursor and meters are logged
    pub report_ms: u64,
    /// Poll the remote status endpoints for levels and CPU load
    pub remote_status: bool,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            session: SessionConfig::default(),
            manifest_path: None,
            stem_dir: None,
            run_seconds: 0.0,
            tick_ms: 16,
            report_ms: 1000,
            remote_status: false,
        }
    }
}

impl PlayerConfig {
    /// Manifest from `manifest_path`, or one derived from `stem_dir`
    pub fn manifest(&self) -> Result<StemManifest> {
        if let Some(path) = &self.manifest_path {
            return load_manifest(path);
        }
        if let Some(dir) = &self.stem_dir {
            return Ok(StemManifest::from_layout(dir, &DEFAULT_STEMS, &DEFAULT_EXTENSIONS));
        }
        anyhow::bail!("No stems to play: set manifest_path or stem_dir (or pass --manifest / --stems)")
    }

    /// Directory relative stem locators are resolved against
    pub fn base_dir(&self) -> Option<PathBuf> {
        self.manifest_path
            .as_ref()
            .and_then(|p| p.parent().map(Path::to_path_buf))
            .or_else(|| self.stem_dir.clone())
    }
}

/// Read a stem manifest
pub fn load_manifest(path: &Path) -> Result<StemManifest> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read manifest {:?}", path))?;
    let manifest: StemManifest = serde_yaml::from_str(&contents)
        .with_context(|| format!("Invalid manifest {:?}", path))?;
    log::info!("Manifest {:?}: {} stems", path, manifest.len());
    Ok(manifest)
}

/// Get the default config file path
///
/// Returns: ~/.config/stemline/player.yaml
pub fn default_config_path() -> PathBuf {
    core_config_path("player.yaml")
}
