//! Session configuration
//!
//! - Generic YAML load/save used by every stemline binary
//! - [`SessionConfig`], the tunables of the transport, meter, renderer and
//!   update channel
//! - Default config locations
//!
//! # Usage
//!
//! ```ignore
//! use stemline_core::config::{load_config, default_config_path, SessionConfig};
//!
//! let config: SessionConfig = load_config(&default_config_path("session.yaml"));
//! ```

mod io;
mod paths;
mod session;

pub use io::{load_config, load_or_init_config, save_config};
pub use paths::{default_config_dir, default_config_path};
pub use session::{
    MeterConfig, RemoteConfig, SessionConfig, TransportConfig, UpdatesConfig, WaveformConfig,
    ZoomConfig,
};
