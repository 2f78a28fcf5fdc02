//! Stemline Core - transport, waveform and mixer engine for multi-stem sessions

pub mod config;
pub mod error;
pub mod grid;
pub mod loader;
pub mod meter;
pub mod registry;
pub mod remote;
pub mod session;
pub mod source;
pub mod transport;
pub mod types;
pub mod updates;
pub mod waveform;

pub use types::*;
