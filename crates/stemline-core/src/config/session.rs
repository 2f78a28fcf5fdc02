//! Tunables for one editing session

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::types::{TimeSignature, DEFAULT_BPM, WAVEFORM_BUCKETS};

/// Top-level session configuration
///
/// Every section is `#[serde(default)]`, so a config file only needs the
/// keys it wants to change.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub waveform: WaveformConfig,
    pub transport: TransportConfig,
    pub meter: MeterConfig,
    pub zoom: ZoomConfig,
    pub updates: UpdatesConfig,
    pub remote: RemoteConfig,
}

/// Waveform summarization settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WaveformConfig {
    /// Buckets per summarized waveform (shared by all tracks)
    pub buckets: usize,
}

impl Default for WaveformConfig {
    fn default() -> Self {
        Self {
            buckets: WAVEFORM_BUCKETS,
        }
    }
}

/// Transport clock settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Lead time between `play()` and the shared start deadline
    pub start_latency_ms: u64,
    /// Largest tolerated gap between a source and the published cursor
    /// before that source is resynchronized
    pub max_drift_ms: u64,
    /// Tempo of a fresh session
    pub tempo_bpm: f64,
    pub time_signature: TimeSignature,
    pub snap_enabled: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            start_latency_ms: 25,
            max_drift_ms: 30,
            tempo_bpm: DEFAULT_BPM,
            time_signature: TimeSignature::default(),
            snap_enabled: true,
        }
    }
}

impl TransportConfig {
    pub fn start_latency(&self) -> Duration {
        Duration::from_millis(self.start_latency_ms)
    }

    pub fn max_drift(&self) -> Duration {
        Duration::from_millis(self.max_drift_ms)
    }
}

/// Level meter settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeterConfig {
    /// Metering tick period
    pub interval_ms: u64,
    /// Length of audio inspected for each reading
    pub window_ms: u64,
    /// Per-tick multiplier applied to held levels when no signal is available
    pub decay: f32,
}

impl Default for MeterConfig {
    fn default() -> Self {
        Self {
            interval_ms: 50,
            window_ms: 50,
            decay: 0.6,
        }
    }
}

impl MeterConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

/// Timeline zoom limits, in pixels per second
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ZoomConfig {
    pub min_pixels_per_second: f64,
    pub max_pixels_per_second: f64,
    pub default_pixels_per_second: f64,
    /// How long a manual scroll suppresses playhead following
    pub manual_scroll_hold_ms: u64,
}

impl Default for ZoomConfig {
    fn default() -> Self {
        Self {
            min_pixels_per_second: 10.0,
            max_pixels_per_second: 1000.0,
            default_pixels_per_second: 100.0,
            manual_scroll_hold_ms: 1500,
        }
    }
}

/// Real-time update channel settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdatesConfig {
    /// Try the push channel before falling back to polling
    pub prefer_push: bool,
    /// Polling period once the push channel has failed
    pub poll_interval_ms: u64,
}

impl Default for UpdatesConfig {
    fn default() -> Self {
        Self {
            prefer_push: true,
            poll_interval_ms: 1000,
        }
    }
}

impl UpdatesConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Remote job service endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Base URL of the REST API, without trailing slash
    pub api_base_url: String,
    /// Project the session's jobs and comments belong to
    pub project_id: String,
    pub timeout_secs: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://127.0.0.1:8000/api".to_string(),
            project_id: "default".to_string(),
            timeout_secs: 30,
        }
    }
}

impl RemoteConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
