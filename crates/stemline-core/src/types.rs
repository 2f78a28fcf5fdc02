//! Common types for Stemline
//!
//! Identifiers, musical metadata and the constants shared by the transport,
//! grid and waveform modules.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of buckets in every summarized waveform
///
/// All tracks share the same length so bucket index maps to the same
/// fraction of the lane width regardless of track.
pub const WAVEFORM_BUCKETS: usize = 200;

/// Minimum tempo accepted by the transport
pub const MIN_BPM: f64 = 30.0;

/// Maximum tempo accepted by the transport
pub const MAX_BPM: f64 = 300.0;

/// Default session tempo
pub const DEFAULT_BPM: f64 = 120.0;

/// Stable track identifier, unique within a registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackId(pub u64);

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "track#{}", self.0)
    }
}

/// Musical time signature (e.g. 4/4, 6/8)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSignature {
    /// Beats in one bar (numerator)
    pub beats_per_bar: u32,
    /// Note value that gets one beat (denominator)
    pub beat_unit: u32,
}

impl TimeSignature {
    /// Create a time signature, raising zero components to 1
    pub fn new(beats_per_bar: u32, beat_unit: u32) -> Self {
        Self {
            beats_per_bar: beats_per_bar.max(1),
            beat_unit: beat_unit.max(1),
        }
    }
}

impl Default for TimeSignature {
    fn default() -> Self {
        Self::new(4, 4)
    }
}

impl fmt::Display for TimeSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.beats_per_bar, self.beat_unit)
    }
}

/// Display colour of a track lane (sRGB, 0-255 per channel)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl TrackColor {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Lane palette cycled through as tracks are added
    pub const PALETTE: [TrackColor; 6] = [
        TrackColor::rgb(0x2D, 0x8C, 0xF0), // blue
        TrackColor::rgb(0xE8, 0x5D, 0x3A), // orange
        TrackColor::rgb(0x3A, 0xC7, 0x7E), // green
        TrackColor::rgb(0xC0, 0x5C, 0xE0), // violet
        TrackColor::rgb(0xE8, 0xC1, 0x3A), // amber
        TrackColor::rgb(0x3A, 0xC4, 0xC7), // teal
    ];

    /// Palette colour for the n-th added track
    pub fn for_index(index: usize) -> Self {
        Self::PALETTE[index % Self::PALETTE.len()]
    }
}

/// Transport play state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayState {
    /// At rest, cursor reset to zero
    #[default]
    Stopped,
    /// Cursor advancing, sources running
    Playing,
    /// Cursor held, sources stopped
    Paused,
}

impl PlayState {
    pub fn is_playing(self) -> bool {
        matches!(self, PlayState::Playing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_signature_rejects_zero() {
        let sig = TimeSignature::new(0, 0);
        assert_eq!(sig.beats_per_bar, 1);
        assert_eq!(sig.beat_unit, 1);
        assert_eq!(TimeSignature::default().to_string(), "4/4");
    }

    #[test]
    fn test_palette_cycles() {
        assert_eq!(TrackColor::for_index(0), TrackColor::for_index(6));
        assert_ne!(TrackColor::for_index(0), TrackColor::for_index(1));
    }
}
