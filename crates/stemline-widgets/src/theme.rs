//! Shared theme constants for the timeline
//!
//! Default palette only; track colors come from the registry.

use iced::Color;
use stemline_core::TrackColor;

/// Canvas background
pub const BACKGROUND: Color = Color::from_rgb(0.1, 0.1, 0.12);

/// Ruler strip background
pub const RULER_BACKGROUND: Color = Color::from_rgb(0.14, 0.14, 0.17);

/// Alternating lane backgrounds
pub const LANE_BACKGROUNDS: [Color; 2] = [
    Color::from_rgb(0.12, 0.12, 0.14),
    Color::from_rgb(0.13, 0.13, 0.155),
];

/// Grid line colors (bar, beat, half-beat)
pub const BAR_LINE: Color = Color::from_rgba(0.75, 0.75, 0.8, 0.55);
pub const BEAT_LINE: Color = Color::from_rgba(0.45, 0.45, 0.5, 0.35);
pub const HALF_LINE: Color = Color::from_rgba(0.4, 0.4, 0.45, 0.25);

/// Bar number labels in the ruler
pub const LABEL: Color = Color::from_rgb(0.7, 0.7, 0.8);

pub const PLAYHEAD: Color = Color::from_rgb(1.0, 1.0, 1.0);

/// Marker drawn on lanes whose source sits out the current pass
pub const EXCLUDED_MARKER: Color = Color::from_rgb(0.85, 0.25, 0.25);

/// Meter colors: normal, hot (> -6 dBFS), clipping (>= 0 dBFS)
pub const METER_COLORS: [Color; 3] = [
    Color::from_rgb(0.2, 0.8, 0.4),
    Color::from_rgb(1.0, 0.75, 0.0),
    Color::from_rgb(1.0, 0.25, 0.25),
];
pub const METER_BACKGROUND: Color = Color::from_rgb(0.06, 0.06, 0.07);

/// Waveform opacity for audible tracks
pub const WAVEFORM_ALPHA: f32 = 0.9;
/// Extra opacity factor for placeholder waveforms
pub const PLACEHOLDER_ALPHA: f32 = 0.4;
/// Extra opacity factor for muted / solo-silenced tracks
pub const SILENCED_ALPHA: f32 = 0.3;

/// Registry track color as an iced color
pub fn track_color(color: TrackColor) -> Color {
    Color::from_rgb8(color.r, color.g, color.b)
}

/// Meter fill color for a peak value
pub fn meter_color(peak: f32) -> Color {
    if peak >= 1.0 {
        METER_COLORS[2]
    } else if peak > 0.5 {
        METER_COLORS[1]
    } else {
        METER_COLORS[0]
    }
}
