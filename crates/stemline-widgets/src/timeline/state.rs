//! Timeline view state (zoom, scroll, lane geometry)
//!
//! Rendering only. Nothing here feeds back into the audio path except the
//! seek targets produced by [`ZoomState::apply`].

use serde::{Deserialize, Serialize};
use stemline_core::config::ZoomConfig;
use stemline_core::transport::TransportState;

use super::interaction::TimelineMessage;

/// Where the playhead lands, as a fraction of the viewport, after the view
/// pages to follow it
pub const FOLLOW_LEAD: f64 = 0.1;

/// Horizontal zoom and scroll position, owned by the application
#[derive(Debug, Clone, PartialEq)]
pub struct ZoomState {
    pixels_per_second: f64,
    scroll_offset_px: f64,
    min_zoom: f64,
    max_zoom: f64,
    /// Seconds a manual scroll suspends playhead following
    manual_scroll_hold: f64,
    last_manual_scroll: Option<f64>,
    scrubbing: bool,
}

impl Default for ZoomState {
    fn default() -> Self {
        Self::from_config(&ZoomConfig::default())
    }
}

impl ZoomState {
    pub fn new(min_zoom: f64, max_zoom: f64, pixels_per_second: f64, manual_scroll_hold: f64) -> Self {
        let min_zoom = min_zoom.max(f64::EPSILON);
        let max_zoom = max_zoom.max(min_zoom);
        Self {
            pixels_per_second: pixels_per_second.clamp(min_zoom, max_zoom),
            scroll_offset_px: 0.0,
            min_zoom,
            max_zoom,
            manual_scroll_hold: manual_scroll_hold.max(0.0),
            last_manual_scroll: None,
            scrubbing: false,
        }
    }

    pub fn from_config(config: &ZoomConfig) -> Self {
        Self::new(
            config.min_pixels_per_second,
            config.max_pixels_per_second,
            config.default_pixels_per_second,
            config.manual_scroll_hold_ms as f64 / 1000.0,
        )
    }

    pub fn pixels_per_second(&self) -> f64 {
        self.pixels_per_second
    }

    pub fn scroll_offset_px(&self) -> f64 {
        self.scroll_offset_px
    }

    pub fn zoom_range(&self) -> (f64, f64) {
        (self.min_zoom, self.max_zoom)
    }

    pub fn is_scrubbing(&self) -> bool {
        self.scrubbing
    }

    /// Viewport x of a timeline position
    #[inline]
    pub fn time_to_x(&self, time_sec: f64) -> f64 {
        time_sec * self.pixels_per_second - self.scroll_offset_px
    }

    /// Timeline position under a viewport x
    #[inline]
    pub fn x_to_time(&self, x: f64) -> f64 {
        (x + self.scroll_offset_px) / self.pixels_per_second
    }

    /// `(start, end)` seconds visible in a viewport `width` pixels wide
    pub fn visible_range(&self, width: f64) -> (f64, f64) {
        (self.x_to_time(0.0), self.x_to_time(width.max(0.0)))
    }

    /// Set the zoom, clamped to the configured range
    pub fn set_zoom(&mut self, pixels_per_second: f64) {
        if pixels_per_second.is_finite() {
            self.pixels_per_second = pixels_per_second.clamp(self.min_zoom, self.max_zoom);
        }
    }

    /// Zoom keeping the time under `anchor_x` fixed on screen
    pub fn zoom_around(&mut self, pixels_per_second: f64, anchor_x: f64, now: f64) {
        let anchor_time = self.x_to_time(anchor_x);
        self.set_zoom(pixels_per_second);
        self.scroll_offset_px = (anchor_time * self.pixels_per_second - anchor_x).max(0.0);
        self.last_manual_scroll = Some(now);
    }

    /// User scroll to an absolute offset
    pub fn scroll_to(&mut self, offset_px: f64, now: f64) {
        if offset_px.is_finite() {
            self.scroll_offset_px = offset_px.max(0.0);
            self.last_manual_scroll = Some(now);
        }
    }

    pub fn begin_scrub(&mut self) {
        self.scrubbing = true;
    }

    pub fn end_scrub(&mut self) {
        self.scrubbing = false;
    }

    /// Page the view so the playhead stays visible
    ///
    /// Deferred while scrubbing or within the hold period after a manual
    /// scroll. Returns true when the scroll offset changed.
    pub fn follow_playhead(&mut self, cursor_sec: f64, viewport_width: f64, now: f64) -> bool {
        if self.scrubbing || viewport_width <= 0.0 {
            return false;
        }
        if let Some(last) = self.last_manual_scroll {
            if now - last < self.manual_scroll_hold {
                return false;
            }
        }

        let x = self.time_to_x(cursor_sec);
        if (0.0..=viewport_width).contains(&x) {
            return false;
        }
        let offset = (cursor_sec * self.pixels_per_second - viewport_width * FOLLOW_LEAD).max(0.0);
        let changed = offset != self.scroll_offset_px;
        self.scroll_offset_px = offset;
        changed
    }

    /// Per-frame follow step for a running transport
    ///
    /// Call once per frame after ticking the session. Does nothing unless
    /// the transport is playing.
    pub fn follow_transport(&mut self, transport: &TransportState, viewport_width: f64, now: f64) -> bool {
        transport.playing() && self.follow_playhead(transport.cursor_sec, viewport_width, now)
    }

    /// Apply a canvas message; returns the seek target for `Seek`
    pub fn apply(&mut self, message: &TimelineMessage, now: f64) -> Option<f64> {
        match *message {
            TimelineMessage::Seek(time_sec) => {
                self.begin_scrub();
                Some(time_sec)
            }
            TimelineMessage::ScrubEnded => {
                self.end_scrub();
                None
            }
            TimelineMessage::Scroll(offset_px) => {
                self.scroll_to(offset_px, now);
                None
            }
            TimelineMessage::Zoom {
                pixels_per_second,
                anchor_x,
            } => {
                self.zoom_around(pixels_per_second, anchor_x, now);
                None
            }
        }
    }
}

/// Lane geometry in pixels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimelineLayout {
    pub ruler_height: f32,
    pub lane_height: f32,
    pub lane_gap: f32,
    /// Vertical padding inside a lane around the waveform
    pub lane_padding: f32,
    /// Width of the level meter at the right edge of each lane
    pub meter_width: f32,
    /// Minimum spacing between bar labels
    pub min_label_px: f32,
    /// Half-beat ticks closer than this are not drawn
    pub min_tick_px: f32,
    pub label_size: f32,
}

impl Default for TimelineLayout {
    fn default() -> Self {
        Self {
            ruler_height: 24.0,
            lane_height: 64.0,
            lane_gap: 2.0,
            lane_padding: 4.0,
            meter_width: 6.0,
            min_label_px: 48.0,
            min_tick_px: 4.0,
            label_size: 11.0,
        }
    }
}

impl TimelineLayout {
    /// Top edge of lane `index`
    pub fn lane_top(&self, index: usize) -> f32 {
        self.ruler_height + index as f32 * (self.lane_height + self.lane_gap)
    }

    /// Canvas height needed for `lanes` lanes
    pub fn total_height(&self, lanes: usize) -> f32 {
        self.lane_top(lanes)
    }

    /// Lane under a y coordinate, if any
    pub fn lane_at(&self, y: f32) -> Option<usize> {
        if y < self.ruler_height {
            return None;
        }
        let offset = y - self.ruler_height;
        let stride = self.lane_height + self.lane_gap;
        let index = (offset / stride) as usize;
        (offset - index as f32 * stride <= self.lane_height).then_some(index)
    }
}
