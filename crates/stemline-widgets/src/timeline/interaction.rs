//! Pointer handling for the timeline canvas
//!
//! Pure functions of pointer position and view state, so the canvas
//! program only translates iced events into these calls.

use stemline_core::transport::TransportState;

use super::state::ZoomState;

/// Pixels scrolled per wheel line
pub const SCROLL_STEP_PX: f64 = 40.0;

/// Zoom factor per wheel line (ctrl + wheel)
pub const ZOOM_STEP: f64 = 1.15;

/// Messages published by the timeline canvas
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TimelineMessage {
    /// Move the transport cursor (already snapped when snapping is on)
    Seek(f64),
    /// Pointer released after a press/drag
    ScrubEnded,
    /// New absolute horizontal scroll offset
    Scroll(f64),
    /// New zoom, keeping the time under `anchor_x` in place
    Zoom { pixels_per_second: f64, anchor_x: f64 },
}

/// Canvas-local interaction state
#[derive(Debug, Clone, Copy, Default)]
pub struct TimelineInteraction {
    /// Left button held since a press inside the canvas
    pub is_dragging: bool,
    /// Ctrl (or cmd) currently held
    pub zoom_modifier: bool,
}

impl TimelineInteraction {
    /// Button pressed at viewport x
    pub fn press(&mut self, x: f32, zoom: &ZoomState, transport: &TransportState) -> TimelineMessage {
        self.is_dragging = true;
        TimelineMessage::Seek(seek_target(x, zoom, transport))
    }

    /// Pointer moved; only produces a seek while dragging
    pub fn drag(&self, x: f32, zoom: &ZoomState, transport: &TransportState) -> Option<TimelineMessage> {
        self.is_dragging
            .then(|| TimelineMessage::Seek(seek_target(x, zoom, transport)))
    }

    pub fn release(&mut self) -> Option<TimelineMessage> {
        if self.is_dragging {
            self.is_dragging = false;
            Some(TimelineMessage::ScrubEnded)
        } else {
            None
        }
    }

    /// Wheel moved by `(dx, dy)` lines with the pointer at viewport x
    ///
    /// Ctrl + vertical wheel zooms around the pointer; otherwise the
    /// dominant axis scrolls horizontally.
    pub fn wheel(&self, x: f32, dx: f32, dy: f32, zoom: &ZoomState) -> Option<TimelineMessage> {
        if self.zoom_modifier && dy != 0.0 {
            let pixels_per_second = zoom.pixels_per_second() * ZOOM_STEP.powf(dy as f64);
            return Some(TimelineMessage::Zoom {
                pixels_per_second,
                anchor_x: x as f64,
            });
        }

        let lines = if dx.abs() > dy.abs() { dx } else { -dy };
        if lines == 0.0 {
            return None;
        }
        let offset = (zoom.scroll_offset_px() + lines as f64 * SCROLL_STEP_PX).max(0.0);
        Some(TimelineMessage::Scroll(offset))
    }
}

/// Time under `x`, never negative, snapped to the grid when enabled
pub fn seek_target(x: f32, zoom: &ZoomState, transport: &TransportState) -> f64 {
    transport.snap(zoom.x_to_time(x as f64).max(0.0))
}
