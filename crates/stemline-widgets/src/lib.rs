//! Stemline widgets - iced timeline for multi-stem sessions
//!
//! Follows the iced 0.14 split used across our UI code: plain state structs,
//! view functions taking state plus a message mapper, and canvas programs
//! that only translate events and replay drawing.
//!
//! The draw list is produced by [`timeline::render`] without touching iced's
//! renderer, so it can be tested (and reused) headless.

pub mod theme;
pub mod timeline;

pub use timeline::{
    render, timeline_view, DrawCommand, TimelineCanvas, TimelineInput, TimelineInteraction,
    TimelineLayout, TimelineMessage, ZoomState,
};
