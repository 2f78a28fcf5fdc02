//! Multi-track timeline
//!
//! - **State** (`ZoomState`, `TimelineLayout`): pure data owned by the app
//! - **Renderer** (`render`): snapshot → [`DrawCommand`] list, no iced state
//! - **Interaction** (`TimelineInteraction`): pointer → [`TimelineMessage`]
//! - **Canvas / view** (`TimelineCanvas`, `timeline_view`): iced glue
//!
//! ## Usage
//!
//! ```ignore
//! fn view(&self) -> Element<Message> {
//!     timeline_view(
//!         self.session.registry(),
//!         self.session.transport_state(),
//!         &self.zoom,
//!         Some(self.session.meter()),
//!         TimelineLayout::default(),
//!         Message::Timeline,
//!     )
//! }
//!
//! // in update:
//! Message::Timeline(msg) => {
//!     if let Some(t) = self.zoom.apply(&msg, self.session.now()) {
//!         self.session.handle(SessionCommand::Seek(t))?;
//!     }
//! }
//!
//! // every frame, after ticking the session:
//! Message::Frame => {
//!     self.session.tick();
//!     self.zoom
//!         .follow_transport(self.session.transport_state(), self.viewport_width, self.session.now());
//! }
//! ```

mod canvas;
mod interaction;
mod render;
mod state;

pub use canvas::TimelineCanvas;
pub use interaction::{seek_target, TimelineInteraction, TimelineMessage, SCROLL_STEP_PX, ZOOM_STEP};
pub use render::{render, DrawCommand, TimelineInput};
pub use state::{TimelineLayout, ZoomState, FOLLOW_LEAD};

use iced::widget::Canvas;
use iced::{Element, Length};
use stemline_core::meter::LevelMeter;
use stemline_core::registry::TrackRegistry;
use stemline_core::transport::TransportState;

/// Create a timeline element with scrub-to-seek, wheel scroll and ctrl-wheel zoom
///
/// The canvas is as tall as the ruler plus one lane per track.
pub fn timeline_view<'a, Message>(
    registry: &'a TrackRegistry,
    transport: &'a TransportState,
    zoom: &'a ZoomState,
    meter: Option<&'a LevelMeter>,
    layout: TimelineLayout,
    on_message: impl Fn(TimelineMessage) -> Message + 'a,
) -> Element<'a, Message>
where
    Message: Clone + 'a,
{
    let height = layout.total_height(registry.len());
    Canvas::new(TimelineCanvas {
        registry,
        transport,
        zoom,
        meter,
        layout,
        on_message,
    })
    .width(Length::Fill)
    .height(Length::Fixed(height))
    .into()
}
