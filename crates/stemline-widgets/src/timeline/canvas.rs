//! Canvas Program for the timeline
//!
//! Translates iced events into [`TimelineMessage`]s through
//! [`TimelineInteraction`] and replays [`render`] output into a frame.

use iced::keyboard;
use iced::widget::canvas::{self, Event, Frame, Geometry, Path, Program, Stroke, Text};
use iced::{mouse, Rectangle, Theme};
use stemline_core::meter::LevelMeter;
use stemline_core::registry::TrackRegistry;
use stemline_core::transport::TransportState;

use super::interaction::{TimelineInteraction, TimelineMessage};
use super::render::{render, DrawCommand, TimelineInput};
use super::state::{TimelineLayout, ZoomState};

/// Pixel-delta wheels report this many pixels per line
const PIXELS_PER_LINE: f32 = 50.0;

/// Canvas program drawing ruler, lanes, meters and playhead
///
/// `on_message` maps timeline messages into the application's message type.
pub struct TimelineCanvas<'a, Message, F>
where
    F: Fn(TimelineMessage) -> Message,
{
    pub registry: &'a TrackRegistry,
    pub transport: &'a TransportState,
    pub zoom: &'a ZoomState,
    pub meter: Option<&'a LevelMeter>,
    pub layout: TimelineLayout,
    pub on_message: F,
}

impl<'a, Message, F> Program<Message> for TimelineCanvas<'a, Message, F>
where
    Message: Clone,
    F: Fn(TimelineMessage) -> Message,
{
    type State = TimelineInteraction;

    fn update(
        &self,
        interaction: &mut Self::State,
        event: &Event,
        bounds: Rectangle,
        cursor: mouse::Cursor,
    ) -> Option<canvas::Action<Message>> {
        let message = match event {
            Event::Keyboard(keyboard::Event::ModifiersChanged(modifiers)) => {
                interaction.zoom_modifier = modifiers.command();
                None
            }
            Event::Mouse(mouse::Event::ButtonPressed(mouse::Button::Left)) => cursor
                .position_in(bounds)
                .map(|p| interaction.press(p.x, self.zoom, self.transport)),
            Event::Mouse(mouse::Event::CursorMoved { .. }) => {
                // Drags keep scrubbing when the pointer leaves the canvas
                cursor.position().and_then(|p| {
                    let x = (p.x - bounds.x).clamp(0.0, bounds.width);
                    interaction.drag(x, self.zoom, self.transport)
                })
            }
            Event::Mouse(mouse::Event::ButtonReleased(mouse::Button::Left)) => interaction.release(),
            Event::Mouse(mouse::Event::WheelScrolled { delta }) => {
                let (dx, dy) = match *delta {
                    mouse::ScrollDelta::Lines { x, y } => (x, y),
                    mouse::ScrollDelta::Pixels { x, y } => (x / PIXELS_PER_LINE, y / PIXELS_PER_LINE),
                };
                cursor
                    .position_in(bounds)
                    .and_then(|p| interaction.wheel(p.x, dx, dy, self.zoom))
            }
            _ => None,
        };

        message.map(|m| canvas::Action::publish((self.on_message)(m)))
    }

    fn mouse_interaction(
        &self,
        interaction: &Self::State,
        bounds: Rectangle,
        cursor: mouse::Cursor,
    ) -> mouse::Interaction {
        if interaction.is_dragging {
            mouse::Interaction::Grabbing
        } else if cursor.is_over(bounds) {
            mouse::Interaction::Crosshair
        } else {
            mouse::Interaction::default()
        }
    }

    fn draw(
        &self,
        _interaction: &Self::State,
        renderer: &iced::Renderer,
        _theme: &Theme,
        bounds: Rectangle,
        _cursor: mouse::Cursor,
    ) -> Vec<Geometry> {
        let mut frame = Frame::new(renderer, bounds.size());

        let input = TimelineInput {
            registry: self.registry,
            transport: self.transport,
            zoom: self.zoom,
            meter: self.meter,
            layout: self.layout,
            viewport: bounds.size(),
        };

        for command in render(&input) {
            match command {
                DrawCommand::Rect { origin, size, color } => {
                    frame.fill_rectangle(origin, size, color);
                }
                DrawCommand::Line {
                    from,
                    to,
                    width,
                    color,
                } => {
                    frame.stroke(
                        &Path::line(from, to),
                        Stroke::default().with_color(color).with_width(width),
                    );
                }
                DrawCommand::Text {
                    position,
                    content,
                    size,
                    color,
                } => {
                    frame.fill_text(Text {
                        content,
                        position,
                        size: size.into(),
                        color,
                        ..Text::default()
                    });
                }
            }
        }

        vec![frame.into_geometry()]
    }
}
