//! Timeline draw-command generation
//!
//! [`render`] turns a registry/transport/zoom snapshot into a flat list of
//! [`DrawCommand`]s in painter's order. It owns no state and touches no
//! renderer, so the canvas program just replays the list into a frame.
//!
//! Layers, back to front: background, ruler, grid lines, lanes with
//! waveforms, meters, bar labels, playhead.

use iced::{Color, Point, Size};
use stemline_core::grid::TickKind;
use stemline_core::meter::LevelMeter;
use stemline_core::registry::{Track, TrackRegistry};
use stemline_core::transport::TransportState;

use super::state::{TimelineLayout, ZoomState};
use crate::theme;

/// One primitive for the canvas to draw
#[derive(Debug, Clone, PartialEq)]
pub enum DrawCommand {
    Rect {
        origin: Point,
        size: Size,
        color: Color,
    },
    Line {
        from: Point,
        to: Point,
        width: f32,
        color: Color,
    },
    Text {
        position: Point,
        content: String,
        size: f32,
        color: Color,
    },
}

/// Snapshot the renderer reads
pub struct TimelineInput<'a> {
    pub registry: &'a TrackRegistry,
    pub transport: &'a TransportState,
    pub zoom: &'a ZoomState,
    pub meter: Option<&'a LevelMeter>,
    pub layout: TimelineLayout,
    /// Canvas size in pixels
    pub viewport: Size,
}

/// Build the draw list for one frame
pub fn render(input: &TimelineInput<'_>) -> Vec<DrawCommand> {
    let mut commands = Vec::new();
    let Size { width, height } = input.viewport;
    if width <= 0.0 || height <= 0.0 {
        return commands;
    }

    commands.push(rect(0.0, 0.0, width, height, theme::BACKGROUND));
    commands.push(rect(0.0, 0.0, width, input.layout.ruler_height, theme::RULER_BACKGROUND));

    for (index, _) in input.registry.iter().enumerate() {
        let top = input.layout.lane_top(index);
        let background = theme::LANE_BACKGROUNDS[index % theme::LANE_BACKGROUNDS.len()];
        commands.push(rect(0.0, top, width, input.layout.lane_height, background));
    }

    let labels = render_grid(input, &mut commands);

    for (index, track) in input.registry.iter().enumerate() {
        render_lane(input, index, track, &mut commands);
    }

    commands.extend(labels);
    render_playhead(input, &mut commands);
    commands
}

fn rect(x: f32, y: f32, w: f32, h: f32, color: Color) -> DrawCommand {
    DrawCommand::Rect {
        origin: Point::new(x, y),
        size: Size::new(w, h),
        color,
    }
}

fn line(from: Point, to: Point, width: f32, color: Color) -> DrawCommand {
    DrawCommand::Line {
        from,
        to,
        width,
        color,
    }
}

/// Grid lines go straight into `commands`; bar labels are returned so they
/// can be drawn above the lanes
fn render_grid(input: &TimelineInput<'_>, commands: &mut Vec<DrawCommand>) -> Vec<DrawCommand> {
    let layout = &input.layout;
    let Size { width, height } = input.viewport;
    let pixels_per_second = input.zoom.pixels_per_second();
    let grid = input.transport.grid(pixels_per_second);
    let (_, visible_end) = input.zoom.visible_range(width as f64);

    let half_beat_px = grid.seconds_per_beat() / 2.0 * pixels_per_second;
    let draw_halves = half_beat_px >= layout.min_tick_px as f64;
    let stride = grid.label_stride(layout.min_label_px as f64).max(1);

    let ruler = layout.ruler_height;
    let mut labels = Vec::new();

    for tick in grid.ticks(visible_end) {
        let x = (tick.position_px - input.zoom.scroll_offset_px()) as f32;
        if x < 0.0 {
            continue;
        }
        match tick.kind {
            TickKind::Bar => {
                commands.push(line(Point::new(x, 0.0), Point::new(x, height), 1.0, theme::BAR_LINE));
                if let Some(bar) = tick.bar_number {
                    if (bar - 1) % stride == 0 {
                        labels.push(DrawCommand::Text {
                            position: Point::new(x + 3.0, 2.0),
                            content: bar.to_string(),
                            size: layout.label_size,
                            color: theme::LABEL,
                        });
                    }
                }
            }
            TickKind::Beat => {
                commands.push(line(
                    Point::new(x, ruler * 0.5),
                    Point::new(x, height),
                    1.0,
                    theme::BEAT_LINE,
                ));
            }
            TickKind::Half if draw_halves => {
                commands.push(line(
                    Point::new(x, ruler * 0.75),
                    Point::new(x, ruler),
                    1.0,
                    theme::HALF_LINE,
                ));
            }
            TickKind::Half => {}
        }
    }
    labels
}

/// Seconds a lane's waveform is stretched over
///
/// Placeholder tracks have no duration of their own and borrow the
/// session length, or the visible span when nothing is loaded.
fn lane_span(input: &TimelineInput<'_>, track: &Track) -> f64 {
    if track.duration_sec() > 0.0 {
        return track.duration_sec();
    }
    let session = input.registry.duration_sec();
    if session > 0.0 {
        session
    } else {
        input.zoom.visible_range(input.viewport.width as f64).1
    }
}

fn render_lane(input: &TimelineInput<'_>, index: usize, track: &Track, commands: &mut Vec<DrawCommand>) {
    let layout = &input.layout;
    let width = input.viewport.width;
    let top = layout.lane_top(index);
    let center = top + layout.lane_height / 2.0;
    let max_bar = (layout.lane_height - 2.0 * layout.lane_padding).max(0.0);

    let mut alpha = theme::WAVEFORM_ALPHA;
    if track.is_placeholder() {
        alpha *= theme::PLACEHOLDER_ALPHA;
    }
    if !input.registry.is_audible(track.id()) {
        alpha *= theme::SILENCED_ALPHA;
    }
    let color = Color {
        a: alpha,
        ..theme::track_color(track.color())
    };

    if let Some(waveform) = track.waveform().filter(|w| !w.is_empty()) {
        let span = lane_span(input, track);
        let bucket_sec = span / waveform.len() as f64;
        let bucket_px = (bucket_sec * input.zoom.pixels_per_second()) as f32;

        for (bucket, peak) in waveform.peaks.iter().enumerate() {
            let x = input.zoom.time_to_x(bucket as f64 * bucket_sec) as f32;
            if x + bucket_px < 0.0 {
                continue;
            }
            if x > width {
                break;
            }
            let h = peak.clamp(0.0, 1.0) * max_bar;
            if h > 0.0 {
                commands.push(rect(x, center - h / 2.0, bucket_px.max(1.0), h, color));
            }
        }
    }

    if track.is_excluded() {
        commands.push(rect(0.0, top, 3.0, layout.lane_height, theme::EXCLUDED_MARKER));
    }

    if let Some(meter) = input.meter {
        let level = meter.level(track.id());
        let x = width - layout.meter_width;
        commands.push(rect(x, top, layout.meter_width, layout.lane_height, theme::METER_BACKGROUND));
        if !level.is_silent() {
            let h = level.peak.clamp(0.0, 1.0) * layout.lane_height;
            commands.push(rect(
                x,
                top + layout.lane_height - h,
                layout.meter_width,
                h,
                theme::meter_color(level.peak),
            ));
            let rms_y = top + layout.lane_height * (1.0 - level.rms.clamp(0.0, 1.0));
            commands.push(line(
                Point::new(x, rms_y),
                Point::new(width, rms_y),
                1.0,
                theme::PLAYHEAD,
            ));
        }
    }
}

fn render_playhead(input: &TimelineInput<'_>, commands: &mut Vec<DrawCommand>) {
    let Size { width, height } = input.viewport;
    let x = input.zoom.time_to_x(input.transport.cursor_sec) as f32;
    if (0.0..=width).contains(&x) {
        commands.push(line(Point::new(x, 0.0), Point::new(x, height), 2.0, theme::PLAYHEAD));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stemline_core::meter::LevelSample;
    use stemline_core::registry::{MixParam, NewTrack};
    use stemline_core::source::BufferSource;
    use stemline_core::waveform::Waveform;

    const VIEW: Size = Size::new(800.0, 300.0);

    fn registry_with_two() -> TrackRegistry {
        let mut registry = TrackRegistry::new(4);
        // 4 seconds of audio at 1 kHz
        registry.add_track(
            NewTrack::new("drums")
                .source(Box::new(BufferSource::new(vec![0.5; 4_000].into(), 1_000)))
                .waveform(Waveform {
                    peaks: vec![0.5, 1.0, 0.25, 0.0],
                    placeholder: false,
                }),
        );
        registry.add_track(NewTrack::new("bass").waveform(Waveform::placeholder("bass", 4)));
        registry
    }

    fn input<'a>(
        registry: &'a TrackRegistry,
        transport: &'a TransportState,
        zoom: &'a ZoomState,
        meter: Option<&'a LevelMeter>,
    ) -> TimelineInput<'a> {
        TimelineInput {
            registry,
            transport,
            zoom,
            meter,
            layout: TimelineLayout::default(),
            viewport: VIEW,
        }
    }

    fn rects_with_alpha(commands: &[DrawCommand], alpha: f32) -> Vec<(Point, Size)> {
        commands
            .iter()
            .filter_map(|c| match c {
                DrawCommand::Rect { origin, size, color } if (color.a - alpha).abs() < 1e-6 => {
                    Some((*origin, *size))
                }
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_empty_viewport_draws_nothing() {
        let registry = registry_with_two();
        let transport = TransportState::default();
        let zoom = ZoomState::default();
        let mut input = input(&registry, &transport, &zoom, None);
        input.viewport = Size::new(0.0, 100.0);
        assert!(render(&input).is_empty());
    }

    #[test]
    fn test_waveform_bars_follow_zoom() {
        let registry = registry_with_two();
        let transport = TransportState::default();
        let zoom = ZoomState::default();
        let commands = render(&input(&registry, &transport, &zoom, None));

        // Each bucket spans one second = 100 px; the zero bucket is skipped
        let bars = rects_with_alpha(&commands, theme::WAVEFORM_ALPHA);
        assert_eq!(bars.len(), 3);
        let layout = TimelineLayout::default();
        let max_bar = layout.lane_height - 2.0 * layout.lane_padding;
        assert_eq!(bars[0].0.x, 0.0);
        assert_eq!(bars[1].0.x, 100.0);
        assert_eq!(bars[1].1, Size::new(100.0, max_bar));
        assert_eq!(bars[0].1.height, max_bar * 0.5);
    }

    #[test]
    fn test_placeholder_and_muted_dimmed() {
        let mut registry = registry_with_two();
        let transport = TransportState::default();
        let zoom = ZoomState::default();

        let dimmed = theme::WAVEFORM_ALPHA * theme::PLACEHOLDER_ALPHA;
        let commands = render(&input(&registry, &transport, &zoom, None));
        // Placeholder stretched over the 4 s session, all buckets non-zero
        assert_eq!(rects_with_alpha(&commands, dimmed).len(), 4);

        let drums = registry.ids()[0];
        registry.update_mix(drums, MixParam::Mute(true)).unwrap();
        let commands = render(&input(&registry, &transport, &zoom, None));
        assert!(rects_with_alpha(&commands, theme::WAVEFORM_ALPHA).is_empty());
        assert_eq!(
            rects_with_alpha(&commands, theme::WAVEFORM_ALPHA * theme::SILENCED_ALPHA).len(),
            3
        );
    }

    #[test]
    fn test_ruler_labels_and_playhead() {
        let registry = registry_with_two();
        let transport = TransportState {
            cursor_sec: 2.5,
            ..TransportState::default()
        };
        let zoom = ZoomState::default();
        let commands = render(&input(&registry, &transport, &zoom, None));

        // 120 bpm 4/4: a bar every 2 s = 200 px, label stride 1
        let labels: Vec<(f32, &str)> = commands
            .iter()
            .filter_map(|c| match c {
                DrawCommand::Text {
                    position, content, ..
                } => Some((position.x, content.as_str())),
                _ => None,
            })
            .collect();
        assert_eq!(labels, vec![(3.0, "1"), (203.0, "2"), (403.0, "3"), (603.0, "4"), (803.0, "5")]);

        let playhead = commands.last().unwrap();
        assert_eq!(
            *playhead,
            DrawCommand::Line {
                from: Point::new(250.0, 0.0),
                to: Point::new(250.0, VIEW.height),
                width: 2.0,
                color: theme::PLAYHEAD,
            }
        );
    }

    #[test]
    fn test_scrolled_grid_skips_offscreen_ticks() {
        let registry = TrackRegistry::new(4);
        let transport = TransportState::default();
        let mut zoom = ZoomState::default();
        zoom.scroll_to(250.0, 0.0);
        let commands = render(&input(&registry, &transport, &zoom, None));

        let bar_xs: Vec<f32> = commands
            .iter()
            .filter_map(|c| match c {
                DrawCommand::Line { from, color, .. } if *color == theme::BAR_LINE => Some(from.x),
                _ => None,
            })
            .collect();
        assert_eq!(bar_xs, vec![150.0, 350.0, 550.0, 750.0]);
        // Playhead at 0 s is scrolled out of view
        assert!(!matches!(
            commands.last(),
            Some(DrawCommand::Line { width, .. }) if *width == 2.0
        ));
    }

    #[test]
    fn test_meter_bars() {
        let registry = registry_with_two();
        let drums = registry.ids()[0];
        let transport = TransportState::default();
        let zoom = ZoomState::default();
        let mut meter = LevelMeter::new(0.05, 0.05, 0.5);
        meter.ingest(&registry, drums, LevelSample::new(0.75, 0.5));

        let commands = render(&input(&registry, &transport, &zoom, Some(&meter)));
        let layout = TimelineLayout::default();
        let fill = commands.iter().find_map(|c| match c {
            DrawCommand::Rect { origin, size, color } if *color == theme::meter_color(0.75) => {
                Some((*origin, *size))
            }
            _ => None,
        });
        let (origin, size) = fill.unwrap();
        assert_eq!(origin.x, VIEW.width - layout.meter_width);
        assert_eq!(size.height, 0.75 * layout.lane_height);

        // Silent track gets only the meter background
        let backgrounds = commands
            .iter()
            .filter(|c| matches!(c, DrawCommand::Rect { color, .. } if *color == theme::METER_BACKGROUND))
            .count();
        assert_eq!(backgrounds, 2);
    }
}
