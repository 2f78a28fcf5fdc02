//! Bar/beat grid and snapping
//!
//! Everything here is derived from `{tempo, time signature, zoom}` alone, so a
//! tempo or zoom change produces a consistent new grid on the very next read.
//!
//! Ticks are laid out at half-beat resolution. A tick's time is computed as
//! `index * half_beat` rather than by accumulation, and bar starts are
//! detected by distance to the nearest bar multiple, which keeps long spans
//! free of floating-point drift.

use crate::types::TimeSignature;

/// Tolerance (seconds) when testing whether a tick lands on a bar or beat
pub const BAR_EPSILON: f64 = 1e-6;

/// Subdivisions per beat used for ticks and snapping
pub const SUBDIVISIONS_PER_BEAT: u32 = 2;

/// Seconds per beat at `tempo_bpm`
#[inline]
pub fn seconds_per_beat(tempo_bpm: f64) -> f64 {
    60.0 / tempo_bpm
}

/// Seconds per bar at `tempo_bpm`
#[inline]
pub fn seconds_per_bar(tempo_bpm: f64, signature: TimeSignature) -> f64 {
    seconds_per_beat(tempo_bpm) * signature.beats_per_bar as f64
}

/// Kind of grid line a tick represents
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickKind {
    /// First beat of a bar
    Bar,
    /// Any other beat
    Beat,
    /// Off-beat half subdivision
    Half,
}

/// One ruler tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tick {
    pub time_sec: f64,
    /// Unscrolled pixel position (`time_sec * pixels_per_second`)
    pub position_px: f64,
    pub kind: TickKind,
    /// 1-based bar number, present on bar starts only
    pub bar_number: Option<u32>,
}

impl Tick {
    pub fn is_bar_start(&self) -> bool {
        self.kind == TickKind::Bar
    }
}

/// Lazy iterator over the ticks of `[0, span]`
#[derive(Debug, Clone)]
pub struct Ticks {
    step: f64,
    seconds_per_beat: f64,
    seconds_per_bar: f64,
    pixels_per_second: f64,
    index: u64,
    count: u64,
}

impl Ticks {
    fn empty() -> Self {
        Self {
            step: 0.0,
            seconds_per_beat: 0.0,
            seconds_per_bar: 0.0,
            pixels_per_second: 0.0,
            index: 0,
            count: 0,
        }
    }
}

impl Iterator for Ticks {
    type Item = Tick;

    fn next(&mut self) -> Option<Tick> {
        if self.index >= self.count {
            return None;
        }
        let time_sec = self.index as f64 * self.step;
        self.index += 1;

        let bar_index = (time_sec / self.seconds_per_bar).round();
        let kind = if (time_sec - bar_index * self.seconds_per_bar).abs() < BAR_EPSILON {
            TickKind::Bar
        } else {
            let beat_index = (time_sec / self.seconds_per_beat).round();
            if (time_sec - beat_index * self.seconds_per_beat).abs() < BAR_EPSILON {
                TickKind::Beat
            } else {
                TickKind::Half
            }
        };

        Some(Tick {
            time_sec,
            position_px: time_sec * self.pixels_per_second,
            kind,
            bar_number: (kind == TickKind::Bar).then(|| bar_index as u32 + 1),
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.count.saturating_sub(self.index) as usize;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Ticks {}

/// Ticks covering `[0, span_sec]` at half-beat spacing
///
/// Yields nothing for a non-positive or non-finite tempo or span.
pub fn ticks(
    span_sec: f64,
    tempo_bpm: f64,
    signature: TimeSignature,
    pixels_per_second: f64,
) -> Ticks {
    if !(tempo_bpm.is_finite() && tempo_bpm > 0.0 && span_sec.is_finite() && span_sec >= 0.0) {
        return Ticks::empty();
    }

    let beat = seconds_per_beat(tempo_bpm);
    let step = beat / SUBDIVISIONS_PER_BEAT as f64;
    // Include a tick landing exactly on the span end despite rounding
    let count = (span_sec / step + BAR_EPSILON).floor() as u64 + 1;

    Ticks {
        step,
        seconds_per_beat: beat,
        seconds_per_bar: seconds_per_bar(tempo_bpm, signature),
        pixels_per_second,
        index: 0,
        count,
    }
}

/// Quantize `time_sec` to the nearest half-beat when `enabled`
///
/// Identity when disabled or when the tempo is unusable. Never returns a
/// negative time, and `snap(snap(x)) == snap(x)`.
pub fn snap(time_sec: f64, tempo_bpm: f64, enabled: bool) -> f64 {
    if !enabled || !(tempo_bpm.is_finite() && tempo_bpm > 0.0) || !time_sec.is_finite() {
        return time_sec;
    }
    let step = seconds_per_beat(tempo_bpm) / SUBDIVISIONS_PER_BEAT as f64;
    ((time_sec / step).round() * step).max(0.0)
}

/// How many bars apart ruler labels must be so that none overlap
///
/// Returns 1 when every bar has room for `min_label_px`, otherwise the
/// smallest power of two that spaces labels at least that far apart.
pub fn bar_label_stride(seconds_per_bar: f64, pixels_per_second: f64, min_label_px: f64) -> u32 {
    let bar_px = seconds_per_bar * pixels_per_second;
    if !(bar_px.is_finite() && bar_px > 0.0) {
        return 1;
    }
    let mut stride = 1u32;
    while (stride as f64) * bar_px < min_label_px && stride < (1 << 16) {
        stride *= 2;
    }
    stride
}

/// Grid parameters bundled for renderers
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Grid {
    pub tempo_bpm: f64,
    pub signature: TimeSignature,
    pub pixels_per_second: f64,
}

impl Grid {
    pub fn new(tempo_bpm: f64, signature: TimeSignature, pixels_per_second: f64) -> Self {
        Self {
            tempo_bpm,
            signature,
            pixels_per_second,
        }
    }

    pub fn seconds_per_beat(&self) -> f64 {
        seconds_per_beat(self.tempo_bpm)
    }

    pub fn seconds_per_bar(&self) -> f64 {
        seconds_per_bar(self.tempo_bpm, self.signature)
    }

    pub fn ticks(&self, span_sec: f64) -> Ticks {
        ticks(span_sec, self.tempo_bpm, self.signature, self.pixels_per_second)
    }

    pub fn snap(&self, time_sec: f64, enabled: bool) -> f64 {
        snap(time_sec, self.tempo_bpm, enabled)
    }

    pub fn label_stride(&self, min_label_px: f64) -> u32 {
        bar_label_stride(self.seconds_per_bar(), self.pixels_per_second, min_label_px)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ninety_bpm_bar_boundary() {
        let bars: Vec<Tick> = ticks(4.0, 90.0, TimeSignature::new(4, 4), 100.0)
            .filter(Tick::is_bar_start)
            .collect();

        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].time_sec, 0.0);
        assert_eq!(bars[0].bar_number, Some(1));
        assert!((bars[1].time_sec - 60.0 / 90.0 * 4.0).abs() < BAR_EPSILON);
        assert!((bars[1].time_sec - 2.667).abs() < 1e-3);
        assert!((bars[1].position_px - 266.7).abs() < 0.05);
        assert_eq!(bars[1].bar_number, Some(2));
    }

    #[test]
    fn test_span_end_included() {
        // 120 bpm -> half-beat 0.25s, 2s span -> 9 ticks (0.0 ..= 2.0)
        let all: Vec<Tick> = ticks(2.0, 120.0, TimeSignature::default(), 50.0).collect();
        assert_eq!(all.len(), 9);
        assert_eq!(all.last().map(|t| t.time_sec), Some(2.0));
        assert!(all[8].is_bar_start());
    }

    #[test]
    fn test_kinds_alternate() {
        let kinds: Vec<TickKind> = ticks(2.0, 120.0, TimeSignature::new(4, 4), 10.0)
            .map(|t| t.kind)
            .collect();
        assert_eq!(
            &kinds[..5],
            &[
                TickKind::Bar,
                TickKind::Half,
                TickKind::Beat,
                TickKind::Half,
                TickKind::Beat
            ]
        );
    }

    #[test]
    fn test_ticks_increasing_and_bars_on_multiples() {
        let signatures = [
            TimeSignature::new(4, 4),
            TimeSignature::new(3, 4),
            TimeSignature::new(7, 8),
            TimeSignature::new(1, 1),
        ];
        for &tempo in &[30.0, 61.3, 90.0, 128.0, 174.5, 300.0] {
            for &sig in &signatures {
                for &pps in &[10.0, 100.0, 999.0] {
                    let spb = seconds_per_bar(tempo, sig);
                    let all: Vec<Tick> = ticks(600.0, tempo, sig, pps).collect();
                    assert!(!all.is_empty());
                    for pair in all.windows(2) {
                        assert!(pair[1].position_px > pair[0].position_px);
                    }
                    for tick in all.iter().filter(|t| t.is_bar_start()) {
                        let k = (tick.time_sec / spb).round();
                        assert!((tick.time_sec - k * spb).abs() < BAR_EPSILON);
                    }
                    let bar_count = all.iter().filter(|t| t.is_bar_start()).count();
                    assert_eq!(bar_count as u64, (600.0 / spb + BAR_EPSILON).floor() as u64 + 1);
                }
            }
        }
    }

    #[test]
    fn test_invalid_inputs_yield_nothing() {
        let sig = TimeSignature::default();
        assert_eq!(ticks(10.0, 0.0, sig, 100.0).count(), 0);
        assert_eq!(ticks(10.0, f64::NAN, sig, 100.0).count(), 0);
        assert_eq!(ticks(-1.0, 120.0, sig, 100.0).count(), 0);
        assert_eq!(ticks(0.0, 120.0, sig, 100.0).count(), 1);
    }

    #[test]
    fn test_exact_size() {
        let it = ticks(4.0, 90.0, TimeSignature::default(), 100.0);
        assert_eq!(it.len(), 13);
    }

    #[test]
    fn test_snap_nearest_half_beat() {
        // 120 bpm -> 0.25s grid
        assert_eq!(snap(0.3, 120.0, true), 0.25);
        assert_eq!(snap(0.38, 120.0, true), 0.5);
        assert_eq!(snap(-0.3, 120.0, true), 0.0);
    }

    #[test]
    fn test_snap_disabled_is_identity() {
        assert_eq!(snap(1.2345, 120.0, false), 1.2345);
        assert_eq!(snap(-3.0, 120.0, false), -3.0);
    }

    #[test]
    fn test_snap_idempotent() {
        for &tempo in &[37.0, 90.0, 127.9, 140.0, 300.0] {
            let mut x = -2.0;
            while x < 500.0 {
                let once = snap(x, tempo, true);
                assert_eq!(snap(once, tempo, true), once, "tempo {} x {}", tempo, x);
                x += 0.0731;
            }
        }
    }

    #[test]
    fn test_label_stride() {
        // 2s bars at 100 px/s = 200px, plenty of room
        assert_eq!(bar_label_stride(2.0, 100.0, 40.0), 1);
        // 2s bars at 10 px/s = 20px, need 2 bars for 40px
        assert_eq!(bar_label_stride(2.0, 10.0, 40.0), 2);
        // 2s bars at 10 px/s, need 60px -> 4 (power of two)
        assert_eq!(bar_label_stride(2.0, 10.0, 60.0), 4);
    }

    #[test]
    fn test_grid_follows_tempo_change() {
        let mut grid = Grid::new(120.0, TimeSignature::default(), 100.0);
        assert_eq!(grid.seconds_per_bar(), 2.0);
        grid.tempo_bpm = 60.0;
        assert_eq!(grid.seconds_per_bar(), 4.0);
        assert_eq!(grid.ticks(4.0).filter(Tick::is_bar_start).count(), 2);
    }
}
