//! Audio sources and the session clock
//!
//! The transport never touches audio directly. Each track owns a boxed
//! [`AudioSource`] that can be repositioned, started at a deadline on the
//! shared [`Clock`], stopped, and asked for its current position and recent
//! signal level. [`BufferSource`] is the in-memory implementation used for
//! decoded stems; output backends and tests supply their own.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::{PlaybackError, PlaybackResult};
use crate::meter::LevelSample;

// ─────────────────────────────────────────────────────────────────────────────
// Clock
// ─────────────────────────────────────────────────────────────────────────────

/// Monotonic session clock, in seconds since an arbitrary epoch
pub trait Clock: Send + Sync {
    fn now(&self) -> f64;
}

/// Wall clock anchored at construction
#[derive(Debug, Clone)]
pub struct SystemClock {
    epoch: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64()
    }
}

/// Hand-driven clock for deterministic tests and offline rendering
///
/// Clones share the same time, so a test can keep one handle while the
/// session owns another.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    micros: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, by: Duration) {
        self.micros.fetch_add(by.as_micros() as u64, Ordering::SeqCst);
    }

    pub fn set(&self, seconds: f64) {
        self.micros
            .store((seconds.max(0.0) * 1_000_000.0) as u64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f64 {
        self.micros.load(Ordering::SeqCst) as f64 / 1_000_000.0
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// AudioSource
// ─────────────────────────────────────────────────────────────────────────────

/// A track's playable audio
///
/// Times passed in (`deadline`, `now`) are on the session [`Clock`].
/// Positions are seconds into the track.
pub trait AudioSource: Send {
    /// Length of the audio in seconds (0 when unknown)
    fn duration_sec(&self) -> f64;

    /// Reposition a stopped source
    fn seek(&mut self, position_sec: f64) -> PlaybackResult<()>;

    /// Start playback from the current position once the clock reaches `deadline`
    fn start_at(&mut self, deadline: f64) -> PlaybackResult<()>;

    /// Stop playback, keeping the position reached at `now`
    fn stop(&mut self, now: f64);

    fn is_playing(&self) -> bool;

    /// Playback position at `now`
    fn position(&self, now: f64) -> f64;

    /// Effective output gain (already mute/solo resolved)
    fn set_gain(&mut self, gain: f32);

    fn set_pan(&mut self, pan: f32);

    /// Peak and RMS of the `window_sec` seconds of audio preceding the
    /// position at `now`, before gain. `None` while not playing and once
    /// the source has played to its end.
    fn recent_level(&self, now: f64, window_sec: f64) -> PlaybackResult<Option<LevelSample>>;
}

/// Decoded mono audio held in memory
#[derive(Debug, Clone)]
pub struct BufferSource {
    samples: Arc<[f32]>,
    sample_rate: u32,
    /// Position at `anchor_time` (or the resting position when stopped)
    anchor_position: f64,
    anchor_time: f64,
    playing: bool,
    gain: f32,
    pan: f32,
}

impl BufferSource {
    pub fn new(samples: Arc<[f32]>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate: sample_rate.max(1),
            anchor_position: 0.0,
            anchor_time: 0.0,
            playing: false,
            gain: 1.0,
            pan: 0.0,
        }
    }

    pub fn samples(&self) -> &Arc<[f32]> {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn gain(&self) -> f32 {
        self.gain
    }

    pub fn pan(&self) -> f32 {
        self.pan
    }

    /// Equal-power stereo gains for the current gain and pan
    pub fn channel_gains(&self) -> (f32, f32) {
        let angle = (self.pan + 1.0) * std::f32::consts::FRAC_PI_4;
        (self.gain * angle.cos(), self.gain * angle.sin())
    }
}

impl AudioSource for BufferSource {
    fn duration_sec(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }

    fn seek(&mut self, position_sec: f64) -> PlaybackResult<()> {
        if self.playing {
            return Err(PlaybackError::SeekRejected {
                position: position_sec,
                reason: "source is running".to_string(),
            });
        }
        if !position_sec.is_finite() {
            return Err(PlaybackError::SeekRejected {
                position: position_sec,
                reason: "position is not finite".to_string(),
            });
        }
        self.anchor_position = position_sec.clamp(0.0, self.duration_sec());
        Ok(())
    }

    fn start_at(&mut self, deadline: f64) -> PlaybackResult<()> {
        if self.samples.is_empty() {
            return Err(PlaybackError::Empty);
        }
        self.anchor_time = deadline;
        self.playing = true;
        Ok(())
    }

    fn stop(&mut self, now: f64) {
        if self.playing {
            self.anchor_position = self.position(now);
            self.playing = false;
        }
    }

    fn is_playing(&self) -> bool {
        self.playing
    }

    fn position(&self, now: f64) -> f64 {
        if !self.playing {
            return self.anchor_position;
        }
        let elapsed = (now - self.anchor_time).max(0.0);
        (self.anchor_position + elapsed).min(self.duration_sec())
    }

    fn set_gain(&mut self, gain: f32) {
        self.gain = gain.clamp(0.0, 1.0);
    }

    fn set_pan(&mut self, pan: f32) {
        self.pan = pan.clamp(-1.0, 1.0);
    }

    fn recent_level(&self, now: f64, window_sec: f64) -> PlaybackResult<Option<LevelSample>> {
        let position = self.position(now);
        if !self.playing || position >= self.duration_sec() {
            return Ok(None);
        }
        let rate = self.sample_rate as f64;
        let end = ((position * rate) as usize).min(self.samples.len());
        let start = end.saturating_sub((window_sec.max(0.0) * rate) as usize);
        Ok(Some(LevelSample::from_samples(&self.samples[start..end])))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp_source() -> BufferSource {
        // 2 seconds at 1 kHz
        let samples: Vec<f32> = (0..2000).map(|i| if i < 1000 { 0.0 } else { 0.5 }).collect();
        BufferSource::new(samples.into(), 1000)
    }

    #[test]
    fn test_manual_clock_shared() {
        let clock = ManualClock::new();
        let other = clock.clone();
        clock.advance(Duration::from_millis(1500));
        assert_eq!(other.now(), 1.5);
        other.set(0.25);
        assert_eq!(clock.now(), 0.25);
    }

    #[test]
    fn test_position_waits_for_deadline() {
        let mut src = ramp_source();
        src.seek(0.5).unwrap();
        src.start_at(10.0).unwrap();
        assert_eq!(src.position(9.0), 0.5);
        assert_eq!(src.position(10.25), 0.75);
        // Clamped at the end of the buffer
        assert_eq!(src.position(100.0), 2.0);
    }

    #[test]
    fn test_stop_keeps_position() {
        let mut src = ramp_source();
        src.start_at(0.0).unwrap();
        src.stop(0.4);
        assert!(!src.is_playing());
        assert_eq!(src.position(5.0), 0.4);
    }

    #[test]
    fn test_seek_rejected_while_running() {
        let mut src = ramp_source();
        src.start_at(0.0).unwrap();
        assert!(matches!(src.seek(1.0), Err(PlaybackError::SeekRejected { .. })));
    }

    #[test]
    fn test_seek_clamps() {
        let mut src = ramp_source();
        src.seek(-1.0).unwrap();
        assert_eq!(src.position(0.0), 0.0);
        src.seek(9.0).unwrap();
        assert_eq!(src.position(0.0), 2.0);
    }

    #[test]
    fn test_empty_source_refuses_start() {
        let mut src = BufferSource::new(Vec::new().into(), 44_100);
        assert_eq!(src.start_at(0.0), Err(PlaybackError::Empty));
    }

    #[test]
    fn test_recent_level_window() {
        let mut src = ramp_source();
        assert_eq!(src.recent_level(0.0, 0.05).unwrap(), None);

        src.start_at(0.0).unwrap();
        let quiet = src.recent_level(0.5, 0.05).unwrap().unwrap();
        assert_eq!(quiet.peak, 0.0);

        let loud = src.recent_level(1.5, 0.05).unwrap().unwrap();
        assert_eq!(loud.peak, 0.5);
        assert!((loud.rms - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_recent_level_silent_after_end() {
        let mut src = ramp_source();
        src.start_at(0.0).unwrap();
        assert!(src.recent_level(1.99, 0.05).unwrap().is_some());

        // Still running, but nothing left to play
        assert!(src.is_playing());
        assert_eq!(src.recent_level(2.0, 0.05).unwrap(), None);
        assert_eq!(src.recent_level(4.8, 0.05).unwrap(), None);
    }

    #[test]
    fn test_equal_power_pan() {
        let mut src = ramp_source();
        src.set_pan(0.0);
        let (l, r) = src.channel_gains();
        assert!((l - r).abs() < 1e-6);
        assert!((l * l + r * r - 1.0).abs() < 1e-5);

        src.set_pan(-5.0);
        let (l, r) = src.channel_gains();
        assert!((l - 1.0).abs() < 1e-6);
        assert!(r.abs() < 1e-6);
    }
}
