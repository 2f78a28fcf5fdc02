//! Per-track level metering
//!
//! [`LevelMeter::poll`] is called from the session tick and produces a fresh
//! [`LevelSample`] per track once every metering interval. Readings come
//! from the most recent window of each track's source, scaled by its audible
//! gain.
//!
//! No-signal policy: **hold and decay**. When a track has no live signal
//! (transport not playing, no source, excluded, or the read failed) its
//! previous reading is multiplied by the decay factor each tick and snapped
//! to zero once it drops below [`DECAY_FLOOR`]. Meters fall smoothly instead
//! of blinking out, and never invent signal that isn't there.
//!
//! A failure reading one track only affects that track.

use std::collections::BTreeMap;

use crate::registry::TrackRegistry;
use crate::types::TrackId;

/// Levels below this are reported as silence
pub const DECAY_FLOOR: f32 = 1e-3;

/// Instantaneous peak/RMS pair, both in `[0, 1]`
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LevelSample {
    pub peak: f32,
    pub rms: f32,
}

impl LevelSample {
    pub const SILENT: LevelSample = LevelSample { peak: 0.0, rms: 0.0 };

    /// Build a sample, clamping both values into `[0, 1]`
    pub fn new(peak: f32, rms: f32) -> Self {
        let clamp = |v: f32| if v.is_finite() { v.clamp(0.0, 1.0) } else { 0.0 };
        Self {
            peak: clamp(peak),
            rms: clamp(rms),
        }
    }

    /// Peak and RMS of a block of samples
    pub fn from_samples(samples: &[f32]) -> Self {
        if samples.is_empty() {
            return Self::SILENT;
        }
        let (peak, sum_sq) = samples
            .iter()
            .filter(|s| s.is_finite())
            .fold((0.0f32, 0.0f64), |(peak, sum), &s| {
                (peak.max(s.abs()), sum + (s as f64) * (s as f64))
            });
        let rms = (sum_sq / samples.len() as f64).sqrt() as f32;
        Self::new(peak, rms)
    }

    pub fn scaled(self, gain: f32) -> Self {
        Self::new(self.peak * gain, self.rms * gain)
    }

    /// One decay step toward silence
    pub fn decayed(self, factor: f32) -> Self {
        let step = |v: f32| {
            let next = v * factor;
            if next < DECAY_FLOOR {
                0.0
            } else {
                next
            }
        };
        Self::new(step(self.peak), step(self.rms))
    }

    pub fn is_silent(&self) -> bool {
        self.peak == 0.0 && self.rms == 0.0
    }
}

/// Fixed-interval level meter for every track in a registry
#[derive(Debug, Clone)]
pub struct LevelMeter {
    interval_sec: f64,
    window_sec: f64,
    decay: f32,
    last_tick: Option<f64>,
    levels: BTreeMap<TrackId, LevelSample>,
    master: LevelSample,
}

impl LevelMeter {
    pub fn new(interval_sec: f64, window_sec: f64, decay: f32) -> Self {
        Self {
            interval_sec: interval_sec.max(0.001),
            window_sec: window_sec.max(0.0),
            decay: decay.clamp(0.0, 1.0),
            last_tick: None,
            levels: BTreeMap::new(),
            master: LevelSample::SILENT,
        }
    }

    pub fn from_config(config: &crate::config::MeterConfig) -> Self {
        Self::new(
            config.interval().as_secs_f64(),
            config.window().as_secs_f64(),
            config.decay,
        )
    }

    /// Run a metering tick if the interval has elapsed
    ///
    /// Returns true when new readings were produced. `playing` is the
    /// transport state; sources are only read while it is true.
    pub fn poll(&mut self, now: f64, registry: &TrackRegistry, playing: bool) -> bool {
        if let Some(last) = self.last_tick {
            if now - last < self.interval_sec {
                return false;
            }
        }
        self.last_tick = Some(now);
        self.measure(now, registry, playing);
        true
    }

    /// Take readings immediately, ignoring the interval
    pub fn measure(&mut self, now: f64, registry: &TrackRegistry, playing: bool) {
        // Forget tracks that were removed since the last tick
        self.levels.retain(|id, _| registry.contains(*id));

        for track in registry.iter() {
            let id = track.id();
            let previous = self.levels.get(&id).copied().unwrap_or_default();
            let gain = registry.audible_gain(id);

            let live = match track.source() {
                Some(source) if playing && !track.is_excluded() && gain > 0.0 => {
                    match source.recent_level(now, self.window_sec) {
                        Ok(reading) => reading.map(|s| s.scaled(gain)),
                        Err(e) => {
                            log::debug!("[METER] {} level read failed: {}", id, e);
                            None
                        }
                    }
                }
                _ => None,
            };

            let sample = live.unwrap_or_else(|| previous.decayed(self.decay));
            self.levels.insert(id, sample);
        }

        self.master = Self::mix(self.levels.values().copied());
    }

    /// Overwrite a track's reading with a remotely measured one
    ///
    /// Ignored (returns false) when the track no longer exists.
    pub fn ingest(&mut self, registry: &TrackRegistry, id: TrackId, sample: LevelSample) -> bool {
        if !registry.contains(id) {
            log::debug!("[METER] dropping level update for removed {}", id);
            return false;
        }
        self.levels.insert(id, LevelSample::new(sample.peak, sample.rms));
        self.master = Self::mix(self.levels.values().copied());
        true
    }

    /// Latest reading for a track (silent if never measured)
    pub fn level(&self, id: TrackId) -> LevelSample {
        self.levels.get(&id).copied().unwrap_or_default()
    }

    pub fn levels(&self) -> impl Iterator<Item = (TrackId, LevelSample)> + '_ {
        self.levels.iter().map(|(id, s)| (*id, *s))
    }

    /// Combined reading: loudest peak, power-summed RMS
    pub fn master(&self) -> LevelSample {
        self.master
    }

    fn mix(samples: impl Iterator<Item = LevelSample>) -> LevelSample {
        let (peak, power) = samples.fold((0.0f32, 0.0f32), |(peak, power), s| {
            (peak.max(s.peak), power + s.rms * s.rms)
        });
        LevelSample::new(peak, power.sqrt())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{PlaybackError, PlaybackResult};
    use crate::registry::{MixParam, NewTrack};
    use crate::source::{AudioSource, BufferSource};

    /// Source whose level read always fails
    struct BrokenMeterSource;

    impl AudioSource for BrokenMeterSource {
        fn duration_sec(&self) -> f64 {
            10.0
        }
        fn seek(&mut self, _: f64) -> PlaybackResult<()> {
            Ok(())
        }
        fn start_at(&mut self, _: f64) -> PlaybackResult<()> {
            Ok(())
        }
        fn stop(&mut self, _: f64) {}
        fn is_playing(&self) -> bool {
            true
        }
        fn position(&self, now: f64) -> f64 {
            now
        }
        fn set_gain(&mut self, _: f32) {}
        fn set_pan(&mut self, _: f32) {}
        fn recent_level(&self, _: f64, _: f64) -> PlaybackResult<Option<LevelSample>> {
            Err(PlaybackError::LevelUnavailable("device gone".into()))
        }
    }

    fn running_source(level: f32) -> Box<dyn AudioSource> {
        let mut source = BufferSource::new(vec![level; 10_000].into(), 1000);
        source.start_at(0.0).unwrap();
        Box::new(source)
    }

    #[test]
    fn test_from_samples() {
        let s = LevelSample::from_samples(&[0.5, -0.5, 0.5, -0.5]);
        assert_eq!(s.peak, 0.5);
        assert!((s.rms - 0.5).abs() < 1e-6);
        assert_eq!(LevelSample::from_samples(&[]), LevelSample::SILENT);
        assert_eq!(LevelSample::new(2.0, -1.0), LevelSample::new(1.0, 0.0));
    }

    #[test]
    fn test_interval_gating() {
        let registry = TrackRegistry::new(4);
        let mut meter = LevelMeter::new(0.05, 0.05, 0.5);
        assert!(meter.poll(0.0, &registry, true));
        assert!(!meter.poll(0.03, &registry, true));
        assert!(meter.poll(0.05, &registry, true));
    }

    #[test]
    fn test_reads_scaled_by_audible_gain() {
        let mut registry = TrackRegistry::new(4);
        let id = registry.add_track(NewTrack::new("a").source(running_source(0.8)));
        registry.update_mix(id, MixParam::Gain(0.5)).unwrap();

        let mut meter = LevelMeter::new(0.05, 0.05, 0.5);
        meter.poll(1.0, &registry, true);
        let level = meter.level(id);
        assert!((level.peak - 0.4).abs() < 1e-6);
        assert!((level.rms - 0.4).abs() < 1e-6);
    }

    #[test]
    fn test_muted_track_decays() {
        let mut registry = TrackRegistry::new(4);
        let id = registry.add_track(NewTrack::new("a").source(running_source(0.8)));
        let mut meter = LevelMeter::new(0.05, 0.05, 0.5);
        meter.poll(1.0, &registry, true);

        registry.update_mix(id, MixParam::Mute(true)).unwrap();
        meter.poll(2.0, &registry, true);
        assert!((meter.level(id).peak - 0.4).abs() < 1e-6);

        let fresh = registry.add_track(NewTrack::new("b").source(running_source(0.8)));
        registry.update_mix(fresh, MixParam::Mute(true)).unwrap();
        meter.poll(3.0, &registry, true);
        assert!(meter.level(fresh).is_silent());
    }

    #[test]
    fn test_hold_and_decay_without_signal() {
        let mut registry = TrackRegistry::new(4);
        let id = registry.add_track(NewTrack::new("a").source(running_source(0.8)));
        let mut meter = LevelMeter::new(0.05, 0.05, 0.5);

        meter.poll(1.0, &registry, true);
        assert_eq!(meter.level(id).peak, 0.8);

        // Transport stopped: reading decays instead of dropping
        meter.poll(2.0, &registry, false);
        assert!((meter.level(id).peak - 0.4).abs() < 1e-6);
        meter.poll(3.0, &registry, false);
        assert!((meter.level(id).peak - 0.2).abs() < 1e-6);

        for i in 4..24 {
            meter.poll(i as f64, &registry, false);
        }
        assert!(meter.level(id).is_silent());
    }

    #[test]
    fn test_finished_track_decays_while_others_play() {
        let mut registry = TrackRegistry::new(4);
        let mut short = BufferSource::new(vec![0.5; 2_000].into(), 1000);
        short.start_at(0.0).unwrap();
        let short = registry.add_track(NewTrack::new("short").source(Box::new(short)));
        let long = registry.add_track(NewTrack::new("long").source(running_source(0.6)));

        let mut meter = LevelMeter::new(0.05, 0.05, 0.5);
        meter.poll(1.0, &registry, true);
        assert_eq!(meter.level(short).peak, 0.5);

        meter.poll(2.5, &registry, true);
        assert!((meter.level(short).peak - 0.25).abs() < 1e-6);
        assert_eq!(meter.level(long).peak, 0.6);

        for i in 0..20 {
            meter.poll(3.0 + i as f64 * 0.1, &registry, true);
        }
        assert!(meter.level(short).is_silent());
        assert_eq!(meter.master().peak, 0.6);
    }

    #[test]
    fn test_one_failure_isolated() {
        let mut registry = TrackRegistry::new(4);
        let good = registry.add_track(NewTrack::new("good").source(running_source(0.6)));
        let bad = registry.add_track(NewTrack::new("bad").source(Box::new(BrokenMeterSource)));

        let mut meter = LevelMeter::new(0.05, 0.05, 0.5);
        meter.poll(1.0, &registry, true);
        assert_eq!(meter.level(good).peak, 0.6);
        assert!(meter.level(bad).is_silent());
    }

    #[test]
    fn test_removed_tracks_pruned_and_ingest_rejected() {
        let mut registry = TrackRegistry::new(4);
        let id = registry.add_track(NewTrack::new("a").source(running_source(0.6)));
        let mut meter = LevelMeter::new(0.05, 0.05, 0.5);
        meter.poll(1.0, &registry, true);
        assert_eq!(meter.levels().count(), 1);

        registry.remove_track(id, 1.0).unwrap();
        meter.poll(2.0, &registry, true);
        assert_eq!(meter.levels().count(), 0);
        assert!(!meter.ingest(&registry, id, LevelSample::new(0.9, 0.9)));
    }

    #[test]
    fn test_ingest_and_master() {
        let mut registry = TrackRegistry::new(4);
        let a = registry.add_track(NewTrack::new("a"));
        let b = registry.add_track(NewTrack::new("b"));
        let mut meter = LevelMeter::new(0.05, 0.05, 0.5);

        assert!(meter.ingest(&registry, a, LevelSample::new(0.3, 0.3)));
        assert!(meter.ingest(&registry, b, LevelSample::new(0.7, 0.4)));
        let master = meter.master();
        assert_eq!(master.peak, 0.7);
        assert!((master.rms - 0.5).abs() < 1e-6);
    }
}
