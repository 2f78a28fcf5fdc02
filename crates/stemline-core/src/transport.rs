//! Transport clock - the authoritative playback position
//!
//! # State machine
//!
//! ```text
//!            play()              pause()
//!  Stopped ─────────► Playing ─────────► Paused
//!     ▲                  ▲                  │
//!     │ stop()           └──── play() ──────┘
//!     └──────────── any state ─────────────
//! ```
//!
//! `seek` is valid in every state and never changes it.
//!
//! # Synchronized start
//!
//! On `play()` every audible track's source is repositioned to the cursor and
//! started against one shared deadline (`now + start_latency`) instead of one
//! after another, so start skew is bounded by how precisely each source
//! honours the deadline. A source that refuses is excluded for the rest of the
//! pass and the others carry on.
//!
//! # Position publication
//!
//! While playing, [`Transport::tick`] reads the cursor from a single reference
//! source: the longest running source that has not reached its own end.
//! When the reference runs out the next unfinished source takes over, and
//! with none left the cursor runs from a free-running anchor. Sources that
//! wander further than `max_drift` from the published cursor are restarted
//! in place; sources that have played to their end are left alone.

use std::sync::Arc;

use crate::config::TransportConfig;
use crate::error::PlaybackError;
use crate::grid::{self, Grid};
use crate::registry::TrackRegistry;
use crate::source::Clock;
use crate::types::{PlayState, TimeSignature, TrackId, DEFAULT_BPM, MAX_BPM, MIN_BPM};

/// Observable transport state
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransportState {
    /// Playback/scrub position in seconds, never negative
    pub cursor_sec: f64,
    pub play_state: PlayState,
    pub tempo_bpm: f64,
    pub time_signature: TimeSignature,
    pub snap_enabled: bool,
}

impl TransportState {
    pub fn playing(&self) -> bool {
        self.play_state.is_playing()
    }

    /// Grid for this tempo and signature at the given zoom
    pub fn grid(&self, pixels_per_second: f64) -> Grid {
        Grid::new(self.tempo_bpm, self.time_signature, pixels_per_second)
    }

    /// Apply snapping according to the current tempo and snap flag
    pub fn snap(&self, time_sec: f64) -> f64 {
        grid::snap(time_sec, self.tempo_bpm, self.snap_enabled)
    }
}

impl Default for TransportState {
    fn default() -> Self {
        let config = TransportConfig::default();
        Self {
            cursor_sec: 0.0,
            play_state: PlayState::Stopped,
            tempo_bpm: config.tempo_bpm,
            time_signature: config.time_signature,
            snap_enabled: config.snap_enabled,
        }
    }
}

/// Outcome of a synchronized start
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlayReport {
    /// Clock time all sources were scheduled to start at
    pub deadline: f64,
    pub started: Vec<TrackId>,
    /// Tracks excluded from this pass
    pub failed: Vec<(TrackId, PlaybackError)>,
}

impl PlayReport {
    pub fn is_partial(&self) -> bool {
        !self.failed.is_empty()
    }
}

/// Things the transport did that the rest of the session may care about
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    StateChanged(PlayState),
    Seeked { position_sec: f64 },
    TempoChanged { bpm: f64 },
    /// Source refused a start or seek and sits out this pass
    TrackExcluded { track: TrackId, error: PlaybackError },
    /// Source drifted beyond tolerance and was restarted
    Resynced { track: TrackId, drift_sec: f64 },
    /// Cursor hit the end of the longest track; transport paused
    ReachedEnd { position_sec: f64 },
}

/// The transport clock
pub struct Transport {
    state: TransportState,
    clock: Arc<dyn Clock>,
    start_latency: f64,
    max_drift: f64,
    /// Track whose source position is published as the cursor
    reference: Option<TrackId>,
    /// Free-running fallback: cursor was `anchor_cursor` at `anchor_time`
    anchor_cursor: f64,
    anchor_time: f64,
    events: Vec<TransportEvent>,
}

impl Transport {
    pub fn new(clock: Arc<dyn Clock>, config: &TransportConfig) -> Self {
        Self {
            state: TransportState {
                cursor_sec: 0.0,
                play_state: PlayState::Stopped,
                tempo_bpm: clamp_bpm(config.tempo_bpm).unwrap_or(DEFAULT_BPM),
                time_signature: TimeSignature::new(
                    config.time_signature.beats_per_bar,
                    config.time_signature.beat_unit,
                ),
                snap_enabled: config.snap_enabled,
            },
            clock,
            start_latency: config.start_latency().as_secs_f64(),
            max_drift: config.max_drift().as_secs_f64(),
            reference: None,
            anchor_cursor: 0.0,
            anchor_time: 0.0,
            events: Vec::new(),
        }
    }

    pub fn state(&self) -> &TransportState {
        &self.state
    }

    pub fn cursor(&self) -> f64 {
        self.state.cursor_sec
    }

    pub fn play_state(&self) -> PlayState {
        self.state.play_state
    }

    pub fn is_playing(&self) -> bool {
        self.state.playing()
    }

    pub fn reference(&self) -> Option<TrackId> {
        self.reference
    }

    pub fn max_drift(&self) -> f64 {
        self.max_drift
    }

    /// Change the drift tolerance (seconds)
    pub fn set_max_drift(&mut self, max_drift_sec: f64) {
        if max_drift_sec.is_finite() && max_drift_sec >= 0.0 {
            self.max_drift = max_drift_sec;
        }
    }

    pub fn now(&self) -> f64 {
        self.clock.now()
    }

    /// Take the events emitted since the last drain
    pub fn drain_events(&mut self) -> Vec<TransportEvent> {
        std::mem::take(&mut self.events)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Commands
    // ─────────────────────────────────────────────────────────────────────

    /// Start or resume playback from the cursor
    ///
    /// No-op returning an empty report when already playing.
    pub fn play(&mut self, registry: &mut TrackRegistry) -> PlayReport {
        if self.is_playing() {
            return PlayReport::default();
        }

        let now = self.clock.now();
        let deadline = now + self.start_latency;
        let cursor = self.state.cursor_sec;

        for track in registry.iter_mut() {
            track.set_excluded(false);
        }

        let report = self.start_sources(registry, now, deadline, cursor);
        self.reference = pick_reference(registry, now);
        self.anchor_cursor = cursor;
        self.anchor_time = deadline;

        log::info!(
            "[TRANSPORT] play from {:.3}s: {} started, {} failed, reference {:?}",
            cursor,
            report.started.len(),
            report.failed.len(),
            self.reference
        );

        self.set_play_state(PlayState::Playing);
        report
    }

    /// Stop advancing, leaving the cursor at the last sampled position
    pub fn pause(&mut self, registry: &mut TrackRegistry) {
        if !self.is_playing() {
            return;
        }
        let now = self.clock.now();
        let position = self.read_position(registry, now);
        self.publish(position, registry.duration_sec());
        self.halt_sources(registry, now);

        log::info!("[TRANSPORT] paused at {:.3}s", self.state.cursor_sec);
        self.set_play_state(PlayState::Paused);
    }

    /// Pause and return the cursor to zero
    pub fn stop(&mut self, registry: &mut TrackRegistry) {
        let now = self.clock.now();
        if self.is_playing() {
            self.halt_sources(registry, now);
        }
        for track in registry.iter_mut() {
            let id = track.id();
            if let Some(source) = track.source_mut() {
                if let Err(e) = source.seek(0.0) {
                    log::debug!("[TRANSPORT] {} could not rewind: {}", id, e);
                }
            }
        }
        self.state.cursor_sec = 0.0;
        self.anchor_cursor = 0.0;

        log::info!("[TRANSPORT] stopped");
        if self.state.play_state != PlayState::Stopped {
            self.set_play_state(PlayState::Stopped);
        }
    }

    /// Move the cursor to `max(0, sec)`, clamped to the known duration
    ///
    /// While playing, every running source is stopped, repositioned and
    /// restarted on a fresh shared deadline. Returns the new cursor.
    /// Non-finite targets are ignored.
    pub fn seek(&mut self, registry: &mut TrackRegistry, sec: f64) -> f64 {
        if !sec.is_finite() {
            log::debug!("[TRANSPORT] ignoring non-finite seek");
            return self.state.cursor_sec;
        }

        let duration = registry.duration_sec();
        let mut target = sec.max(0.0);
        if duration > 0.0 {
            target = target.min(duration);
        }
        self.state.cursor_sec = target;

        if self.is_playing() {
            let now = self.clock.now();
            let deadline = now + self.start_latency;
            self.halt_sources(registry, now);
            self.start_sources(registry, now, deadline, target);
            self.reference = pick_reference(registry, now);
            self.anchor_cursor = target;
            self.anchor_time = deadline;
        } else {
            self.anchor_cursor = target;
        }

        log::debug!("[TRANSPORT] seek to {:.3}s", target);
        self.events.push(TransportEvent::Seeked {
            position_sec: target,
        });
        target
    }

    /// Set the tempo; the cursor is not touched
    ///
    /// Values are clamped to the supported range; non-positive or
    /// non-finite values are ignored.
    pub fn set_tempo(&mut self, bpm: f64) {
        let Some(bpm) = clamp_bpm(bpm) else {
            log::debug!("[TRANSPORT] ignoring invalid tempo {}", bpm);
            return;
        };
        if bpm != self.state.tempo_bpm {
            self.state.tempo_bpm = bpm;
            self.events.push(TransportEvent::TempoChanged { bpm });
        }
    }

    pub fn set_time_signature(&mut self, signature: TimeSignature) {
        self.state.time_signature =
            TimeSignature::new(signature.beats_per_bar, signature.beat_unit);
    }

    pub fn set_snap_enabled(&mut self, enabled: bool) {
        self.state.snap_enabled = enabled;
    }

    /// Bring source gain/pan in line with the registry's mix state
    ///
    /// While playing, tracks that became audible are started at the current
    /// cursor; tracks that became inaudible keep running at zero gain so
    /// they stay aligned for when they come back.
    pub fn sync_mix(&mut self, registry: &mut TrackRegistry) {
        let plan: Vec<(TrackId, f32, f32, bool)> = registry
            .iter()
            .filter(|t| t.has_source() && !t.is_excluded())
            .map(|t| {
                let id = t.id();
                (id, registry.audible_gain(id), t.pan(), registry.is_audible(id))
            })
            .collect();

        let playing = self.is_playing();
        let now = self.clock.now();
        let deadline = now + self.start_latency;
        let resume_at = self.state.cursor_sec + self.start_latency;

        for (id, gain, pan, audible) in plan {
            let Some(track) = registry.get_mut(id) else {
                continue;
            };
            let Some(source) = track.source_mut() else {
                continue;
            };
            source.set_gain(gain);
            source.set_pan(pan);

            if playing && audible && !source.is_playing() {
                let duration = source.duration_sec().max(0.0);
                let started = source
                    .seek(resume_at.min(duration))
                    .and_then(|_| source.start_at(deadline));
                match started {
                    Ok(()) => {
                        log::debug!("[TRANSPORT] {} joined playback at {:.3}s", id, resume_at)
                    }
                    Err(error) => self.exclude(registry, id, error),
                }
            }
        }

        if playing && self.reference.is_none() {
            self.reference = pick_reference(registry, now);
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Tick
    // ─────────────────────────────────────────────────────────────────────

    /// Advance the published cursor; call once per render tick
    ///
    /// Returns the cursor. Also handles end-of-timeline and drift.
    pub fn tick(&mut self, registry: &mut TrackRegistry) -> f64 {
        if !self.is_playing() {
            return self.state.cursor_sec;
        }

        let now = self.clock.now();
        let duration = registry.duration_sec();
        let position = self.read_position(registry, now);
        self.publish(position, duration);

        if duration > 0.0 && self.state.cursor_sec >= duration {
            self.halt_sources(registry, now);
            log::info!("[TRANSPORT] reached end at {:.3}s", duration);
            self.events.push(TransportEvent::ReachedEnd {
                position_sec: duration,
            });
            self.set_play_state(PlayState::Paused);
            return self.state.cursor_sec;
        }

        if now >= self.anchor_time {
            self.correct_drift(registry, now);
        }
        self.state.cursor_sec
    }

    // ─────────────────────────────────────────────────────────────────────
    // Internals
    // ─────────────────────────────────────────────────────────────────────

    /// Reposition and schedule every audible source
    fn start_sources(
        &mut self,
        registry: &mut TrackRegistry,
        now: f64,
        deadline: f64,
        position: f64,
    ) -> PlayReport {
        let plan: Vec<(TrackId, f32, f32)> = registry
            .iter()
            .filter(|t| t.has_source() && !t.is_excluded() && registry.is_audible(t.id()))
            .map(|t| (t.id(), registry.audible_gain(t.id()), t.pan()))
            .collect();

        let mut report = PlayReport {
            deadline,
            ..PlayReport::default()
        };

        for (id, gain, pan) in plan {
            let Some(source) = registry.get_mut(id).and_then(|t| t.source_mut()) else {
                continue;
            };
            source.stop(now);
            source.set_gain(gain);
            source.set_pan(pan);

            let duration = source.duration_sec().max(0.0);
            let result = source
                .seek(position.min(duration))
                .and_then(|_| source.start_at(deadline));

            match result {
                Ok(()) => report.started.push(id),
                Err(error) => {
                    self.exclude(registry, id, error.clone());
                    report.failed.push((id, error));
                }
            }
        }
        report
    }

    fn halt_sources(&mut self, registry: &mut TrackRegistry, now: f64) {
        for track in registry.iter_mut() {
            if let Some(source) = track.source_mut() {
                source.stop(now);
            }
        }
        self.reference = None;
    }

    fn exclude(&mut self, registry: &mut TrackRegistry, id: TrackId, error: PlaybackError) {
        log::warn!("[TRANSPORT] excluding {} from playback: {}", id, error);
        if let Some(track) = registry.get_mut(id) {
            track.set_excluded(true);
            if let Some(source) = track.source_mut() {
                source.stop(self.clock.now());
            }
        }
        if self.reference == Some(id) {
            self.reference = None;
        }
        self.events.push(TransportEvent::TrackExcluded { track: id, error });
    }

    /// Current playback position from the reference or the anchor
    fn read_position(&mut self, registry: &TrackRegistry, now: f64) -> f64 {
        let Some(current) = self.reference else {
            return self.anchor_position(now);
        };

        match source_position(registry, current, now) {
            Some((position, false)) => return position,
            Some((position, true)) => {
                // Played to its own end: the anchor carries on from there
                self.anchor_cursor = position.max(self.state.cursor_sec);
                self.anchor_time = now;
            }
            None => {
                // Reference removed or stalled: carry on from the published cursor
                if now > self.anchor_time {
                    self.anchor_cursor = self.state.cursor_sec;
                    self.anchor_time = now;
                }
            }
        }

        self.reference = pick_reference(registry, now);
        log::debug!("[TRANSPORT] reference {} handed over to {:?}", current, self.reference);
        match self.reference.and_then(|id| source_position(registry, id, now)) {
            Some((position, _)) => position,
            None => self.anchor_position(now),
        }
    }

    fn anchor_position(&self, now: f64) -> f64 {
        self.anchor_cursor + (now - self.anchor_time).max(0.0)
    }

    /// Publish a position: monotonic while playing, clamped to duration
    fn publish(&mut self, position: f64, duration: f64) {
        let mut position = position.max(0.0);
        if duration > 0.0 {
            position = position.min(duration);
        }
        if position > self.state.cursor_sec {
            self.state.cursor_sec = position;
        }
    }

    fn correct_drift(&mut self, registry: &mut TrackRegistry, now: f64) {
        let cursor = self.state.cursor_sec;
        let drifting: Vec<(TrackId, f64)> = registry
            .iter()
            .filter(|t| Some(t.id()) != self.reference && !t.is_excluded())
            .filter_map(|t| {
                let source = t.source().filter(|s| s.is_playing())?;
                let position = source.position(now);
                // A shorter track that ran off its own end is not drifting
                if position >= source.duration_sec() {
                    return None;
                }
                let drift = position - cursor;
                (drift.abs() > self.max_drift).then_some((t.id(), drift))
            })
            .collect();

        if drifting.is_empty() {
            return;
        }

        let deadline = now + self.start_latency;
        let target = cursor + self.start_latency;
        for (id, drift) in drifting {
            let Some(source) = registry.get_mut(id).and_then(|t| t.source_mut()) else {
                continue;
            };
            source.stop(now);
            let duration = source.duration_sec().max(0.0);
            let result = source
                .seek(target.min(duration))
                .and_then(|_| source.start_at(deadline));
            match result {
                Ok(()) => {
                    log::debug!("[TRANSPORT] resynced {} (drift {:+.4}s)", id, drift);
                    self.events.push(TransportEvent::Resynced {
                        track: id,
                        drift_sec: drift,
                    });
                }
                Err(error) => self.exclude(registry, id, error),
            }
        }
    }

    fn set_play_state(&mut self, play_state: PlayState) {
        self.state.play_state = play_state;
        self.events.push(TransportEvent::StateChanged(play_state));
    }
}

fn clamp_bpm(bpm: f64) -> Option<f64> {
    (bpm.is_finite() && bpm > 0.0).then(|| bpm.clamp(MIN_BPM, MAX_BPM))
}

/// Position of a track's running source, and whether it has reached its end
fn source_position(registry: &TrackRegistry, id: TrackId, now: f64) -> Option<(f64, bool)> {
    let track = registry.get(id).filter(|t| !t.is_excluded())?;
    let source = track.source().filter(|s| s.is_playing())?;
    let position = source.position(now);
    Some((position, position >= source.duration_sec()))
}

/// Longest running source that still has audio ahead of it
///
/// Ties go to the earlier track in registry order.
fn pick_reference(registry: &TrackRegistry, now: f64) -> Option<TrackId> {
    let mut best: Option<(TrackId, f64)> = None;
    for track in registry.iter() {
        let Some((_, false)) = source_position(registry, track.id(), now) else {
            continue;
        };
        let duration = track.source().map(|s| s.duration_sec()).unwrap_or(0.0);
        if best.map_or(true, |(_, longest)| duration > longest) {
            best = Some((track.id(), duration));
        }
    }
    best.map(|(id, _)| id)
}
