//! Track registry - the loaded tracks and their mix state
//!
//! The registry is the single source of truth read by renderers and the
//! level meter. It is only mutated through the operations below, and every
//! write clamps to the declared ranges:
//!
//! - gain in `[0, 1]` (linear), with a dB view over `[-60, 0]`
//! - pan in `[-1, 1]`
//! - every waveform exactly `buckets` long
//!
//! ## Mix resolution
//!
//! A track is audible when it is not muted and either no track is soloed or
//! it is soloed itself. Its audible gain is `gain * master_gain` when audible
//! and 0 otherwise; the stored gain is never touched by mute or solo.

use crate::error::{RegistryError, RegistryResult};
use crate::source::AudioSource;
use crate::types::{TrackColor, TrackId, WAVEFORM_BUCKETS};
use crate::waveform::Waveform;

/// Gains at or below this dB value are treated as silence
pub const MIN_GAIN_DB: f32 = -60.0;

/// Linear gain for a dB value (`MIN_GAIN_DB` and below map to 0)
pub fn db_to_gain(db: f32) -> f32 {
    if db <= MIN_GAIN_DB {
        0.0
    } else {
        10f32.powf(db.min(0.0) / 20.0)
    }
}

/// dB value for a linear gain, floored at `MIN_GAIN_DB`
pub fn gain_to_db(gain: f32) -> f32 {
    if gain <= 0.0 {
        MIN_GAIN_DB
    } else {
        (20.0 * gain.log10()).clamp(MIN_GAIN_DB, 0.0)
    }
}

/// Mute/solo resolution for one track
#[inline]
pub fn resolve_audible(mute: bool, solo: bool, any_solo: bool) -> bool {
    !mute && (!any_solo || solo)
}

/// One mix parameter change
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MixParam {
    /// Linear gain, clamped to `[0, 1]`
    Gain(f32),
    /// Gain in dB, clamped to `[-60, 0]`
    GainDb(f32),
    /// Pan, clamped to `[-1, 1]`
    Pan(f32),
    Mute(bool),
    Solo(bool),
}

/// Everything needed to register a new track
pub struct NewTrack {
    pub name: String,
    /// Stem type the track was loaded as (e.g. "bass")
    pub stem: Option<String>,
    pub color: Option<TrackColor>,
    pub source: Option<Box<dyn AudioSource>>,
    pub waveform: Option<Waveform>,
}

impl NewTrack {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stem: None,
            color: None,
            source: None,
            waveform: None,
        }
    }

    pub fn stem(mut self, stem: impl Into<String>) -> Self {
        self.stem = Some(stem.into());
        self
    }

    pub fn color(mut self, color: TrackColor) -> Self {
        self.color = Some(color);
        self
    }

    pub fn source(mut self, source: Box<dyn AudioSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn waveform(mut self, waveform: Waveform) -> Self {
        self.waveform = Some(waveform);
        self
    }
}

/// A loaded track and its mix state
pub struct Track {
    id: TrackId,
    name: String,
    stem: Option<String>,
    color: TrackColor,
    source: Option<Box<dyn AudioSource>>,
    duration_sec: f64,
    gain: f32,
    pan: f32,
    mute: bool,
    solo: bool,
    waveform: Option<Waveform>,
    /// Source refused to start during the current playback pass
    excluded: bool,
}

impl std::fmt::Debug for Track {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Track")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("stem", &self.stem)
            .field("has_source", &self.source.is_some())
            .field("duration_sec", &self.duration_sec)
            .field("gain", &self.gain)
            .field("pan", &self.pan)
            .field("mute", &self.mute)
            .field("solo", &self.solo)
            .field("excluded", &self.excluded)
            .finish()
    }
}

impl Track {
    pub fn id(&self) -> TrackId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stem(&self) -> Option<&str> {
        self.stem.as_deref()
    }

    pub fn color(&self) -> TrackColor {
        self.color
    }

    pub fn has_source(&self) -> bool {
        self.source.is_some()
    }

    pub fn source(&self) -> Option<&dyn AudioSource> {
        self.source.as_deref()
    }

    pub(crate) fn source_mut(&mut self) -> Option<&mut (dyn AudioSource + 'static)> {
        self.source.as_deref_mut()
    }

    /// Duration in seconds, 0 when unknown
    pub fn duration_sec(&self) -> f64 {
        self.duration_sec
    }

    pub fn gain(&self) -> f32 {
        self.gain
    }

    pub fn gain_db(&self) -> f32 {
        gain_to_db(self.gain)
    }

    pub fn pan(&self) -> f32 {
        self.pan
    }

    pub fn is_muted(&self) -> bool {
        self.mute
    }

    pub fn is_soloed(&self) -> bool {
        self.solo
    }

    pub fn waveform(&self) -> Option<&Waveform> {
        self.waveform.as_ref()
    }

    /// True when the lane shows demo content instead of real audio
    pub fn is_placeholder(&self) -> bool {
        self.waveform.as_ref().map(|w| w.placeholder).unwrap_or(false)
    }

    pub fn is_excluded(&self) -> bool {
        self.excluded
    }

    pub(crate) fn set_excluded(&mut self, excluded: bool) {
        self.excluded = excluded;
    }
}

/// Implicit master bus applied on top of every track
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MasterBus {
    pub gain: f32,
}

impl Default for MasterBus {
    fn default() -> Self {
        Self { gain: 1.0 }
    }
}

/// The loaded tracks, in insertion order
pub struct TrackRegistry {
    tracks: Vec<Track>,
    master: MasterBus,
    buckets: usize,
    next_id: u64,
    /// Bumped on every mutation; lets readers detect change cheaply
    revision: u64,
}

impl Default for TrackRegistry {
    fn default() -> Self {
        Self::new(WAVEFORM_BUCKETS)
    }
}

impl TrackRegistry {
    /// Empty registry whose waveforms are `buckets` long
    pub fn new(buckets: usize) -> Self {
        Self {
            tracks: Vec::new(),
            master: MasterBus::default(),
            buckets,
            next_id: 1,
            revision: 0,
        }
    }

    pub fn buckets(&self) -> usize {
        self.buckets
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn contains(&self, id: TrackId) -> bool {
        self.index_of(id).is_some()
    }

    pub fn get(&self, id: TrackId) -> Option<&Track> {
        self.tracks.iter().find(|t| t.id == id)
    }

    pub(crate) fn get_mut(&mut self, id: TrackId) -> Option<&mut Track> {
        self.tracks.iter_mut().find(|t| t.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Track> {
        self.tracks.iter()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut Track> {
        self.tracks.iter_mut()
    }

    pub fn ids(&self) -> Vec<TrackId> {
        self.tracks.iter().map(|t| t.id).collect()
    }

    /// Find a track by the stem type it was loaded as
    pub fn find_stem(&self, stem: &str) -> Option<&Track> {
        self.tracks.iter().find(|t| t.stem.as_deref() == Some(stem))
    }

    pub fn master(&self) -> MasterBus {
        self.master
    }

    pub fn set_master_gain(&mut self, gain: f32) {
        if gain.is_finite() {
            self.master.gain = gain.clamp(0.0, 1.0);
            self.revision += 1;
        }
    }

    /// Longest known track duration (0 when nothing is loaded)
    pub fn duration_sec(&self) -> f64 {
        self.tracks.iter().map(|t| t.duration_sec).fold(0.0, f64::max)
    }

    /// Register a track and return its id
    ///
    /// A waveform of the wrong length is dropped with a warning.
    pub fn add_track(&mut self, new: NewTrack) -> TrackId {
        let id = TrackId(self.next_id);
        self.next_id += 1;

        let duration_sec = new
            .source
            .as_ref()
            .map(|s| s.duration_sec())
            .filter(|d| d.is_finite() && *d > 0.0)
            .unwrap_or(0.0);
        let waveform = new.waveform.filter(|w| self.accepts(id, w));
        let color = new
            .color
            .unwrap_or_else(|| TrackColor::for_index(self.tracks.len()));

        log::info!(
            "[REGISTRY] add {} '{}' (source: {}, {:.2}s)",
            id,
            new.name,
            new.source.is_some(),
            duration_sec
        );

        self.tracks.push(Track {
            id,
            name: new.name,
            stem: new.stem,
            color,
            source: new.source,
            duration_sec,
            gain: 1.0,
            pan: 0.0,
            mute: false,
            solo: false,
            waveform,
            excluded: false,
        });
        self.revision += 1;
        id
    }

    /// Remove a track, stopping its source first
    ///
    /// `now` is the session clock time, used to settle the source position.
    pub fn remove_track(&mut self, id: TrackId, now: f64) -> RegistryResult<Track> {
        let index = self.index_of(id).ok_or(RegistryError::UnknownTrack(id))?;
        let mut track = self.tracks.remove(index);
        if let Some(source) = track.source.as_mut() {
            source.stop(now);
        }
        self.revision += 1;
        log::info!("[REGISTRY] removed {} '{}'", id, track.name);
        Ok(track)
    }

    /// Apply one mix parameter change
    ///
    /// Non-finite values are ignored.
    pub fn update_mix(&mut self, id: TrackId, param: MixParam) -> RegistryResult<()> {
        let track = self.get_mut(id).ok_or(RegistryError::UnknownTrack(id))?;
        match param {
            MixParam::Gain(gain) if gain.is_finite() => track.gain = gain.clamp(0.0, 1.0),
            MixParam::GainDb(db) if db.is_finite() => track.gain = db_to_gain(db),
            MixParam::Pan(pan) if pan.is_finite() => track.pan = pan.clamp(-1.0, 1.0),
            MixParam::Mute(mute) => track.mute = mute,
            MixParam::Solo(solo) => track.solo = solo,
            other => {
                log::debug!("[REGISTRY] ignoring non-finite {:?} for {}", other, id);
                return Ok(());
            }
        }
        self.revision += 1;
        Ok(())
    }

    pub fn rename(&mut self, id: TrackId, name: impl Into<String>) -> RegistryResult<()> {
        let track = self.get_mut(id).ok_or(RegistryError::UnknownTrack(id))?;
        track.name = name.into();
        self.revision += 1;
        Ok(())
    }

    pub fn set_color(&mut self, id: TrackId, color: TrackColor) -> RegistryResult<()> {
        let track = self.get_mut(id).ok_or(RegistryError::UnknownTrack(id))?;
        track.color = color;
        self.revision += 1;
        Ok(())
    }

    /// Store a computed waveform (dropped if its length is wrong)
    pub fn set_waveform(&mut self, id: TrackId, waveform: Waveform) -> RegistryResult<()> {
        if !self.contains(id) {
            return Err(RegistryError::UnknownTrack(id));
        }
        if !self.accepts(id, &waveform) {
            return Ok(());
        }
        if let Some(track) = self.get_mut(id) {
            track.waveform = Some(waveform);
        }
        self.revision += 1;
        Ok(())
    }

    /// Attach or replace a track's source, returning the previous one
    pub fn set_source(
        &mut self,
        id: TrackId,
        source: Box<dyn AudioSource>,
    ) -> RegistryResult<Option<Box<dyn AudioSource>>> {
        let track = self.get_mut(id).ok_or(RegistryError::UnknownTrack(id))?;
        let duration = source.duration_sec();
        track.duration_sec = if duration.is_finite() && duration > 0.0 {
            duration
        } else {
            0.0
        };
        let previous = track.source.replace(source);
        self.revision += 1;
        Ok(previous)
    }

    pub fn any_solo(&self) -> bool {
        self.tracks.iter().any(|t| t.solo)
    }

    /// Whether a track survives mute/solo resolution
    pub fn is_audible(&self, id: TrackId) -> bool {
        let any_solo = self.any_solo();
        self.get(id)
            .map(|t| resolve_audible(t.mute, t.solo, any_solo))
            .unwrap_or(false)
    }

    /// Gain the track should actually sound at (0 when silenced)
    pub fn audible_gain(&self, id: TrackId) -> f32 {
        if self.is_audible(id) {
            self.get(id).map(|t| t.gain * self.master.gain).unwrap_or(0.0)
        } else {
            0.0
        }
    }

    fn index_of(&self, id: TrackId) -> Option<usize> {
        self.tracks.iter().position(|t| t.id == id)
    }

    fn accepts(&self, id: TrackId, waveform: &Waveform) -> bool {
        if waveform.len() == self.buckets {
            return true;
        }
        log::warn!(
            "[REGISTRY] dropping waveform for {}: {} buckets, expected {}",
            id,
            waveform.len(),
            self.buckets
        );
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::BufferSource;

    fn registry_with(n: usize) -> (TrackRegistry, Vec<TrackId>) {
        let mut registry = TrackRegistry::new(4);
        let ids = (0..n)
            .map(|i| registry.add_track(NewTrack::new(format!("t{}", i))))
            .collect();
        (registry, ids)
    }

    #[test]
    fn test_ids_unique_and_not_reused() {
        let (mut registry, ids) = registry_with(3);
        assert_eq!(ids, vec![TrackId(1), TrackId(2), TrackId(3)]);
        registry.remove_track(ids[2], 0.0).unwrap();
        let next = registry.add_track(NewTrack::new("again"));
        assert_eq!(next, TrackId(4));
    }

    #[test]
    fn test_solo_wins() {
        let (mut registry, ids) = registry_with(2);
        registry.update_mix(ids[1], MixParam::Solo(true)).unwrap();
        assert!(!registry.is_audible(ids[0]));
        assert!(registry.is_audible(ids[1]));
    }

    #[test]
    fn test_lone_muted_track_inaudible() {
        let (mut registry, ids) = registry_with(1);
        registry.update_mix(ids[0], MixParam::Mute(true)).unwrap();
        assert!(!registry.is_audible(ids[0]));
        assert_eq!(registry.audible_gain(ids[0]), 0.0);
    }

    #[test]
    fn test_muted_solo_stays_silent() {
        let (mut registry, ids) = registry_with(2);
        registry.update_mix(ids[0], MixParam::Solo(true)).unwrap();
        registry.update_mix(ids[0], MixParam::Mute(true)).unwrap();
        assert!(!registry.is_audible(ids[0]));
        assert!(!registry.is_audible(ids[1]));
    }

    #[test]
    fn test_stored_gain_preserved_when_silenced() {
        let (mut registry, ids) = registry_with(1);
        registry.update_mix(ids[0], MixParam::Gain(0.4)).unwrap();
        registry.update_mix(ids[0], MixParam::Mute(true)).unwrap();
        assert_eq!(registry.audible_gain(ids[0]), 0.0);
        assert_eq!(registry.get(ids[0]).unwrap().gain(), 0.4);

        registry.update_mix(ids[0], MixParam::Mute(false)).unwrap();
        assert_eq!(registry.audible_gain(ids[0]), 0.4);
    }

    #[test]
    fn test_clamp_on_write() {
        let (mut registry, ids) = registry_with(1);
        registry.update_mix(ids[0], MixParam::Gain(3.0)).unwrap();
        registry.update_mix(ids[0], MixParam::Pan(-9.0)).unwrap();
        let track = registry.get(ids[0]).unwrap();
        assert_eq!(track.gain(), 1.0);
        assert_eq!(track.pan(), -1.0);

        registry.update_mix(ids[0], MixParam::Gain(f32::NAN)).unwrap();
        assert_eq!(registry.get(ids[0]).unwrap().gain(), 1.0);
    }

    #[test]
    fn test_db_view() {
        let (mut registry, ids) = registry_with(1);
        registry.update_mix(ids[0], MixParam::GainDb(-6.0)).unwrap();
        let gain = registry.get(ids[0]).unwrap().gain();
        assert!((gain - 0.501).abs() < 1e-3);
        assert!((registry.get(ids[0]).unwrap().gain_db() + 6.0).abs() < 1e-3);

        registry.update_mix(ids[0], MixParam::GainDb(-80.0)).unwrap();
        assert_eq!(registry.get(ids[0]).unwrap().gain(), 0.0);
        assert_eq!(registry.get(ids[0]).unwrap().gain_db(), MIN_GAIN_DB);

        registry.update_mix(ids[0], MixParam::GainDb(12.0)).unwrap();
        assert_eq!(registry.get(ids[0]).unwrap().gain(), 1.0);
    }

    #[test]
    fn test_master_gain_scales_audible_gain() {
        let (mut registry, ids) = registry_with(1);
        registry.update_mix(ids[0], MixParam::Gain(0.5)).unwrap();
        registry.set_master_gain(0.5);
        assert_eq!(registry.audible_gain(ids[0]), 0.25);
    }

    #[test]
    fn test_unknown_track() {
        let (mut registry, _) = registry_with(0);
        let missing = TrackId(99);
        assert_eq!(
            registry.update_mix(missing, MixParam::Mute(true)),
            Err(RegistryError::UnknownTrack(missing))
        );
        assert!(registry.remove_track(missing, 0.0).is_err());
        assert!(!registry.is_audible(missing));
    }

    #[test]
    fn test_waveform_length_enforced() {
        let (mut registry, ids) = registry_with(1);
        registry
            .set_waveform(ids[0], Waveform::placeholder("x", 7))
            .unwrap();
        assert!(registry.get(ids[0]).unwrap().waveform().is_none());

        registry
            .set_waveform(ids[0], Waveform::placeholder("x", 4))
            .unwrap();
        assert!(registry.get(ids[0]).unwrap().is_placeholder());
    }

    #[test]
    fn test_remove_stops_source() {
        let mut registry = TrackRegistry::new(4);
        let mut source = BufferSource::new(vec![0.1f32; 1000].into(), 1000);
        source.start_at(0.0).unwrap();
        let id = registry.add_track(NewTrack::new("drums").source(Box::new(source)));
        assert_eq!(registry.duration_sec(), 1.0);

        let removed = registry.remove_track(id, 0.5).unwrap();
        let source = removed.source().unwrap();
        assert!(!source.is_playing());
        assert_eq!(source.position(9.0), 0.5);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_revision_bumps() {
        let (mut registry, ids) = registry_with(1);
        let before = registry.revision();
        registry.update_mix(ids[0], MixParam::Pan(0.3)).unwrap();
        assert!(registry.revision() > before);
    }
}
