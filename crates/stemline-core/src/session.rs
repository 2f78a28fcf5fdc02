//! Session - the injectable state container
//!
//! A [`Session`] owns the track registry, transport, level meter and the
//! background workers, and is driven by its owner in two ways:
//!
//! - [`Session::handle`] applies one [`SessionCommand`]
//! - [`Session::tick`] is called at frame cadence; it applies finished
//!   background work, advances the transport, meters levels and returns the
//!   [`SessionEvent`]s produced since the previous tick
//!
//! Background results are tagged with `(TrackId, generation)`. A result whose
//! track was removed, or whose load was superseded by a newer one, is dropped.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::config::SessionConfig;
use crate::error::{LoadError, RegistryError, SessionError, SessionResult};
use crate::loader::{placeholder_track, LoadOutcome, LoadRequest, SourceResolver, StemEntry, StemLoader, StemManifest};
use crate::meter::{LevelMeter, LevelSample};
use crate::registry::{MixParam, TrackRegistry};
use crate::remote::{JobClient, JobOutcome, JobRequest, JobTicket, RemoteJobs};
use crate::source::{BufferSource, Clock, SystemClock};
use crate::transport::{PlayReport, Transport, TransportEvent, TransportState};
use crate::types::{TimeSignature, TrackId};
use crate::updates::{
    FallbackSubscription, StatusEndpoint, SubscriptionMode, UpdateEvent, UpdateSubscription,
};
use crate::waveform::{SummaryRequest, SummaryResult, SummaryWorker};

/// Commands accepted by [`Session::handle`]
#[derive(Debug, Clone)]
pub enum SessionCommand {
    /// Add one placeholder track per stem and load them in the background
    LoadManifest(StemManifest),
    LoadStem(StemEntry),
    /// Load a track's stem again (e.g. after a failure)
    ReloadTrack(TrackId),
    RemoveTrack(TrackId),
    Play,
    Pause,
    Stop,
    TogglePlay,
    Seek(f64),
    SetTempo(f64),
    SetTimeSignature(TimeSignature),
    SetSnap(bool),
    SetMix { track: TrackId, param: MixParam },
    SetMasterGain(f32),
    Rename { track: TrackId, name: String },
    SubmitJob(JobRequest),
}

/// Everything observable that happened in the session
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Track created (as a placeholder until its stem loads)
    TrackAdded { track: TrackId, stem: String },
    TrackLoaded {
        track: TrackId,
        stem: String,
        locator: String,
    },
    /// Stem could not be loaded; the track keeps its placeholder
    LoadFailed {
        track: TrackId,
        stem: String,
        error: LoadError,
    },
    WaveformReady { track: TrackId },
    TrackRemoved { track: TrackId },
    /// Playback started with some tracks excluded
    PartialStart(PlayReport),
    Transport(TransportEvent),
    /// Push channel failed, updates now come from polling
    UpdatesFellBack,
    /// Transport state reported by the remote service
    RemoteTransport {
        cursor_sec: f64,
        playing: bool,
        tempo_bpm: Option<f64>,
    },
    CpuLoad(f32),
    JobFinished(JobOutcome),
}

/// Builder for [`Session`]; every collaborator is injectable
pub struct SessionBuilder {
    config: SessionConfig,
    clock: Option<Arc<dyn Clock>>,
    resolver: Option<Arc<dyn SourceResolver>>,
    push: Option<Box<dyn UpdateSubscription>>,
    status: Option<Arc<dyn StatusEndpoint>>,
    jobs: Option<Arc<dyn RemoteJobs>>,
}

impl SessionBuilder {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            clock: None,
            resolver: None,
            push: None,
            status: None,
            jobs: None,
        }
    }

    /// Defaults to [`SystemClock`]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn resolver(mut self, resolver: Arc<dyn SourceResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Push update channel
    pub fn push_updates(mut self, subscription: Box<dyn UpdateSubscription>) -> Self {
        self.push = Some(subscription);
        self
    }

    /// Polled status endpoints, used when push is unavailable or fails
    pub fn status_endpoint(mut self, endpoint: Arc<dyn StatusEndpoint>) -> Self {
        self.status = Some(endpoint);
        self
    }

    pub fn jobs(mut self, jobs: Arc<dyn RemoteJobs>) -> Self {
        self.jobs = Some(jobs);
        self
    }

    pub fn build(self) -> SessionResult<Session> {
        let config = self.config;
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock::new()));
        let resolver = self.resolver.ok_or_else(|| SessionError::Worker {
            worker: "stem-loader",
            reason: "no source resolver configured".to_string(),
        })?;

        let loader = StemLoader::spawn(resolver).map_err(|e| SessionError::Worker {
            worker: "stem-loader",
            reason: e.to_string(),
        })?;
        let summarizer = SummaryWorker::spawn().map_err(|e| SessionError::Worker {
            worker: "waveform-summary",
            reason: e.to_string(),
        })?;
        let jobs = match self.jobs {
            Some(jobs) => Some(JobClient::spawn(jobs).map_err(|reason| SessionError::Worker {
                worker: "job-service",
                reason,
            })?),
            None => None,
        };

        let push = if config.updates.prefer_push { self.push } else { None };
        let updates: Option<Box<dyn UpdateSubscription>> = match (push, self.status) {
            (push, Some(endpoint)) => Some(Box::new(FallbackSubscription::new(
                push,
                endpoint,
                config.updates.poll_interval(),
            ))),
            (Some(push), None) => Some(push),
            (None, None) => None,
        };

        log::info!(
            "[SESSION] created ({} buckets, latency {} ms, drift {} ms, updates: {:?})",
            config.waveform.buckets,
            config.transport.start_latency_ms,
            config.transport.max_drift_ms,
            updates.as_ref().map(|u| u.mode())
        );

        Ok(Session {
            registry: TrackRegistry::new(config.waveform.buckets),
            transport: Transport::new(clock.clone(), &config.transport),
            meter: LevelMeter::from_config(&config.meter),
            clock,
            loader,
            summarizer,
            updates,
            jobs,
            generations: HashMap::new(),
            entries: HashMap::new(),
            next_generation: 1,
            cpu_load: None,
            events: Vec::new(),
            config,
        })
    }
}

/// One open multi-track session
pub struct Session {
    config: SessionConfig,
    clock: Arc<dyn Clock>,
    registry: TrackRegistry,
    transport: Transport,
    meter: LevelMeter,
    loader: StemLoader,
    summarizer: SummaryWorker,
    updates: Option<Box<dyn UpdateSubscription>>,
    jobs: Option<JobClient>,
    /// Latest load generation per track; older results are stale
    generations: HashMap<TrackId, u64>,
    /// Stem each track was loaded from, for reloads
    entries: HashMap<TrackId, StemEntry>,
    next_generation: u64,
    cpu_load: Option<f32>,
    events: Vec<SessionEvent>,
}

impl Session {
    pub fn builder(config: SessionConfig) -> SessionBuilder {
        SessionBuilder::new(config)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Read access
    // ─────────────────────────────────────────────────────────────────────

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn registry(&self) -> &TrackRegistry {
        &self.registry
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    pub fn transport_state(&self) -> &TransportState {
        self.transport.state()
    }

    pub fn cursor(&self) -> f64 {
        self.transport.cursor()
    }

    pub fn meter(&self) -> &LevelMeter {
        &self.meter
    }

    pub fn level(&self, track: TrackId) -> LevelSample {
        self.meter.level(track)
    }

    /// Last CPU load reported by the remote service
    pub fn cpu_load(&self) -> Option<f32> {
        self.cpu_load
    }

    pub fn update_mode(&self) -> Option<SubscriptionMode> {
        self.updates.as_ref().map(|u| u.mode())
    }

    /// Loads still waiting for a result
    pub fn pending_loads(&self) -> usize {
        self.generations.len()
    }

    pub fn now(&self) -> f64 {
        self.clock.now()
    }

    // ─────────────────────────────────────────────────────────────────────
    // Commands
    // ─────────────────────────────────────────────────────────────────────

    pub fn handle(&mut self, command: SessionCommand) -> SessionResult<()> {
        log::debug!("[SESSION] {:?}", command);
        match command {
            SessionCommand::LoadManifest(manifest) => {
                for entry in manifest.stems {
                    self.load_stem(entry)?;
                }
            }
            SessionCommand::LoadStem(entry) => {
                self.load_stem(entry)?;
            }
            SessionCommand::ReloadTrack(track) => self.reload_track(track)?,
            SessionCommand::RemoveTrack(track) => self.remove_track(track)?,
            SessionCommand::Play => {
                self.play();
            }
            SessionCommand::Pause => self.transport.pause(&mut self.registry),
            SessionCommand::Stop => self.transport.stop(&mut self.registry),
            SessionCommand::TogglePlay => {
                if self.transport.is_playing() {
                    self.transport.pause(&mut self.registry);
                } else {
                    self.play();
                }
            }
            SessionCommand::Seek(sec) => {
                self.transport.seek(&mut self.registry, sec);
            }
            SessionCommand::SetTempo(bpm) => self.transport.set_tempo(bpm),
            SessionCommand::SetTimeSignature(sig) => self.transport.set_time_signature(sig),
            SessionCommand::SetSnap(enabled) => self.transport.set_snap_enabled(enabled),
            SessionCommand::SetMix { track, param } => {
                self.registry.update_mix(track, param)?;
                self.transport.sync_mix(&mut self.registry);
            }
            SessionCommand::SetMasterGain(gain) => {
                self.registry.set_master_gain(gain);
                self.transport.sync_mix(&mut self.registry);
            }
            SessionCommand::Rename { track, name } => self.registry.rename(track, name)?,
            SessionCommand::SubmitJob(request) => {
                self.submit_job(request)?;
            }
        }
        Ok(())
    }

    /// Add a placeholder track for `entry` and queue its load
    pub fn load_stem(&mut self, entry: StemEntry) -> SessionResult<TrackId> {
        let track = self
            .registry
            .add_track(placeholder_track(&entry.stem, self.registry.buckets()));
        self.events.push(SessionEvent::TrackAdded {
            track,
            stem: entry.stem.clone(),
        });
        self.entries.insert(track, entry.clone());
        self.request_load(track, entry)?;
        Ok(track)
    }

    /// Queue a new load for an existing track, superseding any pending one
    pub fn reload_track(&mut self, track: TrackId) -> SessionResult<()> {
        if !self.registry.contains(track) {
            return Err(RegistryError::UnknownTrack(track).into());
        }
        let entry = self
            .entries
            .get(&track)
            .cloned()
            .ok_or(SessionError::NotReloadable(track))?;
        self.request_load(track, entry)
    }

    pub fn remove_track(&mut self, track: TrackId) -> SessionResult<()> {
        let now = self.clock.now();
        self.registry.remove_track(track, now)?;
        self.generations.remove(&track);
        self.entries.remove(&track);
        self.events.push(SessionEvent::TrackRemoved { track });
        Ok(())
    }

    pub fn play(&mut self) -> PlayReport {
        let report = self.transport.play(&mut self.registry);
        if report.is_partial() {
            self.events.push(SessionEvent::PartialStart(report.clone()));
        }
        report
    }

    pub fn submit_job(&mut self, request: JobRequest) -> SessionResult<JobTicket> {
        let jobs = self.jobs.as_mut().ok_or_else(|| SessionError::Worker {
            worker: "job-service",
            reason: "no remote job client configured".to_string(),
        })?;
        Ok(jobs.submit(request)?)
    }

    fn request_load(&mut self, track: TrackId, entry: StemEntry) -> SessionResult<()> {
        let generation = self.next_generation;
        self.next_generation += 1;
        self.generations.insert(track, generation);

        log::info!("[SESSION] loading '{}' into {} (gen {})", entry.stem, track, generation);
        self.loader
            .load(LoadRequest {
                track,
                generation,
                entry,
            })
            .map_err(|reason| SessionError::Worker {
                worker: "stem-loader",
                reason,
            })
    }

    // ─────────────────────────────────────────────────────────────────────
    // Tick
    // ─────────────────────────────────────────────────────────────────────

    /// Advance the session by one frame and return what happened
    pub fn tick(&mut self) -> Vec<SessionEvent> {
        while let Some(outcome) = self.loader.try_recv() {
            self.apply_load(outcome);
        }
        while let Some(result) = self.summarizer.try_recv() {
            self.apply_summary(result);
        }

        self.transport.tick(&mut self.registry);
        let now = self.clock.now();
        self.meter
            .poll(now, &self.registry, self.transport.is_playing());

        // Remote levels go in after local metering so they win this frame
        self.poll_updates();

        if let Some(jobs) = self.jobs.as_ref() {
            while let Some(outcome) = jobs.try_recv() {
                self.events.push(SessionEvent::JobFinished(outcome));
            }
        }

        for event in self.transport.drain_events() {
            self.events.push(SessionEvent::Transport(event));
        }
        std::mem::take(&mut self.events)
    }

    fn is_current(&self, track: TrackId, generation: u64) -> bool {
        self.registry.contains(track) && self.generations.get(&track) == Some(&generation)
    }

    fn apply_load(&mut self, outcome: LoadOutcome) {
        let LoadOutcome {
            track,
            generation,
            stem,
            result,
        } = outcome;

        if !self.is_current(track, generation) {
            log::debug!("[SESSION] dropping stale load of '{}' for {} (gen {})", stem, track, generation);
            return;
        }

        match result {
            Ok(resolved) => {
                let audio = resolved.audio;
                let source = BufferSource::new(audio.samples.clone(), audio.sample_rate);
                match self.registry.set_source(track, Box::new(source)) {
                    Ok(Some(mut previous)) => previous.stop(self.clock.now()),
                    Ok(None) => {}
                    Err(e) => {
                        log::debug!("[SESSION] {}", e);
                        return;
                    }
                }

                let request = SummaryRequest {
                    track,
                    generation,
                    samples: audio.samples,
                    channels: 1,
                    buckets: self.registry.buckets(),
                };
                if let Err(e) = self.summarizer.submit(request) {
                    log::error!("[SESSION] waveform summary not queued for {}: {}", track, e);
                    self.generations.remove(&track);
                }

                // Joins playback if the transport is already running
                self.transport.sync_mix(&mut self.registry);
                self.events.push(SessionEvent::TrackLoaded {
                    track,
                    stem,
                    locator: resolved.locator,
                });
            }
            Err(error) => {
                log::warn!("[SESSION] {} ('{}') stays a placeholder: {}", track, stem, error);
                self.generations.remove(&track);
                self.events.push(SessionEvent::LoadFailed { track, stem, error });
            }
        }
    }

    fn apply_summary(&mut self, result: SummaryResult) {
        if !self.is_current(result.track, result.generation) {
            log::debug!(
                "[SESSION] dropping stale waveform for {} (gen {})",
                result.track,
                result.generation
            );
            return;
        }
        self.generations.remove(&result.track);
        if self.registry.set_waveform(result.track, result.waveform).is_ok() {
            self.events.push(SessionEvent::WaveformReady {
                track: result.track,
            });
        }
    }

    fn poll_updates(&mut self) {
        let Some(updates) = self.updates.as_mut() else {
            return;
        };
        let before = updates.mode();
        let polled = updates.poll();
        let after = updates.mode();

        if before == SubscriptionMode::Push && after == SubscriptionMode::Polling {
            self.events.push(SessionEvent::UpdatesFellBack);
        }

        let events = match polled {
            Ok(events) => events,
            Err(e) => {
                log::warn!("[SESSION] update channel lost with no fallback: {}", e);
                self.updates = None;
                return;
            }
        };

        for event in events {
            match event {
                UpdateEvent::LevelUpdate { levels } => {
                    for level in levels {
                        let Some(track) = self.registry.find_stem(&level.stem).map(|t| t.id()) else {
                            log::debug!("[SESSION] level for unknown stem '{}'", level.stem);
                            continue;
                        };
                        self.meter.ingest(
                            &self.registry,
                            track,
                            LevelSample::new(level.peak, level.rms),
                        );
                    }
                }
                UpdateEvent::TransportUpdate {
                    cursor_sec,
                    playing,
                    tempo_bpm,
                } => self.events.push(SessionEvent::RemoteTransport {
                    cursor_sec,
                    playing,
                    tempo_bpm,
                }),
                UpdateEvent::CpuUpdate { load } => {
                    let load = if load.is_finite() { load.clamp(0.0, 1.0) } else { 0.0 };
                    self.cpu_load = Some(load);
                    self.events.push(SessionEvent::CpuLoad(load));
                }
            }
        }
    }

    /// Tick until no loads are pending or `timeout` elapses, collecting events
    ///
    /// Meant for headless drivers; interactive owners call [`Session::tick`].
    pub fn settle(&mut self, timeout: Duration) -> Vec<SessionEvent> {
        let deadline = std::time::Instant::now() + timeout;
        let mut events = self.tick();
        while self.pending_loads() > 0 && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(2));
            events.extend(self.tick());
        }
        events
    }
}
