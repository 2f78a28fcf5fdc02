//! Stemline Player - headless multi-stem session driver
//!
//! Loads a stem manifest (or a directory of stems), starts every track in
//! sync and ticks the session until the run length or the end of the
//! longest stem is reached, logging transport and meter activity.
//!
//! ## Command line flags
//!
//! - `--config <path>`: config file (default ~/.config/stemline/player.yaml)
//! - `--manifest <path>`: YAML stem manifest
//! - `--stems <dir>`: directory of `<stem>.<ext>` files
//! - `--seconds <n>`: stop after n seconds of playback
//! - `--init-config`: write the effective config back to the config path

mod config;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

use config::PlayerConfig;
use stemline_core::config::{load_config, save_config};
use stemline_core::grid;
use stemline_core::loader::DefaultResolver;
use stemline_core::remote::HttpJobClient;
use stemline_core::session::{Session, SessionCommand, SessionEvent};
use stemline_core::transport::{TransportEvent, TransportState};
use stemline_core::updates::HttpStatusEndpoint;

/// Upper bound on waiting for the initial stem loads
const LOAD_TIMEOUT: Duration = Duration::from_secs(60);

/// Command line overrides
#[derive(Debug, Default)]
struct Args {
    config: Option<PathBuf>,
    manifest: Option<PathBuf>,
    stems: Option<PathBuf>,
    seconds: Option<f64>,
    init_config: bool,
}

fn parse_args(args: impl IntoIterator<Item = String>) -> Result<Args> {
    let mut parsed = Args::default();
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        let mut value = |flag: &str| {
            args.next()
                .with_context(|| format!("{} expects a value", flag))
        };
        match arg.as_str() {
            "--config" => parsed.config = Some(PathBuf::from(value("--config")?)),
            "--manifest" => parsed.manifest = Some(PathBuf::from(value("--manifest")?)),
            "--stems" => parsed.stems = Some(PathBuf::from(value("--stems")?)),
            "--seconds" => {
                let raw = value("--seconds")?;
                let seconds = raw
                    .parse::<f64>()
                    .with_context(|| format!("Invalid --seconds value {:?}", raw))?;
                parsed.seconds = Some(seconds);
            }
            "--init-config" => parsed.init_config = true,
            other => anyhow::bail!("Unknown argument {:?}", other),
        }
    }
    Ok(parsed)
}

/// `bar.beat` position of a cursor, both 1-based
fn format_position(state: &TransportState) -> String {
    let beat_len = grid::seconds_per_beat(state.tempo_bpm);
    let beats = (state.cursor_sec / beat_len).floor() as u64;
    let per_bar = state.time_signature.beats_per_bar as u64;
    format!("{}.{}", beats / per_bar + 1, beats % per_bar + 1)
}

fn main() -> Result<()> {
    // Initialize logger - set RUST_LOG=debug for verbose output
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let args = parse_args(std::env::args().skip(1))?;

    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║                     Stemline Player                          ║");
    println!("║              synchronized multi-stem playback                ║");
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();

    let config_path = args.config.clone().unwrap_or_else(config::default_config_path);
    let mut config: PlayerConfig = load_config(&config_path);
    if args.manifest.is_some() {
        config.manifest_path = args.manifest;
        config.stem_dir = None;
    }
    if args.stems.is_some() {
        config.stem_dir = args.stems;
        config.manifest_path = None;
    }
    if let Some(seconds) = args.seconds {
        config.run_seconds = seconds.max(0.0);
    }
    if args.init_config {
        save_config(&config, &config_path)?;
        log::info!("Wrote config to {:?}", config_path);
    }

    let manifest = config.manifest()?;
    let mut session = build_session(&config)?;

    session
        .handle(SessionCommand::LoadManifest(manifest))
        .context("Failed to queue stem loads")?;
    for event in session.settle(LOAD_TIMEOUT) {
        log_event(&event);
    }
    if session.pending_loads() > 0 {
        log::warn!("{} stems still loading after {:?}", session.pending_loads(), LOAD_TIMEOUT);
    }
    log::info!(
        "Session ready: {} tracks, {:.2}s",
        session.registry().len(),
        session.registry().duration_sec()
    );

    let report = session.play();
    if report.is_partial() {
        for (track, error) in &report.failed {
            log::warn!("{} sits out this pass: {}", track, error);
        }
    }
    log::info!("Started {} tracks", report.started.len());

    run(&mut session, &config);

    session.handle(SessionCommand::Stop)?;
    for event in session.tick() {
        log_event(&event);
    }
    log::info!("stemline-player finished");
    Ok(())
}

fn build_session(config: &PlayerConfig) -> Result<Session> {
    let remote = &config.session.remote;
    let resolver = Arc::new(DefaultResolver::new(config.base_dir(), remote.timeout()));

    let mut builder = Session::builder(config.session.clone())
        .resolver(resolver)
        .jobs(Arc::new(HttpJobClient::from_config(remote)));
    if config.remote_status {
        log::info!("Polling remote status at {}", remote.api_base_url);
        builder = builder.status_endpoint(Arc::new(HttpStatusEndpoint::new(
            remote.api_base_url.clone(),
            remote.timeout(),
        )));
    }

    builder
        .build()
        .map_err(|e| anyhow::anyhow!("Failed to build session: {}", e))
}

/// Tick until the run length elapses or playback reaches the end
fn run(session: &mut Session, config: &PlayerConfig) {
    let tick = Duration::from_millis(config.tick_ms.max(1));
    let report_every = config.report_ms as f64 / 1000.0;
    let started_at = session.now();
    let mut last_report = started_at;

    loop {
        let mut finished = false;
        for event in session.tick() {
            if matches!(event, SessionEvent::Transport(TransportEvent::ReachedEnd { .. })) {
                finished = true;
            }
            log_event(&event);
        }

        let now = session.now();
        if now - last_report >= report_every {
            last_report = now;
            report(session);
        }

        if finished || !session.transport().is_playing() {
            break;
        }
        if config.run_seconds > 0.0 && now - started_at >= config.run_seconds {
            log::info!("Run length of {:.1}s reached", config.run_seconds);
            break;
        }
        std::thread::sleep(tick);
    }
}

fn report(session: &Session) {
    let state = session.transport_state();
    let master = session.meter().master();
    let meters: Vec<String> = session
        .registry()
        .iter()
        .map(|track| {
            let level = session.level(track.id());
            format!("{}={:.2}", track.name(), level.peak)
        })
        .collect();
    log::info!(
        "[{}] {:.2}s  master {:.2}  {}{}",
        format_position(state),
        state.cursor_sec,
        master.peak,
        meters.join(" "),
        session
            .cpu_load()
            .map(|load| format!("  cpu {:.0}%", load * 100.0))
            .unwrap_or_default()
    );
}

fn log_event(event: &SessionEvent) {
    match event {
        SessionEvent::TrackAdded { track, stem } => log::debug!("{} added for '{}'", track, stem),
        SessionEvent::TrackLoaded { track, stem, locator } => {
            log::info!("{} '{}' loaded from {}", track, stem, locator)
        }
        SessionEvent::LoadFailed { track, stem, error } => {
            log::warn!("{} '{}' failed to load: {}", track, stem, error)
        }
        SessionEvent::UpdatesFellBack => log::warn!("Update channel fell back to polling"),
        SessionEvent::Transport(TransportEvent::Resynced { track, drift_sec }) => {
            log::info!("{} resynced ({:.1} ms drift)", track, drift_sec * 1000.0)
        }
        SessionEvent::Transport(TransportEvent::ReachedEnd { position_sec }) => {
            log::info!("Reached end at {:.2}s", position_sec)
        }
        SessionEvent::JobFinished(outcome) => match &outcome.result {
            Ok(_) => log::info!("Job {:?} ({}) finished", outcome.ticket, outcome.kind),
            Err(e) => log::warn!("Job {:?} ({}) failed: {}", outcome.ticket, outcome.kind, e),
        },
        other => log::debug!("{:?}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stemline_core::TimeSignature;

    fn args(list: &[&str]) -> Result<Args> {
        parse_args(list.iter().map(|s| s.to_string()))
    }

    #[test]
    fn test_parse_args() {
        let parsed = args(&["--stems", "/music/song", "--seconds", "8", "--init-config"]).unwrap();
        assert_eq!(parsed.stems, Some(PathBuf::from("/music/song")));
        assert_eq!(parsed.seconds, Some(8.0));
        assert!(parsed.init_config);
        assert!(parsed.manifest.is_none());

        assert!(args(&["--seconds"]).is_err());
        assert!(args(&["--seconds", "soon"]).is_err());
        assert!(args(&["--loud"]).is_err());
    }

    #[test]
    fn test_format_position() {
        let mut state = TransportState::default();
        assert_eq!(format_position(&state), "1.1");

        // 120 bpm 4/4: beat = 0.5s
        state.cursor_sec = 2.75;
        assert_eq!(format_position(&state), "2.2");

        state.time_signature = TimeSignature::new(3, 4);
        assert_eq!(format_position(&state), "2.3");
    }
}
