//! Stem loading with candidate fallback
//!
//! A [`StemManifest`] lists, per stem type, the locations the audio may live
//! at in order of preference. Each candidate is handed to a
//! [`SourceResolver`]; the first one that decodes wins. When every candidate
//! fails the stem still becomes a track, just without a source and with a
//! placeholder waveform, so the session always shows one lane per stem.
//!
//! Two entry points:
//!
//! - [`load_manifest`] decodes everything (in parallel) and fills a registry
//!   before returning; used by tools and tests
//! - [`StemLoader`] decodes on a background thread; the session polls it on
//!   every tick and drops results for tracks that were removed meanwhile

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::{MediaSource, MediaSourceStream};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::error::{LoadError, LoadResult};
use crate::registry::{NewTrack, TrackRegistry};
use crate::source::BufferSource;
use crate::types::TrackId;
use crate::waveform::Waveform;

/// Largest remote stem we are willing to buffer (512 MiB)
const MAX_REMOTE_BYTES: u64 = 512 * 1024 * 1024;

// ─────────────────────────────────────────────────────────────────────────────
// Manifest
// ─────────────────────────────────────────────────────────────────────────────

/// One stem and where to find it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StemEntry {
    /// Stem type, e.g. "drums"
    pub stem: String,
    /// Locators to try, most preferred first
    pub candidates: Vec<String>,
}

/// Ordered stem-type → candidate locators mapping
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StemManifest {
    pub stems: Vec<StemEntry>,
}

impl StemManifest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a stem with its candidate locators
    pub fn with_stem<I, S>(mut self, stem: impl Into<String>, candidates: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.stems.push(StemEntry {
            stem: stem.into(),
            candidates: candidates.into_iter().map(Into::into).collect(),
        });
        self
    }

    /// Manifest for a directory of `<stem>.<ext>` files
    ///
    /// Every stem gets one candidate per extension, in the order given.
    pub fn from_layout(dir: &Path, stems: &[&str], extensions: &[&str]) -> Self {
        let stems = stems
            .iter()
            .map(|stem| StemEntry {
                stem: stem.to_string(),
                candidates: extensions
                    .iter()
                    .map(|ext| dir.join(format!("{}.{}", stem, ext)).to_string_lossy().into_owned())
                    .collect(),
            })
            .collect();
        Self { stems }
    }

    pub fn len(&self) -> usize {
        self.stems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stems.is_empty()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Resolvers
// ─────────────────────────────────────────────────────────────────────────────

/// Decoded, mono-mixed audio ready to become a [`BufferSource`]
#[derive(Clone)]
pub struct DecodedAudio {
    pub samples: Arc<[f32]>,
    pub sample_rate: u32,
    /// Channel count of the original resource
    pub channels: u16,
}

impl DecodedAudio {
    pub fn duration_sec(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate.max(1) as f64
    }
}

impl std::fmt::Debug for DecodedAudio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecodedAudio")
            .field("samples", &format!("<{} samples>", self.samples.len()))
            .field("sample_rate", &self.sample_rate)
            .field("channels", &self.channels)
            .finish()
    }
}

/// Turns a locator into decoded audio
pub trait SourceResolver: Send + Sync {
    fn resolve(&self, locator: &str) -> LoadResult<DecodedAudio>;
}

/// Resolves filesystem paths, relative ones against an optional base dir
#[derive(Debug, Clone, Default)]
pub struct FileResolver {
    base_dir: Option<PathBuf>,
}

impl FileResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: Some(base_dir.into()),
        }
    }

    fn path_for(&self, locator: &str) -> PathBuf {
        let path = Path::new(locator.strip_prefix("file://").unwrap_or(locator));
        match &self.base_dir {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        }
    }
}

impl SourceResolver for FileResolver {
    fn resolve(&self, locator: &str) -> LoadResult<DecodedAudio> {
        let path = self.path_for(locator);
        let file = std::fs::File::open(&path).map_err(|e| LoadError::Unreachable {
            locator: locator.to_string(),
            reason: e.to_string(),
        })?;
        let ext = path.extension().and_then(|e| e.to_str());
        decode(Box::new(file), ext, locator)
    }
}

/// Downloads `http(s)://` locators and decodes them in memory
#[derive(Debug, Clone)]
pub struct HttpResolver {
    agent: ureq::Agent,
}

impl HttpResolver {
    pub fn new(timeout: Duration) -> Self {
        Self {
            agent: ureq::AgentBuilder::new().timeout(timeout).build(),
        }
    }
}

impl SourceResolver for HttpResolver {
    fn resolve(&self, locator: &str) -> LoadResult<DecodedAudio> {
        let unreachable_err = |reason: String| LoadError::Unreachable {
            locator: locator.to_string(),
            reason,
        };

        log::debug!("[LOADER] downloading {}", locator);
        let response = self
            .agent
            .get(locator)
            .call()
            .map_err(|e| unreachable_err(e.to_string()))?;

        let mut bytes = Vec::new();
        response
            .into_reader()
            .take(MAX_REMOTE_BYTES)
            .read_to_end(&mut bytes)
            .map_err(|e| unreachable_err(e.to_string()))?;

        let ext = locator
            .rsplit('/')
            .next()
            .and_then(|name| name.split('?').next())
            .and_then(|name| name.rsplit_once('.'))
            .map(|(_, ext)| ext);
        decode(Box::new(std::io::Cursor::new(bytes)), ext, locator)
    }
}

/// Sends URLs to an [`HttpResolver`] and everything else to a [`FileResolver`]
#[derive(Debug, Clone)]
pub struct DefaultResolver {
    pub file: FileResolver,
    pub http: HttpResolver,
}

impl DefaultResolver {
    pub fn new(base_dir: Option<PathBuf>, timeout: Duration) -> Self {
        Self {
            file: FileResolver { base_dir },
            http: HttpResolver::new(timeout),
        }
    }
}

impl SourceResolver for DefaultResolver {
    fn resolve(&self, locator: &str) -> LoadResult<DecodedAudio> {
        if locator.starts_with("http://") || locator.starts_with("https://") {
            self.http.resolve(locator)
        } else {
            self.file.resolve(locator)
        }
    }
}

/// Decode any symphonia-supported stream into mono f32
fn decode(
    source: Box<dyn MediaSource>,
    extension: Option<&str>,
    locator: &str,
) -> LoadResult<DecodedAudio> {
    let decode_err = |reason: String| LoadError::Decode {
        locator: locator.to_string(),
        reason,
    };

    let mss = MediaSourceStream::new(source, Default::default());
    let mut hint = Hint::new();
    if let Some(ext) = extension {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| decode_err(e.to_string()))?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| decode_err("no audio track".to_string()))?;
    let track_id = track.id;
    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| decode_err("unknown sample rate".to_string()))?;
    let channels = track
        .codec_params
        .channels
        .map(|c| c.count() as u16)
        .unwrap_or(1)
        .max(1);

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| decode_err(e.to_string()))?;

    let mut mono: Vec<f32> = Vec::new();
    let mut sample_buf: Option<SampleBuffer<f32>> = None;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(e) => {
                log::warn!("[LOADER] {}: packet read stopped: {}", locator, e);
                break;
            }
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(e)) => {
                log::debug!("[LOADER] {}: skipping bad packet: {}", locator, e);
                continue;
            }
            Err(e) => return Err(decode_err(e.to_string())),
        };

        let buf = sample_buf.get_or_insert_with(|| {
            SampleBuffer::new(decoded.capacity() as u64, *decoded.spec())
        });
        buf.copy_interleaved_ref(decoded);

        let ch = channels as usize;
        mono.extend(
            buf.samples()
                .chunks_exact(ch)
                .map(|frame| frame.iter().sum::<f32>() / ch as f32),
        );
    }

    if mono.is_empty() {
        return Err(decode_err("stream contained no samples".to_string()));
    }

    Ok(DecodedAudio {
        samples: mono.into(),
        sample_rate,
        channels,
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Resolution
// ─────────────────────────────────────────────────────────────────────────────

/// A stem's audio together with the candidate that produced it
#[derive(Debug, Clone)]
pub struct ResolvedStem {
    pub locator: String,
    pub audio: DecodedAudio,
}

/// Try each candidate in order; first success wins
pub fn resolve_stem(resolver: &dyn SourceResolver, entry: &StemEntry) -> LoadResult<ResolvedStem> {
    let mut last_error = None;

    for locator in &entry.candidates {
        match resolver.resolve(locator) {
            Ok(audio) => {
                log::info!(
                    "[LOADER] {} <- {} ({:.1}s @ {}Hz)",
                    entry.stem,
                    locator,
                    audio.duration_sec(),
                    audio.sample_rate
                );
                return Ok(ResolvedStem {
                    locator: locator.clone(),
                    audio,
                });
            }
            Err(e) => {
                log::debug!("[LOADER] {} candidate failed: {}", entry.stem, e);
                last_error = Some(e);
            }
        }
    }

    match last_error {
        None => Err(LoadError::NoCandidates(entry.stem.clone())),
        Some(last) => Err(LoadError::Exhausted {
            stem: entry.stem.clone(),
            attempts: entry.candidates.len(),
            last: last.to_string(),
        }),
    }
}

/// Track for a stem that could not be loaded
pub fn placeholder_track(stem: &str, buckets: usize) -> NewTrack {
    NewTrack::new(stem)
        .stem(stem)
        .waveform(Waveform::placeholder(stem, buckets))
}

/// Track for a successfully resolved stem, waveform included
pub fn resolved_track(stem: &str, resolved: &ResolvedStem, buckets: usize) -> NewTrack {
    let audio = &resolved.audio;
    NewTrack::new(stem)
        .stem(stem)
        .source(Box::new(BufferSource::new(audio.samples.clone(), audio.sample_rate)))
        .waveform(Waveform::summarized(&audio.samples, buckets))
}

/// Per-stem outcome of [`load_manifest`]
#[derive(Debug, Clone)]
pub struct StemLoadReport {
    pub stem: String,
    pub track: TrackId,
    /// `None` when the stem loaded; the error when it fell back to a placeholder
    pub error: Option<LoadError>,
}

/// Resolve every stem (in parallel) and add one track per stem
///
/// Tracks are added in manifest order whatever order decoding finishes in.
pub fn load_manifest(
    registry: &mut TrackRegistry,
    resolver: &dyn SourceResolver,
    manifest: &StemManifest,
) -> Vec<StemLoadReport> {
    let buckets = registry.buckets();
    let resolved: Vec<LoadResult<ResolvedStem>> = manifest
        .stems
        .par_iter()
        .map(|entry| resolve_stem(resolver, entry))
        .collect();

    manifest
        .stems
        .iter()
        .zip(resolved)
        .map(|(entry, outcome)| match outcome {
            Ok(stem) => StemLoadReport {
                stem: entry.stem.clone(),
                track: registry.add_track(resolved_track(&entry.stem, &stem, buckets)),
                error: None,
            },
            Err(error) => {
                log::warn!("[LOADER] {}: {}; using placeholder", entry.stem, error);
                StemLoadReport {
                    stem: entry.stem.clone(),
                    track: registry.add_track(placeholder_track(&entry.stem, buckets)),
                    error: Some(error),
                }
            }
        })
        .collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Background loader
// ─────────────────────────────────────────────────────────────────────────────

/// Request to resolve one stem for an existing (placeholder) track
#[derive(Debug, Clone)]
pub struct LoadRequest {
    pub track: TrackId,
    pub generation: u64,
    pub entry: StemEntry,
}

/// Result of a background load
#[derive(Debug, Clone)]
pub struct LoadOutcome {
    pub track: TrackId,
    pub generation: u64,
    pub stem: String,
    pub result: LoadResult<ResolvedStem>,
}

/// Background stem decoding thread
pub struct StemLoader {
    tx: Sender<LoadRequest>,
    rx: Receiver<LoadOutcome>,
    _handle: JoinHandle<()>,
}

impl StemLoader {
    /// Spawn the loader thread around a resolver
    pub fn spawn(resolver: Arc<dyn SourceResolver>) -> std::io::Result<Self> {
        let (request_tx, request_rx) = mpsc::channel::<LoadRequest>();
        let (result_tx, result_rx) = mpsc::channel::<LoadOutcome>();

        let handle = thread::Builder::new()
            .name("stem-loader".to_string())
            .spawn(move || loader_thread(resolver, request_rx, result_tx))?;

        log::info!("StemLoader background thread started");

        Ok(Self {
            tx: request_tx,
            rx: result_rx,
            _handle: handle,
        })
    }

    /// Queue a load (non-blocking)
    pub fn load(&self, request: LoadRequest) -> Result<(), String> {
        self.tx
            .send(request)
            .map_err(|e| format!("Stem loader disconnected: {}", e))
    }

    /// Take one finished load, if any (non-blocking)
    pub fn try_recv(&self) -> Option<LoadOutcome> {
        match self.rx.try_recv() {
            Ok(outcome) => Some(outcome),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                log::error!("Stem loader thread disconnected unexpectedly");
                None
            }
        }
    }
}

fn loader_thread(
    resolver: Arc<dyn SourceResolver>,
    rx: Receiver<LoadRequest>,
    tx: Sender<LoadOutcome>,
) {
    while let Ok(request) = rx.recv() {
        let result = resolve_stem(resolver.as_ref(), &request.entry);
        let outcome = LoadOutcome {
            track: request.track,
            generation: request.generation,
            stem: request.entry.stem,
            result,
        };
        if tx.send(outcome).is_err() {
            break;
        }
    }
    log::debug!("StemLoader thread exiting");
}
