//! Background waveform summarization
//!
//! Summarizing a multi-minute stem touches millions of samples. The
//! [`SummaryWorker`] keeps that off the render tick:
//!
//! 1. The session submits a [`SummaryRequest`] tagged with track id and
//!    generation
//! 2. The worker thread reduces the buffer
//! 3. The session polls [`SummaryWorker::try_recv`] on its tick and drops
//!    results whose track was removed or re-requested since
//!
//! ```ignore
//! let worker = SummaryWorker::spawn()?;
//! worker.submit(SummaryRequest { track, generation: 1, samples, channels: 1, buckets: 200 })?;
//!
//! while let Some(result) = worker.try_recv() {
//!     registry.set_waveform(result.track, result.waveform)?;
//! }
//! ```

use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use super::{summarize_interleaved, Waveform};
use crate::types::TrackId;

/// Request to summarize one track's audio
pub struct SummaryRequest {
    pub track: TrackId,
    /// Bumped by the caller whenever the track's audio changes
    pub generation: u64,
    /// Interleaved samples
    pub samples: Arc<[f32]>,
    pub channels: usize,
    pub buckets: usize,
}

impl std::fmt::Debug for SummaryRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SummaryRequest")
            .field("track", &self.track)
            .field("generation", &self.generation)
            .field("samples", &format!("<{} samples>", self.samples.len()))
            .field("channels", &self.channels)
            .field("buckets", &self.buckets)
            .finish()
    }
}

/// Completed summary
#[derive(Debug, Clone)]
pub struct SummaryResult {
    pub track: TrackId,
    pub generation: u64,
    pub waveform: Waveform,
}

/// Dedicated summarization thread
pub struct SummaryWorker {
    tx: Sender<SummaryRequest>,
    rx: Receiver<SummaryResult>,
    _handle: JoinHandle<()>,
}

impl SummaryWorker {
    /// Spawn the worker thread
    pub fn spawn() -> std::io::Result<Self> {
        let (request_tx, request_rx) = mpsc::channel::<SummaryRequest>();
        let (result_tx, result_rx) = mpsc::channel::<SummaryResult>();

        let handle = thread::Builder::new()
            .name("waveform-summary".to_string())
            .spawn(move || summary_thread(request_rx, result_tx))?;

        log::info!("SummaryWorker background thread started");

        Ok(Self {
            tx: request_tx,
            rx: result_rx,
            _handle: handle,
        })
    }

    /// Queue a request (non-blocking)
    pub fn submit(&self, request: SummaryRequest) -> Result<(), String> {
        self.tx
            .send(request)
            .map_err(|e| format!("Summary worker disconnected: {}", e))
    }

    /// Take one finished result, if any (non-blocking)
    pub fn try_recv(&self) -> Option<SummaryResult> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                log::error!("Summary worker thread disconnected unexpectedly");
                None
            }
        }
    }
}

fn summary_thread(rx: Receiver<SummaryRequest>, tx: Sender<SummaryResult>) {
    while let Ok(request) = rx.recv() {
        let started = std::time::Instant::now();
        let peaks = summarize_interleaved(&request.samples, request.channels, request.buckets);

        log::debug!(
            "[SUMMARY] {} gen {}: {} samples -> {} buckets in {:?}",
            request.track,
            request.generation,
            request.samples.len(),
            peaks.len(),
            started.elapsed()
        );

        let result = SummaryResult {
            track: request.track,
            generation: request.generation,
            waveform: Waveform {
                peaks,
                placeholder: false,
            },
        };
        if tx.send(result).is_err() {
            break;
        }
    }
    log::debug!("SummaryWorker thread exiting");
}
