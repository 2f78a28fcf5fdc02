//! Waveform summaries for track lanes
//!
//! A [`Waveform`] is a fixed number of non-negative bucket values, one per
//! contiguous slice of the source. Renderers map bucket index straight to a
//! fraction of the lane width, so every track in a session shares the same
//! bucket count.
//!
//! Reduction policy: **peak absolute amplitude** per bucket. Peaks keep
//! transients visible at low bucket counts, where a mean-abs reduction
//! flattens drums into the body of the track.
//!
//! When a stem fails to load, [`placeholder`] supplies a deterministic
//! pseudo-waveform so the lane is never empty. The [`Waveform::placeholder`]
//! flag is the only way to tell the two apart.

mod placeholder;
mod summary;
mod worker;

pub use placeholder::{placeholder, seed_for_key};
pub use summary::{summarize, summarize_interleaved};
pub use worker::{SummaryRequest, SummaryResult, SummaryWorker};

/// Summarized waveform of one track
#[derive(Debug, Clone, PartialEq)]
pub struct Waveform {
    /// Bucket values, each >= 0
    pub peaks: Vec<f32>,
    /// True when `peaks` is synthesized demo content, not real audio
    pub placeholder: bool,
}

impl Waveform {
    /// Summarize mono samples into `buckets` peak values
    pub fn summarized(samples: &[f32], buckets: usize) -> Self {
        Self {
            peaks: summarize(samples, buckets),
            placeholder: false,
        }
    }

    /// Deterministic stand-in for a track whose audio could not be loaded
    pub fn placeholder(seed_key: &str, buckets: usize) -> Self {
        Self {
            peaks: placeholder(seed_key, buckets),
            placeholder: true,
        }
    }

    pub fn len(&self) -> usize {
        self.peaks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peaks.is_empty()
    }

    /// Largest bucket value (0 for an empty waveform)
    pub fn max_peak(&self) -> f32 {
        self.peaks.iter().copied().fold(0.0, f32::max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_distinguishes_placeholder() {
        let real = Waveform::summarized(&[0.5; 400], 200);
        let fake = Waveform::placeholder("bass", 200);
        assert!(!real.placeholder);
        assert!(fake.placeholder);
        assert_eq!(real.len(), fake.len());
    }

    #[test]
    fn test_max_peak() {
        let wf = Waveform::summarized(&[0.1, -0.9, 0.3, 0.2], 2);
        assert_eq!(wf.max_peak(), 0.9);
        assert_eq!(Waveform::summarized(&[], 0).max_peak(), 0.0);
    }
}
