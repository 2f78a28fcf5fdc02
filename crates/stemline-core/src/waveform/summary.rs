//! Peak-absolute bucket reduction

/// Reduce mono samples to `buckets` peak-absolute values
///
/// Bucket size is `samples.len() / buckets`; the trailing remainder that
/// does not fill a whole bucket is ignored. When there are fewer samples
/// than buckets every bucket is empty and the result is all zeros.
/// Non-finite samples count as silence.
pub fn summarize(samples: &[f32], buckets: usize) -> Vec<f32> {
    if buckets == 0 {
        return Vec::new();
    }

    let bucket_len = samples.len() / buckets;
    if bucket_len == 0 {
        return vec![0.0; buckets];
    }

    samples
        .chunks_exact(bucket_len)
        .take(buckets)
        .map(peak_abs)
        .collect()
}

/// Reduce interleaved multi-channel samples to `buckets` peak-absolute values
///
/// Buckets are cut on frame boundaries and a frame's value is the loudest of
/// its channels, so a hard-panned part still shows up.
pub fn summarize_interleaved(samples: &[f32], channels: usize, buckets: usize) -> Vec<f32> {
    if channels <= 1 {
        return summarize(samples, buckets);
    }
    if buckets == 0 {
        return Vec::new();
    }

    let frames = samples.len() / channels;
    let frames_per_bucket = frames / buckets;
    if frames_per_bucket == 0 {
        return vec![0.0; buckets];
    }

    samples
        .chunks_exact(frames_per_bucket * channels)
        .take(buckets)
        .map(peak_abs)
        .collect()
}

#[inline]
fn peak_abs(slice: &[f32]) -> f32 {
    slice
        .iter()
        .filter(|s| s.is_finite())
        .fold(0.0f32, |peak, s| peak.max(s.abs()))
}
