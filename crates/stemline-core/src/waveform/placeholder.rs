//! Deterministic demo waveforms for tracks without audio

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Lowest placeholder bucket value
const FLOOR: f32 = 0.05;

/// Highest placeholder bucket value
const CEILING: f32 = 0.95;

/// Stable 64-bit seed for a key (FNV-1a)
///
/// `std`'s hasher is not guaranteed stable across releases; placeholders
/// must look the same every time a session is opened.
pub fn seed_for_key(key: &str) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;

    key.bytes()
        .fold(OFFSET, |hash, byte| (hash ^ byte as u64).wrapping_mul(PRIME))
}

/// Generate a pseudo-waveform of `buckets` values strictly inside (0, 1)
///
/// The same key always yields the same shape. Raw values follow a bounded
/// random walk and are smoothed with a 3-tap average so the result reads
/// like program material rather than noise.
pub fn placeholder(seed_key: &str, buckets: usize) -> Vec<f32> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed_for_key(seed_key));

    let mut level: f32 = rng.random_range(0.3..0.7);
    let raw: Vec<f32> = (0..buckets)
        .map(|_| {
            level = (level + rng.random_range(-0.15..0.15)).clamp(FLOOR, CEILING);
            // Per-bucket jitter on top of the envelope
            (level * rng.random_range(0.75..1.0)).clamp(FLOOR, CEILING)
        })
        .collect();

    (0..buckets)
        .map(|i| {
            let prev = raw[i.saturating_sub(1)];
            let next = raw[(i + 1).min(buckets - 1)];
            ((prev + raw[i] + next) / 3.0).clamp(FLOOR, CEILING)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_length_and_range() {
        let peaks = placeholder("bass", 200);
        assert_eq!(peaks.len(), 200);
        assert!(peaks.iter().all(|&p| p > 0.0 && p < 1.0));
    }

    #[test]
    fn test_deterministic_per_key() {
        assert_eq!(placeholder("drums", 200), placeholder("drums", 200));
        assert_ne!(placeholder("drums", 200), placeholder("vocals", 200));
    }

    #[test]
    fn test_empty_and_single() {
        assert!(placeholder("x", 0).is_empty());
        assert_eq!(placeholder("x", 1).len(), 1);
    }

    #[test]
    fn test_seed_is_fnv1a() {
        assert_eq!(seed_for_key(""), 0xcbf2_9ce4_8422_2325);
        assert_eq!(seed_for_key("a"), 0xaf63_dc4c_8601_ec8c);
    }
}
