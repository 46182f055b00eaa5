//! Random source for simulated telemetry

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Source of uniform values in `[0, 1)`.
///
/// The sampler draws every simulated value through this trait so tests can
/// substitute a fixed sequence.
pub trait RandomSource: Send {
    /// Next value in `[0, 1)`
    fn next_unit(&mut self) -> f64;
}

/// Entropy-seeded standard generator
pub struct StdRandom {
    rng: StdRng,
}

impl StdRandom {
    /// Seed from OS entropy
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Reproducible generator
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Default for StdRandom {
    fn default() -> Self {
        Self::new()
    }
}

impl RandomSource for StdRandom {
    fn next_unit(&mut self) -> f64 {
        self.rng.gen::<f64>()
    }
}

/// Uniform integer in `lo..=hi`
pub(crate) fn range_inclusive(random: &mut dyn RandomSource, lo: u32, hi: u32) -> u32 {
    if hi <= lo {
        return lo;
    }
    let span = (hi - lo + 1) as f64;
    let offset = (random.next_unit().clamp(0.0, 1.0) * span).floor() as u32;
    (lo + offset).min(hi)
}
