//! Seeded noise for stochastic state variables.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use siphasher::sip::SipHasher13;
use std::hash::Hasher;

use crate::types::VariantId;

/// Gaussian noise source driving Euler-Maruyama increments.
///
/// Each variant owns a substream of the study's master seed, derived by
/// hashing `(master_seed, variant_id)` with SipHash-1-3 under fixed zero keys.
/// A variant therefore draws the same noise whether it runs in the sequential
/// loop, on a parallel worker or as a cluster job.
#[derive(Debug, Clone)]
pub struct NoiseSource {
    rng: StdRng,
}

impl NoiseSource {
    /// Source seeded directly with `seed`.
    pub fn from_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Source for one variant of a study seeded with `master_seed`.
    pub fn for_variant(master_seed: u64, id: VariantId) -> Self {
        Self::from_seed(derive_substream_seed(master_seed, u64::from(id)))
    }

    /// Draws from N(0, 1) with the Box-Muller transform.
    pub fn standard_normal(&mut self) -> f64 {
        // shifted into (0, 1] so ln stays finite
        let u1: f64 = 1.0 - self.rng.gen::<f64>();
        let u2: f64 = self.rng.gen::<f64>();
        (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
    }

    /// Wiener increment over a step of length `dt`.
    pub fn wiener_increment(&mut self, dt: f64) -> f64 {
        dt.sqrt() * self.standard_normal()
    }
}

/// Derives the deterministic seed for a specific substream.
pub fn derive_substream_seed(master_seed: u64, substream: u64) -> u64 {
    let mut hasher = SipHasher13::new_with_keys(0, 0);
    hasher.write_u64(master_seed);
    hasher.write_u64(substream);
    hasher.finish()
}
