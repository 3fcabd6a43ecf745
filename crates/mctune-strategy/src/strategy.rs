//! Strategy trait and shared helpers
//!
//! Provides the [`Strategy`] trait for pluggable local search over a fixed
//! parameter domain.

use crate::error::Result;
use crate::scorer::Scorer;
use mctune_space::Configuration;
use rand::rngs::StdRng;
use rand::seq::index;
use rand::{Rng, SeedableRng};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Result of one optimization run
#[derive(Debug, Clone, PartialEq)]
pub struct Optimum {
    /// Decoded best configuration
    pub configuration: Configuration,
    /// Best vector, clamped into the domain
    pub vector: Vec<f64>,
    /// Its score
    pub score: f64,
}

impl Optimum {
    /// Decode `vector` through the scorer's domain
    ///
    /// # Errors
    ///
    /// Returns an error if the vector does not fit the domain.
    pub fn decode(scorer: &Scorer, vector: Vec<f64>, score: f64) -> Result<Self> {
        let vector = scorer.domain().clamp(&vector);
        Ok(Self {
            configuration: scorer.domain().from_vector(&vector)?,
            vector,
            score,
        })
    }
}

/// Local search over the parameter domain of one strategy leaf
///
/// Implementations poll [`Scorer::should_stop`] and return their best-so-far
/// result once it is raised or the budget is spent.
pub trait Strategy: Send + Sync + std::fmt::Debug {
    /// Registry name
    fn name(&self) -> &'static str;

    /// Search for a high-scoring configuration within `budget`
    ///
    /// # Errors
    ///
    /// Returns an error only if the best vector cannot be decoded.
    fn optimize(&self, scorer: &Scorer, budget: Duration) -> Result<Optimum>;
}

/// Per-call random number generators derived from one seed
///
/// Strategies may be optimized from several rollouts at once, so each call
/// draws its own generator instead of sharing one behind a lock.
#[derive(Debug)]
pub struct RngSource {
    seed: u64,
    draws: AtomicU64,
}

impl RngSource {
    /// Source rooted at `seed`
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            draws: AtomicU64::new(0),
        }
    }

    /// Next independent generator
    pub fn next_rng(&self) -> StdRng {
        let draw = self.draws.fetch_add(1, Ordering::Relaxed);
        StdRng::seed_from_u64(self.seed ^ draw.wrapping_mul(0x9E37_79B9_7F4A_7C15))
    }
}

/// Move up to `changes` random coordinates by at most 0.5, staying within `bounds`
pub fn random_transform<R: Rng + ?Sized>(
    candidate: &mut [f64],
    bounds: &[(f64, f64)],
    changes: usize,
    rng: &mut R,
) {
    let changes = changes.min(candidate.len());
    for i in index::sample(rng, candidate.len(), changes) {
        let (min, max) = bounds[i];
        let lower = min.max(candidate[i] - 0.5);
        let upper = max.min(candidate[i] + 0.5);
        candidate[i] = if lower < upper {
            rng.gen_range(lower..=upper)
        } else {
            lower
        };
    }
}
