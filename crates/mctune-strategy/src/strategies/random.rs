//! Random hill climbing

use crate::error::Result;
use crate::scorer::Scorer;
use crate::strategy::{random_transform, Optimum, RngSource, Strategy};
use std::time::{Duration, Instant};
use tracing::debug;

/// Hill climbing by random single-coordinate steps from the best known vector
#[derive(Debug)]
pub struct RandomSearch {
    rng: RngSource,
}

impl RandomSearch {
    /// Registry name
    pub const NAME: &'static str = "random";

    /// Create with a seed
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            rng: RngSource::new(seed),
        }
    }
}

impl Strategy for RandomSearch {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn optimize(&self, scorer: &Scorer, budget: Duration) -> Result<Optimum> {
        let deadline = Instant::now() + budget;
        let (mut best, mut best_score) = scorer.incumbent();
        if !scorer.domain().has_parameters() {
            return Optimum::decode(scorer, best, best_score);
        }

        let mut rng = self.rng.next_rng();
        let bounds = scorer.domain().bounds();
        debug!(score = best_score, "random search starts");
        while !scorer.should_stop() && Instant::now() < deadline {
            let mut candidate = best.clone();
            random_transform(&mut candidate, bounds, 1, &mut rng);
            let score = scorer.score_candidate(&candidate);
            if score > best_score {
                best = candidate;
                best_score = score;
            }
        }
        debug!(score = best_score, "random search ends");
        Optimum::decode(scorer, best, best_score)
    }
}
