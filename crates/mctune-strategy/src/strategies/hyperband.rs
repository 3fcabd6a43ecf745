//! Hyperband-style successive halving
//!
//! Each run walks the brackets `s = s_max..=0`. A bracket starts with
//! `ceil(B / max_iter / (s + 1) * eta^s)` candidates, perturbs and scores them
//! in rounds, and keeps the best `1 / eta` after every round. Runs repeat while
//! the projected duration of the next run still fits the budget.

use crate::error::Result;
use crate::scorer::Scorer;
use crate::strategy::{random_transform, Optimum, RngSource, Strategy};
use rand::Rng;
use std::time::{Duration, Instant};
use tracing::debug;

const TOP_POOL: usize = 50;

/// Successive-halving search
#[derive(Debug)]
pub struct Hyperband {
    max_iter: u32,
    eta: u32,
    rng: RngSource,
}

impl Hyperband {
    /// Registry name
    pub const NAME: &'static str = "hyperband";

    /// Create with a seed, `max_iter = 81` and `eta = 3`
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            max_iter: 81,
            eta: 3,
            rng: RngSource::new(seed),
        }
    }

    /// Largest `s` with `eta^s <= max_iter`
    fn s_max(&self) -> u32 {
        let mut s = 0;
        let mut power = u64::from(self.eta);
        while power <= u64::from(self.max_iter) {
            s += 1;
            power *= u64::from(self.eta);
        }
        s
    }

    /// Initial candidate count of bracket `s`
    fn bracket_size(&self, s: u32) -> usize {
        let budget = u64::from(self.s_max() + 1) * u64::from(self.max_iter);
        let n = (budget * u64::from(self.eta).pow(s))
            .div_ceil(u64::from(self.max_iter) * u64::from(s + 1));
        usize::try_from(n).unwrap_or(usize::MAX)
    }

    /// Half of the draws reuse one of the top results, the rest are random
    fn select_candidate<R: Rng>(scorer: &Scorer, top: &[(f64, Vec<f64>)], rng: &mut R) -> Vec<f64> {
        let i = rng.gen_range(0..TOP_POOL * 2);
        top.get(i)
            .map_or_else(|| scorer.domain().random_vector(rng), |(_, v)| v.clone())
    }

    fn run<R: Rng>(&self, scorer: &Scorer, deadline: Instant, rng: &mut R) -> Option<(Vec<f64>, f64)> {
        let mut best: Option<(Vec<f64>, f64)> = None;
        let bounds = scorer.domain().bounds();
        let eta = self.eta as usize;

        for s in (0..=self.s_max()).rev() {
            let n = self.bracket_size(s);
            let top = scorer.domain().top_k(TOP_POOL);
            let mut candidates: Vec<Vec<f64>> =
                (0..n).map(|_| Self::select_candidate(scorer, &top, rng)).collect();

            for round in 0..=s {
                let n_configs = n / eta.pow(round);
                let mut scored = Vec::with_capacity(candidates.len());
                for mut candidate in candidates {
                    random_transform(&mut candidate, bounds, 1, rng);
                    let score = scorer.score_candidate(&candidate);
                    if best.as_ref().map_or(true, |(_, b)| score >= *b) {
                        best = Some((candidate.clone(), score));
                    }
                    scored.push((score, candidate));
                    if scorer.should_stop() || Instant::now() >= deadline {
                        return best;
                    }
                }
                scored.sort_by(|a, b| b.0.total_cmp(&a.0));
                scored.truncate(n_configs / eta);
                candidates = scored.into_iter().map(|(_, c)| c).collect();
            }
        }
        best
    }
}

impl Strategy for Hyperband {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn optimize(&self, scorer: &Scorer, budget: Duration) -> Result<Optimum> {
        let started = Instant::now();
        let deadline = started + budget;
        let (mut best, mut best_score) = scorer.incumbent();
        if !scorer.domain().has_parameters() {
            return Optimum::decode(scorer, best, best_score);
        }

        let mut rng = self.rng.next_rng();
        let mut runs = 0usize;
        let mut projected = Duration::ZERO;
        while projected <= budget && !scorer.should_stop() {
            let run_started = Instant::now();
            if let Some((candidate, score)) = self.run(scorer, deadline, &mut rng) {
                if score >= best_score {
                    best = candidate;
                    best_score = score;
                }
            }
            runs += 1;
            projected = started.elapsed() + run_started.elapsed();
            if Instant::now() >= deadline {
                break;
            }
        }
        debug!(runs, score = best_score, "hyperband ends");
        Optimum::decode(scorer, best, best_score)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bracket_sizes_follow_eta() {
        let hyperband = Hyperband::new(0);
        assert_eq!(hyperband.s_max(), 4);
        assert_eq!(hyperband.bracket_size(4), 81);
        assert_eq!(hyperband.bracket_size(3), 34);
        assert_eq!(hyperband.bracket_size(2), 15);
        assert_eq!(hyperband.bracket_size(1), 8);
        assert_eq!(hyperband.bracket_size(0), 5);
    }
}
