//! Genetic algorithm
//!
//! Generation layout for a population of `n`:
//! - the top 20 % of the previous generation each produce five offspring
//! - 5 % of the offspring are kept unchanged
//! - 5 % (rounded up to an even count) are recombined pairwise by one-point crossover
//! - the rest get a single-coordinate point mutation

use crate::error::Result;
use crate::scorer::Scorer;
use crate::strategy::{random_transform, Optimum, RngSource, Strategy};
use rand::seq::index;
use rand::Rng;
use std::time::{Duration, Instant};
use tracing::debug;

const OFFSPRING_PER_PARENT: usize = 5;

type Individual = (f64, Vec<f64>);

/// Evolutionary search over the parameter vector
#[derive(Debug)]
pub struct GeneticAlgorithm {
    population: usize,
    rng: RngSource,
}

impl GeneticAlgorithm {
    /// Registry name
    pub const NAME: &'static str = "genetic";

    /// Create with a seed and the default population of 100
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            population: 100,
            rng: RngSource::new(seed),
        }
    }

    /// Set the population size
    #[must_use]
    pub fn with_population(mut self, population: usize) -> Self {
        self.population = population.max(OFFSPRING_PER_PARENT);
        self
    }

    fn fraction(&self, ratio: f64) -> usize {
        #[allow(
            clippy::cast_possible_truncation,
            clippy::cast_sign_loss,
            clippy::cast_precision_loss
        )]
        let amount = (self.population as f64 * ratio) as usize;
        amount
    }

    fn first_generation<R: Rng>(
        &self,
        scorer: &Scorer,
        deadline: Instant,
        rng: &mut R,
    ) -> Vec<Individual> {
        let mut generation = scorer.domain().top_k(self.fraction(0.2));
        while generation.len() < self.population
            && !scorer.should_stop()
            && Instant::now() < deadline
        {
            let individual = scorer.domain().random_vector(rng);
            let score = scorer.score_candidate(&individual);
            generation.push((score, individual));
        }
        generation
    }

    fn next_generation<R: Rng>(
        &self,
        mut generation: Vec<Individual>,
        bounds: &[(f64, f64)],
        rng: &mut R,
    ) -> Vec<Vec<f64>> {
        generation.sort_by(|a, b| b.0.total_cmp(&a.0));
        let mut offspring: Vec<Vec<f64>> = generation
            .into_iter()
            .take(self.fraction(0.2))
            .flat_map(|(_, parent)| std::iter::repeat(parent).take(OFFSPRING_PER_PARENT))
            .collect();

        let mut next = Vec::with_capacity(offspring.len());
        let keep = self.fraction(0.05).min(offspring.len());
        next.extend(take_random(&mut offspring, keep, rng));

        let pairs = self.fraction(0.05).div_ceil(2) * 2;
        let amount = pairs.min(offspring.len()) & !1;
        let mut parents = take_random(&mut offspring, amount, rng);
        while let (Some(a), Some(b)) = (parents.pop(), parents.pop()) {
            let (x, y) = one_point_crossover(a, b, rng);
            next.push(x);
            next.push(y);
        }

        for mut individual in offspring {
            random_transform(&mut individual, bounds, 1, rng);
            next.push(individual);
        }
        next
    }
}

fn take_random<R: Rng>(pool: &mut Vec<Vec<f64>>, amount: usize, rng: &mut R) -> Vec<Vec<f64>> {
    let mut indices = index::sample(rng, pool.len(), amount).into_vec();
    indices.sort_unstable_by(|a, b| b.cmp(a));
    indices.into_iter().map(|i| pool.swap_remove(i)).collect()
}

fn one_point_crossover<R: Rng>(
    mut a: Vec<f64>,
    mut b: Vec<f64>,
    rng: &mut R,
) -> (Vec<f64>, Vec<f64>) {
    if a.len() > 2 && a.len() == b.len() {
        let point = rng.gen_range(1..a.len());
        a[point..].swap_with_slice(&mut b[point..]);
    }
    (a, b)
}

impl Strategy for GeneticAlgorithm {
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
        let mut generation = self.first_generation(scorer, deadline, &mut rng);
        let mut generations = 0usize;

        'evolution: while !scorer.should_stop() && Instant::now() < deadline {
            for (score, individual) in &generation {
                if *score > best_score {
                    best_score = *score;
                    best.clone_from(individual);
                }
            }

            let candidates = self.next_generation(generation, bounds, &mut rng);
            generation = Vec::with_capacity(candidates.len());
            for individual in candidates {
                let score = scorer.score_candidate(&individual);
                generation.push((score, individual));
                if scorer.should_stop() || Instant::now() >= deadline {
                    break 'evolution;
                }
            }
            generations += 1;
        }

        for (score, individual) in generation {
            if score > best_score {
                best_score = score;
                best = individual;
            }
        }
        debug!(generations, score = best_score, "genetic algorithm ends");
        Optimum::decode(scorer, best, best_score)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn next_generation_keeps_population_size() {
        let ga = GeneticAlgorithm::new(1);
        let mut rng = StdRng::seed_from_u64(1);
        #[allow(clippy::cast_precision_loss)]
        let generation: Vec<Individual> =
            (0..100).map(|i| (f64::from(i), vec![i as f64, 0.0, 0.0])).collect();
        let bounds = [(0.0, 100.0); 3];

        let next = ga.next_generation(generation, &bounds, &mut rng);
        assert_eq!(next.len(), 100);
        // Offspring descend from the top 20 individuals only.
        assert!(next.iter().all(|v| v[0] >= 79.5));
    }

    #[test]
    fn small_generation_does_not_panic() {
        let ga = GeneticAlgorithm::new(1);
        let mut rng = StdRng::seed_from_u64(2);
        let next = ga.next_generation(vec![(1.0, vec![0.5])], &[(0.0, 1.0)], &mut rng);
        assert_eq!(next.len(), OFFSPRING_PER_PARENT);
    }

    #[test]
    fn crossover_swaps_tails() {
        let mut rng = StdRng::seed_from_u64(3);
        let (a, b) = one_point_crossover(vec![0.0; 4], vec![1.0; 4], &mut rng);
        assert_eq!(a.iter().sum::<f64>() + b.iter().sum::<f64>(), 4.0);
        assert!((a[0]).abs() < f64::EPSILON);
        assert!((b[0] - 1.0).abs() < f64::EPSILON);
    }
}
