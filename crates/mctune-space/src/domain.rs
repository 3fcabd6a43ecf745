//! Parameter domain and result cache
//!
//! A [`ParameterDomain`] flattens the parameters of every chosen component into
//! one real vector:
//! - components in choice order, parameters in declaration order
//! - ints and doubles keep their bounds, booleans span `[0, 2]`
//! - categoricals are encoded as an index into their value list
//!
//! Every scored vector is remembered once. The cache is ordered by score so
//! strategies can warm-start from the best results found so far on the branch.

use crate::component::{Component, ParameterSpec};
use crate::configuration::{ComponentMapping, Configuration, SlotId};
use crate::error::{Result, SpaceError};
use parking_lot::Mutex;
use rand::seq::IteratorRandom;
use rand::Rng;
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

#[derive(Debug, Clone, Copy)]
struct Coordinate {
    slot: usize,
    parameter: usize,
}

#[derive(Debug, Clone)]
struct CachedResult {
    score: f64,
    order: u64,
    vector: Vec<f64>,
}

impl PartialEq for CachedResult {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for CachedResult {}

impl PartialOrd for CachedResult {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for CachedResult {
    // Among equal scores the earlier insertion ranks higher.
    fn cmp(&self, other: &Self) -> Ordering {
        self.score
            .total_cmp(&other.score)
            .then_with(|| other.order.cmp(&self.order))
    }
}

#[derive(Debug, Default)]
struct ResultCache {
    scores: HashMap<Vec<u64>, f64>,
    ranked: BTreeSet<CachedResult>,
}

fn cache_key(vector: &[f64]) -> Vec<u64> {
    vector.iter().map(|x| x.to_bits()).collect()
}

/// Vector encoding of the parameters of a component set, plus scored results
#[derive(Debug)]
pub struct ParameterDomain {
    slots: Vec<(SlotId, Arc<Component>)>,
    coordinates: Vec<Coordinate>,
    bounds: Vec<(f64, f64)>,
    cache: Mutex<ResultCache>,
}

impl ParameterDomain {
    /// Build the domain of the given chosen components
    #[must_use]
    pub fn new(mapping: &ComponentMapping) -> Self {
        let slots: Vec<_> = mapping
            .iter()
            .map(|(slot, component)| (*slot, Arc::clone(component)))
            .collect();

        let mut coordinates = Vec::new();
        let mut bounds = Vec::new();
        for (slot, (_, component)) in slots.iter().enumerate() {
            for (parameter, spec) in component.parameters.iter().enumerate() {
                coordinates.push(Coordinate { slot, parameter });
                bounds.push(spec.vector_bounds());
            }
        }

        Self {
            slots,
            coordinates,
            bounds,
            cache: Mutex::new(ResultCache::default()),
        }
    }

    fn spec(&self, coordinate: Coordinate) -> &ParameterSpec {
        &self.slots[coordinate.slot].1.parameters[coordinate.parameter]
    }

    /// Number of coordinates
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.coordinates.len()
    }

    /// Whether the domain has no coordinate
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.coordinates.is_empty()
    }

    /// Whether any chosen component has a tunable parameter
    #[inline]
    #[must_use]
    pub fn has_parameters(&self) -> bool {
        !self.is_empty()
    }

    /// Lower and upper bound of every coordinate
    #[inline]
    #[must_use]
    pub fn bounds(&self) -> &[(f64, f64)] {
        &self.bounds
    }

    /// Parameter schema of every coordinate, in vector order
    pub fn parameters(&self) -> impl Iterator<Item = &ParameterSpec> {
        self.coordinates.iter().map(|c| self.spec(*c))
    }

    /// Chosen components, in choice order
    pub fn components(&self) -> impl Iterator<Item = (SlotId, &Arc<Component>)> {
        self.slots.iter().map(|(slot, component)| (*slot, component))
    }

    /// Encode a configuration
    ///
    /// # Errors
    ///
    /// Returns an error if a parameter is missing or has the wrong kind.
    pub fn to_vector(&self, config: &Configuration) -> Result<Vec<f64>> {
        self.coordinates
            .iter()
            .map(|coordinate| {
                let slot = self.slots[coordinate.slot].0;
                let spec = self.spec(*coordinate);
                let value = config
                    .value(slot, &spec.name)
                    .ok_or_else(|| SpaceError::MissingParameter {
                        slot,
                        parameter: spec.name.clone(),
                    })?;
                spec.encode(value).ok_or_else(|| SpaceError::TypeMismatch {
                    parameter: spec.name.clone(),
                })
            })
            .collect()
    }

    /// Decode a vector
    ///
    /// Components without parameters still appear in the result with an
    /// empty parameter map.
    ///
    /// # Errors
    ///
    /// Returns [`SpaceError::DimensionMismatch`] if the vector length differs
    /// from [`len`](Self::len).
    pub fn from_vector(&self, vector: &[f64]) -> Result<Configuration> {
        if vector.len() != self.len() {
            return Err(SpaceError::DimensionMismatch {
                expected: self.len(),
                actual: vector.len(),
            });
        }

        let mut coordinates = vector.iter();
        let mut config = Configuration::new();
        for (slot, component) in &self.slots {
            let parameters = component
                .parameters
                .iter()
                .zip(coordinates.by_ref())
                .map(|(spec, x)| (spec.name.clone(), spec.decode(*x)))
                .collect();
            config.insert(*slot, component, parameters);
        }
        Ok(config)
    }

    /// Vector of declared defaults
    ///
    /// Parameters without a default take their lower bound.
    #[must_use]
    pub fn default_vector(&self) -> Vec<f64> {
        self.coordinates
            .iter()
            .zip(&self.bounds)
            .map(|(coordinate, (min, _))| {
                let spec = self.spec(*coordinate);
                spec.default
                    .as_ref()
                    .and_then(|value| spec.encode(value))
                    .unwrap_or(*min)
            })
            .collect()
    }

    /// Sample every parameter uniformly within its domain and encode the result
    pub fn random_vector<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<f64> {
        self.coordinates
            .iter()
            .map(|coordinate| {
                let spec = self.spec(*coordinate);
                let value = spec.sample(rng);
                spec.encode(&value).unwrap_or(0.0)
            })
            .collect()
    }

    /// Sample a configuration uniformly
    pub fn draw_random_config<R: Rng + ?Sized>(&self, rng: &mut R) -> Configuration {
        let mut config = Configuration::new();
        for (slot, component) in &self.slots {
            config.insert(*slot, component, component.random_config(rng));
        }
        config
    }

    /// Clamp every coordinate into its bounds
    #[must_use]
    pub fn clamp(&self, vector: &[f64]) -> Vec<f64> {
        vector
            .iter()
            .zip(&self.bounds)
            .map(|(x, (min, max))| if x.is_nan() { *min } else { x.clamp(*min, *max) })
            .collect()
    }

    /// Remember a scored vector
    ///
    /// Returns `false` without changing anything if a bit-identical vector was
    /// already recorded.
    pub fn add_result(&self, vector: &[f64], score: f64) -> bool {
        let mut cache = self.cache.lock();
        let key = cache_key(vector);
        if cache.scores.contains_key(&key) {
            return false;
        }
        cache.scores.insert(key, score);
        let order = cache.ranked.len() as u64;
        cache.ranked.insert(CachedResult {
            score,
            order,
            vector: vector.to_vec(),
        });
        true
    }

    /// Previously recorded score of a vector
    #[must_use]
    pub fn score_of(&self, vector: &[f64]) -> Option<f64> {
        self.cache.lock().scores.get(&cache_key(vector)).copied()
    }

    /// Up to `k` results as `(score, vector)`, best first
    #[must_use]
    pub fn top_k(&self, k: usize) -> Vec<(f64, Vec<f64>)> {
        self.cache
            .lock()
            .ranked
            .iter()
            .rev()
            .take(k)
            .map(|r| (r.score, r.vector.clone()))
            .collect()
    }

    /// Best recorded result
    #[must_use]
    pub fn best(&self) -> Option<(f64, Vec<f64>)> {
        self.cache
            .lock()
            .ranked
            .last()
            .map(|r| (r.score, r.vector.clone()))
    }

    /// A uniformly chosen recorded result
    pub fn random_result<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<(f64, Vec<f64>)> {
        self.cache
            .lock()
            .ranked
            .iter()
            .choose(rng)
            .map(|r| (r.score, r.vector.clone()))
    }

    /// Whether any result was recorded
    #[must_use]
    pub fn has_results(&self) -> bool {
        !self.cache.lock().ranked.is_empty()
    }

    /// Number of recorded results
    #[must_use]
    pub fn result_count(&self) -> usize {
        self.cache.lock().ranked.len()
    }
}
