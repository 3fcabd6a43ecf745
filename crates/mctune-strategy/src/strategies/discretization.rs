//! Discretization search
//!
//! Builds a refinement tree over the parameter vector. Each level fixes or
//! narrows the next open coordinate:
//! - booleans and categoricals split into one child per value
//! - ints and doubles are bisected until the range is at most 10 % of the
//!   declared range, then fixed at the midpoint
//!
//! A node is *atomic* once every coordinate is fixed. The search descends to
//! the uncovered node with the best score below it, expands it, scores random
//! atomic completions of each child, and propagates best scores and coverage
//! upwards. It stops once the root is covered.

use crate::error::Result;
use crate::scorer::Scorer;
use crate::strategy::{Optimum, RngSource, Strategy};
use mctune_graph::{ExpandableGraph, Node, NodeId, SuccessorGenerator};
use mctune_space::{ParameterKind, ParameterSpec};
use parking_lot::Mutex;
use rand::seq::SliceRandom;
use rand::Rng;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

const SIMULATION_RUNS: usize = 3;
const MINIMUM_SPLIT_RATIO: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Choice {
    Open,
    Range { lower: f64, upper: f64 },
    Fixed(f64),
}

/// Partially fixed parameter vector
#[derive(Debug, Clone, PartialEq)]
struct Discretization {
    choices: Vec<Choice>,
    next: usize,
}

impl Discretization {
    fn root(parameters: &[ParameterSpec]) -> Self {
        Self {
            choices: parameters
                .iter()
                .map(|p| match p.kind {
                    ParameterKind::Int { .. } | ParameterKind::Double { .. } => {
                        let (lower, upper) = p.vector_bounds();
                        Choice::Range { lower, upper }
                    }
                    ParameterKind::Bool | ParameterKind::Categorical { .. } => Choice::Open,
                })
                .collect(),
            next: 0,
        }
    }

    fn is_atomic(&self) -> bool {
        self.next >= self.choices.len()
    }

    fn fix(&self, value: f64) -> Self {
        let mut refined = self.clone();
        refined.choices[self.next] = Choice::Fixed(value);
        refined.next += 1;
        refined
    }

    fn narrow(&self, lower: f64, upper: f64) -> Self {
        let mut refined = self.clone();
        refined.choices[self.next] = Choice::Range { lower, upper };
        refined
    }

    fn vector(&self) -> Option<Vec<f64>> {
        self.choices
            .iter()
            .map(|c| match c {
                Choice::Fixed(x) => Some(*x),
                _ => None,
            })
            .collect()
    }

    fn refine(&self, parameters: &[ParameterSpec]) -> Vec<Self> {
        if self.is_atomic() {
            return Vec::new();
        }
        let spec = &parameters[self.next];
        let (min, max) = spec.vector_bounds();
        let minimum_split = (max - min) * MINIMUM_SPLIT_RATIO;

        match (&spec.kind, self.choices[self.next]) {
            (ParameterKind::Bool, _) => vec![self.fix(1.0), self.fix(0.0)],
            #[allow(clippy::cast_precision_loss)]
            (ParameterKind::Categorical { values }, _) => {
                (0..values.len()).map(|i| self.fix(i as f64)).collect()
            }
            (ParameterKind::Int { .. }, Choice::Range { lower, upper }) => {
                if upper - lower <= minimum_split.floor() {
                    vec![self.fix((lower + (upper - lower) * 0.5).floor())]
                } else {
                    let split = (lower + (upper - lower) * 0.5).floor();
                    vec![self.narrow(lower, split), self.narrow(split + 1.0, upper)]
                }
            }
            (ParameterKind::Double { .. }, Choice::Range { lower, upper }) => {
                let split = lower + (upper - lower) * 0.5;
                if upper - lower <= minimum_split {
                    vec![self.fix(split)]
                } else {
                    vec![self.narrow(lower, split), self.narrow(split, upper)]
                }
            }
            (_, _) => Vec::new(),
        }
    }
}

#[derive(Debug)]
struct Coverage {
    covered: bool,
    best: f64,
}

#[derive(Debug)]
struct DiscretizationNode {
    discretization: Discretization,
    coverage: Mutex<Coverage>,
}

impl DiscretizationNode {
    fn new(discretization: Discretization) -> Self {
        let covered = discretization.is_atomic();
        Self {
            discretization,
            coverage: Mutex::new(Coverage {
                covered,
                best: f64::NEG_INFINITY,
            }),
        }
    }

    fn is_covered(&self) -> bool {
        self.coverage.lock().covered
    }

    fn best(&self) -> f64 {
        self.coverage.lock().best
    }
}

struct DiscretizationGenerator {
    parameters: Vec<ParameterSpec>,
}

impl SuccessorGenerator for DiscretizationGenerator {
    type Payload = DiscretizationNode;

    fn is_terminal(&self, node: &Node<DiscretizationNode>) -> bool {
        node.payload().discretization.is_atomic()
    }

    fn generate(&self, node: &Node<DiscretizationNode>) -> Vec<DiscretizationNode> {
        node.payload()
            .discretization
            .refine(&self.parameters)
            .into_iter()
            .map(DiscretizationNode::new)
            .collect()
    }
}

type Tree = ExpandableGraph<DiscretizationGenerator>;

/// Best-first refinement over a discretization tree
#[derive(Debug)]
pub struct DiscretizationSearch {
    rng: RngSource,
}

impl DiscretizationSearch {
    /// Registry name
    pub const NAME: &'static str = "discretization";

    /// Create with a seed
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            rng: RngSource::new(seed),
        }
    }

    /// Uncovered, unexpanded node below the best-scoring uncovered path
    fn select(tree: &Tree, scorer: &Scorer) -> Option<Arc<Node<DiscretizationNode>>> {
        let root = tree.root();
        let mut current = Arc::clone(&root);
        loop {
            if root.payload().is_covered() || scorer.should_stop() {
                return None;
            }
            let Some(successors) = current.successors() else {
                return Some(current);
            };
            let mut best: Option<(f64, Arc<Node<DiscretizationNode>>)> = None;
            for node in successors.iter().filter_map(|id| tree.node(*id)) {
                if node.payload().is_covered() {
                    continue;
                }
                let score = node.payload().best();
                if best.as_ref().map_or(true, |(b, _)| score > *b) {
                    best = Some((score, node));
                }
            }
            match best {
                Some((_, node)) => current = node,
                None => {
                    Self::back_propagate(tree, current.id());
                    current = Arc::clone(&root);
                }
            }
        }
    }

    /// Recompute coverage and best score from `id` up to the root
    fn back_propagate(tree: &Tree, id: NodeId) {
        for node in tree.path_to_root(id) {
            let Some(successors) = node.successors() else {
                continue;
            };
            let children: Vec<_> = successors.iter().filter_map(|s| tree.node(*s)).collect();
            let all_covered = children.iter().all(|c| c.payload().is_covered());
            let best = children
                .iter()
                .map(|c| c.payload().best())
                .fold(f64::NEG_INFINITY, f64::max);

            let mut coverage = node.payload().coverage.lock();
            if coverage.covered {
                continue;
            }
            coverage.covered = all_covered;
            coverage.best = coverage.best.max(best);
        }
    }

    /// Random walk from `start` to an atomic node, which is then scored
    fn rollout<R: Rng>(
        tree: &Tree,
        start: &Arc<Node<DiscretizationNode>>,
        scorer: &Scorer,
        rng: &mut R,
    ) -> Option<(Arc<Node<DiscretizationNode>>, Vec<f64>, f64)> {
        let mut node = Arc::clone(start);
        while !tree.is_terminal(&node) {
            if scorer.should_stop() {
                return None;
            }
            node = tree.children(&node).choose(rng).cloned()?;
        }
        let vector = node.payload().discretization.vector()?;
        let score = scorer.score_candidate(&vector);
        Some((node, vector, score))
    }
}

impl Strategy for DiscretizationSearch {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn optimize(&self, scorer: &Scorer, budget: Duration) -> Result<Optimum> {
        let deadline = Instant::now() + budget;
        let (mut best, mut best_score) = scorer.incumbent();
        if !scorer.domain().has_parameters() {
            return Optimum::decode(scorer, best, best_score);
        }

        let parameters: Vec<ParameterSpec> = scorer.domain().parameters().cloned().collect();
        let root = DiscretizationNode::new(Discretization::root(&parameters));
        let tree = Tree::new(DiscretizationGenerator { parameters }, root);
        let mut rng = self.rng.next_rng();

        while Instant::now() < deadline {
            let Some(frontier) = Self::select(&tree, scorer) else {
                break;
            };
            let expanded = tree.children(&frontier);
            if expanded.is_empty() {
                Self::back_propagate(&tree, frontier.id());
                continue;
            }

            for _ in 0..SIMULATION_RUNS {
                for child in &expanded {
                    let Some((leaf, vector, score)) = Self::rollout(&tree, child, scorer, &mut rng)
                    else {
                        continue;
                    };
                    {
                        let mut coverage = leaf.payload().coverage.lock();
                        coverage.best = coverage.best.max(score);
                    }
                    if let Some(parent) = leaf.predecessor() {
                        Self::back_propagate(&tree, parent);
                    }
                    if score > best_score {
                        best_score = score;
                        best = vector;
                    }
                }
            }
        }
        debug!(nodes = tree.len(), score = best_score, "discretization search ends");
        Optimum::decode(scorer, best, best_score)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parameters() -> Vec<ParameterSpec> {
        vec![
            ParameterSpec::new("b", ParameterKind::Bool),
            ParameterSpec::new(
                "c",
                ParameterKind::Categorical {
                    values: vec![json!("x"), json!("y"), json!("z")],
                },
            ),
            ParameterSpec::new("i", ParameterKind::Int { min: 0, max: 3 }),
            ParameterSpec::new("d", ParameterKind::Double { min: 0.0, max: 1.0 }),
        ]
    }

    #[test]
    fn bool_and_categorical_split_per_value() {
        let parameters = parameters();
        let root = Discretization::root(&parameters);
        let bools = root.refine(&parameters);
        assert_eq!(bools.len(), 2);
        assert_eq!(bools[0].next, 1);

        let cats = bools[0].refine(&parameters);
        assert_eq!(cats.len(), 3);
        assert_eq!(cats[2].choices[1], Choice::Fixed(2.0));
    }

    #[test]
    fn int_bisects_down_to_single_values() {
        let parameters = parameters();
        let at_int = Discretization {
            choices: vec![
                Choice::Fixed(0.0),
                Choice::Fixed(0.0),
                Choice::Range { lower: 0.0, upper: 3.0 },
                Choice::Range { lower: 0.0, upper: 1.0 },
            ],
            next: 2,
        };
        let halves = at_int.refine(&parameters);
        assert_eq!(halves[0].choices[2], Choice::Range { lower: 0.0, upper: 1.0 });
        assert_eq!(halves[1].choices[2], Choice::Range { lower: 2.0, upper: 3.0 });

        let quarters = halves[0].refine(&parameters);
        assert_eq!(quarters.len(), 2);
        let single = quarters[0].refine(&parameters);
        assert_eq!(single.len(), 1);
        assert_eq!(single[0].choices[2], Choice::Fixed(0.0));
        assert_eq!(single[0].next, 3);
    }

    #[test]
    fn double_stops_at_minimum_split() {
        let parameters = parameters();
        let mut d = Discretization {
            choices: vec![
                Choice::Fixed(0.0),
                Choice::Fixed(0.0),
                Choice::Fixed(0.0),
                Choice::Range { lower: 0.0, upper: 1.0 },
            ],
            next: 3,
        };
        let mut depth = 0;
        while !d.is_atomic() {
            d = d.refine(&parameters).remove(0);
            depth += 1;
        }
        // 1.0 -> 0.5 -> 0.25 -> 0.125 -> 0.0625 (<= 0.1), then fixed.
        assert_eq!(depth, 5);
        assert_eq!(d.vector().unwrap()[3], 0.03125);
    }
}
