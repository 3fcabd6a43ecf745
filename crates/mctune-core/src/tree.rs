//! Monte-Carlo search tree
//!
//! The search tree extends the constraint graph by one level: every node whose
//! rest problem is satisfied fans out into one strategy leaf per registered
//! strategy. Strategy leaves are the terminal nodes of the tree; scoring one
//! runs its strategy on the parameter domain shared by all leaves of the same
//! structural parent.

use crate::events::{EventSink, SearchEvent, SinkObserver};
use crate::runner::LeafScoring;
use mctune_graph::{ConstraintGenerator, ConstraintNode, Node, RestProblem, StopSignal, SuccessorGenerator};
use mctune_space::ParameterDomain;
use mctune_strategy::{Evaluator, Scorer, Strategy, StrategyRegistry};
use parking_lot::Mutex;
use std::f64::consts::SQRT_2;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Visit statistics of one node
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MctsStats {
    visits: u64,
    score_avg: f64,
    node_value: f64,
}

impl Default for MctsStats {
    fn default() -> Self {
        Self {
            visits: 0,
            score_avg: 0.0,
            node_value: 1.0,
        }
    }
}

impl MctsStats {
    /// Number of recorded scores
    #[inline]
    #[must_use]
    pub fn visits(&self) -> u64 {
        self.visits
    }

    /// Running mean of the recorded scores
    #[inline]
    #[must_use]
    pub fn score_avg(&self) -> f64 {
        self.score_avg
    }

    /// Selection value
    #[inline]
    #[must_use]
    pub fn node_value(&self) -> f64 {
        self.node_value
    }

    /// Count one more visit with `score`
    pub fn record(&mut self, score: f64) {
        self.visits += 1;
        #[allow(clippy::cast_precision_loss)]
        let visits = self.visits as f64;
        self.score_avg += (score - self.score_avg) / visits;
    }

    /// Recompute the selection value given the parent's visit count
    ///
    /// Adds `sqrt(2) * sqrt(ln(parent + 1) / visits)` while this node has
    /// fewer visits than `parent + 1`. The root has no parent and no bonus.
    pub fn recalculate(&mut self, parent_visits: Option<u64>) -> f64 {
        let exploration = match parent_visits {
            Some(parent) if self.visits > 0 && self.visits < parent + 1 => {
                #[allow(clippy::cast_precision_loss)]
                let (parent, visits) = ((parent + 1) as f64, self.visits as f64);
                SQRT_2 * (parent.ln() / visits).sqrt()
            }
            _ => 0.0,
        };
        self.node_value = self.score_avg + exploration;
        self.node_value
    }
}

/// Strategy bound to a leaf
pub struct StrategyBinding {
    strategy: Box<dyn Strategy>,
    scorer: Scorer,
    best_score: Mutex<f64>,
}

impl fmt::Debug for StrategyBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StrategyBinding")
            .field("strategy", &self.strategy.name())
            .field("best_score", &*self.best_score.lock())
            .finish_non_exhaustive()
    }
}

impl StrategyBinding {
    /// Strategy name
    #[inline]
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.strategy.name()
    }

    /// Scoring callback of the leaf
    #[inline]
    #[must_use]
    pub fn scorer(&self) -> &Scorer {
        &self.scorer
    }

    /// Best score this leaf has returned
    #[must_use]
    pub fn best_score(&self) -> f64 {
        *self.best_score.lock()
    }
}

/// Payload of search-tree nodes
#[derive(Debug)]
pub struct SearchNode {
    rest_problem: Arc<RestProblem>,
    label: String,
    domain: Option<Arc<ParameterDomain>>,
    binding: Option<StrategyBinding>,
    stats: Mutex<MctsStats>,
}

impl SearchNode {
    /// Structural node; satisfied rest problems get a parameter domain
    #[must_use]
    pub fn structural(node: ConstraintNode) -> Self {
        let domain = node
            .rest_problem
            .is_satisfied()
            .then(|| Arc::new(ParameterDomain::new(node.rest_problem.components())));
        Self {
            rest_problem: node.rest_problem,
            label: node.label,
            domain,
            binding: None,
            stats: Mutex::new(MctsStats::default()),
        }
    }

    fn leaf(&self, binding: StrategyBinding) -> Self {
        Self {
            rest_problem: Arc::clone(&self.rest_problem),
            label: binding.name().to_string(),
            domain: self.domain.clone(),
            binding: Some(binding),
            stats: Mutex::new(MctsStats::default()),
        }
    }

    /// Rest problem of the node
    #[inline]
    #[must_use]
    pub fn rest_problem(&self) -> &Arc<RestProblem> {
        &self.rest_problem
    }

    /// Component or strategy name
    #[inline]
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Parameter domain, present once the rest problem is satisfied
    #[inline]
    #[must_use]
    pub fn domain(&self) -> Option<&Arc<ParameterDomain>> {
        self.domain.as_ref()
    }

    /// Bound strategy, present on leaves only
    #[inline]
    #[must_use]
    pub fn binding(&self) -> Option<&StrategyBinding> {
        self.binding.as_ref()
    }

    /// Whether this is a strategy leaf
    #[inline]
    #[must_use]
    pub fn is_leaf(&self) -> bool {
        self.binding.is_some()
    }

    /// Snapshot of the visit statistics
    #[must_use]
    pub fn stats(&self) -> MctsStats {
        *self.stats.lock()
    }

    pub(crate) fn update_stats<T>(&self, f: impl FnOnce(&mut MctsStats) -> T) -> T {
        f(&mut self.stats.lock())
    }
}

/// Successor generator of the search tree
pub struct SearchTreeGenerator {
    constraints: ConstraintGenerator,
    strategies: StrategyRegistry,
    evaluator: Arc<dyn Evaluator>,
    evaluation_timeout: Duration,
    stop: StopSignal,
    seed: u64,
    instances: AtomicU64,
    sink: Arc<dyn EventSink>,
}

impl fmt::Debug for SearchTreeGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SearchTreeGenerator")
            .field("strategies", &self.strategies)
            .field("evaluation_timeout", &self.evaluation_timeout)
            .field("stopped", &self.stop.is_raised())
            .finish_non_exhaustive()
    }
}

impl SearchTreeGenerator {
    /// Create a generator
    #[must_use]
    pub fn new(
        constraints: ConstraintGenerator,
        strategies: StrategyRegistry,
        evaluator: Arc<dyn Evaluator>,
        evaluation_timeout: Duration,
        stop: StopSignal,
        seed: u64,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            constraints,
            strategies,
            evaluator,
            evaluation_timeout,
            stop,
            seed,
            instances: AtomicU64::new(0),
            sink,
        }
    }

    /// Structural generator underneath
    #[inline]
    #[must_use]
    pub fn constraints(&self) -> &ConstraintGenerator {
        &self.constraints
    }

    /// Strategies fanned out at satisfied nodes
    #[inline]
    #[must_use]
    pub fn strategies(&self) -> &StrategyRegistry {
        &self.strategies
    }

    fn bind(&self, name: &str, problem: &Arc<RestProblem>, domain: &Arc<ParameterDomain>) -> Option<StrategyBinding> {
        let instance = self.instances.fetch_add(1, Ordering::Relaxed);
        let seed = self.seed.wrapping_add(instance.wrapping_mul(0x9E37_79B9_7F4A_7C15));
        let strategy = match self.strategies.create(name, seed) {
            Ok(strategy) => strategy,
            Err(err) => {
                warn!(error = %err, "strategy could not be created");
                return None;
            }
        };
        let scorer = Scorer::new(
            Arc::clone(problem),
            Arc::clone(domain),
            Arc::clone(&self.evaluator),
            self.evaluation_timeout,
            self.stop.clone(),
        )
        .with_observer(Arc::new(SinkObserver(Arc::clone(&self.sink))));
        Some(StrategyBinding {
            strategy,
            scorer,
            best_score: Mutex::new(0.0),
        })
    }
}

impl SuccessorGenerator for SearchTreeGenerator {
    type Payload = SearchNode;

    fn is_terminal(&self, node: &Node<SearchNode>) -> bool {
        node.payload().is_leaf()
    }

    fn generate(&self, node: &Node<SearchNode>) -> Vec<SearchNode> {
        let payload = node.payload();
        match &payload.domain {
            Some(domain) => self
                .strategies
                .names()
                .into_iter()
                .filter_map(|name| self.bind(name, &payload.rest_problem, domain))
                .map(|binding| payload.leaf(binding))
                .collect(),
            None => self
                .constraints
                .refine(&payload.rest_problem)
                .into_iter()
                .map(SearchNode::structural)
                .collect(),
        }
    }

    fn on_node_created(&self, node: &Node<SearchNode>) {
        self.sink.publish(&SearchEvent::NodeCreated {
            node: node.id(),
            predecessor: node.predecessor(),
            label: node.payload().label.clone(),
            depth: node.depth(),
        });
    }
}

impl LeafScoring for SearchTreeGenerator {
    fn score(&self, leaf: &Node<SearchNode>, budget: Duration, cancel: &StopSignal) -> Option<f64> {
        let binding = leaf.payload().binding.as_ref()?;
        let scorer = binding.scorer.with_cancel_flag(cancel.clone());
        self.sink.publish(&SearchEvent::StrategyInvoked {
            node: leaf.id(),
            strategy: binding.name().to_string(),
        });
        if self.stop.is_raised() {
            return None;
        }

        let domain = scorer.domain();
        let score = if domain.has_parameters() {
            match binding.strategy.optimize(&scorer, budget) {
                Ok(optimum) => optimum.score,
                Err(err) => {
                    warn!(error = %err, strategy = binding.name(), "optimization failed");
                    return None;
                }
            }
        } else {
            scorer.score_candidate(&domain.default_vector())
        };

        let mut best = binding.best_score.lock();
        if score > *best {
            *best = score;
            drop(best);
            info!(
                node = %leaf.id(),
                strategy = binding.name(),
                components = ?leaf.payload().rest_problem.labels(),
                score,
                "new best score"
            );
            self.sink.publish(&SearchEvent::BestScoreUpdated {
                node: leaf.id(),
                strategy: binding.name().to_string(),
                score,
            });
        }
        Some(score)
    }
}
