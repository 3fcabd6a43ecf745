//! Search loop
//!
//! [`MctsSearch`] repeats four phases until its stop signal is raised:
//! 1. select a candidate by descending along the highest node values
//! 2. expand the candidate, or take it alone if it is a strategy leaf
//! 3. simulate with a batch of concurrent rollouts
//! 4. back-propagate the rollout scores to the root
//!
//! Statistics are only written in phase 4, on the driver thread, after every
//! rollout of the batch has finished or been abandoned.

use crate::config::SearchConfig;
use crate::error::{Result, SearchError};
use crate::events::{EventSink, NoopSink, SearchEvent};
use crate::runner::{panic_message, RolloutResult, SimulationRunner};
use crate::tree::{SearchNode, SearchTreeGenerator};
use mctune_graph::{ConstraintGenerator, ExpandableGraph, Node, NodeId, StopSignal};
use mctune_space::{Configuration, SearchSpace};
use mctune_strategy::{Evaluator, StrategyRegistry};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// The search tree
pub type SearchTree = ExpandableGraph<SearchTreeGenerator>;

type TreeNode = Arc<Node<SearchNode>>;

/// Best configuration found by a search
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Solution {
    /// Its score
    pub score: f64,
    /// Chosen component names, in choice order
    pub components: Vec<String>,
    /// Components and parameter values by slot
    pub configuration: Configuration,
}

/// Builds an [`MctsSearch`]
pub struct SearchBuilder {
    space: Arc<SearchSpace>,
    start: String,
    evaluator: Arc<dyn Evaluator>,
    config: SearchConfig,
    registry: StrategyRegistry,
    sink: Arc<dyn EventSink>,
    stop: StopSignal,
}

impl fmt::Debug for SearchBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SearchBuilder")
            .field("start", &self.start)
            .field("config", &self.config)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

impl SearchBuilder {
    /// Use `config` instead of the defaults
    #[must_use]
    pub fn with_config(mut self, config: SearchConfig) -> Self {
        self.config = config;
        self
    }

    /// Pick strategies from `registry` instead of the built-ins
    #[must_use]
    pub fn with_registry(mut self, registry: StrategyRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Publish events to `sink`
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Share an externally controlled stop signal
    #[must_use]
    pub fn with_stop_signal(mut self, stop: StopSignal) -> Self {
        self.stop = stop;
        self
    }

    /// Validate the configuration and create the root of the tree
    ///
    /// # Errors
    ///
    /// Returns an error for an invalid configuration, an unknown strategy
    /// name, or an unknown start component.
    pub fn build(self) -> Result<MctsSearch> {
        self.config.validate()?;
        let strategies = self.registry.select(&self.config.strategies)?;
        let constraints = ConstraintGenerator::new(self.space);
        let root = constraints.root(&self.start)?;
        let generator = SearchTreeGenerator::new(
            constraints,
            strategies,
            self.evaluator,
            self.config.evaluation_timeout,
            self.stop.clone(),
            self.config.seed,
            Arc::clone(&self.sink),
        );

        Ok(MctsSearch {
            graph: Arc::new(ExpandableGraph::new(generator, SearchNode::structural(root))),
            runner: SimulationRunner::new(
                self.config.simulation_runs,
                self.config.grace_period,
                self.config.seed,
            ),
            rng: Mutex::new(StdRng::seed_from_u64(self.config.seed)),
            config: self.config,
            stop: self.stop,
            sink: self.sink,
            rounds: AtomicU64::new(0),
        })
    }
}

/// Concurrent best-first Monte-Carlo tree search
pub struct MctsSearch {
    graph: Arc<SearchTree>,
    config: SearchConfig,
    runner: SimulationRunner,
    stop: StopSignal,
    sink: Arc<dyn EventSink>,
    rng: Mutex<StdRng>,
    rounds: AtomicU64,
}

impl fmt::Debug for MctsSearch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MctsSearch")
            .field("graph", &self.graph)
            .field("config", &self.config)
            .field("rounds", &self.rounds())
            .finish_non_exhaustive()
    }
}

impl MctsSearch {
    /// Start building a search from component `start` of `space`
    #[must_use]
    pub fn builder(
        space: Arc<SearchSpace>,
        start: impl Into<String>,
        evaluator: Arc<dyn Evaluator>,
    ) -> SearchBuilder {
        SearchBuilder {
            space,
            start: start.into(),
            evaluator,
            config: SearchConfig::default(),
            registry: StrategyRegistry::with_defaults(),
            sink: Arc::new(NoopSink),
            stop: StopSignal::new(),
        }
    }

    /// The search tree
    #[inline]
    #[must_use]
    pub fn graph(&self) -> &Arc<SearchTree> {
        &self.graph
    }

    /// Configuration in use
    #[inline]
    #[must_use]
    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Stop signal observed by every phase
    #[inline]
    #[must_use]
    pub fn stop_signal(&self) -> &StopSignal {
        &self.stop
    }

    /// Completed loop iterations
    #[inline]
    #[must_use]
    pub fn rounds(&self) -> u64 {
        self.rounds.load(Ordering::Relaxed)
    }

    /// Descend from the root to the next candidate
    ///
    /// Follows the highest node value, picking uniformly among exact ties, or
    /// uniformly among all live successors in random-selection mode. Stops at
    /// the first node without successors yet. A node whose successors are all
    /// pruned is pruned itself and the descent restarts. Returns `None` once
    /// the root is pruned.
    pub fn select(&self) -> Option<TreeNode> {
        'restart: loop {
            let root = self.graph.root();
            if root.is_pruned() {
                return None;
            }
            let mut node = root;
            loop {
                let Some(successors) = node.successors() else {
                    return Some(node);
                };
                let live: Vec<TreeNode> = successors
                    .iter()
                    .filter_map(|id| self.graph.node(*id))
                    .filter(|child| !child.is_pruned())
                    .collect();
                if live.is_empty() {
                    debug!(node = %node.id(), "all successors pruned");
                    node.prune();
                    continue 'restart;
                }
                node = self.choose(live);
            }
        }
    }

    fn choose(&self, live: Vec<TreeNode>) -> TreeNode {
        let mut candidates = live;
        if !self.config.random_selection {
            let values: Vec<f64> = candidates
                .iter()
                .map(|n| n.payload().stats().node_value())
                .collect();
            let best = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            #[allow(clippy::float_cmp)]
            let tied: Vec<TreeNode> = candidates
                .iter()
                .zip(&values)
                .filter(|(_, value)| **value == best)
                .map(|(node, _)| Arc::clone(node))
                .collect();
            if !tied.is_empty() {
                candidates = tied;
            }
        }
        let index = self.rng.lock().gen_range(0..candidates.len());
        candidates.swap_remove(index)
    }

    /// Frontier for `candidate`: itself if it is a leaf, else its live successors
    pub fn expand_candidate(&self, candidate: &Node<SearchNode>) -> Vec<NodeId> {
        if self.graph.is_terminal(candidate) {
            return vec![candidate.id()];
        }
        self.graph
            .children(candidate)
            .into_iter()
            .filter(|child| !child.is_pruned())
            .map(|child| child.id())
            .collect()
    }

    /// Run one rollout batch over `frontier`
    pub fn simulate(&self, frontier: &[NodeId]) -> Vec<RolloutResult> {
        self.runner.run(
            &self.graph,
            frontier,
            self.config.optimization_time_budget,
            &self.stop,
        )
    }

    /// Record every result on its leaf and all ancestors
    pub fn back_propagate(&self, results: &[RolloutResult]) {
        for result in results {
            for node in self.graph.path_to_root(result.leaf) {
                let parent_visits = node
                    .predecessor()
                    .and_then(|p| self.graph.node(p))
                    .map(|parent| parent.payload().stats().visits());
                let stats = node.payload().update_stats(|stats| {
                    stats.record(result.score);
                    stats.recalculate(parent_visits);
                    *stats
                });
                self.sink.publish(&SearchEvent::WeightUpdated {
                    node: node.id(),
                    visits: stats.visits(),
                    score_avg: stats.score_avg(),
                    node_value: stats.node_value(),
                });
            }
        }
    }

    /// One select, expand, simulate, back-propagate round
    ///
    /// Returns `false` once the search should end: the stop signal was raised
    /// or nothing selectable is left.
    pub fn iterate(&self) -> bool {
        if self.stop.is_raised() {
            return false;
        }
        let Some(candidate) = self.select() else {
            info!("no selectable node left");
            return false;
        };
        if self.stop.is_raised() {
            return false;
        }

        let frontier = self.expand_candidate(&candidate);
        debug!(
            candidate = %candidate.id(),
            label = candidate.payload().label(),
            frontier = frontier.len(),
            "expanded candidate"
        );
        if frontier.is_empty() || self.stop.is_raised() {
            return !self.stop.is_raised();
        }

        let results = self.simulate(&frontier);
        if self.stop.is_raised() {
            return false;
        }
        if !self.config.random_selection {
            self.back_propagate(&results);
        }
        self.rounds.fetch_add(1, Ordering::Relaxed);
        true
    }

    /// Iterate until the search ends
    pub fn run_loop(&self) {
        while self.iterate() {}
        info!(
            rounds = self.rounds(),
            nodes = self.graph.len(),
            "search loop finished"
        );
    }

    /// Iterate at most `rounds` times
    pub fn run_rounds(&self, rounds: usize) {
        for _ in 0..rounds {
            if !self.iterate() {
                break;
            }
        }
    }

    /// Run until the search timeout and return the best solution
    ///
    /// The loop runs on a dedicated driver thread. The stop signal is raised
    /// `stop_margin` before the timeout, or as soon as the loop ends early,
    /// and the driver then gets `stop_margin` to wind down.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Cancelled`] if the stop signal was raised before
    /// the start, [`SearchError::Driver`] if the loop panicked,
    /// [`SearchError::Timeout`] if the driver overran without any result, and
    /// [`SearchError::NoSolution`] if nothing was scored.
    pub async fn run(self: Arc<Self>) -> Result<Solution> {
        if self.stop.is_raised() {
            return Err(SearchError::Cancelled);
        }
        let margin = self.config.effective_stop_margin();
        let working = self.config.search_timeout.saturating_sub(margin);
        info!(
            timeout_secs = self.config.search_timeout.as_secs_f64(),
            strategies = ?self.config.strategies,
            random_selection = self.config.random_selection,
            "search started"
        );

        let (tx, mut rx) = oneshot::channel();
        let search = Arc::clone(&self);
        thread::Builder::new()
            .name("mctune-driver".to_string())
            .spawn(move || {
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| search.run_loop()))
                    .map_err(|payload| panic_message(payload.as_ref()));
                let _ = tx.send(outcome);
            })
            .map_err(|err| SearchError::Driver(err.to_string()))?;

        let finished = tokio::select! {
            () = tokio::time::sleep(working) => None,
            outcome = &mut rx => Some(outcome),
        };
        self.stop.raise();

        let outcome = match finished {
            Some(outcome) => Some(outcome),
            None => tokio::time::timeout(margin, rx).await.ok(),
        };
        match outcome {
            Some(Ok(Ok(()))) => {}
            Some(Ok(Err(message))) => return Err(SearchError::Driver(message)),
            Some(Err(_)) => {
                return Err(SearchError::Driver("driver exited without reporting".into()))
            }
            None => {
                warn!(
                    margin_secs = margin.as_secs_f64(),
                    "search driver did not stop in time"
                );
                return self.best().map_err(|_| SearchError::Timeout {
                    duration_secs: margin.as_secs_f64(),
                });
            }
        }

        let solution = self.best();
        match &solution {
            Ok(solution) => info!(
                score = solution.score,
                components = ?solution.components,
                rounds = self.rounds(),
                "search finished"
            ),
            Err(err) => warn!(error = %err, rounds = self.rounds(), "search finished"),
        }
        solution
    }

    /// Best scored configuration over every parameter domain in the tree
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::NoSolution`] unless some configuration scored
    /// above `0.0`, the score failed evaluations are recorded with.
    pub fn best(&self) -> Result<Solution> {
        let mut best: Option<(f64, Vec<f64>, TreeNode)> = None;
        for node in self.graph.nodes() {
            if node.payload().is_leaf() {
                continue;
            }
            let Some((score, vector)) = node.payload().domain().and_then(|d| d.best()) else {
                continue;
            };
            if score > best.as_ref().map_or(0.0, |(b, _, _)| *b) {
                best = Some((score, vector, node));
            }
        }

        let (score, vector, node) = best.ok_or(SearchError::NoSolution)?;
        let payload = node.payload();
        let domain = payload.domain().ok_or(SearchError::NoSolution)?;
        Ok(Solution {
            score,
            components: payload
                .rest_problem()
                .labels()
                .into_iter()
                .map(String::from)
                .collect(),
            configuration: domain.from_vector(&vector)?,
        })
    }
}
