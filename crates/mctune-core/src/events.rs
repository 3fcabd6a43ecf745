//! Search events
//!
//! The search publishes [`SearchEvent`]s to an injected [`EventSink`]. Sinks
//! only observe; a search behaves the same with [`NoopSink`] as with any other.
//!
//! Provided sinks:
//! - [`NoopSink`] drops everything
//! - [`TracingSink`] logs every event at debug level
//! - [`BestSolutionTracker`] keeps the best scored configuration
//! - [`StrategyCallCounter`] counts strategy invocations by name
//! - [`FanoutSink`] forwards to several sinks

use dashmap::DashMap;
use mctune_graph::{NodeId, RestProblem};
use mctune_space::Configuration;
use mctune_strategy::ScoreObserver;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Something observable happened during a search
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SearchEvent {
    /// A node was added to the tree
    NodeCreated {
        /// New node
        node: NodeId,
        /// Its parent, `None` for the root
        predecessor: Option<NodeId>,
        /// Component or strategy name
        label: String,
        /// Distance from the root
        depth: usize,
    },
    /// Back-propagation updated a node's statistics
    WeightUpdated {
        /// Updated node
        node: NodeId,
        /// Visit count after the update
        visits: u64,
        /// Running mean score
        score_avg: f64,
        /// Selection value
        node_value: f64,
    },
    /// A strategy leaf found a better score than before
    BestScoreUpdated {
        /// Strategy leaf
        node: NodeId,
        /// Strategy name
        strategy: String,
        /// New best score of the leaf
        score: f64,
    },
    /// A strategy leaf is about to be optimized
    StrategyInvoked {
        /// Strategy leaf
        node: NodeId,
        /// Strategy name
        strategy: String,
    },
    /// A configuration was evaluated
    SolutionScored {
        /// Chosen component names, in choice order
        components: Vec<String>,
        /// Evaluated configuration
        configuration: serde_json::Value,
        /// Its score
        score: f64,
    },
}

/// Receives search events
///
/// Called from the search driver and from rollout threads concurrently.
pub trait EventSink: Send + Sync {
    /// Handle one event
    fn publish(&self, event: &SearchEvent);
}

/// Sink that drops every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl EventSink for NoopSink {
    fn publish(&self, _event: &SearchEvent) {}
}

/// Sink logging every event through `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn publish(&self, event: &SearchEvent) {
        match event {
            SearchEvent::NodeCreated {
                node, label, depth, ..
            } => debug!(%node, %label, depth, "node created"),
            SearchEvent::WeightUpdated {
                node,
                visits,
                score_avg,
                node_value,
            } => debug!(%node, visits, score_avg, node_value, "weight updated"),
            SearchEvent::BestScoreUpdated {
                node,
                strategy,
                score,
            } => debug!(%node, %strategy, score, "best score updated"),
            SearchEvent::StrategyInvoked { node, strategy } => {
                debug!(%node, %strategy, "strategy invoked");
            }
            SearchEvent::SolutionScored {
                components, score, ..
            } => debug!(?components, score, "solution scored"),
        }
    }
}

/// Best configuration seen so far
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObservedSolution {
    /// Score of the configuration
    pub score: f64,
    /// Chosen component names
    pub components: Vec<String>,
    /// Configuration as JSON
    pub configuration: serde_json::Value,
}

/// Keeps the highest-scored configuration reported through `SolutionScored`
///
/// Scores of `0.0` or less mark failed evaluations and are never kept.
#[derive(Debug, Default)]
pub struct BestSolutionTracker {
    best: Mutex<Option<ObservedSolution>>,
}

impl BestSolutionTracker {
    /// Create an empty tracker
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Best solution reported so far
    #[must_use]
    pub fn best(&self) -> Option<ObservedSolution> {
        self.best.lock().clone()
    }

    /// Best score reported so far
    #[must_use]
    pub fn best_score(&self) -> Option<f64> {
        self.best.lock().as_ref().map(|s| s.score)
    }
}

impl EventSink for BestSolutionTracker {
    fn publish(&self, event: &SearchEvent) {
        let SearchEvent::SolutionScored {
            components,
            configuration,
            score,
        } = event
        else {
            return;
        };
        let mut best = self.best.lock();
        if *score > best.as_ref().map_or(0.0, |b| b.score) {
            *best = Some(ObservedSolution {
                score: *score,
                components: components.clone(),
                configuration: configuration.clone(),
            });
        }
    }
}

/// Counts `StrategyInvoked` events per strategy name
#[derive(Debug, Default)]
pub struct StrategyCallCounter {
    counts: DashMap<String, u64>,
}

impl StrategyCallCounter {
    /// Create a counter with no calls recorded
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Invocations of `strategy`
    #[must_use]
    pub fn count(&self, strategy: &str) -> u64 {
        self.counts.get(strategy).map_or(0, |c| *c)
    }

    /// All counts, sorted by name
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<String, u64> {
        self.counts
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect()
    }
}

impl EventSink for StrategyCallCounter {
    fn publish(&self, event: &SearchEvent) {
        if let SearchEvent::StrategyInvoked { strategy, .. } = event {
            *self.counts.entry(strategy.clone()).or_insert(0) += 1;
        }
    }
}

/// Forwards every event to each contained sink, in order
#[derive(Default, Clone)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl std::fmt::Debug for FanoutSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FanoutSink")
            .field("sinks", &self.sinks.len())
            .finish()
    }
}

impl FanoutSink {
    /// Create a fanout without sinks
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a sink
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl EventSink for FanoutSink {
    fn publish(&self, event: &SearchEvent) {
        for sink in &self.sinks {
            sink.publish(event);
        }
    }
}

/// Publishes `SolutionScored` for every configuration a scorer evaluates
pub(crate) struct SinkObserver(pub(crate) Arc<dyn EventSink>);

impl ScoreObserver for SinkObserver {
    fn solution_scored(&self, problem: &RestProblem, config: &Configuration, score: f64) {
        self.0.publish(&SearchEvent::SolutionScored {
            components: problem.labels().into_iter().map(String::from).collect(),
            configuration: config.to_json(),
            score,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn scored(score: f64) -> SearchEvent {
        SearchEvent::SolutionScored {
            components: vec!["A".into()],
            configuration: json!({ "score": score }),
            score,
        }
    }

    fn invoked(strategy: &str) -> SearchEvent {
        SearchEvent::StrategyInvoked {
            node: NodeId::new(),
            strategy: strategy.into(),
        }
    }

    #[test]
    fn tracker_keeps_strictly_better() {
        let tracker = BestSolutionTracker::new();
        assert!(tracker.best().is_none());

        tracker.publish(&scored(0.5));
        tracker.publish(&scored(0.9));
        tracker.publish(&scored(0.7));
        let best = tracker.best().unwrap();
        assert!((best.score - 0.9).abs() < f64::EPSILON);
        assert_eq!(best.configuration, json!({ "score": 0.9 }));
    }

    #[test]
    fn counter_counts_per_strategy() {
        let counter = StrategyCallCounter::new();
        counter.publish(&invoked("random"));
        counter.publish(&invoked("random"));
        counter.publish(&invoked("genetic"));
        counter.publish(&scored(1.0));

        assert_eq!(counter.count("random"), 2);
        assert_eq!(counter.count("hyperband"), 0);
        assert_eq!(
            counter.snapshot().into_iter().collect::<Vec<_>>(),
            vec![("genetic".to_string(), 1), ("random".to_string(), 2)]
        );
    }

    #[test]
    fn tracker_ignores_failed_scores() {
        let tracker = BestSolutionTracker::new();
        tracker.publish(&scored(0.0));
        assert_eq!(tracker.best_score(), None);

        tracker.publish(&scored(0.5));
        tracker.publish(&scored(0.0));
        assert_eq!(tracker.best_score(), Some(0.5));
    }

    #[test]
    fn fanout_reaches_every_sink() {
        let tracker = Arc::new(BestSolutionTracker::new());
        let counter = Arc::new(StrategyCallCounter::new());
        let fanout = FanoutSink::new()
            .with_sink(Arc::clone(&tracker) as Arc<dyn EventSink>)
            .with_sink(Arc::clone(&counter) as Arc<dyn EventSink>)
            .with_sink(Arc::new(NoopSink));

        fanout.publish(&scored(2.0));
        fanout.publish(&invoked("random"));

        assert_eq!(tracker.best_score(), Some(2.0));
        assert_eq!(counter.count("random"), 1);
    }

    #[test]
    fn events_serialize_tagged() {
        let value = serde_json::to_value(invoked("random")).unwrap();
        assert_eq!(value["event"], "strategy_invoked");
        assert_eq!(value["strategy"], "random");
    }
}
