//! Concurrent simulation runner
//!
//! Runs one batch of rollouts. Every frontier node is replicated `repeats`
//! times and each replica gets its own thread that walks randomly down to a
//! terminal leaf and scores it. The runner returns what finished by the batch
//! deadline plus a grace period; stragglers are abandoned, never joined.

use crossbeam::channel::{self, RecvTimeoutError};
use mctune_graph::{ExpandableGraph, Node, NodeId, StopSignal, SuccessorGenerator};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Scoring of terminal leaves, as needed by rollouts
pub trait LeafScoring: SuccessorGenerator {
    /// Score `leaf` within `budget`; `None` if nothing was scored
    ///
    /// Scoring should wind down once `cancel` is raised.
    fn score(&self, leaf: &Node<Self::Payload>, budget: Duration, cancel: &StopSignal)
        -> Option<f64>;
}

/// Score reached by one completed rollout
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RolloutResult {
    /// Terminal leaf that was scored
    pub leaf: NodeId,
    /// Its score
    pub score: f64,
}

/// Cancellation flags of the rollouts of one batch
#[derive(Debug, Default)]
pub struct CancelRegistry {
    inner: Mutex<CancelState>,
}

#[derive(Debug, Default)]
struct CancelState {
    flags: Vec<StopSignal>,
    cancelled: bool,
}

impl CancelRegistry {
    /// Create an empty registry
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a flag tracked by this batch
    ///
    /// A flag created after [`cancel_all`](Self::cancel_all) is raised right
    /// away.
    pub fn register(&self) -> StopSignal {
        let flag = StopSignal::new();
        let mut state = self.inner.lock();
        if state.cancelled {
            flag.raise();
        }
        state.flags.push(flag.clone());
        flag
    }

    /// Raise every registered flag
    pub fn cancel_all(&self) {
        let mut state = self.inner.lock();
        state.cancelled = true;
        for flag in &state.flags {
            flag.raise();
        }
    }

    /// Number of registered flags
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().flags.len()
    }

    /// Whether no flag was registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().flags.is_empty()
    }
}

/// Runs batches of concurrent rollouts
#[derive(Debug)]
pub struct SimulationRunner {
    repeats: usize,
    grace_period: Duration,
    seed: u64,
    spawned: AtomicU64,
}

impl SimulationRunner {
    /// Runner starting `repeats` rollouts per frontier node
    #[must_use]
    pub fn new(repeats: usize, grace_period: Duration, seed: u64) -> Self {
        Self {
            repeats,
            grace_period,
            seed,
            spawned: AtomicU64::new(0),
        }
    }

    /// Rollouts per frontier node
    #[inline]
    #[must_use]
    pub fn repeats(&self) -> usize {
        self.repeats
    }

    /// Time cancelled rollouts get to finish
    #[inline]
    #[must_use]
    pub fn grace_period(&self) -> Duration {
        self.grace_period
    }

    /// Roll out from every frontier node and collect the scores in time
    ///
    /// Returns no later than `budget + grace_period` after the call. A rollout
    /// that panics contributes nothing.
    pub fn run<G>(
        &self,
        graph: &Arc<ExpandableGraph<G>>,
        frontier: &[NodeId],
        budget: Duration,
        stop: &StopSignal,
    ) -> Vec<RolloutResult>
    where
        G: LeafScoring + 'static,
    {
        let started = Instant::now();
        let deadline = started + budget;
        let cancels = Arc::new(CancelRegistry::new());
        let (tx, rx) = channel::unbounded::<Option<RolloutResult>>();

        let mut launched = 0usize;
        for _ in 0..self.repeats {
            for &start in frontier {
                let n = self.spawned.fetch_add(1, Ordering::Relaxed);
                let mut rng =
                    StdRng::seed_from_u64(self.seed ^ n.wrapping_mul(0x9E37_79B9_7F4A_7C15));
                let graph = Arc::clone(graph);
                let cancels = Arc::clone(&cancels);
                let stop = stop.clone();
                let tx = tx.clone();

                let spawned = thread::Builder::new()
                    .name(format!("mctune-rollout-{n}"))
                    .spawn(move || {
                        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                            rollout(&graph, start, deadline, &stop, &cancels, &mut rng)
                        }))
                        .unwrap_or_else(|payload| {
                            warn!(panic = %panic_message(payload.as_ref()), "rollout panicked");
                            None
                        });
                        // The receiver is gone once the rollout was abandoned.
                        let _ = tx.send(outcome);
                    });
                match spawned {
                    Ok(_) => launched += 1,
                    Err(err) => warn!(error = %err, "failed to start rollout"),
                }
            }
        }
        drop(tx);

        let mut results = Vec::new();
        let mut finished = 0usize;
        collect_until(&rx, deadline, launched, &mut finished, &mut results);
        if finished < launched {
            cancels.cancel_all();
            let until = deadline + self.grace_period;
            collect_until(&rx, until, launched, &mut finished, &mut results);
        }

        if finished < launched {
            warn!(
                abandoned = launched - finished,
                grace_ms = u64::try_from(self.grace_period.as_millis()).unwrap_or(u64::MAX),
                "rollouts ignored cancellation and were abandoned"
            );
        }
        debug!(
            launched,
            completed = results.len(),
            elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "simulation batch finished"
        );
        results
    }
}

fn collect_until(
    rx: &channel::Receiver<Option<RolloutResult>>,
    until: Instant,
    launched: usize,
    finished: &mut usize,
    results: &mut Vec<RolloutResult>,
) {
    while *finished < launched {
        match rx.recv_deadline(until) {
            Ok(outcome) => {
                *finished += 1;
                results.extend(outcome);
            }
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => break,
        }
    }
}

fn rollout<G, R>(
    graph: &ExpandableGraph<G>,
    start: NodeId,
    deadline: Instant,
    stop: &StopSignal,
    cancels: &CancelRegistry,
    rng: &mut R,
) -> Option<RolloutResult>
where
    G: LeafScoring,
    R: Rng,
{
    let mut node = graph.node(start)?;
    while !graph.is_terminal(&node) {
        if stop.is_raised() {
            return None;
        }
        let live: Vec<_> = graph
            .children(&node)
            .into_iter()
            .filter(|child| !child.is_pruned())
            .collect();
        node = Arc::clone(live.choose(rng)?);
    }
    if stop.is_raised() {
        return None;
    }

    let cancel = cancels.register();
    let budget = deadline.saturating_duration_since(Instant::now());
    let score = graph.generator().score(&node, budget, &cancel)?;
    Some(RolloutResult {
        leaf: node.id(),
        score,
    })
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    /// Root with `width` terminal children; leaf scores are their index.
    struct Fan {
        width: u32,
        sleep: Duration,
        panic_on: Option<u32>,
        cancelled: AtomicUsize,
        scored: AtomicUsize,
    }

    impl Fan {
        fn new(width: u32) -> Self {
            Self {
                width,
                sleep: Duration::ZERO,
                panic_on: None,
                cancelled: AtomicUsize::new(0),
                scored: AtomicUsize::new(0),
            }
        }
    }

    impl SuccessorGenerator for Fan {
        type Payload = u32;

        fn is_terminal(&self, node: &Node<u32>) -> bool {
            node.depth() > 0
        }

        fn generate(&self, _node: &Node<u32>) -> Vec<u32> {
            (1..=self.width).collect()
        }
    }

    impl LeafScoring for Fan {
        fn score(&self, leaf: &Node<u32>, _budget: Duration, cancel: &StopSignal) -> Option<f64> {
            if Some(*leaf.payload()) == self.panic_on {
                panic!("scoring failed");
            }
            thread::sleep(self.sleep);
            if cancel.is_raised() {
                self.cancelled.fetch_add(1, Ordering::SeqCst);
            }
            self.scored.fetch_add(1, Ordering::SeqCst);
            Some(f64::from(*leaf.payload()))
        }
    }

    #[test]
    fn replicates_frontier() {
        let graph = Arc::new(ExpandableGraph::new(Fan::new(3), 0));
        let frontier = graph.expand(&graph.root()).to_vec();
        let runner = SimulationRunner::new(2, Duration::from_millis(100), 1);

        let results = runner.run(&graph, &frontier, Duration::from_secs(5), &StopSignal::new());
        assert_eq!(results.len(), 6);
        for id in &frontier {
            assert_eq!(results.iter().filter(|r| r.leaf == *id).count(), 2);
        }
    }

    #[test]
    fn walks_down_from_the_root() {
        let graph = Arc::new(ExpandableGraph::new(Fan::new(4), 0));
        let runner = SimulationRunner::new(8, Duration::from_millis(100), 9);

        let results = runner.run(&graph, &[graph.root_id()], Duration::from_secs(5), &StopSignal::new());
        assert_eq!(results.len(), 8);
        assert!(results.iter().all(|r| (1.0..=4.0).contains(&r.score)));
        assert!(graph.root().is_expanded());
    }

    #[test]
    fn panicking_rollout_spares_siblings() {
        let mut fan = Fan::new(2);
        fan.panic_on = Some(1);
        let graph = Arc::new(ExpandableGraph::new(fan, 0));
        let frontier = graph.expand(&graph.root()).to_vec();
        let runner = SimulationRunner::new(1, Duration::from_millis(100), 1);

        let results = runner.run(&graph, &frontier, Duration::from_secs(5), &StopSignal::new());
        assert_eq!(results.len(), 1);
        assert!((results[0].score - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn stop_signal_skips_scoring() {
        let graph = Arc::new(ExpandableGraph::new(Fan::new(2), 0));
        let stop = StopSignal::new();
        stop.raise();
        let runner = SimulationRunner::new(3, Duration::from_millis(100), 1);

        let results = runner.run(&graph, &[graph.root_id()], Duration::from_secs(5), &stop);
        assert!(results.is_empty());
        assert_eq!(graph.generator().scored.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn deadline_cancels_registered_flags() {
        let mut fan = Fan::new(1);
        fan.sleep = Duration::from_millis(400);
        let graph = Arc::new(ExpandableGraph::new(fan, 0));
        let frontier = graph.expand(&graph.root()).to_vec();
        let runner = SimulationRunner::new(1, Duration::from_secs(2), 1);

        let results = runner.run(&graph, &frontier, Duration::from_millis(50), &StopSignal::new());
        assert_eq!(graph.generator().cancelled.load(Ordering::SeqCst), 1);
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn registry_cancels_current_and_late_flags() {
        let registry = CancelRegistry::new();
        let early = registry.register();
        assert!(!early.is_raised());

        registry.cancel_all();
        assert!(early.is_raised());

        let late = registry.register();
        assert!(late.is_raised());
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn later_batch_leaves_abandoned_rollouts_cancelled() {
        let mut fan = Fan::new(1);
        fan.sleep = Duration::from_millis(600);
        let graph = Arc::new(ExpandableGraph::new(fan, 0));
        let frontier = graph.expand(&graph.root()).to_vec();
        let runner = SimulationRunner::new(1, Duration::from_millis(50), 1);

        let first = runner.run(&graph, &frontier, Duration::from_millis(50), &StopSignal::new());
        assert!(first.is_empty());
        // The straggler of the first batch is still sleeping while the
        // second batch registers its own flag for the same leaf.
        let second = runner.run(&graph, &frontier, Duration::from_secs(5), &StopSignal::new());
        assert_eq!(second.len(), 1);

        thread::sleep(Duration::from_millis(300));
        assert_eq!(graph.generator().cancelled.load(Ordering::SeqCst), 1);
        assert_eq!(graph.generator().scored.load(Ordering::SeqCst), 2);
    }
}
