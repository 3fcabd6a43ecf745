//! End-to-end behavior of the search loop

use mctune_core::{
    BestSolutionTracker, EventSink, FanoutSink, MctsSearch, RolloutResult, SearchConfig,
    SearchError, SearchNode, StrategyCallCounter,
};
use mctune_graph::{ConstraintGenerator, ExpandableGraph, Node};
use mctune_space::SlotId;
use mctune_space::{Configuration, ParameterValue};
use mctune_strategy::{
    EvaluationError, Evaluator, FnEvaluator, Optimum, Scorer, Strategy, StrategyRegistry,
};
use mctune_test_utils::{
    constant_evaluator, dead_end_space, parameterised_space, two_provider_space,
    unsatisfiable_space,
};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn quick_config() -> SearchConfig {
    SearchConfig::new()
        .with_strategies(["random"])
        .with_optimization_time_budget(Duration::from_millis(200))
        .with_grace_period(Duration::from_millis(200))
        .with_evaluation_timeout(Duration::from_secs(1))
        .with_seed(11)
}

fn leaves(search: &MctsSearch) -> Vec<Arc<Node<SearchNode>>> {
    search
        .graph()
        .nodes()
        .into_iter()
        .filter(|n| n.payload().is_leaf())
        .collect()
}

#[test]
fn two_providers_converge_to_constant_score() {
    let structural = ExpandableGraph::new(
        ConstraintGenerator::new(Arc::new(two_provider_space())),
        ConstraintGenerator::new(Arc::new(two_provider_space()))
            .root("test.A")
            .unwrap(),
    );
    assert_eq!(structural.survey(10).terminals, 2);

    let search = MctsSearch::builder(Arc::new(two_provider_space()), "test.A", constant_evaluator(1.0))
        .with_config(quick_config())
        .build()
        .unwrap();
    search.run_rounds(5);

    let leaves = leaves(&search);
    assert_eq!(leaves.len(), 2);
    for leaf in &leaves {
        let stats = leaf.payload().stats();
        assert!(stats.visits() >= 1);
        assert!((stats.score_avg() - 1.0).abs() < f64::EPSILON);
    }
    let root = search.graph().root().payload().stats();
    assert!((root.score_avg() - 1.0).abs() < f64::EPSILON);
    assert!(search.rounds() >= 1);
}

#[test]
fn back_propagation_keeps_running_mean() {
    let search = MctsSearch::builder(Arc::new(two_provider_space()), "test.A", constant_evaluator(1.0))
        .with_config(quick_config())
        .build()
        .unwrap();
    let graph = search.graph();
    let structural = graph.children(&graph.root()).remove(0);
    let leaf = graph.children(&structural).remove(0);

    let results: Vec<RolloutResult> = [1.0, 2.0, 3.0]
        .into_iter()
        .map(|score| RolloutResult {
            leaf: leaf.id(),
            score,
        })
        .collect();
    search.back_propagate(&results);

    for node in [&leaf, &structural, &graph.root()] {
        let stats = node.payload().stats();
        assert_eq!(stats.visits(), 3);
        assert!((stats.score_avg() - 2.0).abs() < f64::EPSILON);
    }
    // Visited as often as its parent: no exploration bonus left.
    assert!((leaf.payload().stats().node_value() - 2.0).abs() < f64::EPSILON);
}

#[test]
fn dead_end_is_never_selected() {
    let search = MctsSearch::builder(Arc::new(dead_end_space()), "test.A", constant_evaluator(0.5))
        .with_config(quick_config())
        .build()
        .unwrap();
    search.run_rounds(1);

    let dead = search
        .graph()
        .nodes()
        .into_iter()
        .find(|n| n.payload().label() == "B")
        .unwrap();
    assert!(dead.is_pruned());

    for _ in 0..50 {
        let candidate = search.select().unwrap();
        let path = search.graph().path_to_root(candidate.id());
        assert!(path.iter().all(|n| n.id() != dead.id()));
        assert!(search.iterate());
    }
}

#[test]
fn random_selection_skips_back_propagation() {
    let search = MctsSearch::builder(Arc::new(two_provider_space()), "test.A", constant_evaluator(1.0))
        .with_config(quick_config().with_random_selection(true))
        .build()
        .unwrap();
    search.run_rounds(3);

    assert!(search
        .graph()
        .nodes()
        .iter()
        .all(|n| n.payload().stats().visits() == 0));
    assert!((search.best().unwrap().score - 1.0).abs() < f64::EPSILON);
}

#[test]
fn events_reach_injected_sinks() {
    let tracker = Arc::new(BestSolutionTracker::new());
    let counter = Arc::new(StrategyCallCounter::new());
    let sink = FanoutSink::new()
        .with_sink(Arc::clone(&tracker) as Arc<dyn EventSink>)
        .with_sink(Arc::clone(&counter) as Arc<dyn EventSink>);
    let search = MctsSearch::builder(Arc::new(two_provider_space()), "test.A", constant_evaluator(1.0))
        .with_config(quick_config())
        .with_sink(Arc::new(sink))
        .build()
        .unwrap();
    search.run_rounds(2);

    assert_eq!(tracker.best_score(), Some(1.0));
    assert!(counter.count("random") >= 2);
}

#[test]
fn nothing_scored_means_no_solution() {
    let search = MctsSearch::builder(Arc::new(two_provider_space()), "test.A", constant_evaluator(1.0))
        .with_config(quick_config())
        .build()
        .unwrap();
    assert!(matches!(search.best(), Err(SearchError::NoSolution)));
}

fn failing_evaluator() -> Arc<dyn Evaluator> {
    Arc::new(FnEvaluator::new(|_, _| {
        Err(EvaluationError::Failed("evaluation crashed".into()))
    }))
}

#[test]
fn failed_evaluations_are_no_solution() {
    let tracker = Arc::new(BestSolutionTracker::new());
    let search = MctsSearch::builder(Arc::new(parameterised_space()), "test.Pipeline", failing_evaluator())
        .with_config(quick_config())
        .with_sink(Arc::clone(&tracker) as Arc<dyn EventSink>)
        .build()
        .unwrap();
    search.run_rounds(2);

    assert!(search.rounds() >= 1);
    assert!(matches!(search.best(), Err(SearchError::NoSolution)));
    assert_eq!(tracker.best_score(), None);
}

#[tokio::test]
async fn run_with_failing_evaluator_finds_no_solution() {
    let config = quick_config()
        .with_search_timeout(Duration::from_secs(2))
        .with_stop_margin(Duration::from_secs(1));
    let search = MctsSearch::builder(Arc::new(parameterised_space()), "test.Pipeline", failing_evaluator())
        .with_config(config)
        .build()
        .unwrap();

    let started = Instant::now();
    let result = Arc::new(search).run().await;

    assert!(matches!(result, Err(SearchError::NoSolution)));
    assert!(started.elapsed() < Duration::from_secs(4));
}

#[test]
fn unknown_start_or_strategy_is_rejected() {
    let unknown_start =
        MctsSearch::builder(Arc::new(two_provider_space()), "test.Z", constant_evaluator(1.0))
            .with_config(quick_config())
            .build();
    assert!(matches!(unknown_start, Err(SearchError::Graph(_))));

    let unknown_strategy =
        MctsSearch::builder(Arc::new(two_provider_space()), "test.A", constant_evaluator(1.0))
            .with_config(quick_config().with_strategies(["smac"]))
            .build();
    assert!(matches!(unknown_strategy, Err(SearchError::Strategy(_))));
}

/// Ignores its cancellation flag and sleeps for ten seconds.
#[derive(Debug)]
struct Stubborn;

impl Strategy for Stubborn {
    fn name(&self) -> &'static str {
        "stubborn"
    }

    fn optimize(&self, scorer: &Scorer, _budget: Duration) -> mctune_strategy::Result<Optimum> {
        thread::sleep(Duration::from_secs(10));
        Optimum::decode(scorer, scorer.domain().default_vector(), 0.0)
    }
}

#[test]
fn batch_returns_by_deadline_plus_grace() {
    let mut registry = StrategyRegistry::new();
    registry.register("stubborn", |_| Box::new(Stubborn));
    let config = quick_config()
        .with_strategies(["stubborn"])
        .with_optimization_time_budget(Duration::from_secs(2))
        .with_grace_period(Duration::from_millis(200));
    let search = MctsSearch::builder(Arc::new(parameterised_space()), "test.Pipeline", constant_evaluator(1.0))
        .with_config(config)
        .with_registry(registry)
        .build()
        .unwrap();

    let root = search.select().unwrap();
    let frontier = search.expand_candidate(&root);
    assert_eq!(frontier.len(), 2);

    let started = Instant::now();
    let results = search.simulate(&frontier);
    let elapsed = started.elapsed();

    assert!(results.is_empty());
    assert!(elapsed >= Duration::from_secs(2));
    assert!(elapsed < Duration::from_millis(2_700), "took {elapsed:?}");
}

fn alpha(config: &Configuration) -> f64 {
    match config.value(SlotId(1), "alpha") {
        Some(ParameterValue::Double(alpha)) => *alpha,
        _ => 0.0,
    }
}

#[tokio::test]
async fn run_returns_best_solution() {
    let evaluator = Arc::new(FnEvaluator::infallible(|_, config| 1.0 + alpha(config)));
    let config = quick_config()
        .with_search_timeout(Duration::from_millis(1500))
        .with_stop_margin(Duration::from_millis(500));
    let search = MctsSearch::builder(Arc::new(parameterised_space()), "test.Pipeline", evaluator)
        .with_config(config)
        .build()
        .unwrap();

    let started = Instant::now();
    let solution = Arc::new(search).run().await.unwrap();

    assert!(started.elapsed() < Duration::from_secs(3));
    assert!(solution.score >= 1.0);
    assert_eq!(solution.components[0], "Pipeline");
    assert_eq!(solution.configuration.len(), 2);
}

#[tokio::test]
async fn unsatisfiable_space_ends_early_without_solution() {
    let config = quick_config()
        .with_search_timeout(Duration::from_secs(30))
        .with_stop_margin(Duration::from_secs(1));
    let search = MctsSearch::builder(Arc::new(unsatisfiable_space()), "test.A", constant_evaluator(1.0))
        .with_config(config)
        .build()
        .unwrap();

    let started = Instant::now();
    let result = Arc::new(search).run().await;

    assert!(matches!(result, Err(SearchError::NoSolution)));
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn raised_stop_signal_cancels_run() {
    let search = MctsSearch::builder(Arc::new(two_provider_space()), "test.A", constant_evaluator(1.0))
        .with_config(quick_config())
        .build()
        .unwrap();
    search.stop_signal().raise();

    let result = Arc::new(search).run().await;
    assert!(matches!(result, Err(SearchError::Cancelled)));
}
