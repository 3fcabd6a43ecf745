//! Concurrency and structure tests for expandable graphs

use mctune_graph::{ConstraintGenerator, ExpandableGraph, Node, SuccessorGenerator};
use mctune_space::{Component, SearchSpace};
use proptest::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

/// Generator that sleeps while expanding to widen the race window
struct SlowFanout {
    calls: AtomicUsize,
}

impl SuccessorGenerator for SlowFanout {
    type Payload = u8;

    fn is_terminal(&self, node: &Node<u8>) -> bool {
        *node.payload() > 0
    }

    fn generate(&self, _node: &Node<u8>) -> Vec<u8> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        thread::sleep(Duration::from_millis(50));
        vec![1, 2, 3]
    }
}

#[test]
fn concurrent_expand_computes_once() {
    const THREADS: usize = 16;

    let graph = ExpandableGraph::new(
        SlowFanout {
            calls: AtomicUsize::new(0),
        },
        0,
    );
    let root = graph.root();
    let barrier = Barrier::new(THREADS);

    let results: Vec<Vec<_>> = thread::scope(|scope| {
        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                scope.spawn(|| {
                    barrier.wait();
                    graph.expand(&root).to_vec()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(graph.generator().calls.load(Ordering::SeqCst), 1);
    assert_eq!(graph.expansions(), 1);
    assert_eq!(graph.len(), 4);
    for result in &results {
        assert_eq!(result, &results[0]);
    }
}

fn recursive_space(width: usize) -> Arc<SearchSpace> {
    let mut components = vec![Component::new("s.Start").requiring("slot")];
    for i in 0..width {
        let mut c = Component::new(format!("s.Leaf{i}")).providing("slot");
        if i % 2 == 1 {
            c = c.requiring("slot");
        }
        components.push(c);
    }
    Arc::new(SearchSpace::with_components(components))
}

proptest! {
    #[test]
    fn satisfied_problems_only_have_satisfied_descendants(
        width in 1usize..5,
        choices in prop::collection::vec(any::<prop::sample::Index>(), 1..8),
    ) {
        let generator = ConstraintGenerator::new(recursive_space(width));
        let root = generator.root("s.Start").unwrap();
        let graph = ExpandableGraph::new(generator, root);

        let mut node = graph.root();
        let mut seen_satisfied = false;
        for choice in choices {
            let satisfied = node.payload().rest_problem.is_satisfied();
            seen_satisfied |= satisfied;
            prop_assert!(!seen_satisfied || satisfied);
            prop_assert_eq!(graph.is_terminal(&node), satisfied);

            let children = graph.children(&node);
            if children.is_empty() {
                break;
            }
            node = Arc::clone(choice.get(&children));
        }
    }
}
