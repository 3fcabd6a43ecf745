//! Lazily expanded search graph
//!
//! Nodes live in an arena owned by [`ExpandableGraph`] and refer to each other
//! by [`NodeId`]. Successors of a node are computed on first request, at most
//! once, even when many threads ask concurrently. A non-terminal node whose
//! expansion yields nothing is a dead end and gets pruned.

use dashmap::DashMap;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Unique node identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(pub Uuid);

impl NodeId {
    /// Fresh random id
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A node of an [`ExpandableGraph`]
#[derive(Debug)]
pub struct Node<P> {
    id: NodeId,
    predecessor: Option<NodeId>,
    depth: usize,
    successors: OnceCell<Vec<NodeId>>,
    pruned: AtomicBool,
    payload: P,
}

impl<P> Node<P> {
    fn new(predecessor: Option<NodeId>, depth: usize, payload: P) -> Self {
        Self {
            id: NodeId::new(),
            predecessor,
            depth,
            successors: OnceCell::new(),
            pruned: AtomicBool::new(false),
            payload,
        }
    }

    /// Node id
    #[inline]
    #[must_use]
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Parent node, `None` for the root
    #[inline]
    #[must_use]
    pub fn predecessor(&self) -> Option<NodeId> {
        self.predecessor
    }

    /// Distance from the root
    #[inline]
    #[must_use]
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Generator-specific data
    #[inline]
    #[must_use]
    pub fn payload(&self) -> &P {
        &self.payload
    }

    /// Successors, if they have been computed
    #[inline]
    #[must_use]
    pub fn successors(&self) -> Option<&[NodeId]> {
        self.successors.get().map(Vec::as_slice)
    }

    /// Whether successors have been computed
    #[inline]
    #[must_use]
    pub fn is_expanded(&self) -> bool {
        self.successors.get().is_some()
    }

    /// Whether this node is excluded from selection
    #[inline]
    #[must_use]
    pub fn is_pruned(&self) -> bool {
        self.pruned.load(Ordering::Acquire)
    }

    /// Exclude this node from selection for good
    #[inline]
    pub fn prune(&self) {
        self.pruned.store(true, Ordering::Release);
    }
}

/// Computes the successors of graph nodes
pub trait SuccessorGenerator: Send + Sync {
    /// Data carried by every node
    type Payload: Send + Sync;

    /// Whether the node can never have successors
    fn is_terminal(&self, node: &Node<Self::Payload>) -> bool;

    /// Payloads of the node's successors
    fn generate(&self, node: &Node<Self::Payload>) -> Vec<Self::Payload>;

    /// Called once for every node added to the graph, the root included
    fn on_node_created(&self, _node: &Node<Self::Payload>) {}
}

/// Node counts gathered by [`ExpandableGraph::survey`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Survey {
    /// Nodes visited
    pub nodes: usize,
    /// Terminal nodes visited
    pub terminals: usize,
    /// Pruned nodes visited
    pub dead_ends: usize,
    /// Deepest level reached
    pub max_depth: usize,
}

/// Arena of lazily expanded nodes
pub struct ExpandableGraph<G: SuccessorGenerator> {
    generator: G,
    nodes: DashMap<NodeId, Arc<Node<G::Payload>>>,
    root: Arc<Node<G::Payload>>,
    expansions: AtomicUsize,
}

impl<G: SuccessorGenerator> fmt::Debug for ExpandableGraph<G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExpandableGraph")
            .field("root", &self.root.id)
            .field("nodes", &self.nodes.len())
            .field("expansions", &self.expansions())
            .finish_non_exhaustive()
    }
}

impl<G: SuccessorGenerator> ExpandableGraph<G> {
    /// Create a graph holding only the root
    pub fn new(generator: G, root: G::Payload) -> Self {
        let root = Arc::new(Node::new(None, 0, root));
        generator.on_node_created(&root);

        let nodes = DashMap::new();
        nodes.insert(root.id, Arc::clone(&root));
        Self {
            generator,
            nodes,
            root,
            expansions: AtomicUsize::new(0),
        }
    }

    /// The successor generator
    #[inline]
    #[must_use]
    pub fn generator(&self) -> &G {
        &self.generator
    }

    /// Root id
    #[inline]
    #[must_use]
    pub fn root_id(&self) -> NodeId {
        self.root.id
    }

    /// Root node
    #[must_use]
    pub fn root(&self) -> Arc<Node<G::Payload>> {
        Arc::clone(&self.root)
    }

    /// Look up a node
    #[must_use]
    pub fn node(&self, id: NodeId) -> Option<Arc<Node<G::Payload>>> {
        self.nodes.get(&id).map(|n| Arc::clone(n.value()))
    }

    /// Whether the node can never have successors
    #[inline]
    #[must_use]
    pub fn is_terminal(&self, node: &Node<G::Payload>) -> bool {
        self.generator.is_terminal(node)
    }

    /// Successor ids of `node`, computing them on first request
    ///
    /// Terminal nodes have no successors. Concurrent callers block until the
    /// single computation finishes and then observe the same list.
    pub fn expand<'n>(&self, node: &'n Node<G::Payload>) -> &'n [NodeId] {
        if self.generator.is_terminal(node) {
            return &[];
        }
        node.successors.get_or_init(|| {
            self.expansions.fetch_add(1, Ordering::Relaxed);
            let payloads = self.generator.generate(node);
            if payloads.is_empty() {
                warn!(node = %node.id, depth = node.depth, "dead end pruned");
                node.prune();
            }
            payloads
                .into_iter()
                .map(|payload| {
                    let child = Node::new(Some(node.id), node.depth + 1, payload);
                    let id = child.id;
                    self.generator.on_node_created(&child);
                    self.nodes.insert(id, Arc::new(child));
                    id
                })
                .collect()
        })
    }

    /// Successor nodes of `node`, computing them on first request
    pub fn children(&self, node: &Node<G::Payload>) -> Vec<Arc<Node<G::Payload>>> {
        self.expand(node)
            .iter()
            .filter_map(|id| self.node(*id))
            .collect()
    }

    /// The node followed by its ancestors up to the root
    #[must_use]
    pub fn path_to_root(&self, id: NodeId) -> Vec<Arc<Node<G::Payload>>> {
        let mut path = Vec::new();
        let mut current = self.node(id);
        while let Some(node) = current {
            current = node.predecessor.and_then(|p| self.node(p));
            path.push(node);
        }
        path
    }

    /// Snapshot of every node created so far, in no particular order
    #[must_use]
    pub fn nodes(&self) -> Vec<Arc<Node<G::Payload>>> {
        self.nodes.iter().map(|n| Arc::clone(n.value())).collect()
    }

    /// Number of nodes created so far
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Always `false`; the root exists from construction
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Number of successor computations performed
    #[inline]
    #[must_use]
    pub fn expansions(&self) -> usize {
        self.expansions.load(Ordering::Relaxed)
    }

    /// Expand breadth-first down to `max_depth` and count what was found
    pub fn survey(&self, max_depth: usize) -> Survey {
        let mut survey = Survey::default();
        let mut queue = VecDeque::from([self.root()]);
        while let Some(node) = queue.pop_front() {
            survey.nodes += 1;
            survey.max_depth = survey.max_depth.max(node.depth);
            if self.is_terminal(&node) {
                survey.terminals += 1;
                continue;
            }
            if node.depth < max_depth {
                queue.extend(self.children(&node));
            }
            if node.is_pruned() {
                survey.dead_ends += 1;
            }
        }
        debug!(?survey, "graph survey finished");
        survey
    }
}
