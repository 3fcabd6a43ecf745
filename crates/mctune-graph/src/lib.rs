//! mctune graphs
//!
//! Building blocks for tree search over configuration structures:
//! - [`ExpandableGraph`], an arena of lazily and exactly-once expanded nodes
//! - [`SuccessorGenerator`], the seam where a search defines its node payloads
//! - [`RestProblem`] and [`ConstraintGenerator`], refining partial
//!   configurations until every required interface is provided
//! - [`StopSignal`], the cooperative stop flag shared by every long-running loop

pub mod constraint;
pub mod error;
pub mod graph;
pub mod signal;

pub use constraint::{ConstraintGenerator, ConstraintNode, Obligation, RestProblem};
pub use error::{GraphError, Result};
pub use graph::{ExpandableGraph, Node, NodeId, SuccessorGenerator, Survey};
pub use signal::StopSignal;
