//! Constraint refinement
//!
//! A [`RestProblem`] records the components chosen so far and the interface
//! obligations they introduced. Refining a rest problem satisfies its first
//! open obligation with each component able to provide it; the chosen
//! component's own requirements are appended as new obligations. A rest
//! problem without open obligations describes a complete configuration
//! structure.

use crate::error::{GraphError, Result};
use crate::graph::{Node, SuccessorGenerator};
use mctune_space::{Component, ComponentMapping, ConstructionKey, SearchSpace, SlotId};
use std::sync::Arc;
use tracing::debug;

/// An interface some chosen component needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Obligation {
    /// Required interface
    pub interface: String,
    /// Slot of the component that needs it
    pub required_by: SlotId,
    /// Construction position within the requiring component
    pub construction_key: Option<ConstructionKey>,
    /// Slot of the component satisfying it, once chosen
    pub satisfied_with: Option<SlotId>,
}

/// Open obligations plus the components chosen so far
#[derive(Debug, Clone, PartialEq)]
pub struct RestProblem {
    obligations: Vec<Obligation>,
    components: ComponentMapping,
}

impl RestProblem {
    /// Rest problem with only the start component chosen
    #[must_use]
    pub fn initial(start: Arc<Component>) -> Self {
        let mut problem = Self {
            obligations: Vec::new(),
            components: ComponentMapping::new(),
        };
        problem.choose(start);
        problem
    }

    fn choose(&mut self, component: Arc<Component>) -> SlotId {
        let slot = SlotId::next_for(&self.components);
        self.obligations
            .extend(component.required.iter().map(|required| Obligation {
                interface: required.name.clone(),
                required_by: slot,
                construction_key: required.construction_key.clone(),
                satisfied_with: None,
            }));
        self.components.insert(slot, component);
        slot
    }

    /// Whether every obligation is satisfied
    #[must_use]
    pub fn is_satisfied(&self) -> bool {
        self.obligations.iter().all(|o| o.satisfied_with.is_some())
    }

    /// First open obligation, in introduction order
    #[must_use]
    pub fn first_unsatisfied(&self) -> Option<&Obligation> {
        self.obligations.iter().find(|o| o.satisfied_with.is_none())
    }

    /// Copy of this rest problem with the first open obligation satisfied by `component`
    ///
    /// Returns `None` if nothing is open or `component` does not provide the
    /// required interface.
    #[must_use]
    pub fn satisfy_first(&self, component: &Arc<Component>) -> Option<Self> {
        let index = self
            .obligations
            .iter()
            .position(|o| o.satisfied_with.is_none())?;
        if !component.provides(&self.obligations[index].interface) {
            return None;
        }

        let mut next = self.clone();
        let slot = next.choose(Arc::clone(component));
        next.obligations[index].satisfied_with = Some(slot);
        Some(next)
    }

    /// All obligations, in introduction order
    #[inline]
    #[must_use]
    pub fn obligations(&self) -> &[Obligation] {
        &self.obligations
    }

    /// Chosen components by slot
    #[inline]
    #[must_use]
    pub fn components(&self) -> &ComponentMapping {
        &self.components
    }

    /// Short names of the chosen components, in choice order
    #[must_use]
    pub fn labels(&self) -> Vec<&str> {
        self.components.values().map(|c| c.short_name()).collect()
    }
}

/// Payload of constraint-graph nodes
#[derive(Debug, Clone)]
pub struct ConstraintNode {
    /// Rest problem of the node
    pub rest_problem: Arc<RestProblem>,
    /// Short name of the component chosen last
    pub label: String,
}

/// Successor generator refining rest problems against a search space
#[derive(Debug, Clone)]
pub struct ConstraintGenerator {
    space: Arc<SearchSpace>,
}

impl ConstraintGenerator {
    /// Create a generator over `space`
    #[must_use]
    pub fn new(space: Arc<SearchSpace>) -> Self {
        Self { space }
    }

    /// The search space
    #[inline]
    #[must_use]
    pub fn space(&self) -> &Arc<SearchSpace> {
        &self.space
    }

    /// Root payload starting from the named component
    ///
    /// # Errors
    ///
    /// Returns an error if the space has no component of that name.
    pub fn root(&self, start: &str) -> Result<ConstraintNode> {
        let component = Arc::clone(self.space.require(start)?);
        Ok(ConstraintNode {
            label: component.short_name().to_string(),
            rest_problem: Arc::new(RestProblem::initial(component)),
        })
    }

    /// Refinements of `problem`, one per provider of its first open obligation
    ///
    /// Empty when the problem is satisfied or nobody provides the interface.
    #[must_use]
    pub fn refine(&self, problem: &RestProblem) -> Vec<ConstraintNode> {
        let Some(open) = problem.first_unsatisfied() else {
            return Vec::new();
        };
        let refinements: Vec<_> = self
            .space
            .providers_of(&open.interface)
            .iter()
            .filter_map(|provider| {
                problem.satisfy_first(provider).map(|refined| ConstraintNode {
                    label: provider.short_name().to_string(),
                    rest_problem: Arc::new(refined),
                })
            })
            .collect();
        debug!(
            interface = %open.interface,
            required_by = %open.required_by,
            candidates = refinements.len(),
            "refined rest problem"
        );
        refinements
    }

    /// Error describing why `problem` cannot be refined, if it is a dead end
    #[must_use]
    pub fn dead_end(&self, problem: &RestProblem) -> Option<GraphError> {
        let open = problem.first_unsatisfied()?;
        self.space
            .providers_of(&open.interface)
            .is_empty()
            .then(|| GraphError::DeadEnd {
                interface: open.interface.clone(),
                required_by: open.required_by,
            })
    }
}

impl SuccessorGenerator for ConstraintGenerator {
    type Payload = ConstraintNode;

    fn is_terminal(&self, node: &Node<ConstraintNode>) -> bool {
        node.payload().rest_problem.is_satisfied()
    }

    fn generate(&self, node: &Node<ConstraintNode>) -> Vec<ConstraintNode> {
        self.refine(&node.payload().rest_problem)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::ExpandableGraph;
    use pretty_assertions::assert_eq;

    fn space() -> Arc<SearchSpace> {
        Arc::new(SearchSpace::with_components([
            Component::new("p.Pipeline").requiring("prep").requiring("model"),
            Component::new("p.Scaler").providing("prep"),
            Component::new("p.Chain").providing("prep").requiring("prep"),
            Component::new("p.Tree").providing("model"),
            Component::new("p.Forest").providing("model").requiring("model"),
        ]))
    }

    #[test]
    fn initial_problem_lists_start_requirements() {
        let generator = ConstraintGenerator::new(space());
        let root = generator.root("p.Pipeline").unwrap();
        let problem = &root.rest_problem;

        assert!(!problem.is_satisfied());
        assert_eq!(problem.obligations().len(), 2);
        assert_eq!(problem.first_unsatisfied().unwrap().interface, "prep");
        assert_eq!(problem.labels(), vec!["Pipeline"]);
    }

    #[test]
    fn refine_satisfies_first_obligation_and_appends_new_ones() {
        let generator = ConstraintGenerator::new(space());
        let root = generator.root("p.Pipeline").unwrap();
        let refined = generator.refine(&root.rest_problem);

        let labels: Vec<_> = refined.iter().map(|n| n.label.as_str()).collect();
        assert_eq!(labels, vec!["Scaler", "Chain"]);

        let chain = &refined[1].rest_problem;
        assert_eq!(chain.obligations().len(), 3);
        assert_eq!(chain.obligations()[0].satisfied_with, Some(SlotId(1)));
        assert_eq!(chain.first_unsatisfied().unwrap().interface, "model");
        assert_eq!(chain.obligations()[2].required_by, SlotId(1));
    }

    #[test]
    fn satisfy_first_rejects_wrong_provider() {
        let space = space();
        let root = RestProblem::initial(Arc::clone(space.component("p.Pipeline").unwrap()));
        assert!(root.satisfy_first(space.component("p.Tree").unwrap()).is_none());
    }

    #[test]
    fn unknown_start_component() {
        let generator = ConstraintGenerator::new(space());
        assert!(matches!(generator.root("p.Missing"), Err(GraphError::Space(_))));
    }

    #[test]
    fn dead_end_is_reported_and_pruned() {
        let space = Arc::new(SearchSpace::with_components([
            Component::new("p.Root").requiring("nothing"),
        ]));
        let generator = ConstraintGenerator::new(space);
        let root = generator.root("p.Root").unwrap();
        assert!(matches!(
            generator.dead_end(&root.rest_problem),
            Some(GraphError::DeadEnd { .. })
        ));

        let graph = ExpandableGraph::new(generator, root);
        let node = graph.root();
        assert!(graph.expand(&node).is_empty());
        assert!(node.is_pruned());
    }

    #[test]
    fn survey_of_bounded_graph() {
        let generator = ConstraintGenerator::new(space());
        let root = generator.root("p.Pipeline").unwrap();
        let graph = ExpandableGraph::new(generator, root);

        let survey = graph.survey(3);
        // Pipeline -> {Scaler, Chain}; Scaler -> {Tree, Forest}; Chain -> {Scaler, Chain}
        assert_eq!(survey.max_depth, 3);
        assert!(survey.terminals >= 1);
        assert_eq!(survey.dead_ends, 0);
    }
}
