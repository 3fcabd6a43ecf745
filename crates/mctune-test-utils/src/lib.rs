//! Testing utilities for the mctune workspace
//!
//! Shared search spaces and evaluators.

#![allow(missing_docs)]

use mctune_space::{Component, ParameterKind, ParameterSpec, ParameterValue, SearchSpace};
use mctune_strategy::{Evaluator, FnEvaluator};
use serde_json::json;
use std::sync::Arc;

/// `test.A` requires `K`; `test.B` and `test.C` provide it.
pub fn two_provider_space() -> SearchSpace {
    SearchSpace::with_components([
        Component::new("test.A").requiring("K"),
        Component::new("test.B").providing("K"),
        Component::new("test.C").providing("K"),
    ])
}

/// Like [`two_provider_space`], but `test.B` requires `M`, which nobody provides.
pub fn dead_end_space() -> SearchSpace {
    SearchSpace::with_components([
        Component::new("test.A").requiring("K"),
        Component::new("test.B").providing("K").requiring("M"),
        Component::new("test.C").providing("K"),
    ])
}

/// Every path from `test.A` ends in a missing provider.
pub fn unsatisfiable_space() -> SearchSpace {
    SearchSpace::with_components([
        Component::new("test.A").requiring("K"),
        Component::new("test.B").providing("K").requiring("M"),
    ])
}

/// `test.Pipeline` requires a `model`; two tunable models provide one.
pub fn parameterised_space() -> SearchSpace {
    SearchSpace::with_components([
        Component::new("test.Pipeline").requiring("model"),
        Component::new("test.Linear")
            .providing("model")
            .with_parameter(
                ParameterSpec::new("alpha", ParameterKind::Double { min: 0.0, max: 1.0 })
                    .with_default(ParameterValue::Double(0.5)),
            ),
        Component::new("test.Tree")
            .providing("model")
            .with_parameter(ParameterSpec::new("depth", ParameterKind::Int { min: 1, max: 10 }))
            .with_parameter(ParameterSpec::new(
                "criterion",
                ParameterKind::Categorical {
                    values: vec![json!("gini"), json!("entropy")],
                },
            )),
    ])
}

/// Evaluator scoring every configuration with `score`.
pub fn constant_evaluator(score: f64) -> Arc<dyn Evaluator> {
    Arc::new(FnEvaluator::infallible(move |_, _| score))
}
