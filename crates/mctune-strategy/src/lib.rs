//! mctune strategies
//!
//! Local search at the strategy leaves of the search tree:
//! - [`Evaluator`]s score complete configurations in isolation (worker thread
//!   or child process) under a timeout
//! - a [`Scorer`] binds one parameter domain to an evaluator and to the stop
//!   flags a strategy must honor
//! - [`Strategy`] implementations optimize the parameter vector within a time
//!   budget and are created by name through the [`StrategyRegistry`]

pub mod error;
pub mod evaluator;
pub mod isolation;
pub mod registry;
pub mod scorer;
pub mod strategies;
pub mod strategy;

pub use error::{EvaluationError, Result, StrategyError};
pub use evaluator::{Evaluator, FnEvaluator};
pub use isolation::ProcessEvaluator;
pub use registry::{StrategyFactory, StrategyRegistry};
pub use scorer::{ScoreObserver, Scorer};
pub use strategies::{DiscretizationSearch, GeneticAlgorithm, Hyperband, RandomSearch};
pub use strategy::{random_transform, Optimum, RngSource, Strategy};
