//! Built-in strategies

pub mod discretization;
pub mod genetic;
pub mod hyperband;
pub mod random;

pub use discretization::DiscretizationSearch;
pub use genetic::GeneticAlgorithm;
pub use hyperband::Hyperband;
pub use random::RandomSearch;
