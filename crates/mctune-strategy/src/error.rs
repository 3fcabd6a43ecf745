//! Error types for scoring and strategies
//!
//! Evaluation failures never escape a strategy: the [`Scorer`](crate::Scorer)
//! logs them and records a score of zero. Strategy errors only arise when a
//! strategy is requested by an unknown name or produces an undecodable vector.

use mctune_space::SpaceError;
use std::time::Duration;

/// Failure of a single configuration evaluation
#[derive(Debug, thiserror::Error)]
pub enum EvaluationError {
    /// The evaluation did not finish in time
    #[error("evaluation timed out after {0:?}")]
    Timeout(Duration),

    /// The evaluator reported a failure
    #[error("evaluation failed: {0}")]
    Failed(String),

    /// The evaluation process could not be run
    #[error("evaluation process error: {0}")]
    Process(#[from] std::io::Error),

    /// The evaluation panicked
    #[error("evaluation panicked: {0}")]
    Panicked(String),

    /// The evaluator produced something that is not a score
    #[error("invalid evaluator output: {0}")]
    InvalidOutput(String),
}

impl EvaluationError {
    /// Check if the error is a timeout
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

/// Strategy error type
#[derive(Debug, thiserror::Error)]
pub enum StrategyError {
    /// No factory registered under that name
    #[error("unknown strategy: {0}")]
    UnknownStrategy(String),

    /// A vector could not be decoded
    #[error(transparent)]
    Space(#[from] SpaceError),
}

/// Result alias for strategy operations
pub type Result<T> = std::result::Result<T, StrategyError>;
