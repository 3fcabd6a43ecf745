//! Error types for mctune core
//!
//! Covers:
//! - Configuration loading and validation
//! - Search construction failures (unknown start component, unknown strategy)
//! - Searches ending without any scored configuration

use mctune_graph::GraphError;
use mctune_space::SpaceError;
use mctune_strategy::StrategyError;
use std::path::PathBuf;

/// Search configuration error
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Configuration file could not be read
    #[error("failed to read {path}: {source}")]
    Io {
        /// File that failed
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// TOML syntax or schema failure
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is out of range
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Main search error type
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    /// The deadline passed before any configuration was scored
    #[error("no solution found")]
    NoSolution,

    /// Invalid configuration
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Search-space failure
    #[error("search space error: {0}")]
    Space(#[from] SpaceError),

    /// Graph construction failure
    #[error("graph error: {0}")]
    Graph(#[from] GraphError),

    /// Strategy lookup failure
    #[error("strategy error: {0}")]
    Strategy(#[from] StrategyError),

    /// The search driver thread died
    #[error("search driver failed: {0}")]
    Driver(String),

    /// The search driver did not stop within the stop margin
    #[error("search driver did not stop within {duration_secs:.1}s")]
    Timeout {
        /// Stop margin that was exceeded
        duration_secs: f64,
    },

    /// The search was cancelled before it could start
    #[error("search cancelled")]
    Cancelled,
}

impl SearchError {
    /// Check if running the search again might succeed
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::NoSolution | Self::Driver(_) | Self::Timeout { .. }
        )
    }

    /// Check if the error stems from a stop request
    #[inline]
    #[must_use]
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Result alias for search operations
pub type Result<T> = std::result::Result<T, SearchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_error_is_retryable() {
        assert!(SearchError::NoSolution.is_retryable());
        assert!(SearchError::Timeout { duration_secs: 5.0 }.is_retryable());
        assert!(!SearchError::Cancelled.is_retryable());
        assert!(!SearchError::Config(ConfigError::Invalid("x".into())).is_retryable());
    }

    #[test]
    fn search_error_is_cancellation() {
        assert!(SearchError::Cancelled.is_cancellation());
        assert!(!SearchError::NoSolution.is_cancellation());
    }

    #[test]
    fn graph_errors_convert() {
        let err: SearchError = GraphError::Space(SpaceError::UnknownComponent("x".into())).into();
        assert!(err.to_string().contains("unknown component"));
    }
}
