//! Error types for search-space handling
//!
//! Covers:
//! - Malformed component descriptions
//! - Search-space file loading
//! - Configuration/vector conversion failures

use std::path::PathBuf;

/// Search-space error type
#[derive(Debug, thiserror::Error)]
pub enum SpaceError {
    /// A parameter description is malformed
    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter {
        /// Parameter name
        name: String,
        /// What is wrong with it
        reason: String,
    },

    /// Unknown parameter type tag
    #[error("unknown parameter type `{0}`")]
    UnknownParameterType(String),

    /// A component could not be found by name
    #[error("unknown component: {0}")]
    UnknownComponent(String),

    /// A configuration lacks a value the domain needs
    #[error("configuration is missing parameter `{parameter}` of slot {slot}")]
    MissingParameter {
        /// Chosen-component slot
        slot: crate::SlotId,
        /// Parameter name
        parameter: String,
    },

    /// A value does not match the parameter's declared kind
    #[error("value for parameter `{parameter}` does not match its declared type")]
    TypeMismatch {
        /// Parameter name
        parameter: String,
    },

    /// A vector has the wrong number of coordinates
    #[error("vector has {actual} coordinates, domain expects {expected}")]
    DimensionMismatch {
        /// Domain dimension
        expected: usize,
        /// Vector length
        actual: usize,
    },

    /// A search-space document contained no components
    #[error("search space is empty")]
    EmptySpace,

    /// I/O failure while reading a search-space file
    #[error("failed to read {path}: {source}")]
    Io {
        /// File that failed
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// JSON syntax or schema failure
    #[error("failed to parse search space: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result alias for this crate
pub type Result<T> = std::result::Result<T, SpaceError>;
