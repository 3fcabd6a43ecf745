//! Graph errors

use crate::graph::NodeId;
use mctune_space::{SlotId, SpaceError};

/// Graph error type
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    /// Search-space lookup failed
    #[error(transparent)]
    Space(#[from] SpaceError),

    /// Node id not present in the arena
    #[error("node not found: {0}")]
    NodeNotFound(NodeId),

    /// No component provides a required interface
    #[error("no component provides `{interface}` required by slot {required_by}")]
    DeadEnd {
        /// Missing interface
        interface: String,
        /// Slot whose component needs it
        required_by: SlotId,
    },
}

/// Result alias for this crate
pub type Result<T> = std::result::Result<T, GraphError>;
