//! mctune core - Monte-Carlo tree search over component configurations
//!
//! Searches for a high-scoring configuration by:
//! - Refining structural rest problems until every required interface is provided
//! - Fanning satisfied structures out into one leaf per local-search strategy
//! - Rolling out concurrently from the selected frontier under a batch deadline
//! - Back-propagating rollout scores into upper-confidence node values
//!
//! # Example
//!
//! ```rust,ignore
//! use mctune_core::prelude::*;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let space = Arc::new(SearchSpace::from_json_files(["space.json"])?);
//! let evaluator = Arc::new(ProcessEvaluator::from_command_line("./score.sh").ok_or("empty command")?);
//! let search = MctsSearch::builder(space, "pipeline.Pipeline", evaluator)
//!     .with_config(SearchConfig::from_file("search.toml")?)
//!     .build()?;
//!
//! let solution = Arc::new(search).run().await?;
//! println!("{} {:?}", solution.score, solution.components);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod events;
pub mod runner;
pub mod search;
pub mod tree;

pub use config::SearchConfig;
pub use error::{ConfigError, Result, SearchError};
pub use events::{
    BestSolutionTracker, EventSink, FanoutSink, NoopSink, ObservedSolution, SearchEvent,
    StrategyCallCounter, TracingSink,
};
pub use runner::{CancelRegistry, LeafScoring, RolloutResult, SimulationRunner};
pub use search::{MctsSearch, SearchBuilder, SearchTree, Solution};
pub use tree::{MctsStats, SearchNode, SearchTreeGenerator, StrategyBinding};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for running a search
    pub use crate::{
        BestSolutionTracker, EventSink, MctsSearch, SearchConfig, SearchError, Solution,
    };
    pub use mctune_graph::StopSignal;
    pub use mctune_space::SearchSpace;
    pub use mctune_strategy::{Evaluator, FnEvaluator, ProcessEvaluator, StrategyRegistry};
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
