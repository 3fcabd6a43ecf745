//! mctune search spaces
//!
//! Describes what can be configured:
//! - Components with provided/required interfaces and typed parameters
//! - A [`SearchSpace`] indexing components by name and provided interface
//! - [`Configuration`]s assigning components and parameter values to slots
//! - [`ParameterDomain`]s encoding configurations as real vectors, with a
//!   de-duplicating best-first result cache
//!
//! # Example
//!
//! ```rust,ignore
//! use mctune_space::SearchSpace;
//!
//! let space = SearchSpace::from_json_files(["space.json"])?;
//! for provider in space.providers_of("classifier") {
//!     println!("{}", provider.name);
//! }
//! ```

pub mod component;
pub mod configuration;
pub mod domain;
pub mod error;
pub mod space;

pub use component::{
    Component, ConstructionKey, ParameterConfig, ParameterKind, ParameterSpec, ParameterValue,
    RequiredInterface,
};
pub use configuration::{ComponentMapping, Configuration, SlotConfig, SlotId};
pub use domain::ParameterDomain;
pub use error::{Result, SpaceError};
pub use space::SearchSpace;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
