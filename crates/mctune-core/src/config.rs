//! Search configuration
//!
//! Loaded from TOML; durations are written as fractional seconds:
//!
//! ```toml
//! search_timeout = 120.0
//! optimization_time_budget = 10.0
//! evaluation_timeout = 2.5
//! simulation_runs = 3
//! strategies = ["random", "genetic"]
//! ```

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

mod secs {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub(super) fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Duration::try_from_secs_f64(secs).map_err(D::Error::custom)
    }
}

/// Configuration of one search run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SearchConfig {
    /// Overall wall-clock deadline
    #[serde(with = "secs")]
    pub search_timeout: Duration,
    /// Time budget of one simulation batch
    #[serde(with = "secs")]
    pub optimization_time_budget: Duration,
    /// Timeout of a single evaluation
    #[serde(with = "secs")]
    pub evaluation_timeout: Duration,
    /// Rollouts per frontier node and batch
    pub simulation_runs: usize,
    /// Time given to cancelled rollouts before they are abandoned
    #[serde(with = "secs")]
    pub grace_period: Duration,
    /// Select uniformly at random and skip back-propagation
    pub random_selection: bool,
    /// Seed for selection, rollouts, and strategies
    pub seed: u64,
    /// Strategy names fanned out at every satisfied node
    pub strategies: Vec<String>,
    /// Time reserved before the deadline for the driver to stop
    #[serde(with = "secs")]
    pub stop_margin: Duration,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            search_timeout: Duration::from_secs(600),
            optimization_time_budget: Duration::from_secs(30),
            evaluation_timeout: Duration::from_secs(10),
            simulation_runs: 3,
            grace_period: Duration::from_secs(2),
            random_selection: false,
            seed: 42,
            strategies: ["random", "genetic", "hyperband", "discretization"]
                .into_iter()
                .map(String::from)
                .collect(),
            stop_margin: Duration::from_secs(5),
        }
    }
}

impl SearchConfig {
    /// Create default config
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and validate a TOML document
    ///
    /// # Errors
    ///
    /// Returns an error on malformed TOML or invalid values.
    pub fn from_toml_str(toml: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(toml)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse, and validate a TOML file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is invalid.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let toml = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&toml)
    }

    /// Check value ranges
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] describing the first bad value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.search_timeout.is_zero() {
            return Err(ConfigError::Invalid("search_timeout must be positive".into()));
        }
        if self.optimization_time_budget.is_zero() {
            return Err(ConfigError::Invalid(
                "optimization_time_budget must be positive".into(),
            ));
        }
        if self.simulation_runs == 0 {
            return Err(ConfigError::Invalid("simulation_runs must be at least 1".into()));
        }
        if self.strategies.is_empty() {
            return Err(ConfigError::Invalid("at least one strategy is required".into()));
        }
        Ok(())
    }

    /// Stop margin, never longer than the search timeout
    #[inline]
    #[must_use]
    pub fn effective_stop_margin(&self) -> Duration {
        self.stop_margin.min(self.search_timeout)
    }

    /// Set the overall deadline
    #[inline]
    #[must_use]
    pub fn with_search_timeout(mut self, timeout: Duration) -> Self {
        self.search_timeout = timeout;
        self
    }

    /// Set the per-batch budget
    #[inline]
    #[must_use]
    pub fn with_optimization_time_budget(mut self, budget: Duration) -> Self {
        self.optimization_time_budget = budget;
        self
    }

    /// Set the per-evaluation timeout
    #[inline]
    #[must_use]
    pub fn with_evaluation_timeout(mut self, timeout: Duration) -> Self {
        self.evaluation_timeout = timeout;
        self
    }

    /// Set the rollout repeat count
    #[inline]
    #[must_use]
    pub fn with_simulation_runs(mut self, runs: usize) -> Self {
        self.simulation_runs = runs;
        self
    }

    /// Set the grace period for cancelled rollouts
    #[inline]
    #[must_use]
    pub fn with_grace_period(mut self, grace: Duration) -> Self {
        self.grace_period = grace;
        self
    }

    /// Enable or disable random selection
    #[inline]
    #[must_use]
    pub fn with_random_selection(mut self, random: bool) -> Self {
        self.random_selection = random;
        self
    }

    /// Set the seed
    #[inline]
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Set the strategy names
    #[must_use]
    pub fn with_strategies<I, S>(mut self, strategies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.strategies = strategies.into_iter().map(Into::into).collect();
        self
    }

    /// Set the stop margin
    #[inline]
    #[must_use]
    pub fn with_stop_margin(mut self, margin: Duration) -> Self {
        self.stop_margin = margin;
        self
    }
}
