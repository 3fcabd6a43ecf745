//! Strategy registry
//!
//! Provides [`StrategyRegistry`], mapping strategy names to factories. Every
//! strategy leaf of the search tree gets a fresh instance from its factory.

use crate::error::{Result, StrategyError};
use crate::strategies::{DiscretizationSearch, GeneticAlgorithm, Hyperband, RandomSearch};
use crate::strategy::Strategy;
use indexmap::IndexMap;
use std::fmt;
use std::sync::Arc;

/// Creates a strategy instance from a seed
pub type StrategyFactory = Arc<dyn Fn(u64) -> Box<dyn Strategy> + Send + Sync>;

/// Registry of strategy factories, in registration order
#[derive(Default, Clone)]
pub struct StrategyRegistry {
    factories: IndexMap<String, StrategyFactory>,
}

impl fmt::Debug for StrategyRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StrategyRegistry")
            .field("strategies", &self.names())
            .finish()
    }
}

impl StrategyRegistry {
    /// Create new empty registry
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            factories: IndexMap::new(),
        }
    }

    /// Create registry with the built-in strategies
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(RandomSearch::NAME, |seed| Box::new(RandomSearch::new(seed)));
        registry.register(GeneticAlgorithm::NAME, |seed| {
            Box::new(GeneticAlgorithm::new(seed))
        });
        registry.register(Hyperband::NAME, |seed| Box::new(Hyperband::new(seed)));
        registry.register(DiscretizationSearch::NAME, |seed| {
            Box::new(DiscretizationSearch::new(seed))
        });
        registry
    }

    /// Register a factory, replacing any previous one of the same name
    pub fn register<F>(&mut self, name: &str, factory: F)
    where
        F: Fn(u64) -> Box<dyn Strategy> + Send + Sync + 'static,
    {
        self.factories.insert(name.to_string(), Arc::new(factory));
    }

    /// Keep only the named strategies, in the given order
    ///
    /// # Errors
    ///
    /// Returns [`StrategyError::UnknownStrategy`] for the first unknown name.
    pub fn select<S: AsRef<str>>(&self, names: &[S]) -> Result<Self> {
        let mut selected = Self::new();
        for name in names {
            let name = name.as_ref();
            let factory = self
                .factories
                .get(name)
                .ok_or_else(|| StrategyError::UnknownStrategy(name.to_string()))?;
            selected
                .factories
                .insert(name.to_string(), Arc::clone(factory));
        }
        Ok(selected)
    }

    /// Check if strategy exists
    #[inline]
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Remove strategy
    #[inline]
    pub fn remove(&mut self, name: &str) -> bool {
        self.factories.shift_remove(name).is_some()
    }

    /// List all registered strategy names
    #[inline]
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    /// Get number of registered strategies
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.factories.len()
    }

    /// Check if registry is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// Instantiate a strategy
    ///
    /// # Errors
    ///
    /// Returns [`StrategyError::UnknownStrategy`] if the name is not registered.
    pub fn create(&self, name: &str, seed: u64) -> Result<Box<dyn Strategy>> {
        self.factories
            .get(name)
            .map(|factory| factory(seed))
            .ok_or_else(|| StrategyError::UnknownStrategy(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_new_empty() {
        let registry = StrategyRegistry::new();
        assert!(registry.is_empty());
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn registry_with_defaults() {
        let registry = StrategyRegistry::with_defaults();
        assert_eq!(
            registry.names(),
            vec!["random", "genetic", "hyperband", "discretization"]
        );
    }

    #[test]
    fn registry_create_matches_name() {
        let registry = StrategyRegistry::with_defaults();
        for name in registry.names() {
            assert_eq!(registry.create(name, 7).unwrap().name(), name);
        }
        assert!(matches!(
            registry.create("smac", 7),
            Err(StrategyError::UnknownStrategy(_))
        ));
    }

    #[test]
    fn registry_remove() {
        let mut registry = StrategyRegistry::with_defaults();
        assert!(registry.remove("genetic"));
        assert!(!registry.contains("genetic"));
        assert!(!registry.remove("genetic"));
    }

    #[test]
    fn registry_select_keeps_order() {
        let registry = StrategyRegistry::with_defaults();
        let selected = registry.select(&["hyperband", "random"]).unwrap();
        assert_eq!(selected.names(), vec!["hyperband", "random"]);
        assert!(registry.select(&["missing"]).is_err());
    }
}
