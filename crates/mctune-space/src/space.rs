//! Search-space index
//!
//! Holds every known component, indexed by name and by provided interface.
//! Several JSON documents can be merged into one space.

use crate::component::Component;
use crate::error::{Result, SpaceError};
use indexmap::IndexMap;
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Deserialize)]
struct SpaceDocument {
    #[serde(default)]
    components: Vec<Component>,
}

/// Searchable set of components
#[derive(Debug, Clone, Default)]
pub struct SearchSpace {
    components: IndexMap<String, Arc<Component>>,
    providers: IndexMap<String, Vec<Arc<Component>>>,
}

impl SearchSpace {
    /// Empty space
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a space from components
    #[must_use]
    pub fn with_components(components: impl IntoIterator<Item = Component>) -> Self {
        let mut space = Self::new();
        for component in components {
            space.add(component);
        }
        space
    }

    /// Parse one JSON document
    ///
    /// # Errors
    ///
    /// Returns an error on malformed JSON, malformed parameter schemas, or a
    /// document without components.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let mut space = Self::new();
        space.merge_json_str(json)?;
        if space.is_empty() {
            return Err(SpaceError::EmptySpace);
        }
        Ok(space)
    }

    /// Read and merge several JSON documents
    ///
    /// # Errors
    ///
    /// Returns an error if a file cannot be read or parsed, or if the merged
    /// space is empty.
    pub fn from_json_files<P: AsRef<Path>>(paths: impl IntoIterator<Item = P>) -> Result<Self> {
        let mut space = Self::new();
        for path in paths {
            let path = path.as_ref();
            let json = std::fs::read_to_string(path).map_err(|source| SpaceError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            let added = space.merge_json_str(&json)?;
            debug!(path = %path.display(), added, "loaded search space file");
        }
        if space.is_empty() {
            return Err(SpaceError::EmptySpace);
        }
        Ok(space)
    }

    /// Merge a JSON document into this space, returning the number of new components
    ///
    /// # Errors
    ///
    /// Returns an error on malformed JSON or parameter schemas.
    pub fn merge_json_str(&mut self, json: &str) -> Result<usize> {
        let document: SpaceDocument = serde_json::from_str(json)?;
        Ok(document
            .components
            .into_iter()
            .map(|c| self.add(c))
            .filter(|added| *added)
            .count())
    }

    /// Add a component; returns `false` if the name is already taken
    pub fn add(&mut self, component: Component) -> bool {
        if self.components.contains_key(&component.name) {
            warn!(component = %component.name, "duplicate component ignored");
            return false;
        }
        let component = Arc::new(component);
        for interface in &component.provided {
            let providers = self.providers.entry(interface.clone()).or_default();
            if !providers.iter().any(|p| p.name == component.name) {
                providers.push(Arc::clone(&component));
            }
        }
        self.components.insert(component.name.clone(), component);
        true
    }

    /// Look up a component by name
    #[inline]
    #[must_use]
    pub fn component(&self, name: &str) -> Option<&Arc<Component>> {
        self.components.get(name)
    }

    /// Look up a component by name, failing if it is unknown
    ///
    /// # Errors
    ///
    /// Returns [`SpaceError::UnknownComponent`] if no component has that name.
    pub fn require(&self, name: &str) -> Result<&Arc<Component>> {
        self.component(name)
            .ok_or_else(|| SpaceError::UnknownComponent(name.to_string()))
    }

    /// Components providing `interface`, in insertion order
    #[must_use]
    pub fn providers_of(&self, interface: &str) -> &[Arc<Component>] {
        self.providers.get(interface).map_or(&[], Vec::as_slice)
    }

    /// Component names in insertion order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.components.keys().map(String::as_str)
    }

    /// Number of components
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.components.len()
    }

    /// Whether the space holds no component
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const DOC: &str = r#"{
        "components": [
            {"name": "pipe.A", "providedInterface": ["root"], "requiredInterface": [{"name": "K", "construction_key": "step"}]},
            {"name": "pipe.B", "providedInterface": ["K"]},
            {"name": "pipe.C", "providedInterface": ["K", "other"]}
        ]
    }"#;

    #[test]
    fn providers_are_indexed_in_order() {
        let space = SearchSpace::from_json_str(DOC).unwrap();
        let names: Vec<_> = space.providers_of("K").iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["pipe.B", "pipe.C"]);
        assert!(space.providers_of("missing").is_empty());
        assert_eq!(space.len(), 3);
    }

    #[test]
    fn duplicates_are_ignored() {
        let mut space = SearchSpace::from_json_str(DOC).unwrap();
        let added = space.merge_json_str(DOC).unwrap();
        assert_eq!(added, 0);
        assert_eq!(space.providers_of("K").len(), 2);
    }

    #[test]
    fn empty_document_is_rejected() {
        assert!(matches!(
            SearchSpace::from_json_str(r#"{"components": []}"#),
            Err(SpaceError::EmptySpace)
        ));
    }

    #[test]
    fn require_unknown_component() {
        let space = SearchSpace::from_json_str(DOC).unwrap();
        assert!(space.require("pipe.A").is_ok());
        assert!(matches!(space.require("pipe.Z"), Err(SpaceError::UnknownComponent(_))));
    }

    #[test]
    fn files_merge_into_one_space() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("a.json");
        let second = dir.path().join("b.json");
        std::fs::write(&first, DOC).unwrap();
        std::fs::write(
            &second,
            r#"{"components": [{"name": "pipe.D", "providedInterface": ["K"]}]}"#,
        )
        .unwrap();

        let space = SearchSpace::from_json_files([&first, &second]).unwrap();
        assert_eq!(space.providers_of("K").len(), 3);
    }
}
