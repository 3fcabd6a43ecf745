//! Concrete configurations
//!
//! A [`Configuration`] assigns a component and parameter values to every slot
//! chosen along a path through the constraint graph. Slots are numbered in the
//! order components are chosen, the start component occupying slot 0.

use crate::component::{Component, ParameterConfig, ParameterValue};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Identifier of a chosen-component slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SlotId(pub u32);

impl SlotId {
    /// Slot of the start component
    pub const ROOT: Self = Self(0);

    /// Slot that the next chosen component of `mapping` will occupy
    #[must_use]
    pub fn next_for(mapping: &ComponentMapping) -> Self {
        #[allow(clippy::cast_possible_truncation)]
        Self(mapping.len() as u32)
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Components chosen so far, in choice order
pub type ComponentMapping = IndexMap<SlotId, Arc<Component>>;

/// One slot of a configuration
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlotConfig {
    /// Name of the chosen component
    pub component: String,
    /// Parameter values in declaration order
    pub parameters: ParameterConfig,
}

/// Component and parameter choice for every slot
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Configuration {
    slots: IndexMap<SlotId, SlotConfig>,
}

impl Configuration {
    /// Empty configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the component and parameters of a slot
    pub fn insert(&mut self, slot: SlotId, component: &Component, parameters: ParameterConfig) {
        self.slots.insert(
            slot,
            SlotConfig {
                component: component.name.clone(),
                parameters,
            },
        );
    }

    /// Look up one slot
    #[inline]
    #[must_use]
    pub fn slot(&self, slot: SlotId) -> Option<&SlotConfig> {
        self.slots.get(&slot)
    }

    /// Look up a single parameter value
    #[must_use]
    pub fn value(&self, slot: SlotId, parameter: &str) -> Option<&ParameterValue> {
        self.slots.get(&slot)?.parameters.get(parameter)
    }

    /// Iterate over slots in choice order
    pub fn iter(&self) -> impl Iterator<Item = (&SlotId, &SlotConfig)> {
        self.slots.iter()
    }

    /// Number of slots
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether no slot is assigned
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// JSON document handed to external evaluators
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.slots
                .iter()
                .map(|(slot, config)| {
                    let parameters = config
                        .parameters
                        .iter()
                        .map(|(name, value)| (name.clone(), value.to_json()))
                        .collect();
                    (
                        slot.0.to_string(),
                        serde_json::json!({
                            "component": config.component,
                            "parameters": serde_json::Value::Object(parameters),
                        }),
                    )
                })
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{ParameterKind, ParameterSpec};
    use serde_json::json;

    #[test]
    fn json_keeps_slot_order_and_values() {
        let svc = Component::new("svm.SVC")
            .with_parameter(ParameterSpec::new("C", ParameterKind::Double { min: 0.0, max: 1.0 }));
        let scaler = Component::new("prep.Scaler");

        let mut config = Configuration::new();
        config.insert(
            SlotId::ROOT,
            &svc,
            [("C".to_string(), ParameterValue::Double(0.5))].into_iter().collect(),
        );
        config.insert(SlotId(1), &scaler, ParameterConfig::new());

        assert_eq!(
            config.to_json(),
            json!({
                "0": {"component": "svm.SVC", "parameters": {"C": 0.5}},
                "1": {"component": "prep.Scaler", "parameters": {}}
            })
        );
        assert_eq!(config.value(SlotId::ROOT, "C"), Some(&ParameterValue::Double(0.5)));
    }

    #[test]
    fn next_slot_follows_mapping_length() {
        let mut mapping = ComponentMapping::new();
        assert_eq!(SlotId::next_for(&mapping), SlotId::ROOT);
        mapping.insert(SlotId::ROOT, Arc::new(Component::new("a")));
        assert_eq!(SlotId::next_for(&mapping), SlotId(1));
    }
}
