use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A single named component inside a composite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentDef {
  /// Name, unique within the enclosing composite.
  pub name: String,

  /// Behavior selector (e.g. `get-cache`, `fall-back`).
  #[serde(rename = "type")]
  pub component_type: String,

  /// Isolate hosting this component. Unplaced components run wherever the
  /// engine runs.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub isolate: Option<String>,

  /// Behavior-specific properties.
  #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
  pub properties: serde_json::Map<String, serde_json::Value>,

  /// Outcome label -> target component (`name` or `composite.name`).
  #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
  pub wires: BTreeMap<String, String>,
}

impl ComponentDef {
  /// Create a component definition with no isolate, properties or wires.
  pub fn new(name: impl Into<String>, component_type: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      component_type: component_type.into(),
      isolate: None,
      properties: serde_json::Map::new(),
      wires: BTreeMap::new(),
    }
  }

  /// Set the hosting isolate.
  pub fn on_isolate(mut self, isolate: impl Into<String>) -> Self {
    self.isolate = Some(isolate.into());
    self
  }

  /// Add a property.
  pub fn with_property(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
    self.properties.insert(key.into(), value.into());
    self
  }

  /// Add a wire.
  pub fn with_wire(mut self, label: impl Into<String>, target: impl Into<String>) -> Self {
    self.wires.insert(label.into(), target.into());
    self
  }
}
