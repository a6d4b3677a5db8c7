use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Index of a component in its application's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ComponentId(pub(crate) usize);

impl ComponentId {
  /// Ids are only meaningful for the application that issued them; lookups
  /// with a foreign id return `None`.
  pub const fn from_index(index: usize) -> Self {
    Self(index)
  }

  pub fn index(self) -> usize {
    self.0
  }
}

/// Fully-qualified component reference: `composite.name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ComponentRef {
  pub composite: String,
  pub name: String,
}

impl ComponentRef {
  pub fn new(composite: impl Into<String>, name: impl Into<String>) -> Self {
    Self {
      composite: composite.into(),
      name: name.into(),
    }
  }

  /// Split `composite.name` on the first dot.
  pub fn parse(qualified: &str) -> Option<Self> {
    let (composite, name) = qualified.split_once('.')?;
    if composite.is_empty() || name.is_empty() {
      return None;
    }
    Some(Self::new(composite, name))
  }
}

impl fmt::Display for ComponentRef {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}.{}", self.composite, self.name)
  }
}

/// Problems reading a component property.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PropertyError {
  #[error("missing property '{0}'")]
  Missing(String),

  #[error("property '{key}' must be {expected}")]
  InvalidType { key: String, expected: &'static str },
}

/// A loaded component. Wires point at other components of the same
/// application by id.
#[derive(Debug, Clone)]
pub struct Component {
  pub id: ComponentId,
  pub reference: ComponentRef,
  pub component_type: String,
  pub isolate: Option<String>,
  pub properties: serde_json::Map<String, serde_json::Value>,
  pub wires: BTreeMap<String, ComponentId>,
}

impl Component {
  pub fn name(&self) -> &str {
    &self.reference.name
  }

  pub fn has_wire(&self, label: &str) -> bool {
    self.wires.contains_key(label)
  }

  pub fn property(&self, key: &str) -> Option<&serde_json::Value> {
    self.properties.get(key)
  }

  /// Optional string property.
  pub fn str_property(&self, key: &str) -> Result<Option<&str>, PropertyError> {
    match self.properties.get(key) {
      None | Some(serde_json::Value::Null) => Ok(None),
      Some(serde_json::Value::String(s)) => Ok(Some(s.as_str())),
      Some(_) => Err(PropertyError::InvalidType {
        key: key.to_string(),
        expected: "a string",
      }),
    }
  }

  /// Mandatory, non-empty string property.
  pub fn require_str(&self, key: &str) -> Result<&str, PropertyError> {
    match self.str_property(key)? {
      Some(s) if !s.is_empty() => Ok(s),
      _ => Err(PropertyError::Missing(key.to_string())),
    }
  }

  /// Optional unsigned integer property. Configuration files write numbers
  /// both as JSON numbers and as strings, so both are accepted.
  pub fn u64_property(&self, key: &str) -> Result<Option<u64>, PropertyError> {
    let invalid = || PropertyError::InvalidType {
      key: key.to_string(),
      expected: "a non-negative integer",
    };
    match self.properties.get(key) {
      None | Some(serde_json::Value::Null) => Ok(None),
      Some(serde_json::Value::Number(n)) => n.as_u64().map(Some).ok_or_else(invalid),
      Some(serde_json::Value::String(s)) => s.trim().parse::<u64>().map(Some).map_err(|_| invalid()),
      Some(_) => Err(invalid()),
    }
  }

  /// Mandatory unsigned integer property.
  pub fn require_u64(&self, key: &str) -> Result<u64, PropertyError> {
    self
      .u64_property(key)?
      .ok_or_else(|| PropertyError::Missing(key.to_string()))
  }
}
