use serde::{Deserialize, Serialize};

use crate::component::ComponentDef;

/// A named, ordered group of components.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositeDef {
  pub name: String,
  #[serde(default)]
  pub components: Vec<ComponentDef>,
}

impl CompositeDef {
  pub fn new(name: impl Into<String>, components: Vec<ComponentDef>) -> Self {
    Self {
      name: name.into(),
      components,
    }
  }
}

/// The unit of deployment: a named collection of composites.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationDef {
  pub name: String,
  #[serde(rename = "composites", alias = "composets")]
  pub composites: Vec<CompositeDef>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Document {
  Application(ApplicationDef),
  Composite(CompositeDef),
}

impl ApplicationDef {
  pub fn new(name: impl Into<String>, composites: Vec<CompositeDef>) -> Self {
    Self {
      name: name.into(),
      composites,
    }
  }

  /// Parse an application document, or a standalone composite which becomes
  /// a single-composite application of the same name.
  pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
    let document: Document = serde_json::from_str(text)?;
    Ok(match document {
      Document::Application(app) => app,
      Document::Composite(composite) => Self {
        name: composite.name.clone(),
        composites: vec![composite],
      },
    })
  }

  /// Total number of components across all composites.
  pub fn component_count(&self) -> usize {
    self.composites.iter().map(|c| c.components.len()).sum()
  }
}
