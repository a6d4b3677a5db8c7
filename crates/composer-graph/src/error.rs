use thiserror::Error;

/// Load-time errors. Any of these prevents the application from running.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
  #[error("duplicate composite name: {0}")]
  DuplicateComposite(String),

  #[error("duplicate component '{name}' in composite '{composite}'")]
  DuplicateComponent { composite: String, name: String },

  #[error("wire '{label}' of '{component}' targets unknown component '{target}'")]
  UnresolvedWire {
    component: String,
    label: String,
    target: String,
  },

  #[error("wire '{label}' of '{component}' is ambiguous: '{target}' matches {candidates:?}")]
  AmbiguousWire {
    component: String,
    label: String,
    target: String,
    candidates: Vec<String>,
  },

  #[error("component '{component}' has unknown type '{component_type}'")]
  UnknownComponentType {
    component: String,
    component_type: String,
  },

  #[error("invalid component '{component}': {message}")]
  InvalidComponent { component: String, message: String },

  #[error("no entry point found (every component has an inbound wire)")]
  NoEntryPoint,

  #[error("several entry points found: {0:?}")]
  MultipleEntryPoints(Vec<String>),
}
