use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use composer_cache::{CacheStore, Clock, InMemoryCacheStore, SystemClock};
use composer_graph::{Component, TypeCatalog};

use crate::behavior::Behavior;
use crate::builtin;
use crate::dispatch::{DisconnectedDispatcher, Dispatcher};

/// Shared collaborators handed to built-in behaviors.
#[derive(Clone)]
pub struct Services {
  pub cache: Arc<dyn CacheStore>,
  pub clock: Arc<dyn Clock>,
  pub dispatcher: Arc<dyn Dispatcher>,
}

impl Services {
  pub fn new(
    cache: Arc<dyn CacheStore>,
    clock: Arc<dyn Clock>,
    dispatcher: Arc<dyn Dispatcher>,
  ) -> Self {
    Self {
      cache,
      clock,
      dispatcher,
    }
  }

  /// In-memory cache, wall clock, no cross-isolate transport.
  pub fn in_memory() -> Self {
    Self::new(
      Arc::new(InMemoryCacheStore::new()),
      Arc::new(SystemClock),
      Arc::new(DisconnectedDispatcher),
    )
  }
}

impl fmt::Debug for Services {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Services")
      .field("clock", &self.clock)
      .finish_non_exhaustive()
  }
}

/// Maps component type names to behaviors.
#[derive(Clone, Default)]
pub struct ComponentTypeRegistry {
  behaviors: HashMap<String, Arc<dyn Behavior>>,
}

impl ComponentTypeRegistry {
  /// An empty registry.
  pub fn new() -> Self {
    Self::default()
  }

  /// A registry with every built-in type registered.
  pub fn with_builtins(services: &Services) -> Self {
    let mut registry = Self::new();
    builtin::register_all(&mut registry, services);
    registry
  }

  /// Register a behavior, replacing (and returning) any previous one for the
  /// same type name.
  pub fn register(
    &mut self,
    component_type: impl Into<String>,
    behavior: Arc<dyn Behavior>,
  ) -> Option<Arc<dyn Behavior>> {
    self.behaviors.insert(component_type.into(), behavior)
  }

  pub fn get(&self, component_type: &str) -> Option<Arc<dyn Behavior>> {
    self.behaviors.get(component_type).cloned()
  }

  /// Registered type names, sorted.
  pub fn type_names(&self) -> Vec<&str> {
    let mut names: Vec<&str> = self.behaviors.keys().map(String::as_str).collect();
    names.sort_unstable();
    names
  }
}

impl TypeCatalog for ComponentTypeRegistry {
  fn contains(&self, component_type: &str) -> bool {
    self.behaviors.contains_key(component_type)
  }

  fn validate(&self, component: &Component) -> Result<(), String> {
    match self.behaviors.get(&component.component_type) {
      Some(behavior) => behavior.validate(component),
      None => Err(format!("unknown type '{}'", component.component_type)),
    }
  }
}

impl fmt::Debug for ComponentTypeRegistry {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ComponentTypeRegistry")
      .field("types", &self.type_names())
      .finish()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use async_trait::async_trait;
  use composer_config::{ApplicationDef, ComponentDef, CompositeDef};
  use composer_graph::{Application, GraphError};

  use crate::behavior::Branches;
  use crate::context::ExecutionContext;
  use crate::outcome::Outcome;

  struct Echo;

  #[async_trait]
  impl Behavior for Echo {
    async fn evaluate(
      &self,
      _component: &Component,
      ctx: &mut ExecutionContext,
      _branches: &dyn Branches,
    ) -> Outcome {
      Outcome::Terminate(ctx.value().clone())
    }
  }

  fn single(component: ComponentDef) -> ApplicationDef {
    ApplicationDef::new("app", vec![CompositeDef::new("main", vec![component])])
  }

  #[test]
  fn test_builtin_type_names() {
    let registry = ComponentTypeRegistry::with_builtins(&Services::in_memory());
    assert_eq!(
      registry.type_names(),
      vec![
        "cache-queue-handler",
        "erp-caller",
        "exception-catcher",
        "fall-back",
        "get-cache",
        "get-cache-if-recent",
        "store-cache",
        "test-end",
        "test-entry",
      ]
    );
  }

  #[test]
  fn test_register_custom_type() {
    let mut registry = ComponentTypeRegistry::new();
    assert!(registry.register("echo", Arc::new(Echo)).is_none());
    assert!(registry.register("echo", Arc::new(Echo)).is_some());
    assert!(registry.contains("echo"));
    assert!(!registry.contains("get-cache"));

    let app = Application::load(single(ComponentDef::new("e", "echo")), &registry).unwrap();
    assert_eq!(app.entry().component_type, "echo");
  }

  #[test]
  fn test_unknown_type_fails_at_load() {
    let registry = ComponentTypeRegistry::with_builtins(&Services::in_memory());
    let err = Application::load(single(ComponentDef::new("x", "teleporter")), &registry)
      .unwrap_err();
    assert_eq!(
      err,
      GraphError::UnknownComponentType {
        component: "main.x".to_string(),
        component_type: "teleporter".to_string(),
      }
    );
  }

  #[test]
  fn test_builtin_validation_runs_at_load() {
    let registry = ComponentTypeRegistry::with_builtins(&Services::in_memory());

    let missing_channel = single(ComponentDef::new("g", "get-cache").with_property("channelEntryName", "toto"));
    assert!(matches!(
      Application::load(missing_channel, &registry),
      Err(GraphError::InvalidComponent { .. })
    ));

    let bad_age = single(
      ComponentDef::new("g", "get-cache-if-recent")
        .with_property("channelName", "testCache")
        .with_property("channelEntryName", "toto")
        .with_property("maxCacheAge", "recently"),
    );
    assert!(matches!(
      Application::load(bad_age, &registry),
      Err(GraphError::InvalidComponent { .. })
    ));

    let ok = single(
      ComponentDef::new("g", "get-cache")
        .with_property("channelName", "testCache")
        .with_property("channelEntryName", "toto"),
    );
    assert!(Application::load(ok, &registry).is_ok());
  }
}
