use std::collections::{BTreeMap, HashMap, HashSet};

use composer_config::ApplicationDef;
use tracing::debug;

use crate::component::{Component, ComponentId, ComponentRef};
use crate::error::GraphError;

/// Knows which component types exist and whether a component is well formed
/// for its type. Implemented by the component type registry.
pub trait TypeCatalog {
  /// Whether a behavior is registered for `component_type`.
  fn contains(&self, component_type: &str) -> bool;

  /// Type-specific checks (mandatory properties, mandatory wires).
  /// Wires are already resolved when this is called.
  fn validate(&self, _component: &Component) -> Result<(), String> {
    Ok(())
  }
}

/// A named group of components, kept for placement and diagnostics.
#[derive(Debug, Clone)]
pub struct Composite {
  pub name: String,
  pub members: Vec<ComponentId>,
}

/// A validated application graph, immutable once loaded.
#[derive(Debug, Clone)]
pub struct Application {
  name: String,
  components: Vec<Component>,
  composites: Vec<Composite>,
  index: HashMap<ComponentRef, ComponentId>,
  entry: ComponentId,
}

impl Application {
  /// Validate a definition and build the graph.
  ///
  /// This process:
  /// 1. Places every component in the arena (names unique per composite)
  /// 2. Resolves every wire target to exactly one component
  /// 3. Checks component types and type-specific requirements
  /// 4. Finds the single entry point (no inbound wire)
  pub fn load(def: ApplicationDef, catalog: &impl TypeCatalog) -> Result<Self, GraphError> {
    let mut components = Vec::with_capacity(def.component_count());
    let mut composites = Vec::with_capacity(def.composites.len());
    let mut index = HashMap::new();
    let mut declared_wires = Vec::with_capacity(def.component_count());
    let mut composite_names = HashSet::new();

    for composite in def.composites {
      if !composite_names.insert(composite.name.clone()) {
        return Err(GraphError::DuplicateComposite(composite.name));
      }

      let mut members = Vec::with_capacity(composite.components.len());
      for component in composite.components {
        let id = ComponentId(components.len());
        let reference = ComponentRef::new(&composite.name, &component.name);
        if index.insert(reference.clone(), id).is_some() {
          return Err(GraphError::DuplicateComponent {
            composite: composite.name,
            name: component.name,
          });
        }

        members.push(id);
        declared_wires.push(component.wires);
        components.push(Component {
          id,
          reference,
          component_type: component.component_type,
          isolate: component.isolate,
          properties: component.properties,
          wires: BTreeMap::new(),
        });
      }

      composites.push(Composite {
        name: composite.name,
        members,
      });
    }

    // Resolve against the complete arena, then attach.
    let mut resolved_wires = Vec::with_capacity(declared_wires.len());
    for (component, wires) in components.iter().zip(declared_wires) {
      let mut resolved = BTreeMap::new();
      for (label, target) in wires {
        let target_id = resolve_target(&components, &index, component, &label, &target)?;
        resolved.insert(label, target_id);
      }
      resolved_wires.push(resolved);
    }
    for (component, wires) in components.iter_mut().zip(resolved_wires) {
      component.wires = wires;
    }

    for component in &components {
      if !catalog.contains(&component.component_type) {
        return Err(GraphError::UnknownComponentType {
          component: component.reference.to_string(),
          component_type: component.component_type.clone(),
        });
      }
      catalog
        .validate(component)
        .map_err(|message| GraphError::InvalidComponent {
          component: component.reference.to_string(),
          message,
        })?;
    }

    let entry = find_entry(&components)?;

    debug!(
      application = %def.name,
      components = components.len(),
      composites = composites.len(),
      entry = %components[entry.0].reference,
      "application_loaded"
    );

    Ok(Self {
      name: def.name,
      components,
      composites,
      index,
      entry,
    })
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  /// The component with no inbound wire.
  pub fn entry(&self) -> &Component {
    &self.components[self.entry.0]
  }

  pub fn get(&self, id: ComponentId) -> Option<&Component> {
    self.components.get(id.0)
  }

  /// Look a component up by its fully-qualified reference.
  pub fn find(&self, reference: &ComponentRef) -> Option<&Component> {
    self.index.get(reference).and_then(|id| self.get(*id))
  }

  /// Look a component up by `composite.name`, or by a bare name that is
  /// unique in the application.
  pub fn lookup(&self, target: &str) -> Option<&Component> {
    if let Some(found) = ComponentRef::parse(target).and_then(|r| self.find(&r)) {
      return Some(found);
    }
    let mut matches = self.components.iter().filter(|c| c.name() == target);
    match (matches.next(), matches.next()) {
      (Some(only), None) => Some(only),
      _ => None,
    }
  }

  /// Follow the wire named `label` out of `current`. `None` means the wire is
  /// not declared, i.e. `current` is terminal for that label.
  pub fn resolve(&self, current: ComponentId, label: &str) -> Option<&Component> {
    self
      .get(current)?
      .wires
      .get(label)
      .and_then(|target| self.get(*target))
  }

  pub fn components(&self) -> impl Iterator<Item = &Component> {
    self.components.iter()
  }

  pub fn composites(&self) -> &[Composite] {
    &self.composites
  }

  pub fn len(&self) -> usize {
    self.components.len()
  }

  pub fn is_empty(&self) -> bool {
    self.components.is_empty()
  }

  /// Isolates named by at least one component, in first-seen order.
  pub fn isolates(&self) -> Vec<&str> {
    let mut seen = HashSet::new();
    self
      .components
      .iter()
      .filter_map(|c| c.isolate.as_deref())
      .filter(|isolate| seen.insert(*isolate))
      .collect()
  }

  /// Components placed on `isolate`.
  pub fn components_on(&self, isolate: &str) -> Vec<&Component> {
    self
      .components
      .iter()
      .filter(|c| c.isolate.as_deref() == Some(isolate))
      .collect()
  }
}

/// Qualified target first, then the wiring component's own composite, then a
/// name unique across the application.
fn resolve_target(
  components: &[Component],
  index: &HashMap<ComponentRef, ComponentId>,
  from: &Component,
  label: &str,
  target: &str,
) -> Result<ComponentId, GraphError> {
  if let Some(id) = ComponentRef::parse(target).and_then(|r| index.get(&r)) {
    return Ok(*id);
  }

  let local = ComponentRef::new(&from.reference.composite, target);
  if let Some(id) = index.get(&local) {
    return Ok(*id);
  }

  let candidates: Vec<&Component> = components.iter().filter(|c| c.name() == target).collect();
  match candidates.as_slice() {
    [only] => Ok(only.id),
    [] => Err(GraphError::UnresolvedWire {
      component: from.reference.to_string(),
      label: label.to_string(),
      target: target.to_string(),
    }),
    many => Err(GraphError::AmbiguousWire {
      component: from.reference.to_string(),
      label: label.to_string(),
      target: target.to_string(),
      candidates: many.iter().map(|c| c.reference.to_string()).collect(),
    }),
  }
}

fn find_entry(components: &[Component]) -> Result<ComponentId, GraphError> {
  let mut inbound = vec![false; components.len()];
  for component in components {
    for target in component.wires.values() {
      inbound[target.0] = true;
    }
  }

  let entries: Vec<&Component> = components.iter().filter(|c| !inbound[c.id.0]).collect();
  match entries.as_slice() {
    [only] => Ok(only.id),
    [] => Err(GraphError::NoEntryPoint),
    many => Err(GraphError::MultipleEntryPoints(
      many.iter().map(|c| c.reference.to_string()).collect(),
    )),
  }
}
