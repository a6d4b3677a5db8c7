use async_trait::async_trait;

use composer_graph::Component;

use crate::context::ExecutionContext;
use crate::outcome::Outcome;

/// What a component type does when the engine reaches one of its instances.
///
/// New types implement this and register with the
/// [`ComponentTypeRegistry`](crate::ComponentTypeRegistry); the engine does
/// not need to know about them.
#[async_trait]
pub trait Behavior: Send + Sync {
  /// Load-time checks on properties and wires. An error here prevents the
  /// application from loading.
  fn validate(&self, _component: &Component) -> Result<(), String> {
    Ok(())
  }

  /// Evaluate `component` with the value in `ctx`. Branching behaviors use
  /// `branches` to run the subgraphs behind their wires.
  async fn evaluate(
    &self,
    component: &Component,
    ctx: &mut ExecutionContext,
    branches: &dyn Branches,
  ) -> Outcome;
}

/// Subgraph execution, provided by the engine to branching behaviors.
#[async_trait]
pub trait Branches: Send + Sync {
  /// Run the subgraph behind `from`'s wire `label` to its end, inside the
  /// current run. Returns `Terminate` on success or `Fail`; a wire that is
  /// not declared yields `Terminate(value)`.
  async fn follow(
    &self,
    from: &Component,
    label: &str,
    value: serde_json::Value,
    ctx: &mut ExecutionContext,
  ) -> Outcome;

  /// Run the subgraph behind `label` `count` times, concurrently, each with
  /// its own forked context. Outcomes are returned in iteration order.
  async fn fan_out(
    &self,
    from: &Component,
    label: &str,
    value: serde_json::Value,
    count: usize,
    ctx: &mut ExecutionContext,
  ) -> Vec<Outcome>;
}
