use async_trait::async_trait;
use tracing::{info, warn};

use composer_graph::{Component, NEXT};

use crate::behavior::{Behavior, Branches};
use crate::context::ExecutionContext;
use crate::outcome::Outcome;

use super::invalid_property;

/// Start of a test pipeline. With `nbIterations` > 1 it runs the downstream
/// pipeline that many times concurrently and aggregates the results.
#[derive(Debug, Clone, Copy, Default)]
pub struct TestEntry;

impl TestEntry {
  pub const TYPE: &'static str = "test-entry";
  pub const ITERATIONS: &'static str = "nbIterations";
}

#[async_trait]
impl Behavior for TestEntry {
  fn validate(&self, component: &Component) -> Result<(), String> {
    component
      .u64_property(Self::ITERATIONS)
      .map(|_| ())
      .map_err(|e| e.to_string())
  }

  async fn evaluate(
    &self,
    component: &Component,
    ctx: &mut ExecutionContext,
    branches: &dyn Branches,
  ) -> Outcome {
    let iterations = match component.u64_property(Self::ITERATIONS) {
      Ok(n) => n.unwrap_or(1) as usize,
      Err(e) => return invalid_property(component, e),
    };
    let value = ctx.value().clone();

    if iterations <= 1 {
      return Outcome::next(value);
    }

    let outcomes = branches
      .fan_out(component, NEXT, value, iterations, ctx)
      .await;

    let mut results = Vec::with_capacity(outcomes.len());
    let mut first_failure = None;
    let mut failed = 0usize;
    for outcome in outcomes {
      match outcome {
        Outcome::Terminate(v) | Outcome::Continue(_, v) => results.push(v),
        Outcome::Fail(cause) => {
          failed += 1;
          first_failure.get_or_insert(cause);
        }
      }
    }

    info!(
      run_id = %ctx.run_id(),
      component = %component.reference,
      iterations,
      succeeded = results.len(),
      failed,
      "iterations_finished"
    );

    match first_failure {
      Some(cause) => {
        warn!(run_id = %ctx.run_id(), error = %cause, "iteration_failed");
        Outcome::Fail(cause)
      }
      None => Outcome::Terminate(serde_json::Value::Array(results)),
    }
  }
}

/// Successful end of a pipeline.
#[derive(Debug, Clone, Copy, Default)]
pub struct TestEnd;

impl TestEnd {
  pub const TYPE: &'static str = "test-end";
}

#[async_trait]
impl Behavior for TestEnd {
  async fn evaluate(
    &self,
    _component: &Component,
    ctx: &mut ExecutionContext,
    _branches: &dyn Branches,
  ) -> Outcome {
    Outcome::Terminate(ctx.value().clone())
  }
}
