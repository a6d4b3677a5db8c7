use async_trait::async_trait;
use tracing::{info, warn};

use composer_graph::{Component, NEXT, SECOND};

use crate::behavior::{Behavior, Branches};
use crate::context::ExecutionContext;
use crate::outcome::Outcome;

use super::require_wire;

/// Runs the `next` subgraph; if it fails, runs the `second` subgraph instead
/// and adopts its outcome. `second` never runs when `next` succeeds.
#[derive(Debug, Clone, Copy, Default)]
pub struct FallBack;

impl FallBack {
  pub const TYPE: &'static str = "fall-back";
}

#[async_trait]
impl Behavior for FallBack {
  fn validate(&self, component: &Component) -> Result<(), String> {
    require_wire(component, NEXT)?;
    require_wire(component, SECOND)
  }

  async fn evaluate(
    &self,
    component: &Component,
    ctx: &mut ExecutionContext,
    branches: &dyn Branches,
  ) -> Outcome {
    let value = ctx.value().clone();

    match branches.follow(component, NEXT, value.clone(), ctx).await {
      Outcome::Fail(cause) if !cause.is_fatal() => {
        info!(
          run_id = %ctx.run_id(),
          component = %component.reference,
          error = %cause,
          "fall_back_to_second"
        );
        branches.follow(component, SECOND, value, ctx).await
      }
      outcome => outcome,
    }
  }
}

/// Runs the `next` subgraph and absorbs any non-fatal failure raised inside
/// it. The failure is recorded on the run and the catcher ends successfully
/// with the value it received.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExceptionCatcher;

impl ExceptionCatcher {
  pub const TYPE: &'static str = "exception-catcher";
}

#[async_trait]
impl Behavior for ExceptionCatcher {
  fn validate(&self, component: &Component) -> Result<(), String> {
    require_wire(component, NEXT)
  }

  async fn evaluate(
    &self,
    component: &Component,
    ctx: &mut ExecutionContext,
    branches: &dyn Branches,
  ) -> Outcome {
    let value = ctx.value().clone();

    match branches.follow(component, NEXT, value.clone(), ctx).await {
      Outcome::Fail(cause) if !cause.is_fatal() => {
        warn!(
          run_id = %ctx.run_id(),
          component = %component.reference,
          error = %cause,
          "failure_caught"
        );
        ctx.record_caught(component.reference.clone(), cause);
        Outcome::Terminate(value)
      }
      outcome => outcome,
    }
  }
}
