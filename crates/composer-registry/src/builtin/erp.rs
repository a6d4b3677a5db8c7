use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use composer_graph::{Component, PropertyError};

use crate::behavior::{Behavior, Branches};
use crate::context::ExecutionContext;
use crate::dispatch::{Dispatcher, LOCAL_ISOLATE};
use crate::outcome::{FailureCause, Outcome};
use crate::registry::Services;

use super::invalid_property;

const METHOD: &str = "method";
const TIMEOUT: &str = "timeout";

/// Calls a domain method through the cross-isolate dispatcher.
///
/// The request is `{"method": ..., "payload": <value>}`, sent to the
/// component's own isolate. Any transport or remote failure becomes a `Fail`
/// outcome.
pub struct ErpCaller {
  dispatcher: Arc<dyn Dispatcher>,
}

impl ErpCaller {
  pub const TYPE: &'static str = "erp-caller";

  pub fn new(services: &Services) -> Self {
    Self {
      dispatcher: services.dispatcher.clone(),
    }
  }
}

fn settings(component: &Component) -> Result<(&str, Option<u64>), PropertyError> {
  Ok((
    component.require_str(METHOD)?,
    component.u64_property(TIMEOUT)?,
  ))
}

#[async_trait]
impl Behavior for ErpCaller {
  fn validate(&self, component: &Component) -> Result<(), String> {
    settings(component).map(|_| ()).map_err(|e| e.to_string())
  }

  async fn evaluate(
    &self,
    component: &Component,
    ctx: &mut ExecutionContext,
    _branches: &dyn Branches,
  ) -> Outcome {
    let (method, timeout_ms) = match settings(component) {
      Ok(s) => s,
      Err(e) => return invalid_property(component, e),
    };
    let isolate = component.isolate.as_deref().unwrap_or(LOCAL_ISOLATE);
    let request = serde_json::json!({
      "method": method,
      "payload": ctx.value(),
    });

    debug!(run_id = %ctx.run_id(), isolate, method, "erp_call");

    let call = self.dispatcher.invoke(isolate, &component.reference, request);
    let cancel = ctx.cancellation().clone();
    let reply = match timeout_ms {
      Some(ms) => tokio::select! {
        reply = tokio::time::timeout(Duration::from_millis(ms), call) => match reply {
          Ok(outcome) => outcome,
          Err(_) => Outcome::Fail(FailureCause::Timeout {
            component: component.reference.to_string(),
            after_ms: ms,
          }),
        },
        _ = cancel.cancelled() => Outcome::Fail(FailureCause::Cancelled),
      },
      None => tokio::select! {
        outcome = call => outcome,
        _ = cancel.cancelled() => Outcome::Fail(FailureCause::Cancelled),
      },
    };

    match reply {
      Outcome::Continue(_, value) | Outcome::Terminate(value) => Outcome::next(value),
      failed @ Outcome::Fail(_) => failed,
    }
  }
}
