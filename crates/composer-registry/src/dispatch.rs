//! Cross-isolate invocation capability.

use async_trait::async_trait;

use composer_graph::ComponentRef;

use crate::outcome::{FailureCause, Outcome};

/// Isolate name used for components that declare none.
pub const LOCAL_ISOLATE: &str = "local";

/// Delivers an invocation to a component hosted on another isolate.
///
/// Implementations own the transport. Every transport problem must come back
/// as `Outcome::Fail(FailureCause::Transport { .. })`; nothing is retried here.
#[async_trait]
pub trait Dispatcher: Send + Sync {
  async fn invoke(
    &self,
    isolate: &str,
    component: &ComponentRef,
    value: serde_json::Value,
  ) -> Outcome;
}

/// A dispatcher with no transport behind it. Every call fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisconnectedDispatcher;

#[async_trait]
impl Dispatcher for DisconnectedDispatcher {
  async fn invoke(
    &self,
    isolate: &str,
    component: &ComponentRef,
    _value: serde_json::Value,
  ) -> Outcome {
    Outcome::Fail(FailureCause::Transport {
      isolate: isolate.to_string(),
      message: format!("no transport configured to reach '{}'", component),
    })
  }
}
