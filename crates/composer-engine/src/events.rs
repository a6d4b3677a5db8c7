//! Execution events and notifiers.
//!
//! The engine emits events as a run progresses so callers can stream
//! progress, persist it or ignore it.

use serde::Serialize;
use tokio::sync::mpsc;
use uuid::Uuid;

use composer_graph::ComponentRef;
use composer_registry::{FailureCause, StepResult};

/// Events emitted during a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ExecutionEvent {
  /// A run has started at `entry`.
  RunStarted {
    run_id: Uuid,
    application: String,
    entry: ComponentRef,
  },

  /// A component is about to be evaluated.
  ComponentStarted {
    run_id: Uuid,
    component: ComponentRef,
    component_type: String,
    depth: usize,
  },

  /// A component has produced its outcome.
  ComponentFinished {
    run_id: Uuid,
    component: ComponentRef,
    result: StepResult,
  },

  /// The run reached a terminal success.
  RunCompleted {
    run_id: Uuid,
    value: serde_json::Value,
  },

  /// The run ended with an uncaught failure.
  RunFailed { run_id: Uuid, cause: FailureCause },
}

impl ExecutionEvent {
  pub fn run_id(&self) -> Uuid {
    match self {
      Self::RunStarted { run_id, .. }
      | Self::ComponentStarted { run_id, .. }
      | Self::ComponentFinished { run_id, .. }
      | Self::RunCompleted { run_id, .. }
      | Self::RunFailed { run_id, .. } => *run_id,
    }
  }
}

/// Receives execution events.
///
/// Called inline by the engine, so implementations should not block.
pub trait ExecutionNotifier: Send + Sync {
  fn notify(&self, event: ExecutionEvent);
}

/// Discards every event.
#[derive(Debug, Clone, Default)]
pub struct NoopNotifier;

impl ExecutionNotifier for NoopNotifier {
  fn notify(&self, _event: ExecutionEvent) {}
}

/// Forwards events to an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
  // Unbounded so a slow consumer never stalls a run. Volume is two events
  // per component visit.
  sender: mpsc::UnboundedSender<ExecutionEvent>,
}

impl ChannelNotifier {
  pub fn new(sender: mpsc::UnboundedSender<ExecutionEvent>) -> Self {
    Self { sender }
  }

  /// A notifier together with the receiving end of its channel.
  pub fn channel() -> (Self, mpsc::UnboundedReceiver<ExecutionEvent>) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (Self::new(sender), receiver)
  }
}

impl ExecutionNotifier for ChannelNotifier {
  fn notify(&self, event: ExecutionEvent) {
    // Receiver may have been dropped.
    let _ = self.sender.send(event);
  }
}
