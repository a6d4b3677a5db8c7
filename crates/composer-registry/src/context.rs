//! Per-run execution context and trace.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use composer_graph::{ComponentId, ComponentRef};

use crate::outcome::{FailureCause, Outcome};

/// What happened to a component once it was evaluated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum StepResult {
  Continued { label: String },
  Terminated,
  Failed { cause: FailureCause },
}

impl From<&Outcome> for StepResult {
  fn from(outcome: &Outcome) -> Self {
    match outcome {
      Outcome::Continue(label, _) => Self::Continued {
        label: label.clone(),
      },
      Outcome::Terminate(_) => Self::Terminated,
      Outcome::Fail(cause) => Self::Failed {
        cause: cause.clone(),
      },
    }
  }
}

/// One component visit. `depth` is the branch nesting level (0 for the main
/// path, +1 inside each fall-back / exception-catcher / iteration branch).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceStep {
  pub component: ComponentRef,
  pub component_type: String,
  pub depth: usize,
  /// `None` while the component is still running (or if the run was
  /// interrupted inside it).
  pub result: Option<StepResult>,
}

/// Bounded record of visited components, oldest steps dropped first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Trace {
  steps: VecDeque<TraceStep>,
  dropped: usize,
  #[serde(skip)]
  capacity: usize,
}

impl Trace {
  /// A trace keeping at most `capacity` steps; 0 keeps every step.
  pub fn with_capacity(capacity: usize) -> Self {
    Self {
      steps: VecDeque::with_capacity(capacity.min(64)),
      dropped: 0,
      capacity,
    }
  }

  /// Record a visit and return its sequence number.
  pub fn begin(&mut self, component: &ComponentRef, component_type: &str, depth: usize) -> usize {
    self.push(TraceStep {
      component: component.clone(),
      component_type: component_type.to_string(),
      depth,
      result: None,
    })
  }

  /// Attach the result to a visit recorded by [`Trace::begin`]. Ignored if
  /// the step has already been dropped.
  pub fn finish(&mut self, seq: usize, result: StepResult) {
    if let Some(step) = seq
      .checked_sub(self.dropped)
      .and_then(|index| self.steps.get_mut(index))
    {
      step.result = Some(result);
    }
  }

  fn push(&mut self, step: TraceStep) -> usize {
    // capacity 0 (also a deserialized trace) is unbounded
    if self.capacity > 0 && self.steps.len() >= self.capacity {
      self.steps.pop_front();
      self.dropped += 1;
    }
    self.steps.push_back(step);
    self.dropped + self.steps.len() - 1
  }

  /// Append another trace's steps (used when merging forked iterations).
  pub fn absorb(&mut self, other: Trace) {
    self.dropped += other.dropped;
    for step in other.steps {
      self.push(step);
    }
  }

  pub fn steps(&self) -> impl Iterator<Item = &TraceStep> {
    self.steps.iter()
  }

  pub fn len(&self) -> usize {
    self.steps.len()
  }

  pub fn is_empty(&self) -> bool {
    self.steps.is_empty()
  }

  /// Number of steps that no longer fit.
  pub fn dropped(&self) -> usize {
    self.dropped
  }

  /// Names of the visited components, in visit order.
  pub fn visited(&self) -> Vec<String> {
    self.steps.iter().map(|s| s.component.to_string()).collect()
  }

  /// The last visit that failed, i.e. the component a failure came from.
  pub fn last_failure(&self) -> Option<&TraceStep> {
    self
      .steps
      .iter()
      .rev()
      .find(|s| matches!(s.result, Some(StepResult::Failed { .. })))
  }
}

/// A failure that an exception-catcher absorbed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaughtFailure {
  pub catcher: ComponentRef,
  pub cause: FailureCause,
}

/// State of one run. Owned by that run only.
#[derive(Debug)]
pub struct ExecutionContext {
  run_id: Uuid,
  value: serde_json::Value,
  path: Vec<ComponentId>,
  depth: usize,
  trace: Trace,
  caught: Vec<CaughtFailure>,
  cancel: CancellationToken,
}

impl ExecutionContext {
  pub fn new(
    run_id: Uuid,
    value: serde_json::Value,
    trace_capacity: usize,
    cancel: CancellationToken,
  ) -> Self {
    Self {
      run_id,
      value,
      path: Vec::new(),
      depth: 0,
      trace: Trace::with_capacity(trace_capacity),
      caught: Vec::new(),
      cancel,
    }
  }

  pub fn run_id(&self) -> Uuid {
    self.run_id
  }

  /// The value flowing into the component being evaluated.
  pub fn value(&self) -> &serde_json::Value {
    &self.value
  }

  pub fn set_value(&mut self, value: serde_json::Value) {
    self.value = value;
  }

  pub fn cancellation(&self) -> &CancellationToken {
    &self.cancel
  }

  pub fn is_cancelled(&self) -> bool {
    self.cancel.is_cancelled()
  }

  /// Add a component to the current forward path. Returns `false` if it is
  /// already on it.
  pub fn enter(&mut self, id: ComponentId) -> bool {
    if self.path.contains(&id) {
      return false;
    }
    self.path.push(id);
    true
  }

  pub fn path_len(&self) -> usize {
    self.path.len()
  }

  /// Rewind the forward path, e.g. when a branch returns.
  pub fn truncate_path(&mut self, len: usize) {
    self.path.truncate(len);
  }

  pub fn depth(&self) -> usize {
    self.depth
  }

  pub fn set_depth(&mut self, depth: usize) {
    self.depth = depth;
  }

  pub fn trace(&self) -> &Trace {
    &self.trace
  }

  pub fn trace_mut(&mut self) -> &mut Trace {
    &mut self.trace
  }

  pub fn record_caught(&mut self, catcher: ComponentRef, cause: FailureCause) {
    self.caught.push(CaughtFailure { catcher, cause });
  }

  pub fn caught(&self) -> &[CaughtFailure] {
    &self.caught
  }

  /// An independent context for a concurrent iteration: same run, same
  /// path so far, empty trace.
  pub fn fork(&self, value: serde_json::Value) -> Self {
    Self {
      run_id: self.run_id,
      value,
      path: self.path.clone(),
      depth: self.depth,
      trace: Trace::with_capacity(self.trace.capacity),
      caught: Vec::new(),
      cancel: self.cancel.clone(),
    }
  }

  /// Fold a finished fork back in.
  pub fn merge(&mut self, fork: ExecutionContext) {
    self.trace.absorb(fork.trace);
    self.caught.extend(fork.caught);
  }

  /// Split into the parts a run report keeps.
  pub fn into_parts(self) -> (Trace, Vec<CaughtFailure>) {
    (self.trace, self.caught)
  }
}
