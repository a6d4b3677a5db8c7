use serde::Serialize;
use uuid::Uuid;

use composer_registry::{CaughtFailure, FailureCause, Trace};

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
  Success { value: serde_json::Value },
  Failure { cause: FailureCause, trace: Trace },
}

/// Everything the caller gets back from a run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
  pub run_id: Uuid,
  pub outcome: RunOutcome,
  /// Components visited, in order, bounded by the configured capacity.
  pub trace: Trace,
  /// Failures absorbed by exception-catchers along the way.
  pub caught: Vec<CaughtFailure>,
}

impl RunReport {
  pub fn is_success(&self) -> bool {
    matches!(self.outcome, RunOutcome::Success { .. })
  }

  /// The final value of a successful run.
  pub fn value(&self) -> Option<&serde_json::Value> {
    match &self.outcome {
      RunOutcome::Success { value } => Some(value),
      RunOutcome::Failure { .. } => None,
    }
  }

  pub fn cause(&self) -> Option<&FailureCause> {
    match &self.outcome {
      RunOutcome::Success { .. } => None,
      RunOutcome::Failure { cause, .. } => Some(cause),
    }
  }
}
