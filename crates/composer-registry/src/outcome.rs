//! Outcomes of evaluating a component, and the failure taxonomy.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use composer_graph::NEXT;

/// Why a component, a branch or a whole run failed.
///
/// These are values, not Rust errors: behaviors return them inside
/// [`Outcome::Fail`] and the engine routes them.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureCause {
  #[error("cache miss on '{channel}/{entry}'")]
  CacheMiss { channel: String, entry: String },

  #[error("cache entry '{channel}/{entry}' is stale or missing")]
  CacheStaleOrMissing {
    channel: String,
    entry: String,
    /// Age of the stale entry, `None` when there was no entry.
    age_ms: Option<u64>,
  },

  #[error("'{component}' timed out after {after_ms} ms")]
  Timeout { component: String, after_ms: u64 },

  #[error("transport error reaching isolate '{isolate}': {message}")]
  Transport { isolate: String, message: String },

  #[error("remote call from '{component}' failed: {message}")]
  Remote { component: String, message: String },

  #[error("cycle detected: '{component}' reached twice on one path")]
  GraphCycle { component: String },

  #[error("run cancelled")]
  Cancelled,

  #[error("invalid property on '{component}': {message}")]
  InvalidProperty { component: String, message: String },

  #[error("'{component}' failed: {message}")]
  Component { component: String, message: String },
}

impl FailureCause {
  /// Fatal causes end the run; fall-back and exception-catcher let them
  /// through untouched.
  pub fn is_fatal(&self) -> bool {
    matches!(self, Self::GraphCycle { .. } | Self::Cancelled)
  }
}

/// Result of evaluating one component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
  /// Proceed along the wire named by the label.
  Continue(String, serde_json::Value),
  /// The run (or the current branch) ends successfully.
  Terminate(serde_json::Value),
  /// Something went wrong; the engine propagates it.
  Fail(FailureCause),
}

impl Outcome {
  /// `Continue` along the default `next` wire.
  pub fn next(value: serde_json::Value) -> Self {
    Self::Continue(NEXT.to_string(), value)
  }

  pub fn is_fail(&self) -> bool {
    matches!(self, Self::Fail(_))
  }

  /// Short name for logs and traces.
  pub fn kind(&self) -> &'static str {
    match self {
      Self::Continue(..) => "continue",
      Self::Terminate(_) => "terminate",
      Self::Fail(_) => "fail",
    }
  }
}
