use composer_graph::GraphError;
use thiserror::Error;

/// Errors raised around a run, as opposed to failures inside one.
///
/// Component failures are not errors: they end up in
/// [`RunOutcome::Failure`](crate::RunOutcome::Failure).
#[derive(Debug, Error)]
pub enum EngineError {
  #[error("failed to load application: {0}")]
  Load(#[from] GraphError),

  #[error("entry component '{0}' not found in application")]
  UnknownEntry(String),

  #[error("run task failed: {message}")]
  Join { message: String },

  #[error("application runner channel closed")]
  ChannelClosed,
}
