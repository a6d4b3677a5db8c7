//! Application runner with channel-based triggering.
//!
//! The `ApplicationRunner` owns an mpsc channel of payloads and starts one
//! run per payload. Runs proceed concurrently; each gets a child of the
//! runner's cancellation token.

use std::sync::Arc;

use composer_graph::{Application, ComponentRef};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::engine::{Engine, RunHandle};
use crate::error::EngineError;
use crate::events::ExecutionNotifier;
use crate::report::{RunOutcome, RunReport};

/// Starts a run of one application for every payload it receives.
///
/// # Usage
///
/// ```ignore
/// let runner = ApplicationRunner::new(engine, app);
///
/// // Hand the sender to whatever produces payloads
/// let sender = runner.sender();
///
/// let cancel = CancellationToken::new();
/// runner.start(cancel).await?;
/// ```
pub struct ApplicationRunner<N: ExecutionNotifier + 'static> {
  sender: mpsc::Sender<serde_json::Value>,
  receiver: mpsc::Receiver<serde_json::Value>,
  engine: Arc<Engine<N>>,
  app: Arc<Application>,
  entry: ComponentRef,
}

impl<N: ExecutionNotifier + 'static> ApplicationRunner<N> {
  /// A runner starting at the application's entry point.
  pub fn new(engine: Arc<Engine<N>>, app: Arc<Application>) -> Self {
    Self::with_buffer_size(engine, app, 100)
  }

  pub fn with_buffer_size(
    engine: Arc<Engine<N>>,
    app: Arc<Application>,
    buffer_size: usize,
  ) -> Self {
    let (sender, receiver) = mpsc::channel(buffer_size);
    let entry = app.entry().reference.clone();
    Self {
      sender,
      receiver,
      engine,
      app,
      entry,
    }
  }

  /// Start runs from `entry` instead of the application's entry point.
  pub fn with_entry(mut self, entry: ComponentRef) -> Result<Self, EngineError> {
    if self.app.find(&entry).is_none() {
      return Err(EngineError::UnknownEntry(entry.to_string()));
    }
    self.entry = entry;
    Ok(self)
  }

  pub fn sender(&self) -> mpsc::Sender<serde_json::Value> {
    self.sender.clone()
  }

  /// Queue a payload for execution.
  pub async fn submit(&self, payload: serde_json::Value) -> Result<(), EngineError> {
    self
      .sender
      .send(payload)
      .await
      .map_err(|_| EngineError::ChannelClosed)
  }

  /// Run the receive loop until `cancel` fires or every sender is gone.
  ///
  /// On cancellation in-flight runs are cancelled too; the loop waits for
  /// all of them before returning.
  pub async fn start(self, cancel: CancellationToken) -> Result<(), EngineError> {
    let Self {
      sender,
      mut receiver,
      engine,
      app,
      entry,
    } = self;
    // Only external senders keep the loop alive.
    drop(sender);

    info!(application = %app.name(), entry = %entry, "starting application runner");

    let mut runs: JoinSet<Result<RunReport, EngineError>> = JoinSet::new();
    loop {
      tokio::select! {
        _ = cancel.cancelled() => {
          info!(application = %app.name(), "application runner cancelled");
          break;
        }
        Some(finished) = runs.join_next(), if !runs.is_empty() => {
          log_finished(finished);
        }
        payload = receiver.recv() => {
          let Some(payload) = payload else {
            info!(application = %app.name(), "application runner channel closed");
            break;
          };
          let handle = engine.spawn(Arc::clone(&app), &entry, payload, cancel.child_token())?;
          info!(run_id = %handle.run_id(), "run_triggered");
          runs.spawn(RunHandle::wait(handle));
        }
      }
    }

    while let Some(finished) = runs.join_next().await {
      log_finished(finished);
    }
    Ok(())
  }

  /// Execute one payload without the loop.
  pub async fn execute_once(
    &self,
    payload: serde_json::Value,
    cancel: CancellationToken,
  ) -> Result<RunReport, EngineError> {
    self.engine.run(&self.app, &self.entry, payload, cancel).await
  }

  pub fn application(&self) -> &Application {
    &self.app
  }
}

fn log_finished(finished: Result<Result<RunReport, EngineError>, tokio::task::JoinError>) {
  match finished {
    Ok(Ok(report)) => match &report.outcome {
      RunOutcome::Success { .. } => {
        info!(run_id = %report.run_id, steps = report.trace.len(), "run finished");
      }
      RunOutcome::Failure { cause, .. } => {
        warn!(run_id = %report.run_id, error = %cause, "run finished with failure");
      }
    },
    Ok(Err(e)) => error!(error = %e, "run did not finish"),
    Err(e) => error!(error = %e, "run task panicked"),
  }
}
