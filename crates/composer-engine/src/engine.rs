//! The execution engine.
//!
//! `Engine` walks a loaded [`Application`] from an entry component, asking the
//! registry for each component's behavior and following the wire named by
//! the outcome. Branching behaviors re-enter the walk through [`Branches`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument};
use uuid::Uuid;

use composer_config::ApplicationDef;
use composer_graph::{Application, Component, ComponentId, ComponentRef, GraphError};
use composer_registry::{
  Branches, ComponentTypeRegistry, Dispatcher, ExecutionContext, FailureCause, Outcome, Services,
  StepResult,
};

use crate::error::EngineError;
use crate::events::{ExecutionEvent, ExecutionNotifier, NoopNotifier};
use crate::report::{RunOutcome, RunReport};

/// Default number of steps a run trace keeps.
pub const DEFAULT_TRACE_CAPACITY: usize = 256;

/// Most forks of one `fan_out` that are walked at the same time. Forks are
/// created as earlier ones finish, so memory stays bounded for any count.
pub const MAX_CONCURRENT_ITERATIONS: usize = 32;

/// Configuration for the engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
  /// Isolate this engine hosts. Components placed on a different isolate are
  /// handed to the dispatcher. `None` evaluates everything in-process.
  pub local_isolate: Option<String>,
  /// Maximum steps kept in a run trace, 0 for unbounded.
  pub trace_capacity: usize,
}

impl Default for EngineConfig {
  fn default() -> Self {
    Self {
      local_isolate: None,
      trace_capacity: DEFAULT_TRACE_CAPACITY,
    }
  }
}

type ActiveRuns = Mutex<HashMap<Uuid, CancellationToken>>;

/// The application execution engine.
///
/// Generic over `N: ExecutionNotifier`. `Engine::new()` discards events,
/// `Engine::with_notifier()` takes a custom notifier.
pub struct Engine<N: ExecutionNotifier = NoopNotifier> {
  registry: Arc<ComponentTypeRegistry>,
  dispatcher: Arc<dyn Dispatcher>,
  config: EngineConfig,
  notifier: N,
  active: Arc<ActiveRuns>,
}

impl Engine<NoopNotifier> {
  /// An engine with the built-in component types wired to `services`.
  pub fn new(config: EngineConfig, services: Services) -> Self {
    let registry = ComponentTypeRegistry::with_builtins(&services);
    Self::with_notifier(config, registry, services.dispatcher, NoopNotifier)
  }
}

impl<N: ExecutionNotifier> Engine<N> {
  pub fn with_notifier(
    config: EngineConfig,
    registry: ComponentTypeRegistry,
    dispatcher: Arc<dyn Dispatcher>,
    notifier: N,
  ) -> Self {
    Self {
      registry: Arc::new(registry),
      dispatcher,
      config,
      notifier,
      active: Arc::new(Mutex::new(HashMap::new())),
    }
  }

  pub fn registry(&self) -> &ComponentTypeRegistry {
    &self.registry
  }

  pub fn config(&self) -> &EngineConfig {
    &self.config
  }

  /// Resolve and validate a definition against the registered types.
  pub fn load(&self, def: ApplicationDef) -> Result<Application, GraphError> {
    Application::load(def, self.registry.as_ref())
  }

  /// Run the application from `entry` until it terminates or fails.
  #[instrument(
    name = "engine_run",
    skip(self, app, value, cancel),
    fields(application = %app.name(), entry = %entry)
  )]
  pub async fn run(
    &self,
    app: &Application,
    entry: &ComponentRef,
    value: serde_json::Value,
    cancel: CancellationToken,
  ) -> Result<RunReport, EngineError> {
    let start = app
      .find(entry)
      .ok_or_else(|| EngineError::UnknownEntry(entry.to_string()))?;

    let run_id = Uuid::new_v4();
    let token = cancel.child_token();
    let _active = self.track(run_id, token.clone());
    Ok(self.execute(app, start.id, run_id, value, token).await)
  }

  /// Run from the application's entry point.
  pub async fn run_entry(
    &self,
    app: &Application,
    value: serde_json::Value,
    cancel: CancellationToken,
  ) -> Result<RunReport, EngineError> {
    let entry = app.entry().reference.clone();
    self.run(app, &entry, value, cancel).await
  }

  /// Start a run on its own task. The run is cancelled when `cancel` is, when
  /// the handle's `cancel` is called, or through [`Engine::cancel_run`].
  pub fn spawn(
    self: &Arc<Self>,
    app: Arc<Application>,
    entry: &ComponentRef,
    value: serde_json::Value,
    cancel: CancellationToken,
  ) -> Result<RunHandle, EngineError>
  where
    N: 'static,
  {
    let start = app
      .find(entry)
      .ok_or_else(|| EngineError::UnknownEntry(entry.to_string()))?
      .id;

    let run_id = Uuid::new_v4();
    let token = cancel.child_token();
    // Owned by the task future, so the entry goes away even if the task is
    // dropped before it is first polled.
    let active = self.track(run_id, token.clone());

    let engine = Arc::clone(self);
    let run_token = token.clone();
    let handle = tokio::spawn(async move {
      let _active = active;
      engine.execute(&app, start, run_id, value, run_token).await
    });

    Ok(RunHandle {
      run_id,
      cancel: token,
      handle,
    })
  }

  /// Cancel an in-flight run. Returns `false` if no such run is active.
  pub fn cancel_run(&self, run_id: Uuid) -> bool {
    match lock(&self.active).get(&run_id) {
      Some(token) => {
        info!(run_id = %run_id, "run_cancel_requested");
        token.cancel();
        true
      }
      None => false,
    }
  }

  /// Ids of runs currently in flight.
  pub fn active_runs(&self) -> Vec<Uuid> {
    lock(&self.active).keys().copied().collect()
  }

  fn track(&self, run_id: Uuid, token: CancellationToken) -> ActiveRun {
    lock(&self.active).insert(run_id, token);
    ActiveRun {
      runs: Arc::clone(&self.active),
      run_id,
    }
  }

  async fn execute(
    &self,
    app: &Application,
    start: ComponentId,
    run_id: Uuid,
    value: serde_json::Value,
    cancel: CancellationToken,
  ) -> RunReport {
    let mut ctx = ExecutionContext::new(
      run_id,
      value.clone(),
      self.config.trace_capacity,
      cancel,
    );

    let outcome = match app.get(start) {
      Some(start) => {
        info!(
          run_id = %run_id,
          entry = %start.reference,
          payload = %value,
          "run_started"
        );
        self.notifier.notify(ExecutionEvent::RunStarted {
          run_id,
          application: app.name().to_string(),
          entry: start.reference.clone(),
        });

        let driver = RunDriver { engine: self, app };
        driver.walk(start, value, &mut ctx).await
      }
      None => Outcome::Fail(FailureCause::Component {
        component: format!("#{}", start.index()),
        message: "entry component is not part of this application".to_string(),
      }),
    };

    let (trace, caught) = ctx.into_parts();
    let outcome = match outcome {
      Outcome::Terminate(value) | Outcome::Continue(_, value) => {
        info!(run_id = %run_id, steps = trace.len(), "run_completed");
        self.notifier.notify(ExecutionEvent::RunCompleted {
          run_id,
          value: value.clone(),
        });
        RunOutcome::Success { value }
      }
      Outcome::Fail(cause) => {
        error!(run_id = %run_id, error = %cause, "run_failed");
        self.notifier.notify(ExecutionEvent::RunFailed {
          run_id,
          cause: cause.clone(),
        });
        RunOutcome::Failure {
          cause,
          trace: trace.clone(),
        }
      }
    };

    RunReport {
      run_id,
      outcome,
      trace,
      caught,
    }
  }

  fn is_remote<'c>(&self, component: &'c Component) -> Option<&'c str> {
    let local = self.config.local_isolate.as_deref()?;
    component
      .isolate
      .as_deref()
      .filter(|isolate| *isolate != local)
  }
}

fn lock(runs: &ActiveRuns) -> std::sync::MutexGuard<'_, HashMap<Uuid, CancellationToken>> {
  runs.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Removes a run from the active set when it ends, however it ends.
struct ActiveRun {
  runs: Arc<ActiveRuns>,
  run_id: Uuid,
}

impl Drop for ActiveRun {
  fn drop(&mut self) {
    lock(&self.runs).remove(&self.run_id);
  }
}

/// Handle to a run started with [`Engine::spawn`].
#[derive(Debug)]
pub struct RunHandle {
  run_id: Uuid,
  cancel: CancellationToken,
  handle: JoinHandle<RunReport>,
}

impl RunHandle {
  pub fn run_id(&self) -> Uuid {
    self.run_id
  }

  pub fn cancel(&self) {
    self.cancel.cancel();
  }

  /// Wait for the run to finish.
  pub async fn wait(self) -> Result<RunReport, EngineError> {
    self.handle.await.map_err(|e| EngineError::Join {
      message: e.to_string(),
    })
  }
}

/// Walks one run. Also the [`Branches`] capability handed to behaviors.
struct RunDriver<'a, N: ExecutionNotifier> {
  engine: &'a Engine<N>,
  app: &'a Application,
}

impl<'a, N: ExecutionNotifier> RunDriver<'a, N> {
  /// Evaluate from `start` along returned labels until the path ends.
  async fn walk(
    &self,
    start: &Component,
    value: serde_json::Value,
    ctx: &mut ExecutionContext,
  ) -> Outcome {
    let mark = ctx.path_len();
    let mut current = start;
    let mut value = value;

    let outcome = loop {
      if ctx.is_cancelled() {
        break Outcome::Fail(FailureCause::Cancelled);
      }

      if !ctx.enter(current.id) {
        let cause = FailureCause::GraphCycle {
          component: current.reference.to_string(),
        };
        let depth = ctx.depth();
        let seq = ctx
          .trace_mut()
          .begin(&current.reference, &current.component_type, depth);
        ctx.trace_mut().finish(
          seq,
          StepResult::Failed {
            cause: cause.clone(),
          },
        );
        break Outcome::Fail(cause);
      }

      ctx.set_value(value);
      match self.step(current, ctx).await {
        Outcome::Continue(label, next_value) => match self.app.resolve(current.id, &label) {
          Some(next) => {
            current = next;
            value = next_value;
          }
          // No wire for the label: the path ends here.
          None => break Outcome::Terminate(next_value),
        },
        other => break other,
      }
    };

    ctx.truncate_path(mark);
    outcome
  }

  async fn step(&self, component: &Component, ctx: &mut ExecutionContext) -> Outcome {
    let run_id = ctx.run_id();
    let depth = ctx.depth();
    let seq = ctx
      .trace_mut()
      .begin(&component.reference, &component.component_type, depth);
    self.engine.notifier.notify(ExecutionEvent::ComponentStarted {
      run_id,
      component: component.reference.clone(),
      component_type: component.component_type.clone(),
      depth,
    });

    let outcome = match self.engine.is_remote(component) {
      Some(isolate) => self.dispatch(component, isolate, ctx).await,
      None => match self.engine.registry.get(&component.component_type) {
        Some(behavior) => behavior.evaluate(component, ctx, self).await,
        None => Outcome::Fail(FailureCause::Component {
          component: component.reference.to_string(),
          message: format!("no behavior for type '{}'", component.component_type),
        }),
      },
    };

    debug!(
      run_id = %run_id,
      component = %component.reference,
      outcome = outcome.kind(),
      depth,
      "component_evaluated"
    );

    let result = StepResult::from(&outcome);
    ctx.trace_mut().finish(seq, result.clone());
    self
      .engine
      .notifier
      .notify(ExecutionEvent::ComponentFinished {
        run_id,
        component: component.reference.clone(),
        result,
      });

    outcome
  }

  async fn dispatch(
    &self,
    component: &Component,
    isolate: &str,
    ctx: &mut ExecutionContext,
  ) -> Outcome {
    debug!(
      component = %component.reference,
      isolate,
      "dispatching to remote isolate"
    );
    let cancel = ctx.cancellation().clone();
    let value = ctx.value().clone();
    tokio::select! {
      outcome = self.engine.dispatcher.invoke(isolate, &component.reference, value) => outcome,
      _ = cancel.cancelled() => Outcome::Fail(FailureCause::Cancelled),
    }
  }
}

#[async_trait]
impl<'a, N: ExecutionNotifier> Branches for RunDriver<'a, N> {
  async fn follow(
    &self,
    from: &Component,
    label: &str,
    value: serde_json::Value,
    ctx: &mut ExecutionContext,
  ) -> Outcome {
    let Some(target) = self.app.resolve(from.id, label) else {
      return Outcome::Terminate(value);
    };

    let depth = ctx.depth();
    ctx.set_depth(depth + 1);
    let outcome = self.walk(target, value, ctx).await;
    ctx.set_depth(depth);
    outcome
  }

  async fn fan_out(
    &self,
    from: &Component,
    label: &str,
    value: serde_json::Value,
    count: usize,
    ctx: &mut ExecutionContext,
  ) -> Vec<Outcome> {
    let Some(target) = self.app.resolve(from.id, label) else {
      return vec![Outcome::Terminate(value); count];
    };

    let depth = ctx.depth() + 1;
    let parent = &*ctx;
    let finished: Vec<(Outcome, ExecutionContext)> = futures::stream::iter(0..count)
      .map(|_| {
        let mut fork = parent.fork(value.clone());
        fork.set_depth(depth);
        let input = value.clone();
        async move {
          let outcome = self.walk(target, input, &mut fork).await;
          (outcome, fork)
        }
      })
      .buffered(MAX_CONCURRENT_ITERATIONS)
      .collect()
      .await;

    let mut outcomes = Vec::with_capacity(count);
    for (outcome, fork) in finished {
      ctx.merge(fork);
      outcomes.push(outcome);
    }
    outcomes
  }
}
