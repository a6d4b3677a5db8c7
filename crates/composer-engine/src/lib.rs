//! Execution engine for composer applications.
//!
//! Load an [`ApplicationDef`](composer_config::ApplicationDef) with
//! [`Engine::load`], then [`Engine::run`] it with a payload or hand it to an
//! [`ApplicationRunner`] to serve a stream of payloads.

mod engine;
mod error;
mod events;
mod report;
mod runner;

pub use engine::{
  DEFAULT_TRACE_CAPACITY, Engine, EngineConfig, MAX_CONCURRENT_ITERATIONS, RunHandle,
};
pub use error::EngineError;
pub use events::{ChannelNotifier, ExecutionEvent, ExecutionNotifier, NoopNotifier};
pub use report::{RunOutcome, RunReport};
pub use runner::ApplicationRunner;
