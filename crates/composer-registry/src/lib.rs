//! Composer Registry
//!
//! Maps component type names to [`Behavior`] implementations and defines the
//! vocabulary the engine and behaviors share:
//!
//! - [`Outcome`]: `Continue(label, value)`, `Terminate(value)`, `Fail(cause)`
//! - [`FailureCause`]: the failure taxonomy (cache miss, timeout, transport...)
//! - [`ExecutionContext`]: per-run value, forward path, trace and caught
//!   failures
//! - [`Branches`]: subgraph execution offered by the engine to branching
//!   behaviors such as `fall-back`
//! - [`Dispatcher`]: the cross-isolate invocation capability
//!
//! # Built-in types
//!
//! | Type | Behavior |
//! |------|----------|
//! | `test-entry` | start of a pipeline, optionally repeated `nbIterations` times |
//! | `test-end` | successful end |
//! | `get-cache` | read an entry, fail on miss |
//! | `get-cache-if-recent` | read an entry younger than `maxCacheAge` |
//! | `store-cache` | write the value, pass it through |
//! | `fall-back` | `next` subgraph, `second` on failure |
//! | `exception-catcher` | absorb failures of the `next` subgraph |
//! | `cache-queue-handler` | take a queued cart, bounded by `timeout` |
//! | `erp-caller` | call a domain method through the dispatcher |

mod behavior;
pub mod builtin;
mod context;
mod dispatch;
mod outcome;
mod registry;

pub use behavior::{Behavior, Branches};
pub use context::{CaughtFailure, ExecutionContext, StepResult, Trace, TraceStep};
pub use dispatch::{DisconnectedDispatcher, Dispatcher, LOCAL_ISOLATE};
pub use outcome::{FailureCause, Outcome};
pub use registry::{ComponentTypeRegistry, Services};
