//! Composer Config
//!
//! This crate contains the serializable application configuration types for
//! composer. These types represent applications before they are validated and
//! turned into an immutable graph by `composer-graph`.
//!
//! Configuration can be loaded from:
//! - a full application document (`{"name": ..., "composites": [...]}`;
//!   the legacy `composets` spelling is accepted)
//! - a standalone composite document (`{"name": ..., "components": [...]}`),
//!   which is treated as a single-composite application
//!
//! Nothing here checks that wires resolve or that component types exist; that
//! is the job of the graph loader.

mod application;
mod component;

pub use application::{ApplicationDef, CompositeDef};
pub use component::ComponentDef;
